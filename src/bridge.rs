// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Couples two transports with inverted roles, forwarding frames
//! between them untouched. RTU↔TCP, RTU↔RTU and TCP↔TCP are all just
//! `Bridge<A, B>` over whichever two [`Transport`] implementations are
//! plugged in — the bridge itself knows nothing about wire formats.
//!
//! TCP transaction-id regeneration and mapping (forwarding a request
//! under a fresh `txn_id` and routing the eventual response back under
//! the inbound one) is a property of a concrete TCP [`Transport`]
//! implementation, not of [`Frame`] — this crate's core is Frame-level
//! and carries no `txn_id`, so the bridge has no mapping table of its
//! own to maintain.

use crate::frame::Frame;
use crate::transport::Transport;

/// A two-transport, role-inverted coupling.
#[derive(Debug)]
pub struct Bridge<A, B> {
    a: A,
    b: B,
}

impl<A: Transport, B: Transport> Bridge<A, B> {
    /// Couple `a` and `b`. They must play opposite roles — one faces a
    /// client, the other faces a server.
    #[must_use]
    pub fn new(a: A, b: B) -> Self {
        debug_assert_ne!(a.role(), b.role(), "bridge endpoints must have inverted roles");
        Self { a, b }
    }

    /// Forward frames in both directions until either side closes.
    pub async fn run(&self) {
        loop {
            tokio::select! {
                frame = self.a.recv_frame() => {
                    if !self.forward(frame, Side::AtoB).await {
                        break;
                    }
                }
                frame = self.b.recv_frame() => {
                    if !self.forward(frame, Side::BtoA).await {
                        break;
                    }
                }
            }
        }
    }

    async fn forward(&self, frame: crate::Result<Frame>, side: Side) -> bool {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("bridge source transport closed: {err}");
                return false;
            }
        };
        let dest = match side {
            Side::AtoB => &self.b,
            Side::BtoA => &self.a,
        };
        if let Err(err) = dest.send_frame(&frame).await {
            log::warn!("bridge failed to forward frame: {err}");
        }
        true
    }
}

enum Side {
    AtoB,
    BtoA,
}
