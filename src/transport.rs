// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The capability the protocol core consumes from the outside world.
//!
//! `Transport` only describes half-duplex frame exchange; it says
//! nothing about bytes, sockets, or serial ports. Real UART/TCP
//! drivers are out of scope — this crate ships one concrete, in-memory
//! implementation ([`LoopbackTransport`]) for its own tests and for
//! downstream consumers who want to exercise the core without I/O.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::error::{ClientError, Error, Result};
use crate::frame::Frame;

/// Which side of a half-duplex exchange a [`Transport`] plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Half-duplex frame exchange, at most one in-flight frame per
/// direction. Implementations serialize their own transmissions and
/// deliver inbound frames in arrival order.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether this transport plays the client or server role.
    fn role(&self) -> Role;

    /// Whether inbound frames are unfiltered by `slave_id` at the
    /// transport layer (true for TCP-style transports without a wire
    /// addressing concept).
    fn catch_all_slave_ids(&self) -> bool;

    /// Send `frame`. Resolves once the transport has accepted the
    /// frame for transmission, not once it is acknowledged.
    async fn send_frame(&self, frame: &Frame) -> Result<()>;

    /// Wait for and return the next inbound frame.
    async fn recv_frame(&self) -> Result<Frame>;

    /// Best-effort abort of whatever transaction is currently in
    /// flight on this transport. Used by the timeout path; may be a
    /// no-op if the transport has no notion of an in-flight
    /// transaction to cancel.
    fn abort_current_transaction(&self);

    /// Whether the transport is currently able to accept a new
    /// transaction (idle, no transaction in flight).
    fn is_ready(&self) -> bool;
}

/// An in-memory, channel-backed [`Transport`] pair.
///
/// `LoopbackTransport::pair` returns two ends wired together: frames
/// sent on one are received on the other. Useful for unit-testing the
/// client/server/bridge logic without real I/O.
#[derive(Debug)]
pub struct LoopbackTransport {
    role: Role,
    catch_all_slave_ids: bool,
    tx: mpsc::Sender<Frame>,
    rx: Mutex<mpsc::Receiver<Frame>>,
    aborted: std::sync::atomic::AtomicBool,
}

impl LoopbackTransport {
    /// Build a connected client/server pair with a bounded channel of
    /// depth `capacity` in each direction.
    #[must_use]
    pub fn pair(capacity: usize, catch_all_slave_ids: bool) -> (Self, Self) {
        let (client_tx, server_rx) = mpsc::channel(capacity);
        let (server_tx, client_rx) = mpsc::channel(capacity);
        let client = Self {
            role: Role::Client,
            catch_all_slave_ids,
            tx: client_tx,
            rx: Mutex::new(client_rx),
            aborted: std::sync::atomic::AtomicBool::new(false),
        };
        let server = Self {
            role: Role::Server,
            catch_all_slave_ids,
            tx: server_tx,
            rx: Mutex::new(server_rx),
            aborted: std::sync::atomic::AtomicBool::new(false),
        };
        (client, server)
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn role(&self) -> Role {
        self.role
    }

    fn catch_all_slave_ids(&self) -> bool {
        self.catch_all_slave_ids
    }

    async fn send_frame(&self, frame: &Frame) -> Result<()> {
        self.tx
            .send(*frame)
            .await
            .map_err(|_| Error::Client(ClientError::TxFailed))
    }

    async fn recv_frame(&self) -> Result<Frame> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(Error::Client(ClientError::TxFailed))
    }

    fn abort_current_transaction(&self) {
        self.aborted.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn is_ready(&self) -> bool {
        !self.aborted.load(std::sync::atomic::Ordering::SeqCst)
    }
}
