// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(unreachable_pub)]
#![cfg_attr(not(test), warn(unsafe_code))]
#![warn(clippy::all)]
#![warn(clippy::cast_lossless)]
#![warn(clippy::explicit_deref_methods)]
#![cfg_attr(not(test), warn(clippy::panic_in_result_fn))]
#![warn(rustdoc::broken_intra_doc_links)]

//! A transport-agnostic Modbus protocol stack: wire codecs for RTU and
//! TCP, a register-addressing server dispatcher, a single-in-flight
//! client request lifecycle, and a role-inverting bridge between two
//! transports.
//!
//! [`frame`] is the in-memory Modbus PDU, [`codec`] turns it to and
//! from wire bytes, [`word_store`] is the server's register map,
//! [`transport`] is the capability the core consumes from the outside
//! world, and [`client`] / [`server`] / [`bridge`] are the three
//! pieces built on top of those.

pub mod bridge;
pub mod client;
pub mod codec;
pub mod error;
pub mod frame;
pub mod prelude;
pub mod server;
pub mod slave;
pub mod timer;
pub mod transport;
pub mod word_store;

pub use error::{Error, Result};
