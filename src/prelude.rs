// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types, re-exported for a single `use modbus_stack::prelude::*;`.

///////////////////////////////////////////////////////////////////
/// Data model
///////////////////////////////////////////////////////////////////
pub use crate::frame::{Address, ExceptionCode, Frame, FrameType, FunctionCode, Quantity, SlaveId};

///////////////////////////////////////////////////////////////////
/// Transport
///////////////////////////////////////////////////////////////////
pub use crate::transport::{LoopbackTransport, Role, Transport};

///////////////////////////////////////////////////////////////////
/// Client
///////////////////////////////////////////////////////////////////
pub use crate::client::{Client, ClientConfig};

///////////////////////////////////////////////////////////////////
/// Server
///////////////////////////////////////////////////////////////////
pub use crate::server::{Server, ServerConfig};
pub use crate::word_store::{RegType, Word, WordStore};

///////////////////////////////////////////////////////////////////
/// Bridge
///////////////////////////////////////////////////////////////////
pub use crate::bridge::Bridge;

///////////////////////////////////////////////////////////////////
/// Addressing
///////////////////////////////////////////////////////////////////
pub use crate::slave::{Slave, SlaveContext};

///////////////////////////////////////////////////////////////////
/// Errors
///////////////////////////////////////////////////////////////////
pub use crate::error::{ClientError, CodecError, Error, Result, ServerError};
