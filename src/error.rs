// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Library Error type

use thiserror::Error;

/// A specialized [`Result`] type for Modbus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while encoding or decoding a wire frame.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer did not hold a complete, correctly sized frame.
    #[error("invalid frame length")]
    InvalidLen,

    /// RTU CRC-16 did not match the transmitted value.
    #[error("invalid CRC")]
    InvalidCrc,

    /// `slave_id` was outside the valid range for the message type.
    #[error("invalid slave id")]
    InvalidSlaveId,

    /// Unrecognized or unsupported function code.
    #[error("invalid function code")]
    InvalidFc,

    /// `reg_count` violated a per-function-code limit.
    #[error("invalid register/coil count")]
    InvalidRegCount,

    /// Exception code byte was not one of the standard Modbus codes.
    #[error("invalid exception code")]
    InvalidException,

    /// A request PDU carried an exception code, or a response was
    /// decoded without specifying the expected message type.
    #[error("invalid frame type for this operation")]
    InvalidType,

    /// MBAP `proto_id` was not `0x0000`.
    #[error("invalid MBAP protocol id")]
    InvalidMbapProtocolId,

    /// MBAP `length` field disagreed with the buffer, or exceeded the
    /// maximum TCP frame size.
    #[error("invalid MBAP length")]
    InvalidMbapLen,
}

/// Errors produced by the client request lifecycle.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientError {
    /// The caller-supplied request frame was malformed.
    #[error("invalid request frame")]
    InvalidFrame,

    /// Another request is already in flight.
    #[error("client is busy")]
    Busy,

    /// The transport reported failure sending the request.
    #[error("transport failed to send request")]
    TxFailed,

    /// No response arrived before the configured timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// A response arrived but did not match the outstanding request.
    #[error("invalid response frame")]
    InvalidResponse,

    /// The client was used before `begin()`/initialization completed.
    #[error("client not initialized")]
    NotInitialized,

    /// Initialization of the client failed.
    #[error("client initialization failed")]
    InitFailed,
}

/// Errors produced by the server dispatcher and its `WordStore`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerError {
    /// The `WordStore` has no remaining capacity for another `Word`.
    #[error("word store is full")]
    WordStoreFull,

    /// The server mutex could not be acquired within the configured
    /// timeout.
    #[error("server is busy")]
    Busy,

    /// A `Word` descriptor was invalid (e.g. a read-only type carrying
    /// a write handler, or neither a direct pointer nor a handler).
    #[error("invalid word descriptor")]
    InvalidWord,

    /// Inserting a `Word` would overlap an existing one of the same
    /// register type.
    #[error("word overlap")]
    WordOverlap,

    /// Dispatch rejected the request: illegal function code.
    #[error("illegal function")]
    IllegalFunction,

    /// Dispatch rejected the request: address not covered (or partial
    /// `Word` access).
    #[error("illegal data address")]
    IllegalDataAddress,

    /// Dispatch rejected the request: value out of range.
    #[error("illegal data value")]
    IllegalDataValue,

    /// Request's `slave_id` did not match this server.
    #[error("wrong slave id")]
    WrongSlaveId,

    /// A read or write handler reported device failure.
    #[error("slave device failure")]
    SlaveDeviceFailure,

    /// Sending the response failed.
    #[error("response transmission failed")]
    ResponseTxFailed,

    /// The server was used before `begin()`.
    #[error("server not initialized")]
    NotInitialized,

    /// `begin()` failed (e.g. overlap detected during the bulk scan).
    #[error("server initialization failed")]
    InitFailed,
}

/// The crate-wide error type.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A codec (encode/decode) failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A client-side failure.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A server-side failure.
    #[error(transparent)]
    Server(#[from] ServerError),
}
