// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The server request dispatcher: validates incoming requests against
//! a [`WordStore`] and emits responses or exceptions.

use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::ServerError;
use crate::frame::{ExceptionCode, Frame, FrameType, FunctionCode, SlaveId};
use crate::transport::Transport;
use crate::word_store::{RegType, Word, WordStore, DEFAULT_MAX_WORD_SIZE};

/// Server-side tunables.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// This server's slave/unit id. `0` makes it accept any unicast id
    /// (a server-level catch-all, independent of the transport's own
    /// [`Transport::catch_all_slave_ids`]).
    pub slave_id: SlaveId,
    /// Whether an address with no covering [`Word`] is an exception
    /// (`true`) or a silently-skipped gap (`false`).
    pub reject_undefined: bool,
    /// Bound on acquiring the request mutex. `None` means unbounded.
    pub req_mutex_timeout: Option<Duration>,
    /// Cap on registers a single inserted [`Word`] may span.
    pub max_word_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            slave_id: 1,
            reject_undefined: true,
            req_mutex_timeout: None,
            max_word_size: DEFAULT_MAX_WORD_SIZE,
        }
    }
}

/// Walk `[start, start+count)` of `reg_type`, calling `f` once per
/// covering [`Word`] (never per-address) with the item offset into the
/// requested range. A `Word` only partially inside the range, or no
/// `Word` at all when `reject_undefined` is set, ends the walk with
/// [`ExceptionCode::IllegalDataAddress`].
fn for_each_word_in_range<'a>(
    store: &'a WordStore,
    reg_type: RegType,
    start: u16,
    count: u16,
    reject_undefined: bool,
    mut f: impl FnMut(&'a Word, usize) -> Result<(), ExceptionCode>,
) -> Result<(), ExceptionCode> {
    let end = u32::from(start) + u32::from(count);
    if end > u32::from(u16::MAX) + 1 {
        return Err(ExceptionCode::IllegalDataAddress);
    }

    let mut addr = u32::from(start);
    while addr < end {
        match store.find_containing(reg_type, addr as u16) {
            None => {
                if reject_undefined {
                    return Err(ExceptionCode::IllegalDataAddress);
                }
                addr += 1;
            }
            Some(word) => {
                if u32::from(word.start_addr()) < addr || word.end_addr() > end {
                    return Err(ExceptionCode::IllegalDataAddress);
                }
                f(word, (addr - u32::from(start)) as usize)?;
                addr = word.end_addr();
            }
        }
    }
    Ok(())
}

fn read_reg_type(fc: FunctionCode) -> RegType {
    match fc {
        FunctionCode::ReadCoils => RegType::Coil,
        FunctionCode::ReadDiscreteInputs => RegType::DiscreteInput,
        FunctionCode::ReadHoldingRegisters => RegType::HoldingRegister,
        FunctionCode::ReadInputRegisters => RegType::InputRegister,
        _ => unreachable!("read_reg_type called with a non-read function code"),
    }
}

fn write_reg_type(fc: FunctionCode) -> RegType {
    match fc {
        FunctionCode::WriteSingleCoil | FunctionCode::WriteMultipleCoils => RegType::Coil,
        FunctionCode::WriteSingleRegister | FunctionCode::WriteMultipleRegisters => RegType::HoldingRegister,
        _ => unreachable!("write_reg_type called with a non-write function code"),
    }
}

fn handle_read(store: &WordStore, request: &Frame, reject_undefined: bool) -> Frame {
    let reg_type = read_reg_type(request.fc);
    let is_coil = matches!(reg_type, RegType::Coil | RegType::DiscreteInput);
    let start = request.reg_address;
    let count = request.reg_count;

    // Validation scan: every address is covered, fully, by a readable Word.
    if let Err(exc) = for_each_word_in_range(store, reg_type, start, count, reject_undefined, |_word, _offset| Ok(())) {
        return request.exception_response(exc);
    }

    let mut response = Frame {
        frame_type: FrameType::Response,
        fc: request.fc,
        slave_id: request.slave_id,
        reg_count: count,
        ..Frame::default()
    };

    // Execution scan: stream each Word's values into the response.
    let outcome = for_each_word_in_range(store, reg_type, start, count, reject_undefined, |word, offset| {
        let values = word.read().map_err(|_| ExceptionCode::SlaveDeviceFailure)?;
        for (i, v) in values.iter().enumerate() {
            if is_coil {
                response.set_coils(&[*v != 0], Some(offset + i));
            } else {
                response.set_registers(&[*v], Some(offset + i));
            }
        }
        Ok(())
    });

    match outcome {
        Ok(()) => response,
        Err(exc) => request.exception_response(exc),
    }
}

fn handle_write(store: &WordStore, request: &Frame, reject_undefined: bool) -> Frame {
    let reg_type = write_reg_type(request.fc);
    let is_coil = reg_type == RegType::Coil;
    let start = request.reg_address;
    let count = request.reg_count;

    // Validation scan: every address is covered, fully, by a writable Word.
    let validation = for_each_word_in_range(store, reg_type, start, count, reject_undefined, |word, _offset| {
        if word.is_writable() {
            Ok(())
        } else {
            Err(ExceptionCode::IllegalDataAddress)
        }
    });
    if let Err(exc) = validation {
        return request.exception_response(exc);
    }

    // Execution scan: every covered Word is written, even after a failure,
    // but only the first exception is recorded.
    let mut first_exception: Option<ExceptionCode> = None;
    let _ = for_each_word_in_range(store, reg_type, start, count, reject_undefined, |word, offset| {
        let nb_regs = word.nb_regs() as usize;
        let mut values = Vec::with_capacity(nb_regs);
        for i in 0..nb_regs {
            values.push(if is_coil {
                u16::from(request.get_coil(offset + i))
            } else {
                request.get_register(offset + i)
            });
        }
        if word.write(&values).is_err() && first_exception.is_none() {
            first_exception = Some(ExceptionCode::SlaveDeviceFailure);
        }
        Ok(())
    });

    if let Some(exc) = first_exception {
        return request.exception_response(exc);
    }

    let mut response = Frame {
        frame_type: FrameType::Response,
        fc: request.fc,
        slave_id: request.slave_id,
        reg_address: request.reg_address,
        reg_count: request.reg_count,
        ..Frame::default()
    };
    if request.fc.is_write_single() {
        if is_coil {
            response.set_coils(&[request.get_coil(0)], Some(0));
        } else {
            response.set_registers(&[request.get_register(0)], Some(0));
        }
        response.reg_count = 1;
    }
    response
}

/// A Modbus server: a [`WordStore`] plus dispatch logic, bound to one
/// [`Transport`].
#[derive(Debug)]
pub struct Server<T> {
    transport: T,
    config: ServerConfig,
    store: Mutex<WordStore>,
}

impl<T: Transport> Server<T> {
    #[must_use]
    pub fn new(transport: T, config: ServerConfig) -> Self {
        let store = WordStore::new(config.max_word_size);
        Self {
            transport,
            config,
            store: Mutex::new(store),
        }
    }

    /// Register a `Word`. Valid both before and after [`Self::begin`].
    pub async fn insert_word(&self, word: Word) -> Result<(), ServerError> {
        self.store.lock().await.insert(word)
    }

    /// Sort and overlap-check every register type once, then switch to
    /// the runtime insert discipline.
    pub async fn begin(&self) -> Result<(), ServerError> {
        self.store.lock().await.begin()
    }

    /// Drive request processing. Typically spawned with `tokio::spawn`.
    pub async fn run(&self) {
        loop {
            match self.transport.recv_frame().await {
                Ok(frame) => self.handle_frame(frame).await,
                Err(err) => {
                    log::warn!("server transport closed: {err}");
                    break;
                }
            }
        }
    }

    fn address_matches(&self, frame: &Frame) -> bool {
        frame.slave_id == 0
            || frame.slave_id == self.config.slave_id
            || self.config.slave_id == 0
            || self.transport.catch_all_slave_ids()
    }

    async fn handle_frame(&self, frame: Frame) {
        let broadcast = frame.slave_id == 0;

        let guard = match self.config.req_mutex_timeout {
            None => self.store.lock().await,
            Some(bound) => match tokio::time::timeout(bound, self.store.lock()).await {
                Ok(guard) => guard,
                Err(_elapsed) => {
                    if !broadcast && frame.fc != FunctionCode::Null {
                        self.respond(frame.exception_response(ExceptionCode::SlaveDeviceBusy)).await;
                    }
                    return;
                }
            },
        };

        if !self.address_matches(&frame) || frame.frame_type != FrameType::Request {
            return;
        }
        if broadcast && frame.fc.is_read() {
            return;
        }
        if frame.fc == FunctionCode::Null {
            drop(guard);
            if !broadcast {
                self.respond(frame.exception_response(ExceptionCode::IllegalFunction)).await;
            }
            return;
        }

        let response = if frame.fc.is_read() {
            handle_read(&guard, &frame, self.config.reject_undefined)
        } else {
            handle_write(&guard, &frame, self.config.reject_undefined)
        };
        drop(guard);

        if !broadcast {
            self.respond(response).await;
        }
    }

    async fn respond(&self, response: Frame) {
        if let Err(err) = self.transport.send_frame(&response).await {
            log::warn!("server failed to send response: {err}");
        }
    }
}
