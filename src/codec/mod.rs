// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pure encode/decode functions for the Modbus PDU, shared by the RTU
//! and TCP ADU codecs.

#[cfg(feature = "rtu")]
pub mod rtu;
#[cfg(feature = "tcp")]
pub mod tcp;

use byteorder::{ByteOrder, BigEndian};

use crate::error::CodecError;
use crate::frame::{ExceptionCode, Frame, FrameType, FunctionCode};

/// Maximum number of coils a single read request may return.
pub const MAX_COILS_READ: usize = 2000;
/// Maximum number of coils a single write-multiple request may carry.
pub const MAX_COILS_WRITE: usize = 1968;
/// Maximum number of registers a single read request may return.
pub const MAX_REGISTERS_READ: usize = 125;
/// Maximum number of registers a single write-multiple request may carry.
pub const MAX_REGISTERS_WRITE: usize = 123;
/// Per-frame word capacity, mirrored from [`crate::frame::FRAME_DATASIZE`].
pub const FRAME_DATASIZE: usize = crate::frame::FRAME_DATASIZE;
/// Largest legal Modbus TCP ADU, MBAP header included.
pub const TCP_MAX_FRAME: usize = 260;
/// Largest legal Modbus RTU ADU, slave id and CRC included.
pub const RTU_MAX_FRAME: usize = 256;
/// Smallest legal Modbus RTU ADU (slave id + fc + CRC).
pub const RTU_MIN_FRAME: usize = 4;

/// Which kind of message the caller expects to decode.
///
/// Required because the wire form alone cannot distinguish a request
/// from a response for several function codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderType {
    /// Decode as a request (client → server).
    Request,
    /// Decode as a response (server → client).
    Response,
}

fn byte_count_for_read(fc: FunctionCode, qty: usize) -> usize {
    if fc.is_coil_based() {
        qty.div_ceil(8)
    } else {
        qty * 2
    }
}

fn max_read_count(fc: FunctionCode) -> usize {
    if fc.is_coil_based() {
        MAX_COILS_READ
    } else {
        MAX_REGISTERS_READ
    }
}

fn max_write_count(fc: FunctionCode) -> usize {
    if fc.is_coil_based() {
        MAX_COILS_WRITE
    } else {
        MAX_REGISTERS_WRITE
    }
}

/// Number of PDU bytes [`encode_pdu`] would write for this frame.
pub fn pdu_len(frame: &Frame) -> Result<usize, CodecError> {
    if frame.fc == FunctionCode::Null {
        return Err(CodecError::InvalidFc);
    }
    if frame.exception_code.is_exception() {
        return Ok(2);
    }
    let fc = frame.fc;
    let qty = frame.reg_count as usize;
    Ok(match frame.frame_type {
        FrameType::Request => match fc {
            _ if fc.is_read() => 5,
            FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => 5,
            _ if fc.is_write_multiple() => 6 + byte_count_for_read(fc, qty),
            _ => return Err(CodecError::InvalidFc),
        },
        FrameType::Response => match fc {
            _ if fc.is_read() => 2 + byte_count_for_read(fc, qty),
            FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => 5,
            _ if fc.is_write_multiple() => 5,
            _ => return Err(CodecError::InvalidFc),
        },
        FrameType::Null => return Err(CodecError::InvalidType),
    })
}

/// Validate `frame` against the per-function-code limits, independent
/// of framing (RTU vs TCP).
fn validate_common(frame: &Frame) -> Result<(), CodecError> {
    if frame.fc == FunctionCode::Null || frame.frame_type == FrameType::Null {
        return Err(CodecError::InvalidType);
    }
    if frame.frame_type == FrameType::Request && frame.exception_code.is_exception() {
        return Err(CodecError::InvalidType);
    }
    if frame.slave_id > 247 {
        return Err(CodecError::InvalidSlaveId);
    }
    if frame.frame_type == FrameType::Response && frame.slave_id == 0 {
        return Err(CodecError::InvalidSlaveId);
    }
    if frame.exception_code.is_exception() {
        return Ok(());
    }
    let fc = frame.fc;
    let qty = frame.reg_count as usize;
    if fc.is_read() {
        if qty == 0 || qty > max_read_count(fc) {
            return Err(CodecError::InvalidRegCount);
        }
    } else if fc.is_write_single() {
        if qty != 1 {
            return Err(CodecError::InvalidRegCount);
        }
    } else if fc.is_write_multiple() {
        if frame.frame_type == FrameType::Request && (qty == 0 || qty > max_write_count(fc)) {
            return Err(CodecError::InvalidRegCount);
        }
    }
    Ok(())
}

/// Encode `frame`'s PDU (function code + payload, no slave id/CRC/MBAP)
/// into `out`. Returns the number of bytes written.
pub fn encode_pdu(frame: &Frame, out: &mut [u8]) -> Result<usize, CodecError> {
    validate_common(frame)?;
    let needed = pdu_len(frame)?;
    if out.len() < needed {
        return Err(CodecError::InvalidLen);
    }

    if frame.exception_code.is_exception() {
        out[0] = frame.fc.value() | 0x80;
        out[1] = frame.exception_code.value();
        return Ok(2);
    }

    out[0] = frame.fc.value();
    let fc = frame.fc;
    let qty = frame.reg_count as usize;

    match frame.frame_type {
        FrameType::Request => {
            if fc.is_read() {
                BigEndian::write_u16(&mut out[1..3], frame.reg_address);
                BigEndian::write_u16(&mut out[3..5], frame.reg_count);
            } else if fc == FunctionCode::WriteSingleCoil {
                BigEndian::write_u16(&mut out[1..3], frame.reg_address);
                let v: u16 = if frame.get_coil(0) { 0xFF00 } else { 0x0000 };
                BigEndian::write_u16(&mut out[3..5], v);
            } else if fc == FunctionCode::WriteSingleRegister {
                BigEndian::write_u16(&mut out[1..3], frame.reg_address);
                BigEndian::write_u16(&mut out[3..5], frame.get_register(0));
            } else if fc.is_write_multiple() {
                BigEndian::write_u16(&mut out[1..3], frame.reg_address);
                BigEndian::write_u16(&mut out[3..5], frame.reg_count);
                let byte_count = byte_count_for_read(fc, qty);
                out[5] = byte_count as u8;
                write_payload(frame, fc, qty, &mut out[6..6 + byte_count]);
            }
        }
        FrameType::Response => {
            if fc.is_read() {
                let byte_count = byte_count_for_read(fc, qty);
                out[1] = byte_count as u8;
                write_payload(frame, fc, qty, &mut out[2..2 + byte_count]);
            } else if fc == FunctionCode::WriteSingleCoil {
                BigEndian::write_u16(&mut out[1..3], frame.reg_address);
                let v: u16 = if frame.get_coil(0) { 0xFF00 } else { 0x0000 };
                BigEndian::write_u16(&mut out[3..5], v);
            } else if fc == FunctionCode::WriteSingleRegister {
                BigEndian::write_u16(&mut out[1..3], frame.reg_address);
                BigEndian::write_u16(&mut out[3..5], frame.get_register(0));
            } else if fc.is_write_multiple() {
                BigEndian::write_u16(&mut out[1..3], frame.reg_address);
                BigEndian::write_u16(&mut out[3..5], frame.reg_count);
            }
        }
        FrameType::Null => unreachable!("validate_common rejects Null"),
    }

    Ok(needed)
}

fn write_payload(frame: &Frame, fc: FunctionCode, qty: usize, out: &mut [u8]) {
    if fc.is_coil_based() {
        for i in 0..qty {
            if frame.get_coil(i) {
                out[i / 8] |= 1 << (i % 8);
            }
        }
    } else {
        for i in 0..qty {
            BigEndian::write_u16(&mut out[i * 2..i * 2 + 2], frame.get_register(i));
        }
    }
}

/// Decode a bare PDU (no slave id/CRC/MBAP) into `frame`.
///
/// `frame.slave_id` is left untouched; callers fill it in from the ADU
/// header. For read responses, `reg_address`/`reg_count` cannot be
/// recovered from the wire and are set to the best inference available
/// from the byte count alone — callers that know the original request
/// should re-inject the authoritative values.
pub fn decode_pdu(pdu: &[u8], decoder_type: DecoderType, frame: &mut Frame) -> Result<(), CodecError> {
    if pdu.is_empty() {
        return Err(CodecError::InvalidLen);
    }
    let wire_fc = pdu[0];

    if wire_fc & 0x80 != 0 {
        if decoder_type == DecoderType::Request {
            return Err(CodecError::InvalidType);
        }
        if pdu.len() != 2 {
            return Err(CodecError::InvalidLen);
        }
        let fc = FunctionCode::from_u8(wire_fc & 0x7F).ok_or(CodecError::InvalidFc)?;
        let exception_code = ExceptionCode::from_u8(pdu[1]).ok_or(CodecError::InvalidException)?;
        if !exception_code.is_exception() {
            return Err(CodecError::InvalidException);
        }
        *frame = Frame {
            frame_type: FrameType::Response,
            fc,
            exception_code,
            ..Frame::default()
        };
        return Ok(());
    }

    let fc = FunctionCode::from_u8(wire_fc).ok_or(CodecError::InvalidFc)?;
    let frame_type = match decoder_type {
        DecoderType::Request => FrameType::Request,
        DecoderType::Response => FrameType::Response,
    };

    *frame = Frame {
        frame_type,
        fc,
        ..Frame::default()
    };

    match (frame_type, fc) {
        (FrameType::Request, _) if fc.is_read() => {
            if pdu.len() != 5 {
                return Err(CodecError::InvalidLen);
            }
            frame.reg_address = BigEndian::read_u16(&pdu[1..3]);
            let qty = BigEndian::read_u16(&pdu[3..5]);
            if qty == 0 || qty as usize > max_read_count(fc) {
                return Err(CodecError::InvalidRegCount);
            }
            frame.reg_count = qty;
        }
        (_, FunctionCode::WriteSingleCoil) => {
            if pdu.len() != 5 {
                return Err(CodecError::InvalidLen);
            }
            frame.reg_address = BigEndian::read_u16(&pdu[1..3]);
            let raw = BigEndian::read_u16(&pdu[3..5]);
            let coil = match raw {
                0xFF00 => true,
                0x0000 => false,
                _ => return Err(CodecError::InvalidRegCount),
            };
            frame.set_coils(&[coil], None);
        }
        (_, FunctionCode::WriteSingleRegister) => {
            if pdu.len() != 5 {
                return Err(CodecError::InvalidLen);
            }
            frame.reg_address = BigEndian::read_u16(&pdu[1..3]);
            let v = BigEndian::read_u16(&pdu[3..5]);
            frame.set_registers(&[v], None);
        }
        (FrameType::Request, _) if fc.is_write_multiple() => {
            if pdu.len() < 6 {
                return Err(CodecError::InvalidLen);
            }
            frame.reg_address = BigEndian::read_u16(&pdu[1..3]);
            let qty = BigEndian::read_u16(&pdu[3..5]);
            if qty == 0 || qty as usize > max_write_count(fc) {
                return Err(CodecError::InvalidRegCount);
            }
            let byte_count = pdu[5] as usize;
            if byte_count != byte_count_for_read(fc, qty as usize) || pdu.len() != 6 + byte_count {
                return Err(CodecError::InvalidLen);
            }
            decode_payload(fc, qty as usize, &pdu[6..6 + byte_count], frame);
            frame.reg_count = qty;
        }
        (FrameType::Response, _) if fc.is_write_multiple() => {
            if pdu.len() != 5 {
                return Err(CodecError::InvalidLen);
            }
            frame.reg_address = BigEndian::read_u16(&pdu[1..3]);
            frame.reg_count = BigEndian::read_u16(&pdu[3..5]);
        }
        (FrameType::Response, _) if fc.is_read() => {
            if pdu.len() < 2 {
                return Err(CodecError::InvalidLen);
            }
            let byte_count = pdu[0 + 1] as usize;
            if pdu.len() != 2 + byte_count {
                return Err(CodecError::InvalidLen);
            }
            let qty = if fc.is_coil_based() {
                byte_count * 8
            } else {
                byte_count / 2
            };
            if qty == 0 || qty > max_read_count(fc) {
                return Err(CodecError::InvalidRegCount);
            }
            decode_payload(fc, qty, &pdu[2..2 + byte_count], frame);
            frame.reg_count = qty as u16;
        }
        _ => return Err(CodecError::InvalidFc),
    }

    Ok(())
}

fn decode_payload(fc: FunctionCode, qty: usize, payload: &[u8], frame: &mut Frame) {
    if fc.is_coil_based() {
        let mut bits = [false; crate::frame::MAX_COILS_PER_FRAME];
        for (i, bit) in bits.iter_mut().enumerate().take(qty) {
            *bit = (payload[i / 8] >> (i % 8)) & 1 != 0;
        }
        frame.set_coils(&bits[..qty], None);
    } else {
        let mut words = [0u16; FRAME_DATASIZE];
        for (i, word) in words.iter_mut().enumerate().take(qty) {
            *word = BigEndian::read_u16(&payload[i * 2..i * 2 + 2]);
        }
        frame.set_registers(&words[..qty], None);
    }
}
