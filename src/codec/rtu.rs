// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU framing: `slave_id | PDU | CRC16`, CRC transmitted
//! little-endian.

use super::{decode_pdu, encode_pdu, pdu_len, DecoderType, RTU_MAX_FRAME, RTU_MIN_FRAME};
use crate::error::CodecError;
use crate::frame::{Frame, FunctionCode};

/// Standard Modbus CRC-16 (poly `0xA001`, init `0xFFFF`).
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Encode `frame` as a complete RTU ADU into `out`. Returns the number
/// of bytes written.
pub fn encode(frame: &Frame, out: &mut [u8]) -> Result<usize, CodecError> {
    let pdu_size = pdu_len(frame)?;
    let total = 1 + pdu_size + 2;
    if total > RTU_MAX_FRAME {
        return Err(CodecError::InvalidLen);
    }
    if out.len() < total {
        return Err(CodecError::InvalidLen);
    }

    out[0] = frame.slave_id;
    let written = encode_pdu(frame, &mut out[1..1 + pdu_size])?;
    debug_assert_eq!(written, pdu_size);

    let crc = crc16(&out[..1 + pdu_size]);
    out[1 + pdu_size] = (crc & 0xFF) as u8;
    out[1 + pdu_size + 1] = (crc >> 8) as u8;

    Ok(total)
}

/// Decode a complete RTU ADU from `buf`.
pub fn decode(buf: &[u8], decoder_type: DecoderType, frame: &mut Frame) -> Result<(), CodecError> {
    if buf.len() < RTU_MIN_FRAME || buf.len() > RTU_MAX_FRAME {
        return Err(CodecError::InvalidLen);
    }

    let body_len = buf.len() - 2;
    let received_crc = u16::from(buf[body_len]) | (u16::from(buf[body_len + 1]) << 8);
    let computed_crc = crc16(&buf[..body_len]);
    if received_crc != computed_crc {
        return Err(CodecError::InvalidCrc);
    }

    let slave_id = buf[0];
    if slave_id > 247 {
        return Err(CodecError::InvalidSlaveId);
    }
    if decoder_type == DecoderType::Request
        && slave_id == 0
        && buf[1] & 0x7F != 0x0F
        && buf[1] & 0x7F != 0x10
        && buf[1] & 0x7F != 0x05
        && buf[1] & 0x7F != 0x06
    {
        // Broadcast is only meaningful for writes; read requests addressed
        // to broadcast have no well-defined responder and are rejected.
        return Err(CodecError::InvalidSlaveId);
    }

    decode_pdu(&buf[1..body_len], decoder_type, frame)?;
    frame.slave_id = slave_id;
    Ok(())
}

/// Best-effort look-ahead: how many bytes a complete RTU ADU needs,
/// given only the prefix seen so far on the wire.
///
/// Returns `None` when `buf` doesn't yet carry enough bytes to know
/// (e.g. the byte-count field of a write-multiple request hasn't
/// arrived yet). This never replaces [`decode`]'s own validation —
/// byte-stream framing code uses it to decide when to try decoding at
/// all, not to decide whether the frame is well-formed.
#[must_use]
pub fn rtu_frame_len_hint(buf: &[u8], decoder_type: DecoderType) -> Option<usize> {
    let wire_fc = *buf.get(1)?;
    if wire_fc & 0x80 != 0 {
        // slave_id | fc|0x80 | exception_code | CRC16
        return Some(1 + 2 + 2);
    }

    let fc = FunctionCode::from_u8(wire_fc)?;
    let pdu_len = match decoder_type {
        DecoderType::Request => match fc {
            _ if fc.is_read() => 5,
            FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => 5,
            _ if fc.is_write_multiple() => 6 + usize::from(*buf.get(6)?),
            _ => return None,
        },
        DecoderType::Response => match fc {
            _ if fc.is_read() => 2 + usize::from(*buf.get(2)?),
            FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => 5,
            _ if fc.is_write_multiple() => 5,
            _ => return None,
        },
    };
    Some(1 + pdu_len + 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameType, FunctionCode};

    #[test]
    fn crc16_matches_known_vectors() {
        assert_eq!(crc16(&[0x01, 0x03, 0x08, 0x2B, 0x00, 0x02]), 0xB663);
        assert_eq!(crc16(&[0x01, 0x03, 0x04, 0x00, 0x20, 0x00, 0x00]), 0xFBF9);
    }

    #[test]
    fn encode_decode_read_holding_registers_request() {
        let frame = Frame {
            frame_type: FrameType::Request,
            fc: FunctionCode::ReadHoldingRegisters,
            slave_id: 1,
            reg_address: 0x082B,
            reg_count: 2,
            ..Frame::default()
        };
        let mut buf = [0u8; 16];
        let n = encode(&frame, &mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x01, 0x03, 0x08, 0x2B, 0x00, 0x02, 0x63, 0xB6]);

        let mut decoded = Frame::default();
        decode(&buf[..n], DecoderType::Request, &mut decoded).unwrap();
        assert_eq!(decoded.slave_id, 1);
        assert_eq!(decoded.reg_address, 0x082B);
        assert_eq!(decoded.reg_count, 2);
    }

    #[test]
    fn decode_rejects_corrupted_crc() {
        let frame = Frame {
            frame_type: FrameType::Request,
            fc: FunctionCode::ReadHoldingRegisters,
            slave_id: 1,
            reg_address: 0,
            reg_count: 1,
            ..Frame::default()
        };
        let mut buf = [0u8; 16];
        let n = encode(&frame, &mut buf).unwrap();
        buf[n - 1] ^= 0xFF;

        let mut decoded = Frame::default();
        assert_eq!(
            decode(&buf[..n], DecoderType::Request, &mut decoded),
            Err(CodecError::InvalidCrc)
        );
    }

    #[test]
    fn decode_rejects_undersize_frame() {
        let mut decoded = Frame::default();
        assert_eq!(
            decode(&[0x01, 0x03], DecoderType::Request, &mut decoded),
            Err(CodecError::InvalidLen)
        );
    }

    #[test]
    fn decode_rejects_broadcast_read_request() {
        let frame = Frame {
            frame_type: FrameType::Request,
            fc: FunctionCode::ReadHoldingRegisters,
            slave_id: 0,
            reg_address: 0,
            reg_count: 1,
            ..Frame::default()
        };
        let mut buf = [0u8; 16];
        // slave_id == 0 is rejected by encode_pdu's response-only check? No:
        // encode_pdu only rejects broadcast for responses, so this encodes fine.
        let n = encode(&frame, &mut buf).unwrap();

        let mut decoded = Frame::default();
        assert_eq!(
            decode(&buf[..n], DecoderType::Request, &mut decoded),
            Err(CodecError::InvalidSlaveId)
        );
    }

    #[test]
    fn broadcast_write_multiple_request_is_accepted() {
        let mut frame = Frame {
            frame_type: FrameType::Request,
            fc: FunctionCode::WriteMultipleCoils,
            slave_id: 0,
            reg_address: 0,
            ..Frame::default()
        };
        frame.set_coils(&[true, false, true], Some(0));
        frame.reg_count = 3;
        let mut buf = [0u8; 16];
        let n = encode(&frame, &mut buf).unwrap();

        let mut decoded = Frame::default();
        decode(&buf[..n], DecoderType::Request, &mut decoded).unwrap();
        assert_eq!(decoded.slave_id, 0);
        assert_eq!(decoded.reg_count, 3);
    }

    #[test]
    fn decode_rejects_oversize_frame() {
        let mut decoded = Frame::default();
        let buf = [0u8; RTU_MAX_FRAME + 1];
        assert_eq!(
            decode(&buf, DecoderType::Request, &mut decoded),
            Err(CodecError::InvalidLen)
        );
    }

    #[test]
    fn frame_len_hint_fixed_size_requests() {
        // slave_id, fc — the rest of a read request is always 5-byte PDU + CRC.
        assert_eq!(rtu_frame_len_hint(&[0x01, 0x03], DecoderType::Request), Some(8));
        assert_eq!(rtu_frame_len_hint(&[0x01, 0x06], DecoderType::Request), Some(8));
    }

    #[test]
    fn frame_len_hint_waits_for_byte_count_on_write_multiple() {
        // Only slave_id, fc, addr so far — byte_count byte hasn't arrived.
        assert_eq!(rtu_frame_len_hint(&[0x01, 0x10, 0x00, 0x0A, 0x00, 0x02], DecoderType::Request), None);
        // Byte count byte (4) has now arrived: total = 1 + (6 + 4) + 2.
        assert_eq!(
            rtu_frame_len_hint(&[0x01, 0x10, 0x00, 0x0A, 0x00, 0x02, 0x04], DecoderType::Request),
            Some(13)
        );
    }

    #[test]
    fn frame_len_hint_waits_for_byte_count_on_read_response() {
        assert_eq!(rtu_frame_len_hint(&[0x01, 0x03], DecoderType::Response), None);
        assert_eq!(rtu_frame_len_hint(&[0x01, 0x03, 0x04], DecoderType::Response), Some(9));
    }

    #[test]
    fn frame_len_hint_exception_response_is_fixed_size() {
        assert_eq!(rtu_frame_len_hint(&[0x01, 0x83], DecoderType::Response), Some(5));
    }

    #[test]
    fn frame_len_hint_matches_real_encoded_frame_length() {
        let frame = Frame {
            frame_type: FrameType::Request,
            fc: FunctionCode::ReadHoldingRegisters,
            slave_id: 1,
            reg_address: 0x082B,
            reg_count: 2,
            ..Frame::default()
        };
        let mut buf = [0u8; 16];
        let n = encode(&frame, &mut buf).unwrap();
        assert_eq!(rtu_frame_len_hint(&buf[..2], DecoderType::Request), Some(n));
    }
}
