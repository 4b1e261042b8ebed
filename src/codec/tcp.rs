// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP framing: a 7-byte MBAP header (`txn_id | proto_id=0 |
//! length | unit_id`) followed by the PDU. No CRC — TCP guarantees the
//! byte stream.

use byteorder::{BigEndian, ByteOrder};

use super::{decode_pdu, encode_pdu, pdu_len, DecoderType, TCP_MAX_FRAME};
use crate::error::CodecError;
use crate::frame::Frame;

/// Size of the MBAP header, unit id included.
pub const MBAP_HEADER_LEN: usize = 7;

/// Encode `frame` as a complete TCP ADU (MBAP header + PDU) into `out`.
/// Returns the number of bytes written.
pub fn encode(txn_id: u16, frame: &Frame, out: &mut [u8]) -> Result<usize, CodecError> {
    let pdu_size = pdu_len(frame)?;
    let total = MBAP_HEADER_LEN + pdu_size;
    if total > TCP_MAX_FRAME {
        return Err(CodecError::InvalidLen);
    }
    if out.len() < total {
        return Err(CodecError::InvalidLen);
    }

    BigEndian::write_u16(&mut out[0..2], txn_id);
    BigEndian::write_u16(&mut out[2..4], 0); // proto_id
    BigEndian::write_u16(&mut out[4..6], (1 + pdu_size) as u16); // unit_id + PDU
    out[6] = frame.slave_id;

    let written = encode_pdu(frame, &mut out[MBAP_HEADER_LEN..total])?;
    debug_assert_eq!(written, pdu_size);

    Ok(total)
}

/// Decode a complete TCP ADU from `buf`. Returns the transaction id
/// alongside the populated frame.
pub fn decode(buf: &[u8], decoder_type: DecoderType, frame: &mut Frame) -> Result<u16, CodecError> {
    if buf.len() < MBAP_HEADER_LEN || buf.len() > TCP_MAX_FRAME {
        return Err(CodecError::InvalidLen);
    }

    let txn_id = BigEndian::read_u16(&buf[0..2]);
    let proto_id = BigEndian::read_u16(&buf[2..4]);
    if proto_id != 0 {
        return Err(CodecError::InvalidMbapProtocolId);
    }

    let length = BigEndian::read_u16(&buf[4..6]) as usize;
    if length == 0 || length != buf.len() - 6 {
        return Err(CodecError::InvalidMbapLen);
    }

    let slave_id = buf[6];
    decode_pdu(&buf[MBAP_HEADER_LEN..], decoder_type, frame)?;
    frame.slave_id = slave_id;
    Ok(txn_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameType, FunctionCode};

    #[test]
    fn encode_decode_write_single_register_request() {
        let mut frame = Frame {
            frame_type: FrameType::Request,
            fc: FunctionCode::WriteSingleRegister,
            slave_id: 1,
            reg_address: 2,
            ..Frame::default()
        };
        frame.set_registers(&[0x00FF], None);

        let mut buf = [0u8; 16];
        let n = encode(7, &frame, &mut buf).unwrap();
        assert_eq!(
            &buf[..n],
            &[0x00, 0x07, 0x00, 0x00, 0x00, 0x06, 0x01, 0x06, 0x00, 0x02, 0x00, 0xFF]
        );

        let mut decoded = Frame::default();
        let txn = decode(&buf[..n], DecoderType::Request, &mut decoded).unwrap();
        assert_eq!(txn, 7);
        assert_eq!(decoded.slave_id, 1);
        assert_eq!(decoded.reg_address, 2);
        assert_eq!(decoded.get_register(0), 0x00FF);
    }

    #[test]
    fn decode_rejects_wrong_protocol_id() {
        let mut buf = [0u8; MBAP_HEADER_LEN + 2];
        BigEndian::write_u16(&mut buf[2..4], 1);
        BigEndian::write_u16(&mut buf[4..6], 3);
        let mut decoded = Frame::default();
        assert_eq!(
            decode(&buf, DecoderType::Request, &mut decoded),
            Err(CodecError::InvalidMbapProtocolId)
        );
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        let mut buf = [0u8; MBAP_HEADER_LEN + 2];
        BigEndian::write_u16(&mut buf[4..6], 99);
        let mut decoded = Frame::default();
        assert_eq!(
            decode(&buf, DecoderType::Request, &mut decoded),
            Err(CodecError::InvalidMbapLen)
        );
    }

    #[test]
    fn decode_rejects_oversize_frame() {
        let buf = [0u8; TCP_MAX_FRAME + 1];
        let mut decoded = Frame::default();
        assert_eq!(
            decode(&buf, DecoderType::Request, &mut decoded),
            Err(CodecError::InvalidLen)
        );
    }

    #[test]
    fn encode_rejects_oversize_pdu() {
        let frame = Frame {
            frame_type: FrameType::Request,
            fc: FunctionCode::ReadHoldingRegisters,
            slave_id: 1,
            reg_count: 125,
            ..Frame::default()
        };
        let mut buf = [0u8; TCP_MAX_FRAME];
        assert!(encode(1, &frame, &mut buf).is_ok());
    }
}
