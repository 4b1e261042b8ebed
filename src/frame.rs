// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The in-memory representation of a Modbus PDU.
//!
//! [`Frame`] is a fixed-size value: no heap allocation, no lifetime
//! parameter. It holds up to 125 sixteen-bit registers, or the same
//! storage packed as up to 2000 coils, plus enough addressing metadata
//! to serve as both a request and (after the server or client fills it
//! in) a response.

use core::fmt;

/// Maximum number of 16-bit words a single [`Frame`] can carry.
pub const FRAME_DATASIZE: usize = 125;

/// Maximum number of coils a single [`Frame`] can carry (`FRAME_DATASIZE * 16`).
pub const MAX_COILS_PER_FRAME: usize = FRAME_DATASIZE * 16;

/// A Modbus slave/unit identifier.
pub type SlaveId = u8;

/// A Modbus register/coil address (0-based).
pub type Address = u16;

/// A count of registers or coils.
pub type Quantity = u16;

/// Whether a [`Frame`] is a request, a response, or unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameType {
    /// An unused/placeholder frame.
    #[default]
    Null,
    /// A request from client to server.
    Request,
    /// A response from server to client.
    Response,
}

/// The function codes this stack implements. Others are rejected by
/// the codec rather than represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FunctionCode {
    /// No function code (a [`FrameType::Null`] frame).
    #[default]
    Null,
    /// `0x01`
    ReadCoils,
    /// `0x02`
    ReadDiscreteInputs,
    /// `0x03`
    ReadHoldingRegisters,
    /// `0x04`
    ReadInputRegisters,
    /// `0x05`
    WriteSingleCoil,
    /// `0x06`
    WriteSingleRegister,
    /// `0x0F`
    WriteMultipleCoils,
    /// `0x10`
    WriteMultipleRegisters,
}

impl FunctionCode {
    /// Recover a [`FunctionCode`] from its wire value, if supported.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::ReadCoils),
            0x02 => Some(Self::ReadDiscreteInputs),
            0x03 => Some(Self::ReadHoldingRegisters),
            0x04 => Some(Self::ReadInputRegisters),
            0x05 => Some(Self::WriteSingleCoil),
            0x06 => Some(Self::WriteSingleRegister),
            0x0F => Some(Self::WriteMultipleCoils),
            0x10 => Some(Self::WriteMultipleRegisters),
            _ => None,
        }
    }

    /// The wire value of this function code.
    ///
    /// # Panics
    ///
    /// Panics for [`FunctionCode::Null`], which has no wire
    /// representation.
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::Null => panic!("FunctionCode::Null has no wire value"),
            Self::ReadCoils => 0x01,
            Self::ReadDiscreteInputs => 0x02,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::WriteSingleCoil => 0x05,
            Self::WriteSingleRegister => 0x06,
            Self::WriteMultipleCoils => 0x0F,
            Self::WriteMultipleRegisters => 0x10,
        }
    }

    /// `true` for the four read function codes.
    #[must_use]
    pub const fn is_read(self) -> bool {
        matches!(
            self,
            Self::ReadCoils
                | Self::ReadDiscreteInputs
                | Self::ReadHoldingRegisters
                | Self::ReadInputRegisters
        )
    }

    /// `true` for the single-item write function codes.
    #[must_use]
    pub const fn is_write_single(self) -> bool {
        matches!(self, Self::WriteSingleCoil | Self::WriteSingleRegister)
    }

    /// `true` for the multi-item write function codes.
    #[must_use]
    pub const fn is_write_multiple(self) -> bool {
        matches!(
            self,
            Self::WriteMultipleCoils | Self::WriteMultipleRegisters
        )
    }

    /// `true` when this function code addresses coils rather than
    /// holding/input registers.
    #[must_use]
    pub const fn is_coil_based(self) -> bool {
        matches!(
            self,
            Self::ReadCoils | Self::ReadDiscreteInputs | Self::WriteSingleCoil | Self::WriteMultipleCoils
        )
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            other => write!(f, "0x{:02X}", other.value()),
        }
    }
}

/// A standard Modbus exception code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExceptionCode {
    /// No exception.
    #[default]
    None,
    /// `0x01`
    IllegalFunction,
    /// `0x02`
    IllegalDataAddress,
    /// `0x03`
    IllegalDataValue,
    /// `0x04`
    SlaveDeviceFailure,
    /// `0x06`
    SlaveDeviceBusy,
}

impl ExceptionCode {
    /// Recover an [`ExceptionCode`] from its wire value, if it is one
    /// of the codes this stack recognizes.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::None),
            0x01 => Some(Self::IllegalFunction),
            0x02 => Some(Self::IllegalDataAddress),
            0x03 => Some(Self::IllegalDataValue),
            0x04 => Some(Self::SlaveDeviceFailure),
            0x06 => Some(Self::SlaveDeviceBusy),
            _ => None,
        }
    }

    /// The wire value of this exception code.
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::IllegalFunction => 0x01,
            Self::IllegalDataAddress => 0x02,
            Self::IllegalDataValue => 0x03,
            Self::SlaveDeviceFailure => 0x04,
            Self::SlaveDeviceBusy => 0x06,
        }
    }

    /// `true` unless this is [`ExceptionCode::None`].
    #[must_use]
    pub const fn is_exception(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::IllegalFunction => "illegal function",
            Self::IllegalDataAddress => "illegal data address",
            Self::IllegalDataValue => "illegal data value",
            Self::SlaveDeviceFailure => "slave device failure",
            Self::SlaveDeviceBusy => "slave device busy",
        };
        f.write_str(s)
    }
}

/// Byte order for 1-register (16-bit) values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder16 {
    /// Natural big-endian order.
    Ab,
    /// Swapped bytes.
    Ba,
}

/// Byte order for 2-register (32-bit) values.
///
/// `ABCD` labels the bytes of the value most-significant-first; each
/// variant only ever swaps bytes *within* a register or swaps the
/// *order of the two registers*, never both at once for a single axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder32 {
    /// `AB CD` — natural big-endian register order and byte order.
    Abcd,
    /// `CD AB` — registers swapped, bytes within each register natural.
    Cdab,
    /// `BA DC` — registers in natural order, bytes within each register swapped.
    Badc,
    /// `DC BA` — both registers and bytes within each register swapped.
    Dcba,
}

/// A fixed-size Modbus PDU with enough addressing metadata to act as
/// either a request or a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Request, Response, or Null.
    pub frame_type: FrameType,
    /// The function code. Meaningless when `frame_type == Null`.
    pub fc: FunctionCode,
    /// Slave/unit id. `0` is broadcast.
    pub slave_id: SlaveId,
    /// Starting register/coil address.
    pub reg_address: Address,
    /// Logical item count (registers or coils).
    pub reg_count: Quantity,
    /// Packed data: registers as-is, coils packed LSB-first per word
    /// (word 0 holds coils 0..15).
    pub data: [u16; FRAME_DATASIZE],
    /// `None` unless this is an exception response.
    pub exception_code: ExceptionCode,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            frame_type: FrameType::Null,
            fc: FunctionCode::Null,
            slave_id: 0,
            reg_address: 0,
            reg_count: 0,
            data: [0; FRAME_DATASIZE],
            exception_code: ExceptionCode::None,
        }
    }
}

impl Frame {
    /// Build a new, empty request frame for the given function code.
    #[must_use]
    pub fn new_request(fc: FunctionCode, slave_id: SlaveId, reg_address: Address) -> Self {
        Self {
            frame_type: FrameType::Request,
            fc,
            slave_id,
            reg_address,
            ..Default::default()
        }
    }

    /// Build an empty exception response mirroring this frame's fc/slave_id.
    #[must_use]
    pub fn exception_response(&self, exception_code: ExceptionCode) -> Self {
        Self {
            frame_type: FrameType::Response,
            fc: self.fc,
            slave_id: self.slave_id,
            reg_address: self.reg_address,
            reg_count: self.reg_count,
            data: [0; FRAME_DATASIZE],
            exception_code,
        }
    }

    /// Read register `i`, or `0` if out of the requested range.
    #[must_use]
    pub fn get_register(&self, i: usize) -> u16 {
        if i < self.reg_count as usize {
            self.data[i]
        } else {
            0
        }
    }

    /// Read coil `i`, or `false` if out of the requested range.
    #[must_use]
    pub fn get_coil(&self, i: usize) -> bool {
        if i < self.reg_count as usize {
            (self.data[i / 16] >> (i % 16)) & 1 != 0
        } else {
            false
        }
    }

    /// Bulk-copy registers into `data`, starting at `start_idx` (or at
    /// `0` and updating `reg_count` when `start_idx` is `None`).
    ///
    /// Fails if `src` would exceed [`FRAME_DATASIZE`] registers.
    pub fn set_registers(&mut self, src: &[u16], start_idx: Option<usize>) -> bool {
        let start = start_idx.unwrap_or(0);
        if start + src.len() > FRAME_DATASIZE {
            return false;
        }
        self.data[start..start + src.len()].copy_from_slice(src);
        if start_idx.is_none() {
            self.reg_count = src.len() as u16;
        }
        true
    }

    /// Bulk-pack coils into `data`, starting at coil index `start_idx`
    /// (or at `0` and updating `reg_count` when `start_idx` is `None`).
    ///
    /// Fails if `src` would exceed [`MAX_COILS_PER_FRAME`] coils.
    pub fn set_coils(&mut self, src: &[bool], start_idx: Option<usize>) -> bool {
        let start = start_idx.unwrap_or(0);
        if start + src.len() > MAX_COILS_PER_FRAME {
            return false;
        }
        for (i, &bit) in src.iter().enumerate() {
            let idx = start + i;
            let word = idx / 16;
            let shift = idx % 16;
            if bit {
                self.data[word] |= 1 << shift;
            } else {
                self.data[word] &= !(1 << shift);
            }
        }
        if start_idx.is_none() {
            self.reg_count = src.len() as u16;
        }
        true
    }

    fn extend_reg_count(&mut self, min_count: usize) {
        if (self.reg_count as usize) < min_count {
            self.reg_count = min_count as u16;
        }
    }

    /// Write a 16-bit unsigned value at register `idx`.
    ///
    /// Auto-extends `reg_count` to cover `idx`. Returns `false` if
    /// `idx` is out of range.
    pub fn set_u16(&mut self, v: u16, idx: usize, order: ByteOrder16) -> bool {
        if idx >= FRAME_DATASIZE {
            return false;
        }
        self.data[idx] = match order {
            ByteOrder16::Ab => v,
            ByteOrder16::Ba => v.swap_bytes(),
        };
        self.extend_reg_count(idx + 1);
        true
    }

    /// Write a 16-bit signed value at register `idx`. See [`Frame::set_u16`].
    pub fn set_i16(&mut self, v: i16, idx: usize, order: ByteOrder16) -> bool {
        self.set_u16(v as u16, idx, order)
    }

    /// Read a 16-bit unsigned value at register `idx`.
    ///
    /// Returns `None` if `idx` is outside `reg_count`.
    #[must_use]
    pub fn get_u16(&self, idx: usize, order: ByteOrder16) -> Option<u16> {
        if idx >= self.reg_count as usize {
            return None;
        }
        let raw = self.data[idx];
        Some(match order {
            ByteOrder16::Ab => raw,
            ByteOrder16::Ba => raw.swap_bytes(),
        })
    }

    /// Read a 16-bit signed value at register `idx`. See [`Frame::get_u16`].
    #[must_use]
    pub fn get_i16(&self, idx: usize, order: ByteOrder16) -> Option<i16> {
        self.get_u16(idx, order).map(|v| v as i16)
    }

    fn words_for_u32(v: u32, order: ByteOrder32) -> [u16; 2] {
        let bytes = v.to_be_bytes(); // A B C D
        let (a, b, c, d) = (bytes[0], bytes[1], bytes[2], bytes[3]);
        match order {
            ByteOrder32::Abcd => [u16::from_be_bytes([a, b]), u16::from_be_bytes([c, d])],
            ByteOrder32::Cdab => [u16::from_be_bytes([c, d]), u16::from_be_bytes([a, b])],
            ByteOrder32::Badc => [u16::from_be_bytes([b, a]), u16::from_be_bytes([d, c])],
            ByteOrder32::Dcba => [u16::from_be_bytes([d, c]), u16::from_be_bytes([b, a])],
        }
    }

    fn u32_from_words(words: [u16; 2], order: ByteOrder32) -> u32 {
        let w0 = words[0].to_be_bytes();
        let w1 = words[1].to_be_bytes();
        let (a, b, c, d) = match order {
            ByteOrder32::Abcd => (w0[0], w0[1], w1[0], w1[1]),
            ByteOrder32::Cdab => (w1[0], w1[1], w0[0], w0[1]),
            ByteOrder32::Badc => (w0[1], w0[0], w1[1], w1[0]),
            ByteOrder32::Dcba => (w1[1], w1[0], w0[1], w0[0]),
        };
        u32::from_be_bytes([a, b, c, d])
    }

    /// Write a 32-bit unsigned value across registers `idx, idx+1`.
    ///
    /// Auto-extends `reg_count` to cover both registers. Returns
    /// `false` if `idx+1` is out of range.
    pub fn set_u32(&mut self, v: u32, idx: usize, order: ByteOrder32) -> bool {
        if idx + 1 >= FRAME_DATASIZE {
            return false;
        }
        let words = Self::words_for_u32(v, order);
        self.data[idx] = words[0];
        self.data[idx + 1] = words[1];
        self.extend_reg_count(idx + 2);
        true
    }

    /// Write a 32-bit signed value. See [`Frame::set_u32`].
    pub fn set_i32(&mut self, v: i32, idx: usize, order: ByteOrder32) -> bool {
        self.set_u32(v as u32, idx, order)
    }

    /// Write an IEEE-754 binary32 value. See [`Frame::set_u32`].
    pub fn set_float(&mut self, v: f32, idx: usize, order: ByteOrder32) -> bool {
        self.set_u32(v.to_bits(), idx, order)
    }

    /// Read a 32-bit unsigned value across registers `idx, idx+1`.
    ///
    /// Returns `None` if `idx+1` is outside `reg_count`.
    #[must_use]
    pub fn get_u32(&self, idx: usize, order: ByteOrder32) -> Option<u32> {
        if idx + 1 >= self.reg_count as usize {
            return None;
        }
        Some(Self::u32_from_words([self.data[idx], self.data[idx + 1]], order))
    }

    /// Read a 32-bit signed value. See [`Frame::get_u32`].
    #[must_use]
    pub fn get_i32(&self, idx: usize, order: ByteOrder32) -> Option<i32> {
        self.get_u32(idx, order).map(|v| v as i32)
    }

    /// Read an IEEE-754 binary32 value. See [`Frame::get_u32`].
    #[must_use]
    pub fn get_float(&self, idx: usize, order: ByteOrder32) -> Option<f32> {
        self.get_u32(idx, order).map(f32::from_bits)
    }
}
