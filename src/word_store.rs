// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The server's register map: an ordered, overlap-free set of [`Word`]
//! descriptors per [`RegType`].

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use crate::error::ServerError;

/// Default cap on registers a single [`Word`] may span.
pub const DEFAULT_MAX_WORD_SIZE: usize = 8;

/// Which of the four Modbus register spaces a [`Word`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegType {
    Coil,
    DiscreteInput,
    HoldingRegister,
    InputRegister,
}

impl RegType {
    fn is_read_only(self) -> bool {
        matches!(self, Self::DiscreteInput | Self::InputRegister)
    }
}

type ReadFn = Box<dyn Fn() -> Result<Vec<u16>, ServerError> + Send + Sync>;
type WriteFn = Box<dyn Fn(&[u16]) -> Result<(), ServerError> + Send + Sync>;

/// A contiguous register block the server exposes atomically.
///
/// Backed either by a single shared atomic cell (when `nb_regs == 1`)
/// or by read/write handlers. Read-only [`RegType`]s cannot carry a
/// write handler.
pub struct Word {
    reg_type: RegType,
    start_addr: u16,
    nb_regs: u8,
    read: ReadFn,
    write: Option<WriteFn>,
}

impl std::fmt::Debug for Word {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Word")
            .field("reg_type", &self.reg_type)
            .field("start_addr", &self.start_addr)
            .field("nb_regs", &self.nb_regs)
            .field("writable", &self.write.is_some())
            .finish()
    }
}

impl Word {
    /// A single-register `Word` directly backed by a shared atomic
    /// cell. Read-only for [`RegType::DiscreteInput`] / [`RegType::InputRegister`].
    pub fn direct(reg_type: RegType, start_addr: u16, cell: Arc<AtomicU16>) -> Result<Self, ServerError> {
        let read_cell = Arc::clone(&cell);
        let read: ReadFn = Box::new(move || Ok(vec![read_cell.load(Ordering::Acquire)]));
        let write: Option<WriteFn> = if reg_type.is_read_only() {
            None
        } else {
            let write_cell = Arc::clone(&cell);
            Some(Box::new(move |values: &[u16]| {
                write_cell.store(values[0], Ordering::Release);
                Ok(())
            }))
        };
        Ok(Self {
            reg_type,
            start_addr,
            nb_regs: 1,
            read,
            write,
        })
    }

    /// A `Word` spanning `nb_regs` registers, backed by a read handler
    /// and an optional write handler.
    pub fn handler(
        reg_type: RegType,
        start_addr: u16,
        nb_regs: u8,
        read: ReadFn,
        write: Option<WriteFn>,
    ) -> Result<Self, ServerError> {
        if nb_regs == 0 {
            return Err(ServerError::InvalidWord);
        }
        if reg_type.is_read_only() && write.is_some() {
            return Err(ServerError::InvalidWord);
        }
        Ok(Self {
            reg_type,
            start_addr,
            nb_regs,
            read,
            write,
        })
    }

    #[must_use]
    pub fn reg_type(&self) -> RegType {
        self.reg_type
    }

    #[must_use]
    pub fn start_addr(&self) -> u16 {
        self.start_addr
    }

    #[must_use]
    pub fn nb_regs(&self) -> u8 {
        self.nb_regs
    }

    #[must_use]
    pub fn end_addr(&self) -> u32 {
        u32::from(self.start_addr) + u32::from(self.nb_regs)
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.write.is_some()
    }

    pub fn read(&self) -> Result<Vec<u16>, ServerError> {
        (self.read)()
    }

    pub fn write(&self, values: &[u16]) -> Result<(), ServerError> {
        match &self.write {
            Some(w) => w(values),
            None => Err(ServerError::IllegalFunction),
        }
    }

    fn overlaps_range(&self, other: &Word) -> bool {
        u32::from(self.start_addr) < other.end_addr() && u32::from(other.start_addr) < self.end_addr()
    }
}

/// The ordered, overlap-free set of [`Word`] descriptors, one list per
/// [`RegType`].
pub struct WordStore {
    coils: Vec<Word>,
    discrete_inputs: Vec<Word>,
    holding_registers: Vec<Word>,
    input_registers: Vec<Word>,
    max_word_size: usize,
    began: bool,
}

impl std::fmt::Debug for WordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordStore")
            .field("coils", &self.coils.len())
            .field("discrete_inputs", &self.discrete_inputs.len())
            .field("holding_registers", &self.holding_registers.len())
            .field("input_registers", &self.input_registers.len())
            .field("max_word_size", &self.max_word_size)
            .field("began", &self.began)
            .finish()
    }
}

impl WordStore {
    #[must_use]
    pub fn new(max_word_size: usize) -> Self {
        Self {
            coils: Vec::new(),
            discrete_inputs: Vec::new(),
            holding_registers: Vec::new(),
            input_registers: Vec::new(),
            max_word_size,
            began: false,
        }
    }

    fn list(&self, reg_type: RegType) -> &Vec<Word> {
        match reg_type {
            RegType::Coil => &self.coils,
            RegType::DiscreteInput => &self.discrete_inputs,
            RegType::HoldingRegister => &self.holding_registers,
            RegType::InputRegister => &self.input_registers,
        }
    }

    fn list_mut(&mut self, reg_type: RegType) -> &mut Vec<Word> {
        match reg_type {
            RegType::Coil => &mut self.coils,
            RegType::DiscreteInput => &mut self.discrete_inputs,
            RegType::HoldingRegister => &mut self.holding_registers,
            RegType::InputRegister => &mut self.input_registers,
        }
    }

    /// Insert a `Word`. Before [`Self::begin`], overlap is not checked
    /// per-insert (a single scan runs at `begin`); afterwards each
    /// insert is checked against the already-sorted list.
    pub fn insert(&mut self, word: Word) -> Result<(), ServerError> {
        if word.nb_regs() == 0 || word.nb_regs() as usize > self.max_word_size {
            return Err(ServerError::InvalidWord);
        }
        if word.end_addr() > u32::from(u16::MAX) + 1 {
            return Err(ServerError::InvalidWord);
        }

        if !self.began {
            self.list_mut(word.reg_type()).push(word);
            return Ok(());
        }

        let reg_type = word.reg_type();
        if self.overlaps(&word) {
            return Err(ServerError::WordOverlap);
        }
        let list = self.list_mut(reg_type);
        let pos = list.partition_point(|w| w.start_addr() < word.start_addr());
        list.insert(pos, word);
        Ok(())
    }

    pub fn clear_all(&mut self) {
        self.coils.clear();
        self.discrete_inputs.clear();
        self.holding_registers.clear();
        self.input_registers.clear();
        self.began = false;
    }

    /// Sort each type's list by `start_addr` and run a single linear
    /// overlap scan across it.
    pub fn sort_all(&mut self) -> Result<(), ServerError> {
        for reg_type in [
            RegType::Coil,
            RegType::DiscreteInput,
            RegType::HoldingRegister,
            RegType::InputRegister,
        ] {
            let list = self.list_mut(reg_type);
            list.sort_by_key(Word::start_addr);
            for pair in list.windows(2) {
                if pair[0].overlaps_range(&pair[1]) {
                    return Err(ServerError::WordOverlap);
                }
            }
        }
        Ok(())
    }

    /// Finish the build-up phase: sort and overlap-check every list,
    /// then switch to the runtime insert/overlap-check discipline.
    pub fn begin(&mut self) -> Result<(), ServerError> {
        self.sort_all()?;
        self.began = true;
        Ok(())
    }

    #[must_use]
    pub fn find_exact(&self, reg_type: RegType, addr: u16) -> Option<&Word> {
        let list = self.list(reg_type);
        list.binary_search_by_key(&addr, Word::start_addr)
            .ok()
            .map(|idx| &list[idx])
    }

    #[must_use]
    pub fn find_containing(&self, reg_type: RegType, addr: u16) -> Option<&Word> {
        let list = self.list(reg_type);
        let pos = list.partition_point(|w| w.start_addr() <= addr);
        if pos == 0 {
            return None;
        }
        let candidate = &list[pos - 1];
        (u32::from(addr) < candidate.end_addr()).then_some(candidate)
    }

    #[must_use]
    pub fn find_next(&self, reg_type: RegType, addr: u16) -> Option<&Word> {
        let list = self.list(reg_type);
        let pos = list.partition_point(|w| w.start_addr() < addr);
        list.get(pos)
    }

    #[must_use]
    pub fn overlaps(&self, word: &Word) -> bool {
        self.list(word.reg_type()).iter().any(|w| w.overlaps_range(word))
    }

    #[must_use]
    pub fn size(&self, reg_type: RegType) -> usize {
        self.list(reg_type).len()
    }

    #[must_use]
    pub fn total_size(&self) -> usize {
        self.coils.len() + self.discrete_inputs.len() + self.holding_registers.len() + self.input_registers.len()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.coils.capacity()
            + self.discrete_inputs.capacity()
            + self.holding_registers.capacity()
            + self.input_registers.capacity()
    }

    #[must_use]
    pub fn has_begun(&self) -> bool {
        self.began
    }
}
