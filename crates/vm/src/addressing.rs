//! Data movement, pointer instructions, field access and casts.
//!
//! Frame-relative operands resolve through `Memory::to_absolute`. Stored
//! pointers are 4-byte signed values; dereferencing a negative one is an
//! out-of-bounds access.

use std::io::Write;

use basalt_common::operand::{DestMode, ShiftMode, SourceMode};
use basalt_common::Width;

use crate::error::{AtPosition, MemoryError, RuntimeError};
use crate::machine::Vm;

/// A decoded `Mov` source, resolved to where its bytes come from.
enum MoveSource<'a> {
    Address { address: usize, size: usize },
    Immediate(&'a [u8]),
}

impl<'a, W: Write> Vm<'a, W> {
    /// Read a frame offset and load the pointer stored in that slot.
    fn next_pointee(&mut self) -> Result<usize, RuntimeError> {
        let slot = self.next_address()?;
        self.memory.read_pointer(slot).at(self.current)
    }

    fn next_size(&mut self) -> Result<usize, RuntimeError> {
        Ok(self.next_u8()? as usize)
    }

    // ---- Mov ----

    pub(crate) fn exec_mov(&mut self) -> Result<(), RuntimeError> {
        let at = self.current;

        let dest_mode = self.next_u8()?;
        let dest = match DestMode::try_from(dest_mode) {
            Ok(DestMode::Direct) => self.next_address()?,
            Ok(DestMode::Indirect) => self.next_pointee()?,
            Err(mode) => return Err(RuntimeError::InvalidDestinationMode { at, mode }),
        };

        let source_mode = self.next_u8()?;
        let source = match SourceMode::try_from(source_mode) {
            Ok(SourceMode::Frame) => MoveSource::Address {
                address: self.next_address()?,
                size: self.next_size()?,
            },
            Ok(SourceMode::Immediate) => {
                let size = self.next_size()?;
                MoveSource::Immediate(self.next_bytes(size)?)
            }
            Ok(SourceMode::Deref) => MoveSource::Address {
                address: self.next_pointee()?,
                size: self.next_size()?,
            },
            Ok(SourceMode::Absolute) => {
                let raw = self.next_i32()?;
                MoveSource::Address {
                    address: self.memory.pointer(raw).at(at)?,
                    size: self.next_size()?,
                }
            }
            Err(mode) => return Err(RuntimeError::InvalidSourceMode { at, mode }),
        };

        let moved = match source {
            MoveSource::Address { address, size } => self.memory.copy(address, dest, size),
            MoveSource::Immediate(bytes) => self.memory.write(dest, bytes),
        };
        moved.at(at)
    }

    // ---- Pointers ----

    /// Store the address of a variable, or with `dereference` the address
    /// its slot already holds.
    pub(crate) fn exec_to_ptr(&mut self, dereference: bool) -> Result<(), RuntimeError> {
        let at = self.current;
        let variable = if dereference {
            self.next_pointee()?
        } else {
            self.next_address()?
        };
        let result = self.next_address()?;
        self.memory.write_pointer(result, variable).at(at)
    }

    pub(crate) fn exec_ptr_get(&mut self) -> Result<(), RuntimeError> {
        let pointee = self.next_pointee()?;
        let result = self.next_address()?;
        let size = self.next_size()?;
        self.memory.copy(pointee, result, size).at(self.current)
    }

    pub(crate) fn exec_ptr_set(&mut self) -> Result<(), RuntimeError> {
        let pointee = self.next_pointee()?;
        let value = self.next_address()?;
        let size = self.next_size()?;
        self.memory.copy(value, pointee, size).at(self.current)
    }

    /// Add a byte shift to the pointer stored in a slot. Mode 1 shifts by a
    /// sign-extended variable plus a constant.
    pub(crate) fn exec_ptr_shift(&mut self) -> Result<(), RuntimeError> {
        let at = self.current;
        let mode = self.next_u8()?;
        let slot = self.next_address()?;
        let shift = match ShiftMode::try_from(mode) {
            Ok(ShiftMode::Immediate) => self.next_i32()?,
            Ok(ShiftMode::FromVariable) => {
                let variable = self.next_address()?;
                let extra = self.next_i32()?;
                let width = self.next_width()?;
                let value = self.memory.read_int(variable, width).at(at)? as i32;
                value.wrapping_add(extra)
            }
            Err(mode) => return Err(RuntimeError::InvalidShiftMode { at, mode }),
        };

        let pointer = self.memory.read_i32(slot).at(at)?;
        self.memory
            .write_i32(slot, pointer.wrapping_add(shift))
            .at(at)
    }

    // ---- Fields ----

    /// Getter mode copies the field's value to the result slot. Setter mode
    /// stores the field's address there, for a following indirect `Mov`.
    pub(crate) fn exec_field_access(&mut self) -> Result<(), RuntimeError> {
        let at = self.current;
        let object = self.next_pointee()?;
        let field_offset = self.next_i32()?;
        let size = self.next_size()?;
        let getter = self.next_u8()? != 0;
        let result = self.next_address()?;

        let field = object as i64 + field_offset as i64;
        let field = usize::try_from(field)
            .map_err(|_| MemoryError::OutOfBounds {
                address: field,
                size,
                len: self.memory.len(),
            })
            .at(at)?;

        if getter {
            self.memory.copy(field, result, size).at(at)
        } else {
            self.memory.write_pointer(result, field).at(at)
        }
    }

    // ---- Cast ----

    /// Truncate or zero-extend; signs are never extended.
    pub(crate) fn exec_cast(&mut self) -> Result<(), RuntimeError> {
        let at = self.current;
        let source = self.next_address()?;
        let source_size = self.next_cast_width()?;
        let dest = self.next_address()?;
        let dest_size = self.next_cast_width()?;

        let kept = source_size.min(dest_size);
        self.memory.copy(source, dest, kept).at(at)?;
        self.memory.fill_zero(dest + kept, dest_size - kept).at(at)
    }

    fn next_cast_width(&mut self) -> Result<usize, RuntimeError> {
        self.next_width().map(Width::bytes)
    }
}
