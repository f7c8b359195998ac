//! Control transfer and the calling convention.
//!
//! `Call` pushes the position of its own opcode byte. `Return` pops that
//! anchor, checks the image still holds a `Call` opcode there, and resumes
//! five bytes later, just past the call's 4-byte target operand.

use std::io::Write;

use basalt_common::Opcode;

use crate::error::{AtPosition, RuntimeError};
use crate::machine::Vm;

/// Opcode byte plus the 4-byte target operand.
const CALL_LENGTH: usize = 5;

impl<'a, W: Write> Vm<'a, W> {
    /// Move the instruction pointer to `target`. A target equal to the
    /// image length terminates the module normally.
    pub(crate) fn transfer(&mut self, target: i32) -> Result<(), RuntimeError> {
        match usize::try_from(target) {
            Ok(position) if position <= self.code.len() => {
                self.code.set_position(position);
                Ok(())
            }
            _ => Err(RuntimeError::InvalidTarget {
                at: self.current,
                target,
            }),
        }
    }

    // ---- Frames ----

    pub(crate) fn exec_open_frame(&mut self) -> Result<(), RuntimeError> {
        self.memory.open_frame().at(self.current)
    }

    pub(crate) fn exec_close_frame(&mut self) -> Result<(), RuntimeError> {
        self.memory.close_frame().at(self.current)
    }

    pub(crate) fn exec_rewind_frame(&mut self) -> Result<(), RuntimeError> {
        self.memory.rewind_frame();
        Ok(())
    }

    // ---- Calls ----

    pub(crate) fn exec_call(&mut self) -> Result<(), RuntimeError> {
        let at = self.current;
        let target = self.next_i32()?;
        self.memory.push_i32(at as i32).at(at)?;
        self.transfer(target)
    }

    pub(crate) fn exec_return(&mut self) -> Result<(), RuntimeError> {
        let at = self.current;
        let anchor = self.memory.pop_i32().at(at)?;
        let position = usize::try_from(anchor)
            .ok()
            .filter(|&p| p < self.code.len())
            .ok_or(RuntimeError::AnchorOutsideImage { at, anchor })?;

        match self.code.peek_at(position) {
            Some(byte) if byte == Opcode::Call as u8 => {
                self.code.set_position(position + CALL_LENGTH);
                Ok(())
            }
            found => Err(RuntimeError::CorruptedStack {
                at,
                anchor,
                found: found.unwrap_or(0),
            }),
        }
    }

    // ---- Jumps ----

    pub(crate) fn exec_jump(&mut self) -> Result<(), RuntimeError> {
        let target = self.next_i32()?;
        self.transfer(target)
    }

    /// Falls through when any byte of the condition is nonzero.
    pub(crate) fn exec_jump_if_false(&mut self) -> Result<(), RuntimeError> {
        let target = self.next_i32()?;
        let condition = self.next_address()?;
        let width = self.next_width()?;
        let value = self.memory.read(condition, width.bytes()).at(self.current)?;
        if value.iter().all(|&b| b == 0) {
            self.transfer(target)?;
        }
        Ok(())
    }

    pub(crate) fn exec_exit(&mut self) -> Result<(), RuntimeError> {
        self.code.finish();
        Ok(())
    }
}
