//! Main execution loop and opcode dispatch for the Basalt VM.

use std::io::Write;
use std::time::Instant;

use basalt_common::operand::{HeapAllocMode, SectionKind, StackAllocMode};
use basalt_common::Opcode;
use tracing::{debug, trace};

use crate::error::{AtPosition, RuntimeError};
use crate::machine::{ExitStatus, Vm};

impl<'a, W: Write> Vm<'a, W> {
    /// Run until the instruction pointer leaves the image or an error halts
    /// the module.
    pub fn execute(&mut self) -> Result<ExitStatus, RuntimeError> {
        let started = Instant::now();
        while self.step()? {}
        let elapsed = started.elapsed();

        let exit_code = self.exit_code()?;
        debug!(
            exit_code,
            instructions = self.executed,
            elapsed_us = elapsed.as_micros() as u64,
            "module finished"
        );
        Ok(ExitStatus {
            exit_code,
            instructions: self.executed,
            elapsed,
        })
    }

    /// Execute one instruction. Returns `false` without doing anything once
    /// the module has terminated.
    pub fn step(&mut self) -> Result<bool, RuntimeError> {
        if self.code.is_at_end() {
            return Ok(false);
        }

        let at = self.code.position();
        if self.executed >= self.config.instruction_limit {
            return Err(RuntimeError::InstructionLimitExceeded {
                at,
                limit: self.config.instruction_limit,
            });
        }

        self.current = at;
        let byte = self.next_u8()?;
        let opcode =
            Opcode::try_from(byte).map_err(|_| RuntimeError::InvalidOpcode { at, byte })?;
        trace!(position = at, opcode = opcode.mnemonic(), "dispatch");

        let started = self.profile.is_some().then(Instant::now);
        self.dispatch(opcode)?;
        self.executed += 1;
        if let (Some(profile), Some(started)) = (self.profile.as_mut(), started) {
            profile.record(opcode, started.elapsed());
        }
        Ok(true)
    }

    fn dispatch(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        match opcode {
            // Allocation
            Opcode::AllocateStack => self.exec_allocate_stack(),
            Opcode::AllocateHeap => self.exec_allocate_heap(),
            Opcode::DeallocateStack => self.exec_deallocate_stack(),

            // Calling convention and scopes
            Opcode::FunctionPrologue | Opcode::AllocateRspSaver => self.exec_open_frame(),
            Opcode::FunctionEpilogue | Opcode::DeallocateRspSaver => self.exec_close_frame(),
            Opcode::RestoreRspSaver => self.exec_rewind_frame(),
            Opcode::Call => self.exec_call(),
            Opcode::Return => self.exec_return(),

            // Control flow
            Opcode::Jump => self.exec_jump(),
            Opcode::JumpIfFalse => self.exec_jump_if_false(),
            Opcode::Exit => self.exec_exit(),

            // Data movement and pointers
            Opcode::Mov => self.exec_mov(),
            Opcode::ToPtrValueType => self.exec_to_ptr(false),
            Opcode::ToPtrRefType => self.exec_to_ptr(true),
            Opcode::PtrGet => self.exec_ptr_get(),
            Opcode::PtrSet => self.exec_ptr_set(),
            Opcode::PtrShift => self.exec_ptr_shift(),
            Opcode::FieldAccess => self.exec_field_access(),
            Opcode::Cast => self.exec_cast(),

            // Arithmetic
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::DivRemainder
            | Opcode::LeftBitShift
            | Opcode::RightBitShift
            | Opcode::BitAnd
            | Opcode::BitOr => self.exec_binary(opcode),
            Opcode::Compare => self.exec_compare(),
            Opcode::Negate => self.exec_negate(),
            Opcode::Increment => self.exec_step_in_place(1),
            Opcode::Decrement => self.exec_step_in_place(-1),

            // Image structure and host interaction
            Opcode::Section => self.exec_section(),
            Opcode::VmCommand => self.exec_command(),
        }
    }

    // ---- Sections ----

    /// The data section may only open the image, and must be closed by the
    /// code marker, which then dispatches as an ordinary no-op.
    fn exec_section(&mut self) -> Result<(), RuntimeError> {
        let at = self.current;
        let kind = self.next_u8()?;
        match SectionKind::try_from(kind) {
            Ok(SectionKind::Code) => Ok(()),
            Ok(SectionKind::Data) => {
                if at != 0 {
                    return Err(RuntimeError::MisplacedDataSection { at });
                }
                let len = self.next_count()?;
                let data = self.next_bytes(len)?;

                let next = self.code.position();
                let opcode = self.code.peek_at(next).unwrap_or(0);
                let marker = self.code.peek_at(next + 1).unwrap_or(0);
                if opcode != Opcode::Section as u8 || marker != SectionKind::Code as u8 {
                    return Err(RuntimeError::UnterminatedDataSection {
                        at,
                        opcode,
                        kind: marker,
                    });
                }

                self.memory.map_data(data);
                debug!(bytes = len, "mapped data section");
                Ok(())
            }
            Err(kind) => Err(RuntimeError::InvalidSectionKind { at, kind }),
        }
    }

    // ---- Allocation ----

    fn exec_allocate_stack(&mut self) -> Result<(), RuntimeError> {
        let at = self.current;
        let mode = self.next_u8()?;
        match StackAllocMode::try_from(mode) {
            Ok(StackAllocMode::WithDefaultValue) => {
                let size = self.next_u8()? as usize;
                let default = self.next_bytes(size)?;
                self.memory.push(default).at(at)
            }
            Ok(StackAllocMode::PushVariable) => {
                let source = self.next_address()?;
                let size = self.next_u8()? as usize;
                let slot = self.memory.allocate_stack(size).at(at)?;
                self.memory.copy(source, slot, size).at(at)
            }
            Err(mode) => Err(RuntimeError::InvalidStackAllocationMode { at, mode }),
        }
    }

    fn exec_allocate_heap(&mut self) -> Result<(), RuntimeError> {
        let at = self.current;
        let mode = self.next_u8()?;
        let storage = self.next_address()?;
        let size = match HeapAllocMode::try_from(mode) {
            Ok(HeapAllocMode::Fixed) => self.next_count()?,
            Ok(HeapAllocMode::FromVariable) => {
                let variable = self.next_address()?;
                let width = self.next_width()?;
                let value = self.memory.read_int(variable, width).at(at)?;
                usize::try_from(value)
                    .map_err(|_| RuntimeError::NegativeOperand { at, value })?
            }
            Err(mode) => return Err(RuntimeError::InvalidHeapAllocationMode { at, mode }),
        };

        let object = self.memory.allocate_heap(size).at(at)?;
        self.memory.write_pointer(storage, object).at(at)
    }

    fn exec_deallocate_stack(&mut self) -> Result<(), RuntimeError> {
        let count = self.next_count()?;
        self.memory.deallocate_stack(count).at(self.current)
    }
}
