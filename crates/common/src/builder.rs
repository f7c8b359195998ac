//! Programmatic construction of module images.
//!
//! Every emitter appends one instruction and returns the position of its
//! opcode byte. Forward jumps are emitted with a placeholder target and
//! fixed up later with [`ImageBuilder::patch_target`].
//!
//! ```
//! use basalt_common::ImageBuilder;
//!
//! let mut b = ImageBuilder::new();
//! b.allocate_stack(&7i32.to_le_bytes());
//! b.exit();
//! let image = b.finish();
//! assert_eq!(image[0], 1);
//! ```

use crate::opcode::Opcode;
use crate::operand::{
    Command, CompareOp, DestMode, HeapAllocMode, SectionKind, ShiftMode, SourceMode,
    StackAllocMode, ValueKind,
};

/// Destination operand of `Mov`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dest {
    /// Frame slot at this offset.
    Direct(i32),
    /// Address stored in the frame slot at this offset.
    Indirect(i32),
}

/// Source operand of `Mov`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Frame { offset: i32, size: u8 },
    Immediate(Vec<u8>),
    Deref { offset: i32, size: u8 },
    Absolute { address: i32, size: u8 },
}

/// One `(slot, size, kind)` argument of a `Print` or `Sleep` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandArg {
    pub offset: i32,
    pub size: u8,
    pub kind: u8,
}

impl CommandArg {
    pub fn new(offset: i32, size: u8, kind: ValueKind) -> Self {
        Self {
            offset,
            size,
            kind: kind as u8,
        }
    }
}

/// Appends encoded instructions to a byte buffer.
#[derive(Debug, Clone, Default)]
pub struct ImageBuilder {
    bytes: Vec<u8>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position the next instruction will occupy.
    pub fn position(&self) -> i32 {
        self.bytes.len() as i32
    }

    /// Finish and return the image.
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }

    /// Append raw bytes, for malformed-image tests.
    pub fn raw(&mut self, bytes: &[u8]) -> usize {
        let at = self.bytes.len();
        self.bytes.extend_from_slice(bytes);
        at
    }

    /// Rewrite the 4-byte target of the `Call`, `Jump` or `JumpIfFalse`
    /// whose opcode sits at `instruction`.
    pub fn patch_target(&mut self, instruction: usize, target: i32) {
        self.bytes[instruction + 1..instruction + 5].copy_from_slice(&target.to_le_bytes());
    }

    fn op(&mut self, opcode: Opcode) -> usize {
        let at = self.bytes.len();
        self.bytes.push(opcode as u8);
        at
    }

    fn u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    fn i32(&mut self, value: i32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    // ---- Sections ----

    /// Data section followed by the mandatory code marker.
    pub fn data_section(&mut self, data: &[u8]) -> usize {
        let at = self.op(Opcode::Section);
        self.u8(SectionKind::Data as u8);
        self.i32(data.len() as i32);
        self.bytes.extend_from_slice(data);
        self.op(Opcode::Section);
        self.u8(SectionKind::Code as u8);
        at
    }

    /// Bare code section marker.
    pub fn code_section(&mut self) -> usize {
        let at = self.op(Opcode::Section);
        self.u8(SectionKind::Code as u8);
        at
    }

    // ---- Allocation ----

    /// Reserve `default.len()` stack bytes initialised to `default`.
    pub fn allocate_stack(&mut self, default: &[u8]) -> usize {
        let at = self.op(Opcode::AllocateStack);
        self.u8(StackAllocMode::WithDefaultValue as u8);
        self.u8(default.len() as u8);
        self.bytes.extend_from_slice(default);
        at
    }

    /// Push a copy of the `size`-byte variable at `offset`.
    pub fn push_variable(&mut self, offset: i32, size: u8) -> usize {
        let at = self.op(Opcode::AllocateStack);
        self.u8(StackAllocMode::PushVariable as u8);
        self.i32(offset);
        self.u8(size);
        at
    }

    /// Allocate `size` heap bytes and store the pointer at `storage`.
    pub fn allocate_heap(&mut self, storage: i32, size: i32) -> usize {
        let at = self.op(Opcode::AllocateHeap);
        self.u8(HeapAllocMode::Fixed as u8);
        self.i32(storage);
        self.i32(size);
        at
    }

    /// Allocate as many heap bytes as the `width`-byte variable at `size_var` holds.
    pub fn allocate_heap_from(&mut self, storage: i32, size_var: i32, width: u8) -> usize {
        let at = self.op(Opcode::AllocateHeap);
        self.u8(HeapAllocMode::FromVariable as u8);
        self.i32(storage);
        self.i32(size_var);
        self.u8(width);
        at
    }

    pub fn deallocate_stack(&mut self, count: i32) -> usize {
        let at = self.op(Opcode::DeallocateStack);
        self.i32(count);
        at
    }

    // ---- Calling convention ----

    pub fn prologue(&mut self) -> usize {
        self.op(Opcode::FunctionPrologue)
    }

    pub fn epilogue(&mut self) -> usize {
        self.op(Opcode::FunctionEpilogue)
    }

    pub fn call(&mut self, target: i32) -> usize {
        let at = self.op(Opcode::Call);
        self.i32(target);
        at
    }

    pub fn ret(&mut self) -> usize {
        self.op(Opcode::Return)
    }

    pub fn open_scope(&mut self) -> usize {
        self.op(Opcode::AllocateRspSaver)
    }

    pub fn restore_scope(&mut self) -> usize {
        self.op(Opcode::RestoreRspSaver)
    }

    pub fn close_scope(&mut self) -> usize {
        self.op(Opcode::DeallocateRspSaver)
    }

    // ---- Control flow ----

    pub fn jump(&mut self, target: i32) -> usize {
        let at = self.op(Opcode::Jump);
        self.i32(target);
        at
    }

    pub fn jump_if_false(&mut self, target: i32, condition: i32, width: u8) -> usize {
        let at = self.op(Opcode::JumpIfFalse);
        self.i32(target);
        self.i32(condition);
        self.u8(width);
        at
    }

    pub fn exit(&mut self) -> usize {
        self.op(Opcode::Exit)
    }

    // ---- Data movement ----

    pub fn mov(&mut self, dest: Dest, source: Source) -> usize {
        let at = self.op(Opcode::Mov);
        match dest {
            Dest::Direct(offset) => {
                self.u8(DestMode::Direct as u8);
                self.i32(offset);
            }
            Dest::Indirect(offset) => {
                self.u8(DestMode::Indirect as u8);
                self.i32(offset);
            }
        }
        match source {
            Source::Frame { offset, size } => {
                self.u8(SourceMode::Frame as u8);
                self.i32(offset);
                self.u8(size);
            }
            Source::Immediate(bytes) => {
                self.u8(SourceMode::Immediate as u8);
                self.u8(bytes.len() as u8);
                self.bytes.extend_from_slice(&bytes);
            }
            Source::Deref { offset, size } => {
                self.u8(SourceMode::Deref as u8);
                self.i32(offset);
                self.u8(size);
            }
            Source::Absolute { address, size } => {
                self.u8(SourceMode::Absolute as u8);
                self.i32(address);
                self.u8(size);
            }
        }
        at
    }

    pub fn to_ptr_value(&mut self, variable: i32, result: i32) -> usize {
        let at = self.op(Opcode::ToPtrValueType);
        self.i32(variable);
        self.i32(result);
        at
    }

    pub fn to_ptr_ref(&mut self, variable: i32, result: i32) -> usize {
        let at = self.op(Opcode::ToPtrRefType);
        self.i32(variable);
        self.i32(result);
        at
    }

    pub fn ptr_get(&mut self, pointer: i32, result: i32, size: u8) -> usize {
        let at = self.op(Opcode::PtrGet);
        self.i32(pointer);
        self.i32(result);
        self.u8(size);
        at
    }

    pub fn ptr_set(&mut self, pointer: i32, value: i32, size: u8) -> usize {
        let at = self.op(Opcode::PtrSet);
        self.i32(pointer);
        self.i32(value);
        self.u8(size);
        at
    }

    pub fn ptr_shift(&mut self, pointer: i32, shift: i32) -> usize {
        let at = self.op(Opcode::PtrShift);
        self.u8(ShiftMode::Immediate as u8);
        self.i32(pointer);
        self.i32(shift);
        at
    }

    pub fn ptr_shift_by(&mut self, pointer: i32, shift_var: i32, extra: i32, width: u8) -> usize {
        let at = self.op(Opcode::PtrShift);
        self.u8(ShiftMode::FromVariable as u8);
        self.i32(pointer);
        self.i32(shift_var);
        self.i32(extra);
        self.u8(width);
        at
    }

    pub fn field_access(
        &mut self,
        base: i32,
        field_offset: i32,
        size: u8,
        getter: bool,
        result: i32,
    ) -> usize {
        let at = self.op(Opcode::FieldAccess);
        self.i32(base);
        self.i32(field_offset);
        self.u8(size);
        self.u8(getter as u8);
        self.i32(result);
        at
    }

    pub fn cast(&mut self, source: i32, source_size: u8, dest: i32, dest_size: u8) -> usize {
        let at = self.op(Opcode::Cast);
        self.i32(source);
        self.u8(source_size);
        self.i32(dest);
        self.u8(dest_size);
        at
    }

    // ---- Arithmetic ----

    /// Any of the nine binary arithmetic opcodes.
    pub fn binary(&mut self, opcode: Opcode, a: i32, b: i32, result: i32, width: u8) -> usize {
        let at = self.op(opcode);
        self.i32(a);
        self.i32(b);
        self.i32(result);
        self.u8(width);
        at
    }

    pub fn compare(&mut self, a: i32, b: i32, width: u8, result: i32, op: CompareOp) -> usize {
        let at = self.op(Opcode::Compare);
        self.i32(a);
        self.i32(b);
        self.u8(width);
        self.i32(result);
        self.u8(op as u8);
        at
    }

    pub fn negate(&mut self, a: i32, result: i32, width: u8) -> usize {
        let at = self.op(Opcode::Negate);
        self.i32(a);
        self.i32(result);
        self.u8(width);
        at
    }

    pub fn increment(&mut self, target: i32, width: u8) -> usize {
        let at = self.op(Opcode::Increment);
        self.i32(target);
        self.u8(width);
        at
    }

    pub fn decrement(&mut self, target: i32, width: u8) -> usize {
        let at = self.op(Opcode::Decrement);
        self.i32(target);
        self.u8(width);
        at
    }

    // ---- VM commands ----

    pub fn print(&mut self, args: &[CommandArg]) -> usize {
        self.command_with_args(Command::Print, args)
    }

    pub fn sleep(&mut self, arg: CommandArg) -> usize {
        self.command_with_args(Command::Sleep, &[arg])
    }

    /// Invoke the declared function at `function` in the module table.
    pub fn invoke(&mut self, function: i32) -> usize {
        let at = self.op(Opcode::VmCommand);
        self.u8(Command::Invoke as u8);
        self.i32(function);
        at
    }

    fn command_with_args(&mut self, command: Command, args: &[CommandArg]) -> usize {
        let at = self.op(Opcode::VmCommand);
        self.u8(command as u8);
        self.i32(args.len() as i32);
        for arg in args {
            self.i32(arg.offset);
            self.u8(arg.size);
            self.u8(arg.kind);
        }
        at
    }
}
