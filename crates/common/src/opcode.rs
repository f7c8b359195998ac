//! Opcode definitions for the Basalt instruction set.
//!
//! Opcode bytes are dense: every value in `1..=36` names an instruction,
//! 0x00 is illegal and everything above the last opcode is invalid.

use crate::error::DecodeError;

/// Identifies the operation to perform.
///
/// The `#[repr(u8)]` discriminant is the byte that appears in the image.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Allocation
    /// Reserve stack bytes, initialised from the stream or from a variable.
    AllocateStack = 1,
    /// Bump-allocate heap bytes and store the pointer in a frame slot.
    AllocateHeap = 2,
    /// Retract the stack pointer by a literal byte count.
    DeallocateStack = 3,

    // Calling convention
    /// Push the base pointer and rebase onto the stack pointer.
    FunctionPrologue = 4,
    /// Discard frame locals and restore the saved base pointer.
    FunctionEpilogue = 5,
    /// Push the call-site anchor and jump to an absolute position.
    Call = 6,
    /// Pop the call-site anchor and resume after the matching Call.
    Return = 7,

    // Control flow
    /// Jump to an absolute position.
    Jump = 8,
    /// Jump when every byte of the condition is zero.
    JumpIfFalse = 9,
    /// Stop execution.
    Exit = 10,

    // Data movement
    /// Generalised move with destination and source addressing modes.
    Mov = 11,

    // Arithmetic
    Add = 12,
    Sub = 13,
    Mul = 14,
    Div = 15,
    DivRemainder = 16,
    LeftBitShift = 17,
    RightBitShift = 18,
    BitAnd = 19,
    BitOr = 20,
    /// Relational comparison producing a single boolean byte.
    Compare = 21,
    Negate = 22,
    Increment = 23,
    Decrement = 24,

    // Pointers
    /// Address of a frame variable.
    ToPtrValueType = 25,
    /// Pointer held by a frame variable (one extra dereference).
    ToPtrRefType = 26,
    /// Read through a pointer slot.
    PtrGet = 27,
    /// Write through a pointer slot.
    PtrSet = 28,
    /// Add an offset to the pointer held by a slot.
    PtrShift = 29,
    /// Heap object field read, or field-address materialisation.
    FieldAccess = 30,

    // Block scopes
    /// Open a scoped frame (prologue mechanics, no call).
    AllocateRspSaver = 31,
    /// Rewind the stack pointer to the scoped frame base.
    RestoreRspSaver = 32,
    /// Close a scoped frame (epilogue mechanics).
    DeallocateRspSaver = 33,

    /// Truncating / zero-extending copy between widths.
    Cast = 34,
    /// Data or code section marker.
    Section = 35,
    /// Host-facing command (print, sleep, native invoke).
    VmCommand = 36,
}

/// Number of opcodes. Opcode `n` has the table index `n - 1`.
pub const OPCODE_COUNT: usize = 36;

/// All valid opcodes, in byte order.
pub const ALL_OPCODES: [Opcode; OPCODE_COUNT] = [
    Opcode::AllocateStack,
    Opcode::AllocateHeap,
    Opcode::DeallocateStack,
    Opcode::FunctionPrologue,
    Opcode::FunctionEpilogue,
    Opcode::Call,
    Opcode::Return,
    Opcode::Jump,
    Opcode::JumpIfFalse,
    Opcode::Exit,
    Opcode::Mov,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::Div,
    Opcode::DivRemainder,
    Opcode::LeftBitShift,
    Opcode::RightBitShift,
    Opcode::BitAnd,
    Opcode::BitOr,
    Opcode::Compare,
    Opcode::Negate,
    Opcode::Increment,
    Opcode::Decrement,
    Opcode::ToPtrValueType,
    Opcode::ToPtrRefType,
    Opcode::PtrGet,
    Opcode::PtrSet,
    Opcode::PtrShift,
    Opcode::FieldAccess,
    Opcode::AllocateRspSaver,
    Opcode::RestoreRspSaver,
    Opcode::DeallocateRspSaver,
    Opcode::Cast,
    Opcode::Section,
    Opcode::VmCommand,
];

impl TryFrom<u8> for Opcode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Err(DecodeError::IllegalOpcode),
            1..=36 => Ok(ALL_OPCODES[value as usize - 1]),
            _ => Err(DecodeError::InvalidOpcode(value)),
        }
    }
}

impl Opcode {
    /// Index of this opcode in per-opcode tables of length [`OPCODE_COUNT`].
    pub fn index(self) -> usize {
        self as usize - 1
    }

    /// Returns the listing mnemonic for this opcode.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::AllocateStack => "ALLOCATE_STACK",
            Opcode::AllocateHeap => "ALLOCATE_HEAP",
            Opcode::DeallocateStack => "DEALLOCATE_STACK",
            Opcode::FunctionPrologue => "PROLOGUE",
            Opcode::FunctionEpilogue => "EPILOGUE",
            Opcode::Call => "CALL",
            Opcode::Return => "RETURN",
            Opcode::Jump => "JUMP",
            Opcode::JumpIfFalse => "JUMP_IF_FALSE",
            Opcode::Exit => "EXIT",
            Opcode::Mov => "MOV",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::DivRemainder => "REM",
            Opcode::LeftBitShift => "SHL",
            Opcode::RightBitShift => "SHR",
            Opcode::BitAnd => "AND",
            Opcode::BitOr => "OR",
            Opcode::Compare => "CMP",
            Opcode::Negate => "NEG",
            Opcode::Increment => "INC",
            Opcode::Decrement => "DEC",
            Opcode::ToPtrValueType => "TO_PTR_VALUE",
            Opcode::ToPtrRefType => "TO_PTR_REF",
            Opcode::PtrGet => "PTR_GET",
            Opcode::PtrSet => "PTR_SET",
            Opcode::PtrShift => "PTR_SHIFT",
            Opcode::FieldAccess => "FIELD",
            Opcode::AllocateRspSaver => "SCOPE_OPEN",
            Opcode::RestoreRspSaver => "SCOPE_RESTORE",
            Opcode::DeallocateRspSaver => "SCOPE_CLOSE",
            Opcode::Cast => "CAST",
            Opcode::Section => "SECTION",
            Opcode::VmCommand => "VM_COMMAND",
        }
    }
}
