//! Runtime errors for the Basalt VM.
//!
//! Every condition here is fatal to the running module. Errors raised while
//! executing an instruction carry the position of its opcode byte (`at`).

use basalt_common::DecodeError;
use thiserror::Error;

/// Memory subsystem failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Access outside `[0, memory length)`.
    #[error("access of {size} bytes at address {address} is outside memory of {len} bytes")]
    OutOfBounds { address: i64, size: usize, len: usize },

    /// Stack allocation would reach the end of the stack region.
    #[error("stack overflow: allocating {requested} bytes at {pointer} reaches the stack limit {limit}")]
    StackOverflow {
        requested: usize,
        pointer: usize,
        limit: usize,
    },

    /// Stack release would move below the start of the stack region.
    #[error("stack underflow: releasing {requested} bytes at {pointer} passes the stack base {base}")]
    StackUnderflow {
        requested: usize,
        pointer: usize,
        base: usize,
    },

    /// The host could not supply the bytes for a heap allocation.
    #[error("heap exhausted: cannot allocate {requested} bytes at {pointer}")]
    HeapExhausted { requested: usize, pointer: usize },
}

/// Errors that halt execution of a module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Opcode byte 0 or a byte past the instruction table.
    #[error("invalid opcode {byte} at position {at}")]
    InvalidOpcode { at: usize, byte: u8 },

    /// An operand ran past the end of the image.
    #[error("truncated instruction at position {at}: {source}")]
    Truncated {
        at: usize,
        #[source]
        source: DecodeError,
    },

    /// Out-of-bounds access, stack overflow or underflow.
    #[error("memory error at position {at}: {source}")]
    Memory {
        at: usize,
        #[source]
        source: MemoryError,
    },

    /// The popped call-site anchor does not point at a Call opcode.
    #[error("stack corrupted, unbalanced push/pop: Return at {at} popped anchor {anchor} holding byte {found}, not Call")]
    CorruptedStack { at: usize, anchor: i32, found: u8 },

    /// The popped call-site anchor lies outside the image.
    #[error("stack corrupted, unbalanced push/pop: Return at {at} popped anchor {anchor} outside the image")]
    AnchorOutsideImage { at: usize, anchor: i32 },

    /// Jump or Call target outside `[0, image length]`.
    #[error("control transfer at {at} targets invalid position {target}")]
    InvalidTarget { at: usize, target: i32 },

    #[error("division by zero at position {at}")]
    DivisionByZero { at: usize },

    /// Operand width other than 1, 2, 4 or 8 bytes.
    #[error("unsupported operand width {width} at position {at}")]
    UnsupportedWidth { at: usize, width: u8 },

    #[error("invalid compare operator {op} at position {at}")]
    InvalidCompareOperator { at: usize, op: u8 },

    #[error("invalid mov destination mode {mode} at position {at}")]
    InvalidDestinationMode { at: usize, mode: u8 },

    #[error("invalid mov source mode {mode} at position {at}")]
    InvalidSourceMode { at: usize, mode: u8 },

    #[error("invalid stack allocation mode {mode} at position {at}")]
    InvalidStackAllocationMode { at: usize, mode: u8 },

    #[error("invalid heap allocation mode {mode} at position {at}")]
    InvalidHeapAllocationMode { at: usize, mode: u8 },

    #[error("invalid pointer shift mode {mode} at position {at}")]
    InvalidShiftMode { at: usize, mode: u8 },

    /// A size, count or length operand was negative.
    #[error("negative operand {value} at position {at}")]
    NegativeOperand { at: usize, value: i64 },

    #[error("invalid section type {kind} at position {at}")]
    InvalidSectionKind { at: usize, kind: u8 },

    /// A data section appeared anywhere but the start of the image.
    #[error("data section at position {at} must be the first instruction")]
    MisplacedDataSection { at: usize },

    /// The data section was not followed by the code section marker.
    #[error("invalid data section at {at}: expected Section opcode and Code (1) type, found {opcode} {kind}")]
    UnterminatedDataSection { at: usize, opcode: u8, kind: u8 },

    #[error("invalid VM command {command} at position {at}")]
    InvalidCommand { at: usize, command: u8 },

    /// Print or Sleep argument with an unknown or unusable value kind.
    #[error("invalid argument kind {kind} for VM command at position {at}")]
    InvalidValueKind { at: usize, kind: u8 },

    /// Sleep expects exactly one argument.
    #[error("VM command at position {at} expects {expected} arguments, got {got}")]
    ArgumentCount { at: usize, expected: usize, got: usize },

    /// Writing to the console sink failed.
    #[error("output error at position {at}: {message}")]
    Output { at: usize, message: String },

    /// Invoke referenced a function index outside the module table.
    #[error("unknown function {index} at position {at}")]
    UnknownFunction { at: usize, index: i32 },

    /// Invoke referenced a function with a code body.
    #[error("function {index} at position {at} has a code body at {position}; reach it with Call")]
    NotAbstract { at: usize, index: i32, position: u32 },

    /// No host implementation for an abstract function.
    #[error("failed to find implementation for abstract function '{owner}.{name}'")]
    UnresolvedFunction { owner: String, name: String },

    /// An abstract function declares a parameter type that cannot be marshalled.
    #[error("abstract function '{function}' has unsupported argument type '{type_name}'")]
    UnsupportedArgument { function: String, type_name: String },

    /// A declaration references a type index missing from the module.
    #[error("function '{function}' references unknown type {index}")]
    UnknownType { function: String, index: u32 },

    /// A native implementation reported failure.
    #[error("native function '{function}' failed at position {at}: {message}")]
    Native {
        at: usize,
        function: String,
        message: String,
    },

    /// The configured instruction ceiling was reached.
    #[error("instruction limit {limit} exceeded at position {at}; the module may not terminate")]
    InstructionLimitExceeded { at: usize, limit: u64 },
}

/// Attach the failing instruction position to lower-level errors.
pub(crate) trait AtPosition<T> {
    fn at(self, at: usize) -> Result<T, RuntimeError>;
}

impl<T> AtPosition<T> for Result<T, MemoryError> {
    fn at(self, at: usize) -> Result<T, RuntimeError> {
        self.map_err(|source| RuntimeError::Memory { at, source })
    }
}

impl<T> AtPosition<T> for Result<T, DecodeError> {
    fn at(self, at: usize) -> Result<T, RuntimeError> {
        self.map_err(|source| RuntimeError::Truncated { at, source })
    }
}
