//! Basalt common types and module image encoding.
//!
//! This crate provides the foundational data structures shared by the
//! engine and its tooling:
//!
//! - [`Opcode`]: the 36 instruction opcodes
//! - [`operand`]: operand tags (widths, addressing modes, commands)
//! - [`Cursor`]: bounds-checked little-endian reading over an image
//! - [`Module`]: code plus declared type/function tables, and its container format
//! - [`ImageBuilder`]: emits encoded instructions
//! - [`DecodeError`]: errors from decoding byte streams

pub mod builder;
pub mod cursor;
pub mod error;
pub mod module;
pub mod opcode;
pub mod operand;

// Re-export commonly used types at the crate root.
pub use builder::{CommandArg, Dest, ImageBuilder, Source};
pub use cursor::Cursor;
pub use error::DecodeError;
pub use module::{FieldDecl, FunctionDecl, Module, TypeDecl};
pub use opcode::{Opcode, ALL_OPCODES, OPCODE_COUNT};
pub use operand::{CompareOp, ValueKind, Width};
