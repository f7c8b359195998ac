//! Decode errors for Basalt module images.

use thiserror::Error;

/// Errors that occur while reading bytes out of a module image or a
/// compiled-module container.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The image ended before `needed` more bytes could be read at `at`.
    #[error("unexpected end of image: needed {needed} bytes at offset {at}")]
    UnexpectedEnd { at: usize, needed: usize },

    /// A length or count field held a negative value.
    #[error("negative length {value} at offset {at}")]
    NegativeLength { at: usize, value: i32 },

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 in string at offset {at}")]
    InvalidUtf8 { at: usize },

    /// Bytes remained after the code blob of a container.
    #[error("{count} trailing bytes after module code")]
    TrailingBytes { count: usize },

    /// Opcode byte 0x00 is never a valid instruction.
    #[error("illegal opcode 0x00")]
    IllegalOpcode,

    /// Opcode byte outside the instruction set.
    #[error("invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),
}
