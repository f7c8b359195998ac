//! Integer arithmetic, comparison and in-place increment at four widths.
//!
//! A width tag of 1, 2, 4 or 8 bytes selects `i8`, `i16`, `i32` or `i64`.
//! Every operation wraps exactly as the native type of that width does;
//! nothing is promoted to a wider type before the result is stored.

use std::io::Write;

use basalt_common::{CompareOp, Opcode, Width};

use crate::error::{AtPosition, MemoryError, RuntimeError};
use crate::machine::Vm;
use crate::memory::Memory;

/// The nine binary arithmetic opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    And,
    Or,
}

impl BinaryOp {
    pub fn from_opcode(opcode: Opcode) -> Option<Self> {
        Some(match opcode {
            Opcode::Add => BinaryOp::Add,
            Opcode::Sub => BinaryOp::Sub,
            Opcode::Mul => BinaryOp::Mul,
            Opcode::Div => BinaryOp::Div,
            Opcode::DivRemainder => BinaryOp::Rem,
            Opcode::LeftBitShift => BinaryOp::Shl,
            Opcode::RightBitShift => BinaryOp::Shr,
            Opcode::BitAnd => BinaryOp::And,
            Opcode::BitOr => BinaryOp::Or,
            _ => return None,
        })
    }
}

/// Division or remainder with a zero divisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DivisionByZero;

/// Fixed-width signed integer behaviour the arithmetic opcodes need.
pub trait Word: Copy + Ord + Sized {
    const WIDTH: Width;

    fn from_le(bytes: &[u8]) -> Self;
    fn write_le(self, out: &mut [u8]);
    fn to_i64(self) -> i64;
    fn truncate(value: i64) -> Self;

    fn binary(op: BinaryOp, a: Self, b: Self) -> Result<Self, DivisionByZero>;
    fn wrapping_negate(self) -> Self;
}

macro_rules! impl_word {
    ($ty:ty, $width:expr) => {
        impl Word for $ty {
            const WIDTH: Width = $width;

            fn from_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_le_bytes(raw)
            }

            fn write_le(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }

            fn to_i64(self) -> i64 {
                self as i64
            }

            fn truncate(value: i64) -> Self {
                value as $ty
            }

            fn binary(op: BinaryOp, a: Self, b: Self) -> Result<Self, DivisionByZero> {
                Ok(match op {
                    BinaryOp::Add => a.wrapping_add(b),
                    BinaryOp::Sub => a.wrapping_sub(b),
                    BinaryOp::Mul => a.wrapping_mul(b),
                    BinaryOp::Div if b == 0 => return Err(DivisionByZero),
                    BinaryOp::Rem if b == 0 => return Err(DivisionByZero),
                    BinaryOp::Div => a.wrapping_div(b),
                    BinaryOp::Rem => a.wrapping_rem(b),
                    // Shift counts wrap modulo the bit width.
                    BinaryOp::Shl => a.wrapping_shl(b as u32),
                    BinaryOp::Shr => a.wrapping_shr(b as u32),
                    BinaryOp::And => a & b,
                    BinaryOp::Or => a | b,
                })
            }

            fn wrapping_negate(self) -> Self {
                self.wrapping_neg()
            }
        }
    };
}

impl_word!(i8, Width::Byte);
impl_word!(i16, Width::Short);
impl_word!(i32, Width::Int);
impl_word!(i64, Width::Long);

/// Compare two values with a relational operator.
pub fn compare<T: Word>(op: CompareOp, a: T, b: T) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Neq => a != b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
    }
}

/// Run `$body` with `$ty` bound to the integer type of `$width`.
macro_rules! with_width {
    ($width:expr, $ty:ident => $body:expr) => {
        match $width {
            Width::Byte => {
                type $ty = i8;
                $body
            }
            Width::Short => {
                type $ty = i16;
                $body
            }
            Width::Int => {
                type $ty = i32;
                $body
            }
            Width::Long => {
                type $ty = i64;
                $body
            }
        }
    };
}

impl Memory {
    pub fn read_word<T: Word>(&self, address: usize) -> Result<T, MemoryError> {
        Ok(T::from_le(self.read(address, T::WIDTH.bytes())?))
    }

    pub fn write_word<T: Word>(&mut self, address: usize, value: T) -> Result<(), MemoryError> {
        let mut raw = [0u8; 8];
        let out = &mut raw[..T::WIDTH.bytes()];
        value.write_le(out);
        self.write(address, out)
    }

    /// Read a signed integer of `width` bytes, sign-extended to 64 bits.
    pub fn read_int(&self, address: usize, width: Width) -> Result<i64, MemoryError> {
        with_width!(width, T => Ok(self.read_word::<T>(address)?.to_i64()))
    }
}

impl<'a, W: Write> Vm<'a, W> {
    pub(crate) fn exec_binary(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        let a = self.next_address()?;
        let b = self.next_address()?;
        let result = self.next_address()?;
        let width = self.next_width()?;
        let op = BinaryOp::from_opcode(opcode).ok_or(RuntimeError::InvalidOpcode {
            at: self.current,
            byte: opcode as u8,
        })?;
        with_width!(width, T => self.binary_at::<T>(op, a, b, result))
    }

    fn binary_at<T: Word>(
        &mut self,
        op: BinaryOp,
        a: usize,
        b: usize,
        result: usize,
    ) -> Result<(), RuntimeError> {
        let at = self.current;
        let lhs = self.memory.read_word::<T>(a).at(at)?;
        let rhs = self.memory.read_word::<T>(b).at(at)?;
        let value =
            T::binary(op, lhs, rhs).map_err(|DivisionByZero| RuntimeError::DivisionByZero { at })?;
        self.memory.write_word(result, value).at(at)
    }

    /// Writes a single byte, 1 for true and 0 for false.
    pub(crate) fn exec_compare(&mut self) -> Result<(), RuntimeError> {
        let at = self.current;
        let a = self.next_address()?;
        let b = self.next_address()?;
        let width = self.next_width()?;
        let result = self.next_address()?;
        let op_byte = self.next_u8()?;
        let op = CompareOp::try_from(op_byte)
            .map_err(|op| RuntimeError::InvalidCompareOperator { at, op })?;

        let outcome = with_width!(width, T => {
            let lhs = self.memory.read_word::<T>(a).at(at)?;
            let rhs = self.memory.read_word::<T>(b).at(at)?;
            compare(op, lhs, rhs)
        });
        self.memory.write_u8(result, outcome as u8).at(at)
    }

    pub(crate) fn exec_negate(&mut self) -> Result<(), RuntimeError> {
        let at = self.current;
        let a = self.next_address()?;
        let result = self.next_address()?;
        let width = self.next_width()?;
        with_width!(width, T => {
            let value = self.memory.read_word::<T>(a).at(at)?;
            self.memory.write_word(result, value.wrapping_negate()).at(at)
        })
    }

    /// Increment (`delta = 1`) or decrement (`delta = -1`) a slot in place.
    pub(crate) fn exec_step_in_place(&mut self, delta: i64) -> Result<(), RuntimeError> {
        let at = self.current;
        let target = self.next_address()?;
        let width = self.next_width()?;
        with_width!(width, T => {
            let value = self.memory.read_word::<T>(target).at(at)?;
            let stepped = T::truncate(value.to_i64().wrapping_add(delta));
            self.memory.write_word(target, stepped).at(at)
        })
    }
}
