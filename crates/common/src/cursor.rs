//! Bounds-checked reading over a byte slice.
//!
//! Every instruction handler and the container decoder read operands
//! through a [`Cursor`]. Multi-byte values are little-endian.

use crate::error::DecodeError;

/// A read position over an immutable byte slice.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    /// Create a cursor at offset 0.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    /// Current read offset.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move the read offset. Positions past the end are allowed and simply
    /// leave the cursor exhausted.
    pub fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    /// Move the read offset to the end of the slice.
    pub fn finish(&mut self) {
        self.position = self.bytes.len();
    }

    /// True once every byte has been consumed.
    pub fn is_at_end(&self) -> bool {
        self.position >= self.bytes.len()
    }

    /// Length of the underlying slice.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the underlying slice is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.position)
    }

    /// Byte at an arbitrary offset, without moving the cursor.
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(offset).copied()
    }

    /// Read `count` bytes and advance.
    pub fn next_bytes(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .position
            .checked_add(count)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(DecodeError::UnexpectedEnd {
                at: self.position,
                needed: count,
            })?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    /// Read a fixed-size array and advance.
    pub fn next_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.next_bytes(N)?);
        Ok(out)
    }

    pub fn next_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.next_array::<1>()?[0])
    }

    pub fn next_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.next_u8()? != 0)
    }

    pub fn next_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.next_array()?))
    }

    pub fn next_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.next_array()?))
    }

    /// Read a 4-byte length or count that must not be negative.
    pub fn next_len(&mut self) -> Result<usize, DecodeError> {
        let at = self.position;
        let value = self.next_i32()?;
        usize::try_from(value).map_err(|_| DecodeError::NegativeLength { at, value })
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn next_string(&mut self) -> Result<String, DecodeError> {
        let len = self.next_len()?;
        let at = self.position;
        let bytes = self.next_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8 { at })
    }
}
