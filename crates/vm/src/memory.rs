//! Flat addressable memory with data, stack and heap regions.
//!
//! ```text
//! [0, D)          static data (copied from the data section)
//! [D, D + S)      stack, bump-allocated through `stack_pointer`
//! [D + S, ...)    heap, bump-allocated through `heap_pointer`, never reclaimed
//! ```
//!
//! Regions are a convention; every access is only checked against the
//! full buffer. The heap grows the buffer on demand.

use crate::error::MemoryError;

/// Width of saved base pointers, call-site anchors and stored pointers.
pub const POINTER_SIZE: usize = 4;

/// VM memory and its three pointers.
#[derive(Debug, Clone)]
pub struct Memory {
    bytes: Vec<u8>,
    data_size: usize,
    stack_size: usize,
    base_pointer: usize,
    stack_pointer: usize,
    heap_pointer: usize,
}

/// Highest address a 4-byte stored pointer can hold.
pub const MAX_ADDRESS: usize = i32::MAX as usize;

impl Memory {
    /// Create memory with an empty data region, a `stack_size`-byte stack,
    /// and `heap_reserve` zeroed heap bytes ready for use.
    pub fn new(stack_size: usize, heap_reserve: usize) -> Self {
        Self {
            bytes: vec![0; stack_size + heap_reserve],
            data_size: 0,
            stack_size,
            base_pointer: 0,
            stack_pointer: 0,
            heap_pointer: stack_size,
        }
    }

    /// Place `data` at `[0, D)` and shift every region up by `D`.
    ///
    /// Only meaningful before anything has been allocated.
    pub fn map_data(&mut self, data: &[u8]) {
        let shift = data.len();
        let mut bytes = Vec::with_capacity(shift + self.bytes.len());
        bytes.extend_from_slice(data);
        bytes.extend_from_slice(&self.bytes);
        self.bytes = bytes;
        self.data_size += shift;
        self.base_pointer += shift;
        self.stack_pointer += shift;
        self.heap_pointer += shift;
    }

    /// Size of the static data region (`D`).
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// First byte of the stack region.
    pub fn stack_base(&self) -> usize {
        self.data_size
    }

    /// One past the last byte of the stack region (`D + S`).
    pub fn stack_limit(&self) -> usize {
        self.data_size + self.stack_size
    }

    /// Total buffer length.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the buffer has no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn base_pointer(&self) -> usize {
        self.base_pointer
    }

    pub fn set_base_pointer(&mut self, value: usize) {
        self.base_pointer = value;
    }

    pub fn stack_pointer(&self) -> usize {
        self.stack_pointer
    }

    pub fn set_stack_pointer(&mut self, value: usize) {
        self.stack_pointer = value;
    }

    pub fn heap_pointer(&self) -> usize {
        self.heap_pointer
    }

    // ---- Allocation ----

    /// Reserve `count` stack bytes, returning their address.
    pub fn allocate_stack(&mut self, count: usize) -> Result<usize, MemoryError> {
        let pointer = self.stack_pointer;
        let limit = self.stack_limit();
        match pointer.checked_add(count) {
            Some(end) if end < limit => {
                self.stack_pointer = end;
                Ok(pointer)
            }
            _ => Err(MemoryError::StackOverflow {
                requested: count,
                pointer,
                limit,
            }),
        }
    }

    /// Release the top `count` stack bytes.
    pub fn deallocate_stack(&mut self, count: usize) -> Result<(), MemoryError> {
        let base = self.stack_base();
        match self.stack_pointer.checked_sub(count) {
            Some(pointer) if pointer >= base => {
                self.stack_pointer = pointer;
                Ok(())
            }
            _ => Err(MemoryError::StackUnderflow {
                requested: count,
                pointer: self.stack_pointer,
                base,
            }),
        }
    }

    /// Reserve `count` heap bytes, returning their address. Nothing is
    /// reclaimed; the buffer grows when the heap outruns it.
    ///
    /// Objects must end within [`MAX_ADDRESS`] so a stored pointer can
    /// reach every byte of them.
    pub fn allocate_heap(&mut self, count: usize) -> Result<usize, MemoryError> {
        let pointer = self.heap_pointer;
        let end = pointer
            .checked_add(count)
            .filter(|&end| end <= MAX_ADDRESS)
            .ok_or(MemoryError::OutOfBounds {
                address: pointer as i64,
                size: count,
                len: self.bytes.len(),
            })?;

        if end > self.bytes.len() {
            self.bytes
                .try_reserve(end - self.bytes.len())
                .map_err(|_| MemoryError::HeapExhausted {
                    requested: count,
                    pointer,
                })?;
            self.bytes.resize(end, 0);
        }
        self.heap_pointer = end;
        Ok(pointer)
    }

    // ---- Raw access ----

    fn range(&self, address: usize, size: usize) -> Result<std::ops::Range<usize>, MemoryError> {
        address
            .checked_add(size)
            .filter(|&end| end <= self.bytes.len())
            .map(|end| address..end)
            .ok_or(MemoryError::OutOfBounds {
                address: address as i64,
                size,
                len: self.bytes.len(),
            })
    }

    pub fn read(&self, address: usize, size: usize) -> Result<&[u8], MemoryError> {
        let range = self.range(address, size)?;
        Ok(&self.bytes[range])
    }

    pub fn write(&mut self, address: usize, bytes: &[u8]) -> Result<(), MemoryError> {
        let range = self.range(address, bytes.len())?;
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Copy `size` bytes from `src` to `dst`; the ranges may overlap.
    pub fn copy(&mut self, src: usize, dst: usize, size: usize) -> Result<(), MemoryError> {
        let from = self.range(src, size)?;
        self.range(dst, size)?;
        self.bytes.copy_within(from, dst);
        Ok(())
    }

    /// Zero `size` bytes starting at `address`.
    pub fn fill_zero(&mut self, address: usize, size: usize) -> Result<(), MemoryError> {
        let range = self.range(address, size)?;
        self.bytes[range].fill(0);
        Ok(())
    }

    // ---- Typed access ----

    fn read_array<const N: usize>(&self, address: usize) -> Result<[u8; N], MemoryError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read(address, N)?);
        Ok(out)
    }

    pub fn read_u8(&self, address: usize) -> Result<u8, MemoryError> {
        Ok(self.read_array::<1>(address)?[0])
    }

    pub fn read_i16(&self, address: usize) -> Result<i16, MemoryError> {
        Ok(i16::from_le_bytes(self.read_array(address)?))
    }

    pub fn read_i32(&self, address: usize) -> Result<i32, MemoryError> {
        Ok(i32::from_le_bytes(self.read_array(address)?))
    }

    pub fn read_i64(&self, address: usize) -> Result<i64, MemoryError> {
        Ok(i64::from_le_bytes(self.read_array(address)?))
    }

    pub fn write_u8(&mut self, address: usize, value: u8) -> Result<(), MemoryError> {
        self.write(address, &[value])
    }

    pub fn write_i16(&mut self, address: usize, value: i16) -> Result<(), MemoryError> {
        self.write(address, &value.to_le_bytes())
    }

    pub fn write_i32(&mut self, address: usize, value: i32) -> Result<(), MemoryError> {
        self.write(address, &value.to_le_bytes())
    }

    pub fn write_i64(&mut self, address: usize, value: i64) -> Result<(), MemoryError> {
        self.write(address, &value.to_le_bytes())
    }

    // ---- Pointers ----

    /// Interpret a stored 4-byte pointer value as an address.
    pub fn pointer(&self, raw: i32) -> Result<usize, MemoryError> {
        usize::try_from(raw).map_err(|_| MemoryError::OutOfBounds {
            address: raw as i64,
            size: 0,
            len: self.bytes.len(),
        })
    }

    /// Read the pointer stored at `address` and return the address it names.
    pub fn read_pointer(&self, address: usize) -> Result<usize, MemoryError> {
        let raw = self.read_i32(address)?;
        self.pointer(raw)
    }

    /// Store `target` as a 4-byte pointer at `address`.
    pub fn write_pointer(&mut self, address: usize, target: usize) -> Result<(), MemoryError> {
        let raw = i32::try_from(target).map_err(|_| MemoryError::OutOfBounds {
            address: target as i64,
            size: POINTER_SIZE,
            len: self.bytes.len(),
        })?;
        self.write_i32(address, raw)
    }

    /// Translate a frame-relative offset: `base_pointer - offset`.
    pub fn to_absolute(&self, offset: i32) -> Result<usize, MemoryError> {
        let address = self.base_pointer as i64 - offset as i64;
        usize::try_from(address).map_err(|_| MemoryError::OutOfBounds {
            address,
            size: 0,
            len: self.bytes.len(),
        })
    }

    // ---- Stack convenience ----

    /// Allocate and write `bytes` at the stack top.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), MemoryError> {
        let address = self.allocate_stack(bytes.len())?;
        self.write(address, bytes)
    }

    /// Release the top `size` stack bytes and return them.
    pub fn pop(&mut self, size: usize) -> Result<&[u8], MemoryError> {
        self.deallocate_stack(size)?;
        self.read(self.stack_pointer, size)
    }

    pub fn push_i32(&mut self, value: i32) -> Result<(), MemoryError> {
        self.push(&value.to_le_bytes())
    }

    pub fn pop_i32(&mut self) -> Result<i32, MemoryError> {
        self.deallocate_stack(POINTER_SIZE)?;
        self.read_i32(self.stack_pointer)
    }
}
