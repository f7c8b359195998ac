//! Base-pointer frames.
//!
//! A frame exists while its saved base pointer sits on the stack. Function
//! prologue/epilogue and the block-scope savers share these mechanics:
//!
//! ```text
//! open:    push base_pointer; base_pointer = stack_pointer
//! rewind:  stack_pointer = base_pointer
//! close:   stack_pointer = base_pointer; base_pointer = pop
//! ```

use crate::error::MemoryError;
use crate::memory::Memory;

impl Memory {
    /// Push the current base pointer and rebase onto the stack top.
    pub fn open_frame(&mut self) -> Result<(), MemoryError> {
        let saved = self.base_pointer();
        self.push_i32(saved as i32)?;
        let top = self.stack_pointer();
        self.set_base_pointer(top);
        Ok(())
    }

    /// Discard everything allocated since the frame was opened.
    pub fn rewind_frame(&mut self) {
        let base = self.base_pointer();
        self.set_stack_pointer(base);
    }

    /// Discard the frame's locals and restore the enclosing base pointer.
    pub fn close_frame(&mut self) -> Result<(), MemoryError> {
        self.rewind_frame();
        let saved = self.pop_i32()?;
        let base = self.pointer(saved)?;
        self.set_base_pointer(base);
        Ok(())
    }
}
