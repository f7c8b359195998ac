//! VM state: the image cursor, memory, linked function table and counters.

use std::io::{self, Stdout, Write};
use std::time::Duration;

use basalt_common::{Cursor, Module, Width};
use tracing::debug;

use crate::bridge::{FunctionTable, NativeRegistry};
use crate::config::VmConfig;
use crate::error::{AtPosition, RuntimeError};
use crate::memory::Memory;
use crate::profile::Profile;

/// Outcome of a module that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// 32-bit value at the first stack slot (address `D`).
    pub exit_code: i32,
    /// Instructions dispatched, including the terminating one.
    pub instructions: u64,
    /// Wall time spent in [`Vm::execute`].
    pub elapsed: Duration,
}

/// The Basalt virtual machine.
///
/// Owns its memory exclusively and borrows the image of the module it was
/// loaded from. Console output from `Print` goes to `W`.
pub struct Vm<'a, W: Write = Stdout> {
    /// Instruction pointer over the module image.
    pub(crate) code: Cursor<'a>,
    pub(crate) memory: Memory,
    pub(crate) functions: FunctionTable,
    pub(crate) config: VmConfig,
    pub(crate) output: W,
    /// Opcode position of the instruction being executed.
    pub(crate) current: usize,
    pub(crate) executed: u64,
    pub(crate) profile: Option<Profile>,
}

impl<'a> Vm<'a, Stdout> {
    /// Load a module with no native bindings, printing to stdout.
    pub fn new(module: &'a Module, config: VmConfig) -> Result<Self, RuntimeError> {
        Vm::load(module, &NativeRegistry::new(), config, io::stdout())
    }
}

impl<'a, W: Write> Vm<'a, W> {
    /// Link `module` against `natives` and prepare a fresh memory.
    ///
    /// Linking is the only step that consults the registry: every abstract
    /// function must resolve here or loading fails.
    pub fn load(
        module: &'a Module,
        natives: &NativeRegistry,
        config: VmConfig,
        output: W,
    ) -> Result<Self, RuntimeError> {
        let functions = FunctionTable::link(module, natives)?;
        let memory = Memory::new(config.stack_size, config.heap_size);
        debug!(
            image_len = module.code.len(),
            stack_size = config.stack_size,
            heap_size = config.heap_size,
            instruction_limit = config.instruction_limit,
            "loaded module"
        );
        Ok(Self {
            code: Cursor::new(&module.code),
            memory,
            functions,
            profile: config.profile.then(Profile::default),
            config,
            output,
            current: 0,
            executed: 0,
        })
    }

    /// Position of the next instruction to execute.
    pub fn position(&self) -> usize {
        self.code.position()
    }

    /// True once the instruction pointer has left the image.
    pub fn is_finished(&self) -> bool {
        self.code.is_at_end()
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Instructions dispatched so far.
    pub fn instructions(&self) -> u64 {
        self.executed
    }

    /// Per-opcode counters, when profiling is enabled.
    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Exit code convention: the 32-bit value at the first stack slot.
    pub fn exit_code(&self) -> Result<i32, RuntimeError> {
        self.memory
            .read_i32(self.memory.stack_base())
            .at(self.code.position())
    }

    // ---- Operand decoding ----

    pub(crate) fn next_u8(&mut self) -> Result<u8, RuntimeError> {
        self.code.next_u8().at(self.current)
    }

    pub(crate) fn next_i32(&mut self) -> Result<i32, RuntimeError> {
        self.code.next_i32().at(self.current)
    }

    pub(crate) fn next_bytes(&mut self, count: usize) -> Result<&'a [u8], RuntimeError> {
        self.code.next_bytes(count).at(self.current)
    }

    /// Read a 4-byte size, count or length that must not be negative.
    pub(crate) fn next_count(&mut self) -> Result<usize, RuntimeError> {
        let value = self.next_i32()?;
        usize::try_from(value).map_err(|_| RuntimeError::NegativeOperand {
            at: self.current,
            value: value as i64,
        })
    }

    /// Read a frame-relative offset and translate it to an absolute address.
    pub(crate) fn next_address(&mut self) -> Result<usize, RuntimeError> {
        let offset = self.next_i32()?;
        self.memory.to_absolute(offset).at(self.current)
    }

    /// Read an integer width tag (1, 2, 4 or 8).
    pub(crate) fn next_width(&mut self) -> Result<Width, RuntimeError> {
        let byte = self.next_u8()?;
        Width::try_from(byte).map_err(|width| RuntimeError::UnsupportedWidth {
            at: self.current,
            width,
        })
    }
}
