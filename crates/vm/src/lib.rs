//! Basalt virtual machine: executes module images against one flat memory.
//!
//! The VM is a register-less stack machine with:
//! - A byte buffer split into data, stack and heap regions
//! - Base-pointer frames shared by calls and block scopes
//! - Frame-relative addressing (`base_pointer - offset`) for every slot operand
//! - Host natives bound to abstract functions at load time
//!
//! # Usage
//!
//! ```
//! use basalt_common::{Dest, ImageBuilder, Module, Source};
//! use basalt_vm::{run, VmConfig};
//!
//! let mut b = ImageBuilder::new();
//! b.allocate_stack(&[0; 4]);
//! b.mov(Dest::Direct(0), Source::Immediate(42i32.to_le_bytes().to_vec()));
//! b.exit();
//!
//! let module = Module::from_code(b.finish());
//! let status = run(&module, VmConfig::default()).unwrap();
//! assert_eq!(status.exit_code, 42);
//! ```

mod addressing;
pub mod arith;
pub mod bridge;
mod command;
pub mod config;
mod control;
pub mod error;
mod execute;
mod frame;
pub mod machine;
pub mod memory;
pub mod profile;

pub use bridge::{NativeContext, NativeFn, NativeRegistry, NativeValue, ParamKind};
pub use config::VmConfig;
pub use error::{MemoryError, RuntimeError};
pub use machine::{ExitStatus, Vm};
pub use memory::Memory;
pub use profile::{Profile, ProfileEntry};

use basalt_common::Module;

/// Execute a module with no native bindings, printing to stdout.
///
/// # Errors
///
/// Returns [`RuntimeError`] if linking fails or any instruction halts the
/// module (out-of-bounds access, corrupted stack, division by zero, ...).
pub fn run(module: &Module, config: VmConfig) -> Result<ExitStatus, RuntimeError> {
    let mut vm = Vm::new(module, config)?;
    vm.execute()
}
