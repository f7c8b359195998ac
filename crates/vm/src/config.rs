//! Engine configuration.

use serde::Deserialize;

/// Default stack region size in bytes.
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Default initial heap reservation in bytes.
pub const DEFAULT_HEAP_SIZE: usize = 64 * 1024;

/// Default ceiling on executed instructions.
pub const DEFAULT_INSTRUCTION_LIMIT: u64 = 50_000_000;

/// Fixed per-instance engine parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmConfig {
    /// Bytes in the stack region.
    pub stack_size: usize,
    /// Heap bytes reserved up front. The heap grows past this on demand.
    pub heap_size: usize,
    /// Executing more instructions than this is fatal.
    pub instruction_limit: u64,
    /// Collect per-opcode counts and timings.
    pub profile: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            heap_size: DEFAULT_HEAP_SIZE,
            instruction_limit: DEFAULT_INSTRUCTION_LIMIT,
            profile: false,
        }
    }
}
