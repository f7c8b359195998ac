//! Per-opcode execution counters.
//!
//! One slot per opcode, so the table never grows with program length.

use std::fmt;
use std::time::Duration;

use basalt_common::{Opcode, ALL_OPCODES, OPCODE_COUNT};

/// Execution count and accumulated wall time per opcode.
#[derive(Debug, Clone)]
pub struct Profile {
    counts: [u64; OPCODE_COUNT],
    elapsed: [Duration; OPCODE_COUNT],
}

/// One row of a profile report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileEntry {
    pub opcode: Opcode,
    pub count: u64,
    pub elapsed: Duration,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            counts: [0; OPCODE_COUNT],
            elapsed: [Duration::ZERO; OPCODE_COUNT],
        }
    }
}

impl Profile {
    pub fn record(&mut self, opcode: Opcode, elapsed: Duration) {
        let i = opcode.index();
        self.counts[i] += 1;
        self.elapsed[i] += elapsed;
    }

    pub fn count(&self, opcode: Opcode) -> u64 {
        self.counts[opcode.index()]
    }

    /// Opcodes that ran at least once, slowest total first.
    pub fn entries(&self) -> Vec<ProfileEntry> {
        let mut entries: Vec<ProfileEntry> = ALL_OPCODES
            .iter()
            .map(|&opcode| ProfileEntry {
                opcode,
                count: self.counts[opcode.index()],
                elapsed: self.elapsed[opcode.index()],
            })
            .filter(|e| e.count > 0)
            .collect();
        entries.sort_by(|a, b| b.elapsed.cmp(&a.elapsed).then(b.count.cmp(&a.count)));
        entries
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<18} {:>12} {:>14}", "opcode", "count", "total")?;
        for entry in self.entries() {
            writeln!(
                f,
                "{:<18} {:>12} {:>14?}",
                entry.opcode.mnemonic(),
                entry.count,
                entry.elapsed
            )?;
        }
        Ok(())
    }
}
