//! `VMCommand` sub-commands: console output, sleeping and native invocation.

use std::io::Write;
use std::thread;
use std::time::Duration;

use basalt_common::operand::Command;
use basalt_common::ValueKind;
use tracing::debug;

use crate::bridge::{self, Binding, NativeContext};
use crate::error::{AtPosition, RuntimeError};
use crate::machine::Vm;

/// One decoded `(slot, size, kind)` argument.
#[derive(Debug, Clone, Copy)]
struct Argument {
    address: usize,
    size: usize,
    kind: u8,
}

/// Stack bytes each printable kind occupies.
fn slot_size(kind: ValueKind) -> usize {
    match kind {
        ValueKind::Bool | ValueKind::Byte => 1,
        ValueKind::Short => 2,
        ValueKind::Int | ValueKind::Pointer | ValueKind::Str => 4,
        ValueKind::Long => 8,
    }
}

impl<'a, W: Write> Vm<'a, W> {
    pub(crate) fn exec_command(&mut self) -> Result<(), RuntimeError> {
        let at = self.current;
        let byte = self.next_u8()?;
        match Command::try_from(byte) {
            Ok(Command::Print) => {
                let args = self.next_arguments()?;
                self.print(&args)
            }
            Ok(Command::Sleep) => {
                let args = self.next_arguments()?;
                self.sleep(&args)
            }
            Ok(Command::Invoke) => {
                let index = self.next_i32()?;
                self.invoke(index)
            }
            Err(command) => Err(RuntimeError::InvalidCommand { at, command }),
        }
    }

    fn next_arguments(&mut self) -> Result<Vec<Argument>, RuntimeError> {
        let count = self.next_count()?;
        let mut args = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            args.push(Argument {
                address: self.next_address()?,
                size: self.next_u8()? as usize,
                kind: self.next_u8()?,
            });
        }
        Ok(args)
    }

    /// Resolve an argument's kind and check its declared size matches.
    fn argument_kind(&self, arg: &Argument) -> Result<ValueKind, RuntimeError> {
        let at = self.current;
        let kind = ValueKind::try_from(arg.kind)
            .map_err(|kind| RuntimeError::InvalidValueKind { at, kind })?;
        if arg.size != slot_size(kind) {
            return Err(RuntimeError::UnsupportedWidth {
                at,
                width: arg.size as u8,
            });
        }
        Ok(kind)
    }

    fn print(&mut self, args: &[Argument]) -> Result<(), RuntimeError> {
        let at = self.current;
        let mut line = String::new();
        for arg in args {
            let kind = self.argument_kind(arg)?;
            let memory = &self.memory;
            let address = arg.address;
            let text = match kind {
                ValueKind::Bool => (memory.read_u8(address).at(at)? != 0).to_string(),
                ValueKind::Byte => memory.read_u8(address).at(at)?.to_string(),
                ValueKind::Short => memory.read_i16(address).at(at)?.to_string(),
                ValueKind::Int => memory.read_i32(address).at(at)?.to_string(),
                ValueKind::Long => memory.read_i64(address).at(at)?.to_string(),
                ValueKind::Pointer => format!("<0x{:X}>", memory.read_i32(address).at(at)?),
                ValueKind::Str => {
                    let pointee = memory.read_pointer(address).at(at)?;
                    bridge::read_string(memory, pointee).at(at)?
                }
            };
            line.push_str(&text);
        }

        writeln!(self.output, "{line}")
            .and_then(|()| self.output.flush())
            .map_err(|e| RuntimeError::Output {
                at,
                message: e.to_string(),
            })
    }

    fn sleep(&mut self, args: &[Argument]) -> Result<(), RuntimeError> {
        let at = self.current;
        let [arg] = args else {
            return Err(RuntimeError::ArgumentCount {
                at,
                expected: 1,
                got: args.len(),
            });
        };

        let millis = match self.argument_kind(arg)? {
            ValueKind::Byte => self.memory.read_u8(arg.address).at(at)? as i64,
            ValueKind::Short => self.memory.read_i16(arg.address).at(at)? as i64,
            ValueKind::Int => self.memory.read_i32(arg.address).at(at)? as i64,
            ValueKind::Long => self.memory.read_i64(arg.address).at(at)?,
            other => {
                return Err(RuntimeError::InvalidValueKind {
                    at,
                    kind: other as u8,
                })
            }
        };
        let millis =
            u64::try_from(millis).map_err(|_| RuntimeError::NegativeOperand { at, value: millis })?;

        thread::sleep(Duration::from_millis(millis));
        Ok(())
    }

    /// Call the native bound to declared function `index` with arguments
    /// marshalled from the stack top.
    fn invoke(&mut self, index: i32) -> Result<(), RuntimeError> {
        let at = self.current;
        let binding = usize::try_from(index)
            .ok()
            .and_then(|i| self.functions.get(i))
            .ok_or(RuntimeError::UnknownFunction { at, index })?;

        match binding {
            Binding::InModule { position } => Err(RuntimeError::NotAbstract {
                at,
                index,
                position: *position,
            }),
            Binding::Native {
                qualified_name,
                params,
                implementation,
            } => {
                let args = bridge::marshal_arguments(&self.memory, params).at(at)?;
                debug!(function = %qualified_name, args = args.len(), "invoking native");
                let mut context = NativeContext {
                    memory: &mut self.memory,
                    output: &mut self.output,
                };
                (**implementation)(&mut context, &args).map_err(|message| RuntimeError::Native {
                    at,
                    function: qualified_name.clone(),
                    message,
                })
            }
        }
    }
}
