//! Binding declared functions to code positions or host natives.
//!
//! The host injects a [`NativeRegistry`] at load time. Linking walks the
//! module's function table once: functions with a body bind to their code
//! position, abstract functions bind to the registry entry matching
//! `(owner type name, function name)`. Missing natives and parameter types
//! that cannot be marshalled fail the load.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use basalt_common::{FunctionDecl, Module};
use tracing::debug;

use crate::error::{MemoryError, RuntimeError};
use crate::memory::{Memory, POINTER_SIZE};

/// A decoded argument handed to a native implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeValue {
    Int(i32),
    Long(i64),
    Str(String),
}

/// How a declared parameter is laid out on the VM stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// 4-byte signed integer.
    Int,
    /// 8-byte signed integer.
    Long,
    /// 4-byte pointer to `[length i32][length bytes]`.
    Str,
}

impl ParamKind {
    /// Parameter kind for a declared type name.
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(ParamKind::Int),
            "long" => Some(ParamKind::Long),
            "string" => Some(ParamKind::Str),
            _ => None,
        }
    }

    /// Bytes the argument occupies on the stack.
    pub fn slot_size(self) -> usize {
        match self {
            ParamKind::Int | ParamKind::Str => POINTER_SIZE,
            ParamKind::Long => 8,
        }
    }
}

/// What a native implementation may touch.
pub struct NativeContext<'a> {
    pub memory: &'a mut Memory,
    pub output: &'a mut dyn Write,
}

/// A host implementation of an abstract function. Errors are reported as
/// messages and become [`RuntimeError::Native`].
pub type NativeFn =
    Arc<dyn Fn(&mut NativeContext<'_>, &[NativeValue]) -> Result<(), String> + Send + Sync>;

/// Host natives keyed by `(owner type name, function name)`.
#[derive(Clone, Default)]
pub struct NativeRegistry {
    entries: HashMap<(String, String), NativeFn>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the native for `owner.name`.
    pub fn register<F>(&mut self, owner: &str, name: &str, function: F)
    where
        F: Fn(&mut NativeContext<'_>, &[NativeValue]) -> Result<(), String> + Send + Sync + 'static,
    {
        self.entries
            .insert((owner.to_string(), name.to_string()), Arc::new(function));
    }

    pub fn lookup(&self, owner: &str, name: &str) -> Option<NativeFn> {
        self.entries
            .get(&(owner.to_string(), name.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.entries.keys().collect();
        keys.sort();
        f.debug_struct("NativeRegistry").field("entries", &keys).finish()
    }
}

/// The resolved implementation of one declared function.
#[derive(Clone)]
pub enum Binding {
    /// Body lives in the image at this position.
    InModule { position: u32 },
    /// Host native, with the parameter layout used to marshal arguments.
    Native {
        qualified_name: String,
        params: Vec<ParamKind>,
        implementation: NativeFn,
    },
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::InModule { position } => {
                f.debug_struct("InModule").field("position", position).finish()
            }
            Binding::Native {
                qualified_name,
                params,
                ..
            } => f
                .debug_struct("Native")
                .field("qualified_name", qualified_name)
                .field("params", params)
                .finish_non_exhaustive(),
        }
    }
}

/// Bindings for every declared function, indexed like the module table.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    bindings: Vec<Binding>,
}

impl FunctionTable {
    /// Resolve every declared function of `module` against `registry`.
    pub fn link(module: &Module, registry: &NativeRegistry) -> Result<Self, RuntimeError> {
        let bindings = module
            .functions
            .iter()
            .map(|decl| link_function(module, registry, decl))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            functions = bindings.len(),
            natives = bindings
                .iter()
                .filter(|b| matches!(b, Binding::Native { .. }))
                .count(),
            "linked module function table"
        );
        Ok(Self { bindings })
    }

    pub fn get(&self, index: usize) -> Option<&Binding> {
        self.bindings.get(index)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

fn link_function(
    module: &Module,
    registry: &NativeRegistry,
    decl: &FunctionDecl,
) -> Result<Binding, RuntimeError> {
    if !decl.is_abstract {
        return Ok(Binding::InModule {
            position: decl.pointed_opcode,
        });
    }

    let owner = module
        .type_name(decl.owner_type)
        .ok_or_else(|| RuntimeError::UnknownType {
            function: decl.name.clone(),
            index: decl.owner_type,
        })?;
    let qualified_name = format!("{owner}.{}", decl.name);

    let params = decl
        .arguments
        .iter()
        .map(|arg| {
            let type_name =
                module
                    .type_name(arg.type_index)
                    .ok_or_else(|| RuntimeError::UnknownType {
                        function: qualified_name.clone(),
                        index: arg.type_index,
                    })?;
            ParamKind::from_type_name(type_name).ok_or_else(|| RuntimeError::UnsupportedArgument {
                function: qualified_name.clone(),
                type_name: type_name.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let implementation =
        registry
            .lookup(owner, &decl.name)
            .ok_or_else(|| RuntimeError::UnresolvedFunction {
                owner: owner.to_string(),
                name: decl.name.clone(),
            })?;

    Ok(Binding::Native {
        qualified_name,
        params,
        implementation,
    })
}

/// Decode the arguments of a native call from the stack top.
///
/// The last parameter occupies the bytes just below the stack pointer, the
/// one before it sits below that, and so on. Arguments are returned in
/// declaration order.
pub fn marshal_arguments(
    memory: &Memory,
    params: &[ParamKind],
) -> Result<Vec<NativeValue>, MemoryError> {
    let mut args = Vec::with_capacity(params.len());
    let mut address = memory.stack_pointer();

    for &kind in params.iter().rev() {
        address = address
            .checked_sub(kind.slot_size())
            .ok_or(MemoryError::OutOfBounds {
                address: address as i64 - kind.slot_size() as i64,
                size: kind.slot_size(),
                len: memory.len(),
            })?;
        let value = match kind {
            ParamKind::Int => NativeValue::Int(memory.read_i32(address)?),
            ParamKind::Long => NativeValue::Long(memory.read_i64(address)?),
            ParamKind::Str => NativeValue::Str(read_string(memory, memory.read_pointer(address)?)?),
        };
        args.push(value);
    }

    args.reverse();
    Ok(args)
}

/// Read a `[length i32][bytes]` string, one character per byte.
pub fn read_string(memory: &Memory, address: usize) -> Result<String, MemoryError> {
    let raw_len = memory.read_i32(address)?;
    let len = usize::try_from(raw_len).map_err(|_| MemoryError::OutOfBounds {
        address: address as i64,
        size: 0,
        len: memory.len(),
    })?;
    let bytes = memory.read(address + POINTER_SIZE, len)?;
    Ok(bytes.iter().map(|&b| b as char).collect())
}
