//! Compiled modules: code plus the declared type and function tables.
//!
//! A module on disk is either a raw image (code bytes only) or a
//! container that prefixes the code with its metadata tables:
//!
//! ```text
//! types:     i32 count, { string name, bool is_value_type, fields, indexes }*
//! functions: i32 count, { string name, bool is_static, bool is_abstract,
//!                         u32 owner_type, fields, indexes, u32 pointed_opcode }*
//! code:      i32 length, bytes
//!
//! fields  = i32 count, { string name, u32 type_index }*
//! indexes = i32 count, u32*
//! string  = i32 length, UTF-8 bytes
//! ```

use crate::cursor::Cursor;
use crate::error::DecodeError;

/// A named, typed slot: a struct field or a function parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: String,
    /// Index into [`Module::types`].
    pub type_index: u32,
}

/// A type declared by the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    pub name: String,
    pub is_value_type: bool,
    pub fields: Vec<FieldDecl>,
    /// Indexes into [`Module::functions`].
    pub functions: Vec<u32>,
}

/// A function declared by the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: String,
    pub is_static: bool,
    /// Abstract functions have no code body and are bound to host natives.
    pub is_abstract: bool,
    /// Index into [`Module::types`].
    pub owner_type: u32,
    pub arguments: Vec<FieldDecl>,
    /// Type indexes of the return values.
    pub returns: Vec<u32>,
    /// Code position of the body for in-module functions.
    pub pointed_opcode: u32,
}

/// A loadable module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    pub types: Vec<TypeDecl>,
    pub functions: Vec<FunctionDecl>,
    /// The module image executed by the engine.
    pub code: Vec<u8>,
}

impl Module {
    /// Wrap a raw image with empty metadata tables.
    pub fn from_code(code: Vec<u8>) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }

    /// Decode a container. The whole slice must be consumed.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = Cursor::new(bytes);

        let type_count = cursor.next_len()?;
        let mut types = Vec::with_capacity(type_count.min(cursor.remaining()));
        for _ in 0..type_count {
            types.push(TypeDecl {
                name: cursor.next_string()?,
                is_value_type: cursor.next_bool()?,
                fields: decode_fields(&mut cursor)?,
                functions: decode_indexes(&mut cursor)?,
            });
        }

        let function_count = cursor.next_len()?;
        let mut functions = Vec::with_capacity(function_count.min(cursor.remaining()));
        for _ in 0..function_count {
            functions.push(FunctionDecl {
                name: cursor.next_string()?,
                is_static: cursor.next_bool()?,
                is_abstract: cursor.next_bool()?,
                owner_type: cursor.next_u32()?,
                arguments: decode_fields(&mut cursor)?,
                returns: decode_indexes(&mut cursor)?,
                pointed_opcode: cursor.next_u32()?,
            });
        }

        let code_len = cursor.next_len()?;
        let code = cursor.next_bytes(code_len)?.to_vec();

        if !cursor.is_at_end() {
            return Err(DecodeError::TrailingBytes {
                count: cursor.remaining(),
            });
        }

        Ok(Self {
            types,
            functions,
            code,
        })
    }

    /// Encode as a container.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();

        put_len(&mut out, self.types.len());
        for ty in &self.types {
            put_string(&mut out, &ty.name);
            out.push(ty.is_value_type as u8);
            put_fields(&mut out, &ty.fields);
            put_indexes(&mut out, &ty.functions);
        }

        put_len(&mut out, self.functions.len());
        for func in &self.functions {
            put_string(&mut out, &func.name);
            out.push(func.is_static as u8);
            out.push(func.is_abstract as u8);
            out.extend_from_slice(&func.owner_type.to_le_bytes());
            put_fields(&mut out, &func.arguments);
            put_indexes(&mut out, &func.returns);
            out.extend_from_slice(&func.pointed_opcode.to_le_bytes());
        }

        put_len(&mut out, self.code.len());
        out.extend_from_slice(&self.code);
        out
    }

    /// Name of the type at `index`, if declared.
    pub fn type_name(&self, index: u32) -> Option<&str> {
        self.types.get(index as usize).map(|t| t.name.as_str())
    }
}

fn decode_fields(cursor: &mut Cursor<'_>) -> Result<Vec<FieldDecl>, DecodeError> {
    let count = cursor.next_len()?;
    let mut fields = Vec::with_capacity(count.min(cursor.remaining()));
    for _ in 0..count {
        fields.push(FieldDecl {
            name: cursor.next_string()?,
            type_index: cursor.next_u32()?,
        });
    }
    Ok(fields)
}

fn decode_indexes(cursor: &mut Cursor<'_>) -> Result<Vec<u32>, DecodeError> {
    let count = cursor.next_len()?;
    (0..count).map(|_| cursor.next_u32()).collect()
}

fn put_len(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(&(len as i32).to_le_bytes());
}

fn put_string(out: &mut Vec<u8>, s: &str) {
    put_len(out, s.len());
    out.extend_from_slice(s.as_bytes());
}

fn put_fields(out: &mut Vec<u8>, fields: &[FieldDecl]) {
    put_len(out, fields.len());
    for field in fields {
        put_string(out, &field.name);
        out.extend_from_slice(&field.type_index.to_le_bytes());
    }
}

fn put_indexes(out: &mut Vec<u8>, indexes: &[u32]) {
    put_len(out, indexes.len());
    for index in indexes {
        out.extend_from_slice(&index.to_le_bytes());
    }
}
