//! Module container and binary artifact format.
//!
//! A [`Module`] is the serializable unit of compilation: it owns (by id)
//! the types and functions it introduced, its typed globals with their
//! raw initial bytes, and the per-function IR. The binary format is a
//! self-describing little-endian sequence: header, function table, type
//! table, data table, IR table: with length-prefixed strings.
//!
//! Deserialization is skeleton-first to resolve the reference cycles
//! between methods, signature types, and classes: function skeletons are
//! registered first (without signatures), then type skeletons (without
//! details), then signatures are assigned, then type details are filled,
//! then globals and IR are read back.

mod bytes;
mod decode;
mod encode;
mod tags;

pub use bytes::{ByteReader, ByteWriter, DecodeError};
pub use decode::decode_module;
pub use encode::encode_module;

use tern_ir::{FunctionId, ModuleId, SourceMap, TypeId};
use tern_types::Access;

/// One typed global slot in a module's data area.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleData {
    pub name: String,
    pub ty: TypeId,
    /// Offset within the module's data area (cumulative layout).
    pub offset: u32,
    pub size: u32,
    pub access: Access,
    /// Initial contents; `len() == size`.
    pub bytes: Vec<u8>,
}

/// A compiled module: types, functions, globals, IR.
#[derive(Clone, Debug, Default)]
pub struct Module {
    pub id: ModuleId,
    pub name: String,
    pub path: String,
    /// Types introduced by this module (also the module-local search set
    /// for function-type dedup).
    pub types: Vec<TypeId>,
    /// Functions owned by this module; index 0 is reserved null.
    pub functions: Vec<FunctionId>,
    pub data: Vec<ModuleData>,
    /// Synthetic `__init__` function that populates the globals.
    pub init: FunctionId,
    /// Line table of the module's source unit.
    pub source_map: SourceMap,
}

impl Module {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Module {
        let name = name.into();
        Module {
            id: ModuleId::of(&name),
            name,
            path: path.into(),
            types: Vec::new(),
            functions: vec![FunctionId::NULL],
            data: Vec::new(),
            init: FunctionId::NULL,
            source_map: SourceMap::default(),
        }
    }

    /// Add a function to the module's table.
    pub fn add_function(&mut self, id: FunctionId) {
        self.functions.push(id);
    }

    /// Add a typed global, assigning its offset in the data area.
    /// Returns the slot index.
    pub fn add_data(
        &mut self,
        name: impl Into<String>,
        ty: TypeId,
        size: u32,
        access: Access,
    ) -> usize {
        let offset = self.data_size();
        self.data.push(ModuleData {
            name: name.into(),
            ty,
            offset,
            size,
            access,
            bytes: vec![0; size as usize],
        });
        self.data.len() - 1
    }

    /// Find a global slot by name.
    pub fn find_data(&self, name: &str) -> Option<usize> {
        self.data.iter().position(|d| d.name == name)
    }

    /// Total size of the module's data area in bytes.
    pub fn data_size(&self) -> u32 {
        self.data.iter().map(|d| d.size).sum()
    }
}

#[cfg(test)]
mod tests;
