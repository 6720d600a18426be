//! The `DataType` tagged union and its kind-specific payloads.
//!
//! Cross-references between types and functions are always ids resolved
//! through the registries, never ownership pointers; this breaks the
//! cycles between a class, its methods, and their signature types, and
//! is what lets serialization rebuild structures skeleton-first.

use crate::{MetaFlags, TypeMeta};
use bitflags::bitflags;
use tern_ir::{FunctionId, ModuleId, Name, NodeId, ParseArena, TypeId};

/// Access modifier on types, members, and module data.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Access {
    #[default]
    Public,
    Private,
}

impl Access {
    /// Serialized tag.
    pub const fn encode(self) -> u8 {
        match self {
            Access::Public => 0,
            Access::Private => 1,
        }
    }

    pub fn decode(raw: u8) -> Access {
        if raw == 1 {
            Access::Private
        } else {
            Access::Public
        }
    }
}

/// Fundamental scalar kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    Void,
    Null,
    /// Opaque pointer-sized value.
    Ptr,
}

impl Primitive {
    pub const fn size(self) -> u32 {
        match self {
            Primitive::I8 | Primitive::U8 | Primitive::Bool => 1,
            Primitive::I16 | Primitive::U16 => 2,
            Primitive::I32 | Primitive::U32 | Primitive::F32 => 4,
            Primitive::I64 | Primitive::U64 | Primitive::F64 | Primitive::Null | Primitive::Ptr => 8,
            Primitive::Void => 0,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Primitive::I8 => "i8",
            Primitive::I16 => "i16",
            Primitive::I32 => "i32",
            Primitive::I64 => "i64",
            Primitive::U8 => "u8",
            Primitive::U16 => "u16",
            Primitive::U32 => "u32",
            Primitive::U64 => "u64",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
            Primitive::Bool => "bool",
            Primitive::Void => "void",
            Primitive::Null => "null",
            Primitive::Ptr => "ptr",
        }
    }

    pub const fn is_floating_point(self) -> bool {
        matches!(self, Primitive::F32 | Primitive::F64)
    }

    pub const fn is_unsigned(self) -> bool {
        matches!(
            self,
            Primitive::U8 | Primitive::U16 | Primitive::U32 | Primitive::U64 | Primitive::Bool
        )
    }

    /// Serialized tag.
    pub const fn encode(self) -> u8 {
        self as u8
    }

    pub fn decode(raw: u8) -> Option<Primitive> {
        const ALL: [Primitive; 14] = [
            Primitive::I8,
            Primitive::I16,
            Primitive::I32,
            Primitive::I64,
            Primitive::U8,
            Primitive::U16,
            Primitive::U32,
            Primitive::U64,
            Primitive::F32,
            Primitive::F64,
            Primitive::Bool,
            Primitive::Void,
            Primitive::Null,
            Primitive::Ptr,
        ];
        ALL.get(raw as usize).copied()
    }
}

bitflags! {
    /// Flags on a class property.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct PropFlags: u8 {
        const READABLE = 1 << 0;
        const WRITABLE = 1 << 1;
        const POINTER = 1 << 2;
        const STATIC = 1 << 3;
        /// Accessor-only property with no backing storage.
        const ACCESSOR = 1 << 4;
    }
}

/// A base class reference with its layout offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeBase {
    pub ty: TypeId,
    pub offset: u32,
    pub access: Access,
}

/// A class property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeProperty {
    pub name: Name,
    pub offset: u32,
    pub ty: TypeId,
    pub flags: PropFlags,
    pub access: Access,
    pub getter: Option<FunctionId>,
    pub setter: Option<FunctionId>,
}

/// Class payload: bases, properties, methods, destructor, and (for
/// template instantiations) the template the class was produced from.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ClassInfo {
    pub bases: Vec<TypeBase>,
    pub properties: Vec<TypeProperty>,
    pub methods: Vec<FunctionId>,
    pub destructor: Option<FunctionId>,
    pub template_base: Option<TypeId>,
    pub template_args: Vec<TypeId>,
}

impl ClassInfo {
    pub fn property(&self, name: Name) -> Option<&TypeProperty> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// How a function argument is passed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Value,
    Pointer,
    /// Implicit: closure environment pointer.
    FuncPtr,
    /// Implicit: caller-provided return storage.
    RetPtr,
    /// Implicit: execution context pointer.
    ContextPtr,
    /// Implicit: method receiver.
    ThisPtr,
}

impl ArgKind {
    pub const fn is_implicit(self) -> bool {
        matches!(
            self,
            ArgKind::FuncPtr | ArgKind::RetPtr | ArgKind::ContextPtr | ArgKind::ThisPtr
        )
    }

    pub const fn encode(self) -> u8 {
        self as u8
    }

    pub fn decode(raw: u8) -> Option<ArgKind> {
        const ALL: [ArgKind; 6] = [
            ArgKind::Value,
            ArgKind::Pointer,
            ArgKind::FuncPtr,
            ArgKind::RetPtr,
            ArgKind::ContextPtr,
            ArgKind::ThisPtr,
        ];
        ALL.get(raw as usize).copied()
    }
}

/// One declared function argument.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionArgument {
    pub kind: ArgKind,
    pub ty: TypeId,
}

/// Function-type payload: return type plus ordered arguments (implicit
/// prefix included).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    pub ret: TypeId,
    pub args: Vec<FunctionArgument>,
}

impl Signature {
    pub fn new(ret: TypeId, args: Vec<FunctionArgument>) -> Self {
        Signature { ret, args }
    }

    /// Arguments the caller writes explicitly (skips the implicit prefix).
    pub fn explicit_args(&self) -> impl Iterator<Item = &FunctionArgument> {
        self.args.iter().filter(|a| !a.kind.is_implicit())
    }

    pub fn explicit_arity(&self) -> usize {
        self.explicit_args().count()
    }

    pub fn implicit_arity(&self) -> usize {
        self.args.len() - self.explicit_arity()
    }
}

/// Template payload: the deep-cloned defining subtree plus parameter
/// names, re-compiled per instantiation.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateInfo {
    pub arena: ParseArena,
    pub root: NodeId,
    pub params: Vec<Name>,
}

/// Kind-specific payload of a [`DataType`].
#[derive(Clone, Debug, PartialEq)]
pub enum TypeKind {
    Primitive(Primitive),
    Class(ClassInfo),
    Alias { target: TypeId },
    Function(Signature),
    Template(TemplateInfo),
}

impl TypeKind {
    /// Serialized kind tag.
    pub const fn tag(&self) -> u8 {
        match self {
            TypeKind::Primitive(_) => 0,
            TypeKind::Class(_) => 1,
            TypeKind::Alias { .. } => 2,
            TypeKind::Function(_) => 3,
            TypeKind::Template(_) => 4,
        }
    }
}

/// A registered type.
///
/// `id` is always the hash of `fqn`; the registry maintains that
/// invariant on insertion.
#[derive(Clone, Debug, PartialEq)]
pub struct DataType {
    pub id: TypeId,
    pub name: String,
    pub fqn: String,
    pub access: Access,
    pub owner: Option<ModuleId>,
    pub meta: TypeMeta,
    pub kind: TypeKind,
}

impl DataType {
    /// Build a primitive type (unqualified name, id = hash of name).
    pub fn primitive(prim: Primitive) -> DataType {
        let mut flags = MetaFlags::TRIVIAL | MetaFlags::PRIMITIVE;
        if prim.is_floating_point() {
            flags |= MetaFlags::FLOATING_POINT;
        } else if !matches!(prim, Primitive::Void | Primitive::Null) {
            flags |= MetaFlags::INTEGRAL;
        }
        if prim.is_unsigned() {
            flags |= MetaFlags::UNSIGNED;
        }
        DataType {
            id: TypeId::of(prim.name()),
            name: prim.name().to_owned(),
            fqn: prim.name().to_owned(),
            access: Access::Public,
            owner: None,
            meta: TypeMeta::new(flags, prim.size()),
            kind: TypeKind::Primitive(prim),
        }
    }

    pub fn class(&self) -> Option<&ClassInfo> {
        match &self.kind {
            TypeKind::Class(info) => Some(info),
            _ => None,
        }
    }

    pub fn class_mut(&mut self) -> Option<&mut ClassInfo> {
        match &mut self.kind {
            TypeKind::Class(info) => Some(info),
            _ => None,
        }
    }

    pub fn signature(&self) -> Option<&Signature> {
        match &self.kind {
            TypeKind::Function(sig) => Some(sig),
            _ => None,
        }
    }

    pub fn template(&self) -> Option<&TemplateInfo> {
        match &self.kind {
            TypeKind::Template(info) => Some(info),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(_))
    }

    pub fn primitive_kind(&self) -> Option<Primitive> {
        match self.kind {
            TypeKind::Primitive(p) => Some(p),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_meta() {
        let ty = DataType::primitive(Primitive::U16);
        assert_eq!(ty.meta.size, 2);
        assert!(ty.meta.is_primitive());
        assert!(ty.meta.is_unsigned());
        assert!(ty.meta.is_integral());
        assert!(!ty.meta.is_floating_point());
        assert_eq!(ty.id, TypeId::of("u16"));
    }

    #[test]
    fn test_float_meta() {
        let ty = DataType::primitive(Primitive::F64);
        assert!(ty.meta.is_floating_point());
        assert!(!ty.meta.is_integral());
        assert_eq!(ty.meta.size, 8);
    }

    #[test]
    fn test_explicit_arity_skips_implicit_prefix() {
        let i32_id = TypeId::of("i32");
        let sig = Signature::new(
            i32_id,
            vec![
                FunctionArgument { kind: ArgKind::FuncPtr, ty: i32_id },
                FunctionArgument { kind: ArgKind::RetPtr, ty: i32_id },
                FunctionArgument { kind: ArgKind::ContextPtr, ty: i32_id },
                FunctionArgument { kind: ArgKind::Value, ty: i32_id },
            ],
        );
        assert_eq!(sig.explicit_arity(), 1);
        assert_eq!(sig.implicit_arity(), 3);
    }

    #[test]
    fn test_primitive_encode_decode() {
        for raw in 0..14u8 {
            let prim = Primitive::decode(raw).unwrap();
            assert_eq!(prim.encode(), raw);
        }
        assert_eq!(Primitive::decode(100), None);
    }
}
