//! Type system and registries for tern.
//!
//! [`DataType`] is a tagged union over primitives, classes, aliases,
//! function types, and templates; all operations that differ per kind
//! dispatch on the [`TypeKind`] tag. The [`TypeRegistry`] canonicalizes
//! types by fully-qualified name, and the [`FunctionRegistry`] assigns
//! stable ids to functions.

mod data_type;
mod function;
mod meta;
mod registry;

pub use data_type::{
    Access, ArgKind, ClassInfo, DataType, FunctionArgument, Primitive, PropFlags, Signature,
    TemplateInfo, TypeBase, TypeKind, TypeProperty,
};
pub use function::{FunctionRegistry, FunctionTemplate, HostFnHandle, ScriptFunction};
pub use meta::{MetaFlags, TypeMeta};
pub use registry::{PrimitiveIds, TypeRegistry};
