//! Script and host function records plus the function registry.

use crate::Access;
use rustc_hash::FxHashMap;
use tern_ir::{CodeHolder, FunctionId, ModuleId, Name, NodeId, ParseArena, Span, TypeId};

/// Index into the embedding context's host-function table.
///
/// Host entry points are Rust closures owned by the context; functions
/// reference them by handle so the registry stays serializable and free
/// of trait objects.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct HostFnHandle(pub u32);

/// A template function's re-compilable context: its defining subtree plus
/// parameter names.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionTemplate {
    pub arena: ParseArena,
    pub root: NodeId,
    pub params: Vec<Name>,
}

/// A function known to the context: bytecode, host-bound, or a template
/// awaiting instantiation.
#[derive(Clone, Debug, PartialEq)]
pub struct ScriptFunction {
    pub id: FunctionId,
    /// Bare name, e.g. `push`.
    pub name: String,
    /// Name with signature for diagnostics, e.g. `push(i32)`.
    pub display_name: String,
    /// Fully-qualified name, e.g. `builtin::Array<i32>::push`.
    pub fqn: String,
    pub access: Access,
    pub module: Option<ModuleId>,
    /// Signature type (a `TypeKind::Function` entry in the type
    /// registry). Absent while only a stub is registered.
    pub signature: Option<TypeId>,
    /// Owning class for methods.
    pub owner: Option<TypeId>,
    /// Offset of the owning class within the full object layout, for
    /// methods inherited through bases.
    pub base_offset: u32,
    pub is_method: bool,
    pub is_template: bool,
    pub host: Option<HostFnHandle>,
    pub template: Option<FunctionTemplate>,
    pub span: Option<Span>,
    /// Compiled body. Immutable once compilation of the function exits.
    pub code: Option<CodeHolder>,
}

impl ScriptFunction {
    pub fn new(name: impl Into<String>, fqn: impl Into<String>) -> ScriptFunction {
        let name = name.into();
        ScriptFunction {
            id: FunctionId::NULL,
            display_name: name.clone(),
            name,
            fqn: fqn.into(),
            access: Access::Public,
            module: None,
            signature: None,
            owner: None,
            base_offset: 0,
            is_method: false,
            is_template: false,
            host: None,
            template: None,
            span: None,
            code: None,
        }
    }

    pub fn is_host(&self) -> bool {
        self.host.is_some()
    }
}

/// Assigns stable ids to functions and looks them up by id.
///
/// Id 0 is reserved as the null function; the slot is occupied by `None`
/// so a dangling id can never resolve.
#[derive(Clone, Debug, Default)]
pub struct FunctionRegistry {
    functions: Vec<Option<ScriptFunction>>,
    by_fqn: FxHashMap<String, Vec<FunctionId>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        FunctionRegistry {
            functions: vec![None],
            by_fqn: FxHashMap::default(),
        }
    }

    /// Register a function, assigning its id.
    pub fn register(&mut self, mut function: ScriptFunction) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        function.id = id;
        self.by_fqn.entry(function.fqn.clone()).or_default().push(id);
        self.functions.push(Some(function));
        id
    }

    pub fn get(&self, id: FunctionId) -> Option<&ScriptFunction> {
        self.functions.get(id.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: FunctionId) -> Option<&mut ScriptFunction> {
        self.functions.get_mut(id.0 as usize)?.as_mut()
    }

    /// All ids registered under a fully-qualified name (overload set).
    pub fn by_fqn(&self, fqn: &str) -> &[FunctionId] {
        self.by_fqn.get(fqn).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of registered functions (excluding the null slot).
    pub fn len(&self) -> usize {
        self.functions.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScriptFunction> {
        self.functions.iter().filter_map(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one() {
        let mut registry = FunctionRegistry::new();
        let a = registry.register(ScriptFunction::new("a", "m::a"));
        let b = registry.register(ScriptFunction::new("b", "m::b"));
        assert_eq!(a, FunctionId(1));
        assert_eq!(b, FunctionId(2));
        assert!(registry.get(FunctionId::NULL).is_none());
        assert_eq!(registry.get(a).unwrap().name, "a");
    }

    #[test]
    fn test_overload_set_by_fqn() {
        let mut registry = FunctionRegistry::new();
        let a = registry.register(ScriptFunction::new("f", "m::f"));
        let b = registry.register(ScriptFunction::new("f", "m::f"));
        assert_eq!(registry.by_fqn("m::f"), &[a, b]);
        assert!(registry.by_fqn("m::missing").is_empty());
    }
}
