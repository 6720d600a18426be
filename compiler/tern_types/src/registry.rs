//! The type registry: canonical store of every type in a context.
//!
//! Types are keyed by the hash of their fully-qualified name; the
//! registry guarantees at most one type per id. Equality, equivalence,
//! and convertibility all test *effective* types (aliases stripped).

use crate::{
    Access, ArgKind, ClassInfo, DataType, FunctionRegistry, MetaFlags, Primitive, PropFlags,
    Signature, TypeBase, TypeKind, TypeMeta, TypeProperty,
};
use rustc_hash::FxHashMap;
use tern_ir::{Name, StringInterner, TypeId};

/// Ids of the built-in primitive types, registered with every context.
#[derive(Copy, Clone, Debug)]
pub struct PrimitiveIds {
    pub i8: TypeId,
    pub i16: TypeId,
    pub i32: TypeId,
    pub i64: TypeId,
    pub u8: TypeId,
    pub u16: TypeId,
    pub u32: TypeId,
    pub u64: TypeId,
    pub f32: TypeId,
    pub f64: TypeId,
    pub boolean: TypeId,
    pub void: TypeId,
    pub null: TypeId,
    pub ptr: TypeId,
}

impl PrimitiveIds {
    pub fn of(&self, prim: Primitive) -> TypeId {
        match prim {
            Primitive::I8 => self.i8,
            Primitive::I16 => self.i16,
            Primitive::I32 => self.i32,
            Primitive::I64 => self.i64,
            Primitive::U8 => self.u8,
            Primitive::U16 => self.u16,
            Primitive::U32 => self.u32,
            Primitive::U64 => self.u64,
            Primitive::F32 => self.f32,
            Primitive::F64 => self.f64,
            Primitive::Bool => self.boolean,
            Primitive::Void => self.void,
            Primitive::Null => self.null,
            Primitive::Ptr => self.ptr,
        }
    }
}

/// Keyed store: fully-qualified name -> type, id -> type.
#[derive(Clone, Debug)]
pub struct TypeRegistry {
    types: FxHashMap<TypeId, DataType>,
    by_fqn: FxHashMap<String, TypeId>,
    prims: PrimitiveIds,
}

impl TypeRegistry {
    /// Create a registry pre-populated with the poison sentinel and every
    /// primitive type.
    pub fn new() -> Self {
        let mut registry = TypeRegistry {
            types: FxHashMap::default(),
            by_fqn: FxHashMap::default(),
            prims: PrimitiveIds {
                i8: TypeId::POISON,
                i16: TypeId::POISON,
                i32: TypeId::POISON,
                i64: TypeId::POISON,
                u8: TypeId::POISON,
                u16: TypeId::POISON,
                u32: TypeId::POISON,
                u64: TypeId::POISON,
                f32: TypeId::POISON,
                f64: TypeId::POISON,
                boolean: TypeId::POISON,
                void: TypeId::POISON,
                null: TypeId::POISON,
                ptr: TypeId::POISON,
            },
        };

        // The poison sentinel occupies id 0 so that operations on
        // poisoned values resolve to a real (if empty) type.
        let poison = DataType {
            id: TypeId::POISON,
            name: "$poison".to_owned(),
            fqn: "$poison".to_owned(),
            access: Access::Public,
            owner: None,
            meta: TypeMeta::new(MetaFlags::ANONYMOUS, 0),
            kind: TypeKind::Primitive(Primitive::Void),
        };
        registry.by_fqn.insert(poison.fqn.clone(), poison.id);
        registry.types.insert(poison.id, poison);

        registry.prims = PrimitiveIds {
            i8: registry.insert(DataType::primitive(Primitive::I8)),
            i16: registry.insert(DataType::primitive(Primitive::I16)),
            i32: registry.insert(DataType::primitive(Primitive::I32)),
            i64: registry.insert(DataType::primitive(Primitive::I64)),
            u8: registry.insert(DataType::primitive(Primitive::U8)),
            u16: registry.insert(DataType::primitive(Primitive::U16)),
            u32: registry.insert(DataType::primitive(Primitive::U32)),
            u64: registry.insert(DataType::primitive(Primitive::U64)),
            f32: registry.insert(DataType::primitive(Primitive::F32)),
            f64: registry.insert(DataType::primitive(Primitive::F64)),
            boolean: registry.insert(DataType::primitive(Primitive::Bool)),
            void: registry.insert(DataType::primitive(Primitive::Void)),
            null: registry.insert(DataType::primitive(Primitive::Null)),
            ptr: registry.insert(DataType::primitive(Primitive::Ptr)),
        };
        registry
    }

    pub fn primitives(&self) -> &PrimitiveIds {
        &self.prims
    }

    /// Insert a type, forcing `id = hash(fqn)`. If a type with the same
    /// fully-qualified name already exists, the existing id is returned
    /// unchanged (insertion is idempotent by name).
    pub fn insert(&mut self, mut ty: DataType) -> TypeId {
        if let Some(&existing) = self.by_fqn.get(&ty.fqn) {
            return existing;
        }
        ty.id = TypeId::of(&ty.fqn);
        let id = ty.id;
        self.by_fqn.insert(ty.fqn.clone(), id);
        self.types.insert(id, ty);
        id
    }

    pub fn get(&self, id: TypeId) -> Option<&DataType> {
        self.types.get(&id)
    }

    pub fn get_mut(&mut self, id: TypeId) -> Option<&mut DataType> {
        self.types.get_mut(&id)
    }

    pub fn by_fqn(&self, fqn: &str) -> Option<TypeId> {
        self.by_fqn.get(fqn).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataType> {
        self.types.values()
    }

    /// The fully-qualified name of a type (`"<unknown>"` for a dangling
    /// id, which only happens on registry misuse).
    pub fn fqn(&self, id: TypeId) -> &str {
        self.get(id).map(|t| t.fqn.as_str()).unwrap_or("<unknown>")
    }

    /// Size in bytes of a type's storage.
    pub fn size_of(&self, id: TypeId) -> u32 {
        self.get(self.effective(id)).map(|t| t.meta.size).unwrap_or(0)
    }

    // ── Effective types ──────────────────────────────────────────────

    /// Strip alias wrappers down to the underlying type id.
    pub fn effective(&self, id: TypeId) -> TypeId {
        let mut cur = id;
        // Alias chains are finite; guard against accidental cycles.
        for _ in 0..64 {
            match self.get(cur).map(|t| &t.kind) {
                Some(TypeKind::Alias { target }) => cur = *target,
                _ => return cur,
            }
        }
        cur
    }

    /// The effective `DataType` record behind an id.
    pub fn effective_type(&self, id: TypeId) -> Option<&DataType> {
        self.get(self.effective(id))
    }

    // ── Equality / equivalence / convertibility ──────────────────────

    /// Identity of effective types.
    pub fn is_equal_to(&self, a: TypeId, b: TypeId) -> bool {
        self.effective(a) == self.effective(b)
    }

    /// Structural equivalence over size, kind flags, properties, bases,
    /// and method signatures.
    pub fn is_equivalent_to(&self, a: TypeId, b: TypeId, funcs: &FunctionRegistry) -> bool {
        let a = self.effective(a);
        let b = self.effective(b);
        if a == b {
            return true;
        }
        let (Some(ta), Some(tb)) = (self.get(a), self.get(b)) else {
            return false;
        };
        if ta.meta.size != tb.meta.size || ta.meta.flags != tb.meta.flags {
            return false;
        }
        match (&ta.kind, &tb.kind) {
            (TypeKind::Primitive(pa), TypeKind::Primitive(pb)) => pa == pb,
            (TypeKind::Function(sa), TypeKind::Function(sb)) => {
                self.signatures_equivalent(sa, sb)
            }
            (TypeKind::Class(ca), TypeKind::Class(cb)) => {
                self.classes_equivalent(ca, cb, funcs)
            }
            _ => false,
        }
    }

    fn classes_equivalent(&self, a: &ClassInfo, b: &ClassInfo, funcs: &FunctionRegistry) -> bool {
        if a.bases.len() != b.bases.len()
            || a.properties.len() != b.properties.len()
            || a.methods.len() != b.methods.len()
        {
            return false;
        }
        let bases_match = a.bases.iter().zip(&b.bases).all(|(x, y)| {
            x.offset == y.offset && x.access == y.access && self.is_equal_to(x.ty, y.ty)
        });
        if !bases_match {
            return false;
        }
        let props_match = a.properties.iter().zip(&b.properties).all(|(x, y)| {
            x.name == y.name
                && x.offset == y.offset
                && x.flags == y.flags
                && self.is_equal_to(x.ty, y.ty)
        });
        if !props_match {
            return false;
        }
        a.methods.iter().zip(&b.methods).all(|(x, y)| {
            match (funcs.get(*x), funcs.get(*y)) {
                (Some(fx), Some(fy)) => {
                    fx.name == fy.name
                        && match (fx.signature, fy.signature) {
                            (Some(sx), Some(sy)) => self.is_equal_to(sx, sy),
                            (None, None) => true,
                            _ => false,
                        }
                }
                _ => false,
            }
        })
    }

    /// Two function types are equivalent iff return types and argument
    /// lists match positionally in argument kind and effective type.
    pub fn signatures_equivalent(&self, a: &Signature, b: &Signature) -> bool {
        if !self.is_equal_to(a.ret, b.ret) || a.args.len() != b.args.len() {
            return false;
        }
        a.args
            .iter()
            .zip(&b.args)
            .all(|(x, y)| x.kind == y.kind && self.is_equal_to(x.ty, y.ty))
    }

    /// Convertibility: both primitive, or a unique conversion operator
    /// `operator Target()`, or a unique single-argument constructor on
    /// the target taking exactly the source.
    pub fn is_convertible_to(&self, src: TypeId, dst: TypeId, funcs: &FunctionRegistry) -> bool {
        let src = self.effective(src);
        let dst = self.effective(dst);
        if src == dst {
            return true;
        }
        let (Some(ts), Some(td)) = (self.get(src), self.get(dst)) else {
            return false;
        };
        if ts.is_primitive() && td.is_primitive() {
            return !matches!(ts.kind, TypeKind::Primitive(Primitive::Void))
                && !matches!(td.kind, TypeKind::Primitive(Primitive::Void));
        }
        if self.find_conversion_operator(src, dst, funcs).is_some() {
            return true;
        }
        self.find_converting_constructor(src, dst, funcs).is_some()
    }

    /// The unique `operator Target()` on `src` converting to `dst`, if
    /// exactly one exists.
    pub fn find_conversion_operator(
        &self,
        src: TypeId,
        dst: TypeId,
        funcs: &FunctionRegistry,
    ) -> Option<tern_ir::FunctionId> {
        let class = self.effective_type(src)?.class()?;
        let mut found = None;
        for &method in &class.methods {
            let function = funcs.get(method)?;
            if !function.name.starts_with("operator ") {
                continue;
            }
            let sig = function.signature.and_then(|s| self.get(s)?.signature())?;
            if sig.explicit_arity() == 0 && self.is_equal_to(sig.ret, dst) {
                if found.is_some() {
                    return None; // ambiguous
                }
                found = Some(method);
            }
        }
        found
    }

    /// The unique single-argument constructor on `dst` accepting exactly
    /// `src`, if one exists.
    pub fn find_converting_constructor(
        &self,
        src: TypeId,
        dst: TypeId,
        funcs: &FunctionRegistry,
    ) -> Option<tern_ir::FunctionId> {
        let class = self.effective_type(dst)?.class()?;
        let mut found = None;
        for &method in &class.methods {
            let function = funcs.get(method)?;
            if function.name != "constructor" {
                continue;
            }
            let sig = function.signature.and_then(|s| self.get(s)?.signature())?;
            let mut explicit = sig.explicit_args();
            let (Some(first), None) = (explicit.next(), explicit.next()) else {
                continue;
            };
            if self.is_equal_to(first.ty, src) {
                if found.is_some() {
                    return None; // ambiguous
                }
                found = Some(method);
            }
        }
        found
    }

    /// Implicit assignability: primitive-to-primitive, or structurally
    /// equivalent trivially-copyable types.
    pub fn is_implicitly_assignable_to(
        &self,
        src: TypeId,
        dst: TypeId,
        funcs: &FunctionRegistry,
    ) -> bool {
        let (Some(ts), Some(td)) = (self.effective_type(src), self.effective_type(dst)) else {
            return false;
        };
        if ts.is_primitive() && td.is_primitive() {
            return true;
        }
        ts.meta.is_trivially_copyable()
            && td.meta.is_trivially_copyable()
            && self.is_equivalent_to(src, dst, funcs)
    }

    // ── Function types ───────────────────────────────────────────────

    /// Canonical fully-qualified name of a function type.
    pub fn signature_fqn(&self, sig: &Signature) -> String {
        let mut fqn = String::from("fn(");
        for (idx, arg) in sig.args.iter().enumerate() {
            if idx > 0 {
                fqn.push(',');
            }
            let kind = match arg.kind {
                ArgKind::Value => "val",
                ArgKind::Pointer => "ptr",
                ArgKind::FuncPtr => "fp",
                ArgKind::RetPtr => "rp",
                ArgKind::ContextPtr => "cp",
                ArgKind::ThisPtr => "tp",
            };
            fqn.push_str(kind);
            fqn.push(':');
            fqn.push_str(self.fqn(self.effective(arg.ty)));
        }
        fqn.push_str("):");
        fqn.push_str(self.fqn(self.effective(sig.ret)));
        fqn
    }

    /// Find or insert a function type. The module-local set is searched
    /// first, then the context-global store; insertion is idempotent for
    /// structurally equivalent signatures because the canonical name is
    /// built from effective types.
    pub fn function_type(&mut self, sig: Signature, module_local: &[TypeId]) -> TypeId {
        for &local in module_local {
            if let Some(existing) = self.get(local).and_then(|t| t.signature()) {
                if self.signatures_equivalent(existing, &sig) {
                    return local;
                }
            }
        }
        let fqn = self.signature_fqn(&sig);
        if let Some(existing) = self.by_fqn(&fqn) {
            return existing;
        }
        self.insert(DataType {
            id: TypeId::POISON, // overwritten by insert
            name: fqn.clone(),
            fqn,
            access: Access::Public,
            owner: None,
            // Function references are pointer-sized scalars.
            meta: TypeMeta::new(MetaFlags::FUNCTION | MetaFlags::TRIVIAL, 8),
            kind: TypeKind::Function(sig),
        })
    }

    // ── Class layout ─────────────────────────────────────────────────

    /// Append a base class, extending the layout. The base's offset is
    /// the class size so far.
    pub fn add_base(&mut self, class: TypeId, base: TypeId, access: Access) {
        let base_effective = self.effective(base);
        let (base_size, base_pod) = match self.get(base_effective) {
            Some(t) => (t.meta.size, t.meta.is_pod()),
            None => (0, true),
        };
        let Some(ty) = self.get_mut(class) else { return };
        let offset = ty.meta.size;
        ty.meta.size += base_size;
        if !base_pod {
            ty.meta.downgrade_pod();
        }
        if let Some(info) = ty.class_mut() {
            info.bases.push(TypeBase {
                ty: base,
                offset,
                access,
            });
        }
    }

    /// Append a property, extending the layout. The property's offset is
    /// the class size so far; adding a non-POD member downgrades the
    /// containing class's POD/trivial flags.
    pub fn add_property(
        &mut self,
        class: TypeId,
        name: Name,
        prop_ty: TypeId,
        flags: PropFlags,
        access: Access,
    ) {
        let effective = self.effective(prop_ty);
        let (prop_size, prop_pod) = match self.get(effective) {
            Some(t) => (t.meta.size, t.meta.is_pod()),
            None => (0, true),
        };
        let size = if flags.contains(PropFlags::POINTER) {
            Primitive::Ptr.size()
        } else {
            prop_size
        };
        let Some(ty) = self.get_mut(class) else { return };
        let offset = if flags.contains(PropFlags::STATIC) {
            0
        } else {
            let offset = ty.meta.size;
            ty.meta.size += size;
            offset
        };
        if !prop_pod && !flags.contains(PropFlags::POINTER) {
            ty.meta.downgrade_pod();
        }
        if let Some(info) = ty.class_mut() {
            info.properties.push(TypeProperty {
                name,
                offset,
                ty: prop_ty,
                flags,
                access,
                getter: None,
                setter: None,
            });
        }
    }

    /// Cached instantiation lookup: `Base<Arg1FQN, Arg2FQN, ...>`.
    pub fn instantiation_fqn(&self, base_fqn: &str, args: &[TypeId]) -> String {
        let mut fqn = String::from(base_fqn);
        fqn.push('<');
        for (idx, &arg) in args.iter().enumerate() {
            if idx > 0 {
                fqn.push_str(", ");
            }
            fqn.push_str(self.fqn(arg));
        }
        fqn.push('>');
        fqn
    }

    /// Resolve a primitive name (`i32`, `bool`, ...) to its id.
    pub fn primitive_by_name(&self, interner: &StringInterner, name: Name) -> Option<TypeId> {
        let text = interner.resolve(name);
        let id = self.by_fqn(text)?;
        self.get(id).filter(|t| t.is_primitive()).map(|t| t.id)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        TypeRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FunctionArgument;

    fn empty_class(name: &str) -> DataType {
        DataType {
            id: TypeId::POISON,
            name: name.to_owned(),
            fqn: format!("test::{name}"),
            access: Access::Public,
            owner: None,
            meta: TypeMeta::new(MetaFlags::TRIVIAL, 0),
            kind: TypeKind::Class(ClassInfo::default()),
        }
    }

    #[test]
    fn test_registry_invariant_id_is_fqn_hash() {
        let mut registry = TypeRegistry::new();
        let id = registry.insert(empty_class("Vec2"));
        assert_eq!(id, TypeId::of("test::Vec2"));
        assert_eq!(registry.get(id).unwrap().id, id);
        assert_eq!(registry.by_fqn("test::Vec2"), Some(id));
    }

    #[test]
    fn test_insert_idempotent_by_fqn() {
        let mut registry = TypeRegistry::new();
        let a = registry.insert(empty_class("Vec2"));
        let b = registry.insert(empty_class("Vec2"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_effective_strips_alias_chain() {
        let mut registry = TypeRegistry::new();
        let i32_id = registry.primitives().i32;
        let alias1 = registry.insert(DataType {
            id: TypeId::POISON,
            name: "Id".to_owned(),
            fqn: "test::Id".to_owned(),
            access: Access::Public,
            owner: None,
            meta: TypeMeta::new(MetaFlags::ALIAS, 4),
            kind: TypeKind::Alias { target: i32_id },
        });
        let alias2 = registry.insert(DataType {
            id: TypeId::POISON,
            name: "Key".to_owned(),
            fqn: "test::Key".to_owned(),
            access: Access::Public,
            owner: None,
            meta: TypeMeta::new(MetaFlags::ALIAS, 4),
            kind: TypeKind::Alias { target: alias1 },
        });
        assert_eq!(registry.effective(alias2), i32_id);
        assert!(registry.is_equal_to(alias2, i32_id));
    }

    #[test]
    fn test_class_layout_offsets() {
        let mut registry = TypeRegistry::new();
        let funcs = FunctionRegistry::new();
        let interner = StringInterner::new();
        let prims = *registry.primitives();

        let base = registry.insert(empty_class("Base"));
        registry.add_property(
            base,
            interner.intern("tag"),
            prims.u32,
            PropFlags::READABLE | PropFlags::WRITABLE,
            Access::Public,
        );

        let class = registry.insert(empty_class("Derived"));
        registry.add_base(class, base, Access::Public);
        registry.add_property(
            class,
            interner.intern("x"),
            prims.f32,
            PropFlags::READABLE | PropFlags::WRITABLE,
            Access::Public,
        );
        registry.add_property(
            class,
            interner.intern("y"),
            prims.f64,
            PropFlags::READABLE | PropFlags::WRITABLE,
            Access::Public,
        );

        let ty = registry.get(class).unwrap();
        let info = ty.class().unwrap();
        // base(4) + x(4) + y(8)
        assert_eq!(ty.meta.size, 16);
        assert_eq!(info.bases[0].offset, 0);
        assert_eq!(info.properties[0].offset, 4);
        assert_eq!(info.properties[1].offset, 8);

        // Sum of base + property sizes equals the class size.
        let sum: u32 = info
            .bases
            .iter()
            .map(|b| registry.size_of(b.ty))
            .chain(info.properties.iter().map(|p| registry.size_of(p.ty)))
            .sum();
        assert_eq!(sum, ty.meta.size);
        let _ = funcs;
    }

    #[test]
    fn test_non_pod_member_downgrades_class() {
        let mut registry = TypeRegistry::new();
        let interner = StringInterner::new();

        let mut non_pod = empty_class("Resource");
        non_pod.meta.downgrade_pod();
        let non_pod = registry.insert(non_pod);

        let class = registry.insert(empty_class("Holder"));
        assert!(registry.get(class).unwrap().meta.is_pod());
        registry.add_property(
            class,
            interner.intern("res"),
            non_pod,
            PropFlags::READABLE | PropFlags::WRITABLE,
            Access::Public,
        );
        assert!(!registry.get(class).unwrap().meta.is_pod());
    }

    #[test]
    fn test_function_type_idempotent() {
        let mut registry = TypeRegistry::new();
        let prims = *registry.primitives();
        let sig = || Signature::new(
            prims.i32,
            vec![FunctionArgument { kind: ArgKind::Value, ty: prims.i32 }],
        );
        let a = registry.function_type(sig(), &[]);
        let b = registry.function_type(sig(), &[]);
        assert_eq!(a, b);

        let other = registry.function_type(
            Signature::new(prims.i32, vec![FunctionArgument { kind: ArgKind::Pointer, ty: prims.i32 }]),
            &[],
        );
        // Same types but different argument kind is a different function type.
        assert_ne!(a, other);
    }

    #[test]
    fn test_primitive_convertibility() {
        let registry = TypeRegistry::new();
        let funcs = FunctionRegistry::new();
        let prims = *registry.primitives();
        assert!(registry.is_convertible_to(prims.i32, prims.f64, &funcs));
        assert!(registry.is_convertible_to(prims.boolean, prims.u8, &funcs));
        assert!(!registry.is_convertible_to(prims.i32, prims.void, &funcs));
    }
}
