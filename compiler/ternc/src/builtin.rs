//! Builtin host types and functions.
//!
//! Registered into every context at construction: the `string` class
//! backing string literals, the `print` overloads, the `__throw` raise
//! intrinsic, and the host-bound `Array<T>` / `Pointer<T>` generics.
//! Array instantiation is host-binding work (the runtime contract of the
//! bound methods is all that matters): each instantiation builds the
//! concrete class and binds per-element-type method closures over VM
//! memory.

use tern_ir::{FunctionId, StringInterner, TypeId};
use tern_types::{
    Access, ArgKind, ClassInfo, DataType, FunctionArgument, FunctionRegistry, MetaFlags,
    PropFlags, ScriptFunction, Signature, TypeKind, TypeMeta, TypeRegistry,
};
use tern_vm::{HostCall, HostTable, HostValue, RuntimeError};

/// Array object layout (bytes): data pointer, length, capacity.
const ARRAY_DATA: u64 = 0;
const ARRAY_LEN: u64 = 8;
const ARRAY_CAP: u64 = 12;
const ARRAY_SIZE: u32 = 16;

/// Ids of the always-registered builtins.
pub struct Builtins {
    pub string_ty: TypeId,
    pub throw_fn: FunctionId,
}

fn make_sig(
    types: &mut TypeRegistry,
    ret: TypeId,
    this: Option<TypeId>,
    explicit: &[(ArgKind, TypeId)],
) -> TypeId {
    let ptr = types.primitives().ptr;
    let mut args = vec![
        FunctionArgument { kind: ArgKind::FuncPtr, ty: ptr },
        FunctionArgument { kind: ArgKind::RetPtr, ty: ptr },
        FunctionArgument { kind: ArgKind::ContextPtr, ty: ptr },
    ];
    if let Some(this) = this {
        args.push(FunctionArgument { kind: ArgKind::ThisPtr, ty: this });
    }
    args.extend(explicit.iter().map(|&(kind, ty)| FunctionArgument { kind, ty }));
    types.function_type(Signature::new(ret, args), &[])
}

fn register_host(
    funcs: &mut FunctionRegistry,
    host: &mut HostTable,
    name: &str,
    fqn: &str,
    display: &str,
    sig: TypeId,
    owner: Option<TypeId>,
    entry: tern_vm::HostFn,
) -> FunctionId {
    let handle = host.register(entry);
    let mut function = ScriptFunction::new(name, fqn);
    function.display_name = display.to_owned();
    function.signature = Some(sig);
    function.host = Some(handle);
    function.owner = owner;
    function.is_method = owner.is_some();
    funcs.register(function)
}

impl Builtins {
    /// Register the builtin surface into a fresh context.
    pub fn register(
        types: &mut TypeRegistry,
        funcs: &mut FunctionRegistry,
        host: &mut HostTable,
        interner: &StringInterner,
    ) -> Builtins {
        let prims = *types.primitives();

        // `string`: { data: ptr-to-u8, length: u64 }: trivially
        // copyable, so string values move freely.
        let string_ty = types.insert(DataType {
            id: TypeId::POISON,
            name: "string".into(),
            fqn: "string".into(),
            access: Access::Public,
            owner: None,
            meta: TypeMeta::new(MetaFlags::TRIVIAL | MetaFlags::HOST, 0),
            kind: TypeKind::Class(ClassInfo::default()),
        });
        types.add_property(
            string_ty,
            interner.intern("data"),
            prims.u8,
            PropFlags::READABLE | PropFlags::POINTER,
            Access::Private,
        );
        types.add_property(
            string_ty,
            interner.intern("length"),
            prims.u64,
            PropFlags::READABLE,
            Access::Public,
        );

        // `__throw(value, type_id)`: raises a script exception that
        // unwinds to the innermost `try` handler.
        let throw_sig = make_sig(
            types,
            prims.void,
            None,
            &[(ArgKind::Value, prims.u64), (ArgKind::Value, prims.u64)],
        );
        let throw_fn = register_host(
            funcs,
            host,
            "__throw",
            "__throw",
            "__throw(u64, u64)",
            throw_sig,
            None,
            Box::new(|call| {
                let value = call.arg(0).to_bits();
                let ty = TypeId(call.arg(1).to_bits() as u32);
                Err(tern_vm::raise(value, ty))
            }),
        );

        // `print` overloads.
        let print_i64_sig = make_sig(types, prims.void, None, &[(ArgKind::Value, prims.i64)]);
        register_host(
            funcs,
            host,
            "print",
            "print",
            "print(i64)",
            print_i64_sig,
            None,
            Box::new(|call| {
                let HostValue::I64(v) = call.arg(0) else { return Ok(()) };
                println!("{v}");
                Ok(())
            }),
        );
        let print_f64_sig = make_sig(types, prims.void, None, &[(ArgKind::Value, prims.f64)]);
        register_host(
            funcs,
            host,
            "print",
            "print",
            "print(f64)",
            print_f64_sig,
            None,
            Box::new(|call| {
                let HostValue::F64(v) = call.arg(0) else { return Ok(()) };
                println!("{v}");
                Ok(())
            }),
        );
        let print_str_sig = make_sig(types, prims.void, None, &[(ArgKind::Pointer, string_ty)]);
        register_host(
            funcs,
            host,
            "print",
            "print",
            "print(string)",
            print_str_sig,
            None,
            Box::new(|call| {
                let HostValue::Ptr(addr) = call.arg(0) else { return Ok(()) };
                // string layout: { data: ptr @0, length: u64 @8 }
                let data = call.memory.load(addr, 8)?;
                let len = call.memory.load(addr + 8, 8)?;
                let bytes = call.memory.slice(data, len)?.to_vec();
                println!("{}", String::from_utf8_lossy(&bytes));
                Ok(())
            }),
        );

        Builtins { string_ty, throw_fn }
    }

    /// The cached (or freshly instantiated) `Array<element>` type.
    ///
    /// Instantiation is idempotent: the class is cached by its
    /// fully-qualified name, so requesting `Array<T>` twice returns the
    /// same type object.
    pub fn array_type(
        types: &mut TypeRegistry,
        funcs: &mut FunctionRegistry,
        host: &mut HostTable,
        interner: &StringInterner,
        element: TypeId,
    ) -> TypeId {
        let element = types.effective(element);
        let fqn = format!("builtin::Array<{}>", types.fqn(element));
        if let Some(cached) = types.by_fqn(&fqn) {
            return cached;
        }

        let prims = *types.primitives();
        let elem_size = u64::from(types.size_of(element)).max(1);
        let elem_prim = types.get(element).and_then(|t| t.primitive_kind());
        let name = format!("Array<{}>", types.fqn(element));

        let array_ty = types.insert(DataType {
            id: TypeId::POISON,
            name,
            fqn,
            access: Access::Public,
            owner: None,
            meta: TypeMeta::new(MetaFlags::HOST, 0),
            kind: TypeKind::Class(ClassInfo {
                template_args: vec![element],
                ..ClassInfo::default()
            }),
        });
        types.add_property(
            array_ty,
            interner.intern("data"),
            element,
            PropFlags::READABLE | PropFlags::POINTER,
            Access::Private,
        );
        types.add_property(
            array_ty,
            interner.intern("length"),
            prims.u32,
            PropFlags::READABLE,
            Access::Public,
        );
        types.add_property(
            array_ty,
            interner.intern("capacity"),
            prims.u32,
            PropFlags::READABLE,
            Access::Private,
        );
        debug_assert_eq!(types.size_of(array_ty), ARRAY_SIZE);

        let elem_kind = if types.get(element).map(|t| t.is_primitive()).unwrap_or(false) {
            ArgKind::Value
        } else {
            ArgKind::Pointer
        };
        let class_fqn = types.fqn(array_ty).to_owned();
        let mut methods = Vec::new();

        // constructor(): zero the header.
        let ctor_sig = make_sig(types, prims.void, Some(array_ty), &[]);
        methods.push(register_host(
            funcs,
            host,
            "constructor",
            &format!("{class_fqn}::constructor"),
            &format!("{class_fqn}()"),
            ctor_sig,
            Some(array_ty),
            Box::new(|call| {
                let HostValue::Ptr(this) = call.arg(0) else { return Ok(()) };
                call.memory.store(this + ARRAY_DATA, 0, 8)?;
                call.memory.store(this + ARRAY_LEN, 0, 4)?;
                call.memory.store(this + ARRAY_CAP, 0, 4)?;
                Ok(())
            }),
        ));

        // destructor(): storage is arena-backed, nothing to release.
        let dtor_sig = make_sig(types, prims.void, Some(array_ty), &[]);
        let dtor = register_host(
            funcs,
            host,
            "destructor",
            &format!("{class_fqn}::destructor"),
            &format!("{class_fqn}::destructor()"),
            dtor_sig,
            Some(array_ty),
            Box::new(|_| Ok(())),
        );
        methods.push(dtor);

        // push(v: T)
        let push_sig = make_sig(types, prims.void, Some(array_ty), &[(elem_kind, element)]);
        methods.push(register_host(
            funcs,
            host,
            "push",
            &format!("{class_fqn}::push"),
            &format!("{class_fqn}::push({})", types.fqn(element)),
            push_sig,
            Some(array_ty),
            Box::new(move |call| {
                let HostValue::Ptr(this) = call.arg(0) else { return Ok(()) };
                let mut data = call.memory.load(this + ARRAY_DATA, 8)?;
                let len = call.memory.load(this + ARRAY_LEN, 4)?;
                let cap = call.memory.load(this + ARRAY_CAP, 4)?;
                if len == cap {
                    let new_cap = (cap * 2).max(4);
                    let new_data = call.memory.host_alloc(new_cap * elem_size);
                    if cap > 0 {
                        let old = call.memory.slice(data, len * elem_size)?.to_vec();
                        call.memory
                            .slice_mut(new_data, len * elem_size)?
                            .copy_from_slice(&old);
                    }
                    call.memory.store(this + ARRAY_DATA, new_data, 8)?;
                    call.memory.store(this + ARRAY_CAP, new_cap, 4)?;
                    data = new_data;
                }
                let by_ref = elem_prim.is_none();
                write_element(call, data + len * elem_size, elem_size, call.arg(1), by_ref)?;
                call.memory.store(this + ARRAY_LEN, len + 1, 4)?;
                Ok(())
            }),
        ));

        // at(i: u32): T
        let at_sig = make_sig(types, element, Some(array_ty), &[(ArgKind::Value, prims.u32)]);
        methods.push(register_host(
            funcs,
            host,
            "at",
            &format!("{class_fqn}::at"),
            &format!("{class_fqn}::at(u32)"),
            at_sig,
            Some(array_ty),
            Box::new(move |call| {
                let HostValue::Ptr(this) = call.arg(0) else { return Ok(()) };
                let index = call.arg(1).to_bits();
                let (data, len) = array_bounds(call, this)?;
                if index >= len {
                    return Err(RuntimeError::BadAddress { address: this });
                }
                let addr = data + index * elem_size;
                match elem_prim {
                    Some(prim) => {
                        let raw = call.memory.load(addr, elem_size)?;
                        call.set_return(HostValue::from_bits(raw, prim));
                    }
                    None => {
                        // Construct into the caller-provided return
                        // storage.
                        let bytes = call.memory.slice(addr, elem_size)?.to_vec();
                        let ret_ptr = call.ret_ptr;
                        call.memory.slice_mut(ret_ptr, elem_size)?.copy_from_slice(&bytes);
                    }
                }
                Ok(())
            }),
        ));

        // set(i: u32, v: T)
        let set_sig = make_sig(
            types,
            prims.void,
            Some(array_ty),
            &[(ArgKind::Value, prims.u32), (elem_kind, element)],
        );
        methods.push(register_host(
            funcs,
            host,
            "set",
            &format!("{class_fqn}::set"),
            &format!("{class_fqn}::set(u32, {})", types.fqn(element)),
            set_sig,
            Some(array_ty),
            Box::new(move |call| {
                let HostValue::Ptr(this) = call.arg(0) else { return Ok(()) };
                let index = call.arg(1).to_bits();
                let (data, len) = array_bounds(call, this)?;
                if index >= len {
                    return Err(RuntimeError::BadAddress { address: this });
                }
                let by_ref = elem_prim.is_none();
                write_element(call, data + index * elem_size, elem_size, call.arg(2), by_ref)
            }),
        ));

        if let Some(ty) = types.get_mut(array_ty) {
            if let Some(info) = ty.class_mut() {
                info.methods = methods;
                info.destructor = Some(dtor);
            }
        }
        array_ty
    }

    /// The cached (or freshly created) `Pointer<element>` type: a single
    /// pointer-sized slot typed as pointing at the element.
    pub fn pointer_type(
        types: &mut TypeRegistry,
        interner: &StringInterner,
        element: TypeId,
    ) -> TypeId {
        let element = types.effective(element);
        let fqn = format!("builtin::Pointer<{}>", types.fqn(element));
        if let Some(cached) = types.by_fqn(&fqn) {
            return cached;
        }
        let name = format!("Pointer<{}>", types.fqn(element));
        let pointer_ty = types.insert(DataType {
            id: TypeId::POISON,
            name,
            fqn,
            access: Access::Public,
            owner: None,
            meta: TypeMeta::new(MetaFlags::TRIVIAL | MetaFlags::HOST, 0),
            kind: TypeKind::Class(ClassInfo {
                template_args: vec![element],
                ..ClassInfo::default()
            }),
        });
        types.add_property(
            pointer_ty,
            interner.intern("value"),
            element,
            PropFlags::READABLE | PropFlags::WRITABLE | PropFlags::POINTER,
            Access::Public,
        );
        pointer_ty
    }
}

fn array_bounds(call: &mut HostCall<'_>, this: u64) -> Result<(u64, u64), RuntimeError> {
    let data = call.memory.load(this + ARRAY_DATA, 8)?;
    let len = call.memory.load(this + ARRAY_LEN, 4)?;
    Ok((data, len))
}

/// Write one element: by-reference (class) values arrive as an address
/// and copy `elem_size` bytes; primitives store their bits directly.
fn write_element(
    call: &mut HostCall<'_>,
    addr: u64,
    elem_size: u64,
    value: HostValue,
    by_ref: bool,
) -> Result<(), RuntimeError> {
    match value {
        HostValue::Ptr(src) if by_ref => {
            let bytes = call.memory.slice(src, elem_size)?.to_vec();
            call.memory.slice_mut(addr, elem_size)?.copy_from_slice(&bytes);
            Ok(())
        }
        value => call.memory.store(addr, value.to_bits(), elem_size.min(8)),
    }
}
