//! Serialize -> deserialize round-trip tests.

use crate::{decode_module, encode_module, Module};
use tern_ir::{
    Imm, Instruction, NodeKind, Op, Operand, ParseArena, ParseNode, SourceMap, Span,
    StringInterner, TypeId,
};
use tern_types::{
    Access, ArgKind, ClassInfo, DataType, FunctionArgument, FunctionRegistry, MetaFlags,
    PropFlags, ScriptFunction, Signature, TemplateInfo, TypeKind, TypeMeta, TypeRegistry,
};

/// Build a module with one class, one function type, one function with
/// IR, and one global.
fn build_sample(
    types: &mut TypeRegistry,
    funcs: &mut FunctionRegistry,
    interner: &StringInterner,
) -> Module {
    let prims = *types.primitives();
    let mut module = Module::new("sample", "sample.tn");
    module.source_map = SourceMap::new("let answer = 42;\nfunction f(a: i32): i32 { return a; }\n");

    // Class with two properties.
    let class_id = types.insert(DataType {
        id: TypeId::POISON,
        name: "Vec2".into(),
        fqn: "sample::Vec2".into(),
        access: Access::Public,
        owner: Some(module.id),
        meta: TypeMeta::new(MetaFlags::TRIVIAL, 0),
        kind: TypeKind::Class(ClassInfo::default()),
    });
    types.add_property(
        class_id,
        interner.intern("x"),
        prims.f32,
        PropFlags::READABLE | PropFlags::WRITABLE,
        Access::Public,
    );
    types.add_property(
        class_id,
        interner.intern("y"),
        prims.f32,
        PropFlags::READABLE | PropFlags::WRITABLE,
        Access::Private,
    );
    module.types.push(class_id);

    // Function type and function.
    let sig = Signature::new(
        prims.i32,
        vec![
            FunctionArgument { kind: ArgKind::FuncPtr, ty: prims.ptr },
            FunctionArgument { kind: ArgKind::RetPtr, ty: prims.ptr },
            FunctionArgument { kind: ArgKind::ContextPtr, ty: prims.ptr },
            FunctionArgument { kind: ArgKind::Value, ty: prims.i32 },
        ],
    );
    let sig_id = types.function_type(sig, &[]);
    module.types.push(sig_id);

    let mut function = ScriptFunction::new("f", "sample::f");
    function.display_name = "f(i32)".into();
    function.signature = Some(sig_id);
    function.span = Some(Span::new(17, 48));

    let mut code = tern_ir::CodeHolder::new();
    let r0 = code.alloc_reg();
    let r1 = code.alloc_reg();
    let label = code.alloc_label();
    code.emit(
        Instruction::new(Op::IAdd, Span::new(40, 46)).with_operands(&[
            Operand::Reg(r1, prims.i32),
            Operand::Reg(r0, prims.i32),
            Operand::Imm(Imm::Int(1), prims.i32),
        ]),
    );
    code.place_label(label, Span::new(40, 46));
    code.emit(
        Instruction::new(Op::Ret, Span::new(40, 46))
            .with_operands(&[Operand::Reg(r1, prims.i32)]),
    );
    function.code = Some(code);

    let fn_id = funcs.register(function);
    module.add_function(fn_id);
    module.init = fn_id;

    // One global with nonzero bytes.
    let slot = module.add_data("answer", prims.i32, 4, Access::Public);
    module.data[slot].bytes.copy_from_slice(&42i32.to_le_bytes());

    module
}

#[test]
fn test_round_trip_preserves_module() {
    let interner = StringInterner::new();
    let mut types = TypeRegistry::new();
    let mut funcs = FunctionRegistry::new();
    let module = build_sample(&mut types, &mut funcs, &interner);
    let bytes = encode_module(&module, &types, &funcs, &interner);

    // Decode into a fresh context.
    let mut types2 = TypeRegistry::new();
    let mut funcs2 = FunctionRegistry::new();
    let decoded = decode_module(&bytes, &mut types2, &mut funcs2, &interner).unwrap();

    assert_eq!(decoded.id, module.id);
    assert_eq!(decoded.name, module.name);
    assert_eq!(decoded.path, module.path);
    assert_eq!(decoded.types.len(), module.types.len());
    assert_eq!(decoded.functions.len(), module.functions.len());
    assert_eq!(decoded.source_map, module.source_map);

    // The class round-trips: same fqn-derived id, same layout.
    let class_id = decoded.types[0];
    assert_eq!(class_id, TypeId::of("sample::Vec2"));
    let class = types2.get(class_id).unwrap();
    assert_eq!(class.meta.size, 8);
    let info = class.class().unwrap();
    assert_eq!(info.properties.len(), 2);
    assert_eq!(interner.resolve(info.properties[1].name), "y");
    assert_eq!(info.properties[1].offset, 4);
    assert_eq!(info.properties[1].access, Access::Private);

    // The function got a fresh id but kept its contents.
    let fn_id = decoded.functions[1];
    let function = funcs2.get(fn_id).unwrap();
    assert_eq!(function.name, "f");
    assert_eq!(function.display_name, "f(i32)");
    assert_eq!(function.span, Some(Span::new(17, 48)));
    assert_eq!(decoded.init, fn_id);

    // Signature type resolved to the equivalent function type.
    let sig_id = function.signature.unwrap();
    let sig = types2.get(sig_id).unwrap().signature().unwrap();
    assert_eq!(sig.explicit_arity(), 1);
    assert_eq!(sig.implicit_arity(), 3);
    assert!(types2.is_equal_to(sig.ret, types2.primitives().i32));

    // IR round-trips bit-for-bit at the logical level.
    let original = funcs.get(module.functions[1]).unwrap().code.as_ref().unwrap();
    let restored = function.code.as_ref().unwrap();
    assert_eq!(restored.code(), original.code());
    assert_eq!(restored.next_reg_id(), original.next_reg_id());
    assert_eq!(restored.next_label_id(), original.next_label_id());

    // Globals keep their raw bytes.
    assert_eq!(decoded.data.len(), 1);
    assert_eq!(decoded.data[0].bytes, 42i32.to_le_bytes());
    assert_eq!(decoded.data[0].size, 4);
}

#[test]
fn test_round_trip_template_context() {
    let interner = StringInterner::new();
    let mut types = TypeRegistry::new();
    let funcs = FunctionRegistry::new();
    let mut module = Module::new("tmpl", "tmpl.tn");

    // A template type carrying a detached subtree: `class Box<T> { v: T; }`
    let mut arena = ParseArena::new();
    let mut prop_ty = ParseNode::new(NodeKind::TypeSpecifier, Span::new(20, 21));
    prop_ty.name = Some(interner.intern("T"));
    let prop_ty = arena.alloc(prop_ty);
    let mut prop = ParseNode::new(NodeKind::Property, Span::new(17, 21));
    prop.name = Some(interner.intern("v"));
    prop.data_type = Some(prop_ty);
    let prop = arena.alloc(prop);
    let mut class = ParseNode::new(NodeKind::Class, Span::new(0, 23));
    class.name = Some(interner.intern("Box"));
    class.body = Some(prop);
    let root = arena.alloc(class);

    let template_id = types.insert(DataType {
        id: TypeId::POISON,
        name: "Box".into(),
        fqn: "tmpl::Box".into(),
        access: Access::Public,
        owner: Some(module.id),
        meta: TypeMeta::new(MetaFlags::TEMPLATE, 0),
        kind: TypeKind::Template(TemplateInfo {
            arena,
            root,
            params: vec![interner.intern("T")],
        }),
    });
    module.types.push(template_id);

    let bytes = encode_module(&module, &types, &funcs, &interner);
    let mut types2 = TypeRegistry::new();
    let mut funcs2 = FunctionRegistry::new();
    let decoded = decode_module(&bytes, &mut types2, &mut funcs2, &interner).unwrap();

    let restored = types2.get(decoded.types[0]).unwrap();
    let info = restored.template().unwrap();
    assert_eq!(info.params.len(), 1);
    assert_eq!(interner.resolve(info.params[0]), "T");

    let root = info.arena.get(info.root);
    assert_eq!(root.kind, NodeKind::Class);
    assert_eq!(interner.resolve(root.name.unwrap()), "Box");
    let prop = info.arena.get(root.body.unwrap());
    assert_eq!(prop.kind, NodeKind::Property);
    let prop_ty = info.arena.get(prop.data_type.unwrap());
    assert_eq!(interner.resolve(prop_ty.name.unwrap()), "T");
}

#[test]
fn test_bad_magic_rejected() {
    let interner = StringInterner::new();
    let mut types = TypeRegistry::new();
    let mut funcs = FunctionRegistry::new();
    let err = decode_module(&[0, 1, 2, 3, 4, 5, 6, 7], &mut types, &mut funcs, &interner)
        .unwrap_err();
    assert!(matches!(err, crate::DecodeError::BadMagic(_)));
}

#[test]
fn test_truncated_artifact_rejected() {
    let interner = StringInterner::new();
    let mut types = TypeRegistry::new();
    let mut funcs = FunctionRegistry::new();
    let module = Module::new("t", "t.tn");
    let mut bytes = encode_module(&module, &types, &funcs, &interner);
    bytes.truncate(bytes.len() - 1);
    let err = decode_module(&bytes, &mut types, &mut funcs, &interner).unwrap_err();
    assert!(matches!(err, crate::DecodeError::UnexpectedEof { .. }));
}
