//! Module artifact decoding.
//!
//! Reconstruction order resolves reference cycles (method -> signature
//! type -> function arg type -> class whose method is being read):
//!
//! 1. function skeletons (no signatures)
//! 2. type skeletons (no properties/bases/details)
//! 3. function signatures assigned
//! 4. type details filled
//! 5. globals and per-function IR
//!
//! Ids may be re-hashed on the way in (the registry re-derives every type
//! id from its fully-qualified name and assigns fresh function ids), so
//! every stored id goes through a remap table; ids that are not part of
//! the artifact (primitives, cross-module references) pass through
//! unchanged.

use crate::bytes::{ByteReader, DecodeError};
use crate::encode::{MAGIC, VERSION};
use crate::tags::{lit_from_tags, MOD_KINDS, NODE_KINDS, NONE_TAG, OP_KINDS};
use crate::{Module, ModuleData};
use rustc_hash::FxHashMap;
use tern_ir::{
    CodeHolder, FunctionId, Instruction, LabelId, LitValue, ModuleId, Name, NodeId, Op, Operand,
    OperandFlags, ParseArena, ParseNode, SourceMap, Span, StringInterner, TypeId,
};
use tern_types::{
    Access, ArgKind, ClassInfo, DataType, FunctionArgument, FunctionRegistry, FunctionTemplate,
    MetaFlags, Primitive, PropFlags, ScriptFunction, Signature, TemplateInfo, TypeBase, TypeKind,
    TypeMeta, TypeProperty, TypeRegistry,
};

struct RawFunction {
    old_id: u32,
    new_id: FunctionId,
    signature: u32,
    owner: u32,
}

struct RawClass {
    destructor: u32,
    template_base: u32,
    template_args: Vec<u32>,
    bases: Vec<(u32, u32, u8)>,
    properties: Vec<RawProperty>,
    methods: Vec<u32>,
}

struct RawProperty {
    name: Name,
    offset: u32,
    ty: u32,
    flags: u8,
    access: u8,
    getter: u32,
    setter: u32,
}

enum RawPayload {
    Primitive(Primitive),
    Class(RawClass),
    Alias(u32),
    Function { ret: u32, args: Vec<(u8, u32)> },
    Template(TemplateInfo),
}

struct RawType {
    old_id: u32,
    new_id: TypeId,
    payload: RawPayload,
}

/// Decode a module artifact, registering its types and functions into
/// the given registries.
pub fn decode_module(
    bytes: &[u8],
    types: &mut TypeRegistry,
    funcs: &mut FunctionRegistry,
    interner: &StringInterner,
) -> Result<Module, DecodeError> {
    let mut r = ByteReader::new(bytes);

    // Header
    let magic = r.u32()?;
    if magic != MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }
    let version = r.u16()?;
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let _stored_id = r.u32()?;
    let name = r.str()?;
    let path = r.str()?;
    let init_raw = r.u32()?;

    let mut module = Module::new(name, path);
    debug_assert_eq!(module.id, ModuleId(_stored_id), "module id is name-derived");

    // Source line table
    let line_count = r.u32()? as usize;
    let mut line_starts = Vec::with_capacity(line_count);
    for _ in 0..line_count {
        line_starts.push(r.u32()?);
    }
    let source_len = r.u32()?;
    module.source_map = SourceMap::from_parts(line_starts, source_len);

    // 1. Function skeletons
    let function_count = r.u32()? as usize;
    let mut raw_functions = Vec::with_capacity(function_count);
    let mut fn_map: FxHashMap<u32, FunctionId> = FxHashMap::default();
    for _ in 0..function_count {
        let raw = decode_function_skeleton(&mut r, funcs, &mut module, interner)?;
        fn_map.insert(raw.old_id, raw.new_id);
        raw_functions.push(raw);
    }

    // 2. Type skeletons
    let type_count = r.u32()? as usize;
    let mut raw_types = Vec::with_capacity(type_count);
    let mut ty_map: FxHashMap<u32, TypeId> = FxHashMap::default();
    for _ in 0..type_count {
        let raw = decode_type_skeleton(&mut r, types, &mut module, interner)?;
        ty_map.insert(raw.old_id, raw.new_id);
        raw_types.push(raw);
    }

    let map_ty = |old: u32| -> TypeId { ty_map.get(&old).copied().unwrap_or(TypeId(old)) };
    let map_fn = |old: u32| -> FunctionId {
        fn_map.get(&old).copied().unwrap_or(FunctionId(old))
    };
    let opt_ty = |old: u32| -> Option<TypeId> { (old != 0).then(|| map_ty(old)) };
    let opt_fn = |old: u32| -> Option<FunctionId> { (old != 0).then(|| map_fn(old)) };

    module.init = map_fn(init_raw);

    // 3. Function signatures
    for raw in &raw_functions {
        let function = funcs
            .get_mut(raw.new_id)
            .ok_or(DecodeError::DanglingId { what: "function", id: raw.old_id })?;
        function.signature = opt_ty(raw.signature);
        function.owner = opt_ty(raw.owner);
        function.module = Some(module.id);
    }

    // 4. Type details
    for raw in raw_types {
        let kind = match raw.payload {
            RawPayload::Primitive(prim) => TypeKind::Primitive(prim),
            RawPayload::Alias(target) => TypeKind::Alias { target: map_ty(target) },
            RawPayload::Function { ret, args } => TypeKind::Function(Signature::new(
                map_ty(ret),
                args.iter()
                    .map(|&(kind, ty)| {
                        Ok(FunctionArgument {
                            kind: ArgKind::decode(kind)
                                .ok_or(DecodeError::BadTag { what: "argument kind", value: kind })?,
                            ty: map_ty(ty),
                        })
                    })
                    .collect::<Result<_, DecodeError>>()?,
            )),
            RawPayload::Template(info) => TypeKind::Template(info),
            RawPayload::Class(class) => TypeKind::Class(ClassInfo {
                destructor: opt_fn(class.destructor),
                template_base: opt_ty(class.template_base),
                template_args: class.template_args.iter().map(|&t| map_ty(t)).collect(),
                bases: class
                    .bases
                    .iter()
                    .map(|&(ty, offset, access)| TypeBase {
                        ty: map_ty(ty),
                        offset,
                        access: Access::decode(access),
                    })
                    .collect(),
                properties: class
                    .properties
                    .iter()
                    .map(|p| TypeProperty {
                        name: p.name,
                        offset: p.offset,
                        ty: map_ty(p.ty),
                        flags: PropFlags::from_bits_truncate(p.flags),
                        access: Access::decode(p.access),
                        getter: opt_fn(p.getter),
                        setter: opt_fn(p.setter),
                    })
                    .collect(),
                methods: class.methods.iter().map(|&m| map_fn(m)).collect(),
            }),
        };
        let ty = types
            .get_mut(raw.new_id)
            .ok_or(DecodeError::DanglingId { what: "type", id: raw.old_id })?;
        ty.kind = kind;
    }

    // 5a. Data table
    let data_count = r.u32()? as usize;
    for _ in 0..data_count {
        let name = r.str()?;
        let ty = r.u32()?;
        let offset = r.u32()?;
        let size = r.u32()?;
        let access = Access::decode(r.u8()?);
        let bytes = r.bytes()?;
        module.data.push(ModuleData {
            name,
            ty: map_ty(ty),
            offset,
            size,
            access,
            bytes,
        });
    }

    // 5b. IR table
    let ir_count = r.u32()? as usize;
    for _ in 0..ir_count {
        let fn_id = map_fn(r.u32()?);
        let code = decode_code(&mut r, &map_ty, &map_fn)?;
        let function = funcs
            .get_mut(fn_id)
            .ok_or(DecodeError::DanglingId { what: "function", id: fn_id.0 })?;
        function.code = Some(code);
    }

    Ok(module)
}

fn decode_function_skeleton(
    r: &mut ByteReader<'_>,
    funcs: &mut FunctionRegistry,
    module: &mut Module,
    interner: &StringInterner,
) -> Result<RawFunction, DecodeError> {
    let old_id = r.u32()?;
    let name = r.str()?;
    let display_name = r.str()?;
    let fqn = r.str()?;
    let access = Access::decode(r.u8()?);
    let flags = r.u8()?;
    let signature = r.u32()?;
    let owner = r.u32()?;
    let base_offset = r.u32()?;
    let span = decode_span_opt(r)?;

    let template = if r.u8()? != 0 {
        let param_count = r.u32()? as usize;
        let mut params = Vec::with_capacity(param_count);
        for _ in 0..param_count {
            params.push(interner.intern(&r.str()?));
        }
        let (arena, root) = decode_arena(r, interner)?;
        Some(FunctionTemplate { arena, root, params })
    } else {
        None
    };

    let mut function = ScriptFunction::new(name, fqn);
    function.display_name = display_name;
    function.access = access;
    function.is_method = flags & 1 != 0;
    function.is_template = flags & 2 != 0;
    // Host entry points (flag bit 2) cannot be restored from an artifact;
    // the embedder re-binds them after load.
    function.base_offset = base_offset;
    function.span = span;
    function.template = template;

    let new_id = funcs.register(function);
    module.add_function(new_id);
    Ok(RawFunction {
        old_id,
        new_id,
        signature,
        owner,
    })
}

fn decode_type_skeleton(
    r: &mut ByteReader<'_>,
    types: &mut TypeRegistry,
    module: &mut Module,
    interner: &StringInterner,
) -> Result<RawType, DecodeError> {
    let old_id = r.u32()?;
    let tag = r.u8()?;
    let name = r.str()?;
    let fqn = r.str()?;
    let access = Access::decode(r.u8()?);
    let flags = MetaFlags::from_bits_truncate(r.u16()?);
    let size = r.u32()?;
    let host_hash = r.u64()?;

    let payload = match tag {
        0 => {
            let prim = r.u8()?;
            RawPayload::Primitive(
                Primitive::decode(prim)
                    .ok_or(DecodeError::BadTag { what: "primitive", value: prim })?,
            )
        }
        1 => {
            let destructor = r.u32()?;
            let template_base = r.u32()?;
            let template_args = read_u32s(r)?;
            let base_count = r.u32()? as usize;
            let mut bases = Vec::with_capacity(base_count);
            for _ in 0..base_count {
                bases.push((r.u32()?, r.u32()?, r.u8()?));
            }
            let prop_count = r.u32()? as usize;
            let mut properties = Vec::with_capacity(prop_count);
            for _ in 0..prop_count {
                properties.push(RawProperty {
                    name: interner.intern(&r.str()?),
                    offset: r.u32()?,
                    ty: r.u32()?,
                    flags: r.u8()?,
                    access: r.u8()?,
                    getter: r.u32()?,
                    setter: r.u32()?,
                });
            }
            let methods = read_u32s(r)?;
            RawPayload::Class(RawClass {
                destructor,
                template_base,
                template_args,
                bases,
                properties,
                methods,
            })
        }
        2 => RawPayload::Alias(r.u32()?),
        3 => {
            let ret = r.u32()?;
            let arg_count = r.u32()? as usize;
            let mut args = Vec::with_capacity(arg_count);
            for _ in 0..arg_count {
                args.push((r.u8()?, r.u32()?));
            }
            RawPayload::Function { ret, args }
        }
        4 => {
            let param_count = r.u32()? as usize;
            let mut params = Vec::with_capacity(param_count);
            for _ in 0..param_count {
                params.push(interner.intern(&r.str()?));
            }
            let (arena, root) = decode_arena(r, interner)?;
            RawPayload::Template(TemplateInfo { arena, root, params })
        }
        other => return Err(DecodeError::BadTag { what: "type kind", value: other }),
    };

    // Insert the skeleton with an empty payload of the right kind; details
    // are filled after every referenced id is known.
    let skeleton_kind = match &payload {
        RawPayload::Primitive(prim) => TypeKind::Primitive(*prim),
        RawPayload::Class(_) => TypeKind::Class(ClassInfo::default()),
        RawPayload::Alias(_) => TypeKind::Alias { target: TypeId::POISON },
        RawPayload::Function { .. } => TypeKind::Function(Signature::new(TypeId::POISON, vec![])),
        RawPayload::Template(info) => TypeKind::Template(info.clone()),
    };
    let new_id = types.insert(DataType {
        id: TypeId::POISON,
        name,
        fqn,
        access,
        owner: Some(module.id),
        meta: TypeMeta {
            flags,
            size,
            host_hash,
        },
        kind: skeleton_kind,
    });
    module.types.push(new_id);
    Ok(RawType {
        old_id,
        new_id,
        payload,
    })
}

fn decode_code(
    r: &mut ByteReader<'_>,
    map_ty: &impl Fn(u32) -> TypeId,
    map_fn: &impl Fn(u32) -> FunctionId,
) -> Result<CodeHolder, DecodeError> {
    let next_label = r.u32()?;
    let next_reg = r.u32()?;
    let next_alloc = r.u32()?;
    let count = r.u32()? as usize;
    let mut code = Vec::with_capacity(count);
    for _ in 0..count {
        let op_raw = r.u8()?;
        let op = Op::decode(op_raw).ok_or(DecodeError::BadTag { what: "op", value: op_raw })?;
        let mut operands = [Operand::None; 3];
        for slot in &mut operands {
            let flags = OperandFlags::from_bits_truncate(r.u8()?);
            let ty = map_ty(r.u32()?);
            let value = r.u64()?;
            let mut operand = Operand::decode(flags, ty, value);
            if let Operand::Func(old, fty) = operand {
                operand = Operand::Func(map_fn(old.0), fty);
            }
            *slot = operand;
        }
        let mut labels = [None; 2];
        for slot in &mut labels {
            let raw = r.u32()?;
            *slot = (raw != u32::MAX).then_some(LabelId(raw));
        }
        let span = Span::new(r.u32()?, r.u32()?);
        code.push(Instruction {
            op,
            operands,
            labels,
            span,
        });
    }
    Ok(CodeHolder::from_parts(code, next_label, next_reg, next_alloc))
}

fn decode_span_opt(r: &mut ByteReader<'_>) -> Result<Option<Span>, DecodeError> {
    if r.u8()? != 0 {
        Ok(Some(Span::new(r.u32()?, r.u32()?)))
    } else {
        Ok(None)
    }
}

fn read_u32s(r: &mut ByteReader<'_>) -> Result<Vec<u32>, DecodeError> {
    let count = r.u32()? as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(r.u32()?);
    }
    Ok(values)
}

/// Deserialize a parse arena (template context).
fn decode_arena(
    r: &mut ByteReader<'_>,
    interner: &StringInterner,
) -> Result<(ParseArena, NodeId), DecodeError> {
    let count = r.u32()? as usize;
    let mut arena = ParseArena::new();
    for _ in 0..count {
        let kind_raw = r.u8()?;
        let kind = *NODE_KINDS
            .get(kind_raw as usize)
            .ok_or(DecodeError::BadTag { what: "node kind", value: kind_raw })?;
        let op_raw = r.u8()?;
        let op = if op_raw == NONE_TAG {
            None
        } else {
            Some(*OP_KINDS.get(op_raw as usize).ok_or(DecodeError::BadTag {
                what: "op kind",
                value: op_raw,
            })?)
        };
        let lit_family = r.u8()?;
        let lit_suffix = r.u8()?;
        let lit = if lit_family == NONE_TAG {
            None
        } else {
            Some(lit_from_tags(lit_family, lit_suffix).ok_or(DecodeError::BadTag {
                what: "literal kind",
                value: lit_family,
            })?)
        };
        let mod_raw = r.u8()?;
        let modifier_kind = if mod_raw == NONE_TAG {
            None
        } else {
            Some(*MOD_KINDS.get(mod_raw as usize).ok_or(DecodeError::BadTag {
                what: "modifier kind",
                value: mod_raw,
            })?)
        };

        let value = match r.u8()? {
            0 => LitValue::None,
            1 => LitValue::Int(r.u64()?),
            2 => LitValue::Float(f64::from_bits(r.u64()?)),
            3 => LitValue::Str(interner.intern(&r.str()?)),
            4 => LitValue::Bool(r.u8()? != 0),
            other => return Err(DecodeError::BadTag { what: "literal value", value: other }),
        };

        let name = if r.u8()? != 0 {
            Some(interner.intern(&r.str()?))
        } else {
            None
        };

        let span = Span::new(r.u32()?, r.u32()?);

        let mut slots = [None; 13];
        for slot in &mut slots {
            let raw = r.u32()?;
            *slot = (raw != u32::MAX).then_some(NodeId(raw));
        }

        let mut node = ParseNode::new(kind, span);
        node.op = op;
        node.lit = lit;
        node.modifier_kind = modifier_kind;
        node.value = value;
        node.name = name;
        [
            node.data_type,
            node.lvalue,
            node.rvalue,
            node.cond,
            node.body,
            node.else_body,
            node.initializer,
            node.parameters,
            node.template_parameters,
            node.modifier,
            node.alias,
            node.inheritance,
            node.next,
        ] = slots;
        arena.alloc(node);
    }
    let root = NodeId(r.u32()?);
    Ok((arena, root))
}
