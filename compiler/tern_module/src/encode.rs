//! Module artifact encoding.

use crate::bytes::ByteWriter;
use crate::tags::{lit_tags, tag_of, MOD_KINDS, NODE_KINDS, NONE_TAG, OP_KINDS};
use crate::Module;
use tern_ir::{CodeHolder, LitValue, NodeId, ParseArena, Span, StringInterner};
use tern_types::{FunctionRegistry, ScriptFunction, TypeKind, TypeRegistry};

pub(crate) const MAGIC: u32 = 0x4d4e_5254; // "TRNM"
pub(crate) const VERSION: u16 = 1;

/// Serialize a module to its binary artifact.
///
/// Everything the module references must be resolvable through the given
/// registries; cross-references are written as ids.
pub fn encode_module(
    module: &Module,
    types: &TypeRegistry,
    funcs: &FunctionRegistry,
    interner: &StringInterner,
) -> Vec<u8> {
    let mut w = ByteWriter::new();

    // Header
    w.u32(MAGIC);
    w.u16(VERSION);
    w.u32(module.id.0);
    w.str(&module.name);
    w.str(&module.path);
    w.u32(module.init.0);

    // Source line table
    w.u32(module.source_map.line_starts().len() as u32);
    for &start in module.source_map.line_starts() {
        w.u32(start);
    }
    w.u32(module.source_map.source_len());

    // Function table (index 0 null slot is implicit)
    let function_ids: Vec<_> = module
        .functions
        .iter()
        .copied()
        .filter(|id| !id.is_null())
        .collect();
    w.u32(function_ids.len() as u32);
    for id in &function_ids {
        let function = funcs.get(*id).expect("module references unknown function");
        encode_function(&mut w, function, interner);
    }

    // Type table
    w.u32(module.types.len() as u32);
    for &id in &module.types {
        let ty = types.get(id).expect("module references unknown type");
        encode_type(&mut w, ty, interner);
    }

    // Data table
    w.u32(module.data.len() as u32);
    for data in &module.data {
        w.str(&data.name);
        w.u32(data.ty.0);
        w.u32(data.offset);
        w.u32(data.size);
        w.u8(data.access.encode());
        w.bytes(&data.bytes);
    }

    // IR table
    let with_code: Vec<_> = function_ids
        .iter()
        .filter_map(|id| funcs.get(*id).and_then(|f| f.code.as_ref().map(|c| (*id, c))))
        .collect();
    w.u32(with_code.len() as u32);
    for (id, code) in with_code {
        w.u32(id.0);
        encode_code(&mut w, code);
    }

    w.into_bytes()
}

fn encode_function(w: &mut ByteWriter, function: &ScriptFunction, interner: &StringInterner) {
    w.u32(function.id.0);
    w.str(&function.name);
    w.str(&function.display_name);
    w.str(&function.fqn);
    w.u8(function.access.encode());

    let mut flags = 0u8;
    if function.is_method {
        flags |= 1;
    }
    if function.is_template {
        flags |= 2;
    }
    if function.is_host() {
        flags |= 4;
    }
    w.u8(flags);

    w.u32(function.signature.map(|t| t.0).unwrap_or(0));
    w.u32(function.owner.map(|t| t.0).unwrap_or(0));
    w.u32(function.base_offset);
    encode_span_opt(w, function.span);

    // Optional template context
    match &function.template {
        Some(template) => {
            w.u8(1);
            w.u32(template.params.len() as u32);
            for &param in &template.params {
                w.str(interner.resolve(param));
            }
            encode_arena(w, &template.arena, template.root, interner);
        }
        None => w.u8(0),
    }
}

fn encode_type(w: &mut ByteWriter, ty: &tern_types::DataType, interner: &StringInterner) {
    w.u32(ty.id.0);
    w.u8(ty.kind.tag());
    w.str(&ty.name);
    w.str(&ty.fqn);
    w.u8(ty.access.encode());
    w.u16(ty.meta.flags.bits());
    w.u32(ty.meta.size);
    w.u64(ty.meta.host_hash);

    match &ty.kind {
        TypeKind::Primitive(prim) => w.u8(prim.encode()),
        TypeKind::Class(info) => {
            w.u32(info.destructor.map(|f| f.0).unwrap_or(0));
            w.u32(info.template_base.map(|t| t.0).unwrap_or(0));
            w.u32(info.template_args.len() as u32);
            for arg in &info.template_args {
                w.u32(arg.0);
            }
            w.u32(info.bases.len() as u32);
            for base in &info.bases {
                w.u32(base.ty.0);
                w.u32(base.offset);
                w.u8(base.access.encode());
            }
            w.u32(info.properties.len() as u32);
            for prop in &info.properties {
                w.str(interner.resolve(prop.name));
                w.u32(prop.offset);
                w.u32(prop.ty.0);
                w.u8(prop.flags.bits());
                w.u8(prop.access.encode());
                w.u32(prop.getter.map(|f| f.0).unwrap_or(0));
                w.u32(prop.setter.map(|f| f.0).unwrap_or(0));
            }
            w.u32(info.methods.len() as u32);
            for method in &info.methods {
                w.u32(method.0);
            }
        }
        TypeKind::Alias { target } => w.u32(target.0),
        TypeKind::Function(sig) => {
            w.u32(sig.ret.0);
            w.u32(sig.args.len() as u32);
            for arg in &sig.args {
                w.u8(arg.kind.encode());
                w.u32(arg.ty.0);
            }
        }
        TypeKind::Template(info) => {
            w.u32(info.params.len() as u32);
            for &param in &info.params {
                w.str(interner.resolve(param));
            }
            encode_arena(w, &info.arena, info.root, interner);
        }
    }
}

fn encode_code(w: &mut ByteWriter, code: &CodeHolder) {
    w.u32(code.next_label_id());
    w.u32(code.next_reg_id());
    w.u32(code.next_alloc_id());
    w.u32(code.len() as u32);
    for instr in code.code() {
        w.u8(instr.op.encode());
        for operand in &instr.operands {
            let (flags, ty, value) = operand.encode();
            w.u8(flags.bits());
            w.u32(ty.0);
            w.u64(value);
        }
        for label in &instr.labels {
            w.u32(label.map(|l| l.0).unwrap_or(u32::MAX));
        }
        w.u32(instr.span.start);
        w.u32(instr.span.end);
    }
}

fn encode_span_opt(w: &mut ByteWriter, span: Option<Span>) {
    match span {
        Some(span) => {
            w.u8(1);
            w.u32(span.start);
            w.u32(span.end);
        }
        None => w.u8(0),
    }
}

fn encode_slot(w: &mut ByteWriter, slot: Option<NodeId>) {
    w.u32(slot.map(|n| n.0).unwrap_or(u32::MAX));
}

/// Serialize a parse arena (template context). Nodes are written in arena
/// order; slots reference node indices.
pub(crate) fn encode_arena(
    w: &mut ByteWriter,
    arena: &ParseArena,
    root: NodeId,
    interner: &StringInterner,
) {
    w.u32(arena.len() as u32);
    for idx in 0..arena.len() {
        let node = arena.get(NodeId(idx as u32));
        w.u8(tag_of(&NODE_KINDS, &node.kind));
        w.u8(node.op.map(|op| tag_of(&OP_KINDS, &op)).unwrap_or(NONE_TAG));
        match node.lit {
            Some(lit) => {
                let (family, suffix) = lit_tags(lit);
                w.u8(family);
                w.u8(suffix);
            }
            None => {
                w.u8(NONE_TAG);
                w.u8(0);
            }
        }
        w.u8(node
            .modifier_kind
            .map(|m| tag_of(&MOD_KINDS, &m))
            .unwrap_or(NONE_TAG));

        match node.value {
            LitValue::None => w.u8(0),
            LitValue::Int(v) => {
                w.u8(1);
                w.u64(v);
            }
            LitValue::Float(v) => {
                w.u8(2);
                w.u64(v.to_bits());
            }
            LitValue::Str(name) => {
                w.u8(3);
                w.str(interner.resolve(name));
            }
            LitValue::Bool(v) => {
                w.u8(4);
                w.u8(u8::from(v));
            }
        }

        match node.name {
            Some(name) => {
                w.u8(1);
                w.str(interner.resolve(name));
            }
            None => w.u8(0),
        }

        w.u32(node.span.start);
        w.u32(node.span.end);

        for slot in node.child_slots() {
            encode_slot(w, slot);
        }
    }
    w.u32(root.0);
}
