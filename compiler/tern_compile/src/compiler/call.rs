//! Calls: overload resolution, implicit conversions, argument
//! marshalling, and object construction.

use super::Compiler;
use crate::{Value, ValueKind};
use tern_diagnostic::ErrorCode;
use tern_ir::{FunctionId, Imm, Instruction, NodeId, Op, Operand, Span, TypeId};
use tern_types::{Access, ArgKind, Primitive, TypeProperty};

/// Collect the callable methods of a class (bases included) with a given
/// name, respecting access from the current compilation context.
pub(crate) fn method_candidates(
    c: &Compiler<'_>,
    class_ty: TypeId,
    name: &str,
) -> Vec<FunctionId> {
    let mut out = Vec::new();
    collect_methods(c, class_ty, name, &mut out, 0);
    out
}

// Inheritance chains are acyclic in well-formed programs; the depth
// bound keeps lookup terminating while a base-cycle diagnostic is being
// reported.
const MAX_BASE_DEPTH: u32 = 64;

fn collect_methods(
    c: &Compiler<'_>,
    class_ty: TypeId,
    name: &str,
    out: &mut Vec<FunctionId>,
    depth: u32,
) {
    if depth > MAX_BASE_DEPTH {
        return;
    }
    let effective = c.types.effective(class_ty);
    let Some(info) = c.types.get(effective).and_then(|t| t.class()) else {
        return;
    };
    for &method in &info.methods {
        let Some(function) = c.funcs.get(method) else { continue };
        if function.name == name && c.can_access(function.access, effective) {
            out.push(method);
        }
    }
    for base in &info.bases {
        collect_methods(c, base.ty, name, out, depth + 1);
    }
}

/// Find a property by name, walking bases. Returns the property and its
/// offset within the complete object layout.
pub(crate) fn find_property(
    c: &Compiler<'_>,
    class_ty: TypeId,
    name: tern_ir::Name,
) -> Option<(TypeProperty, u32)> {
    find_property_at(c, class_ty, name, 0)
}

fn find_property_at(
    c: &Compiler<'_>,
    class_ty: TypeId,
    name: tern_ir::Name,
    depth: u32,
) -> Option<(TypeProperty, u32)> {
    if depth > MAX_BASE_DEPTH {
        return None;
    }
    let effective = c.types.effective(class_ty);
    let info = c.types.get(effective).and_then(|t| t.class())?;
    if let Some(prop) = info.property(name) {
        return Some((prop.clone(), prop.offset));
    }
    for base in &info.bases {
        if let Some((prop, offset)) = find_property_at(c, base.ty, name, depth + 1) {
            return Some((prop, base.offset + offset));
        }
    }
    None
}

/// Overload resolution per the two-stage rule:
///
/// 1. keep candidates with matching explicit arity whose every parameter
///    is convertible from the argument;
/// 2. if several remain, keep those requiring no conversion at all
///    (`is_equal_to` per argument).
///
/// Exactly one survivor wins. Several survivors in either stage is an
/// ambiguity, reported with an `info` note per candidate; zero stage-1
/// survivors is "no matching overload".
pub(crate) fn resolve_overload(
    c: &mut Compiler<'_>,
    candidates: &[FunctionId],
    args: &[Value],
    node: NodeId,
    what: &str,
    ambiguous: ErrorCode,
    no_match: ErrorCode,
) -> Option<FunctionId> {
    if args.iter().any(Value::is_poison) {
        return None; // cascade suppression
    }

    let viable: Vec<FunctionId> = candidates
        .iter()
        .copied()
        .filter(|&id| {
            let Some(sig) = signature_of(c, id) else { return false };
            if sig.len() != args.len() {
                return false;
            }
            args.iter()
                .zip(&sig)
                .all(|(arg, &param)| c.types.is_convertible_to(arg.ty, param, c.funcs))
        })
        .collect();

    match viable.len() {
        0 => {
            let arg_list = describe_args(c, args);
            c.error(no_match, format!("no matching {what} for ({arg_list})"), node);
            None
        }
        1 => Some(viable[0]),
        _ => {
            let exact: Vec<FunctionId> = viable
                .iter()
                .copied()
                .filter(|&id| {
                    let Some(sig) = signature_of(c, id) else { return false };
                    args.iter()
                        .zip(&sig)
                        .all(|(arg, &param)| c.types.is_equal_to(arg.ty, param))
                })
                .collect();
            if exact.len() == 1 {
                return Some(exact[0]);
            }
            if exact.is_empty() {
                // Numeric-family tie break: a float argument prefers a
                // float parameter over an integral one (and vice versa).
                let family: Vec<FunctionId> = viable
                    .iter()
                    .copied()
                    .filter(|&id| {
                        let Some(sig) = signature_of(c, id) else { return false };
                        args.iter()
                            .zip(&sig)
                            .all(|(arg, &param)| same_numeric_family(c, arg.ty, param))
                    })
                    .collect();
                if family.len() == 1 {
                    return Some(family[0]);
                }
            }
            let arg_list = describe_args(c, args);
            c.error(ambiguous, format!("ambiguous {what} for ({arg_list})"), node);
            let listed = if exact.len() > 1 { exact } else { viable };
            for id in listed {
                if let Some(function) = c.funcs.get(id) {
                    let span = function.span.unwrap_or_else(|| c.node_span(node));
                    let display = function.display_name.clone();
                    c.info(ambiguous, format!("could be `{display}`"), span);
                }
            }
            None
        }
    }
}

/// Whether two types sit in the same numeric family (floating point or
/// integral), or are outright equal.
fn same_numeric_family(c: &Compiler<'_>, a: TypeId, b: TypeId) -> bool {
    if c.types.is_equal_to(a, b) {
        return true;
    }
    let (Some(ta), Some(tb)) = (c.types.effective_type(a), c.types.effective_type(b)) else {
        return false;
    };
    (ta.meta.is_floating_point() && tb.meta.is_floating_point())
        || (ta.meta.is_integral() && tb.meta.is_integral())
}

/// The explicit parameter types of a function, in order.
fn signature_of(c: &Compiler<'_>, id: FunctionId) -> Option<Vec<TypeId>> {
    let function = c.funcs.get(id)?;
    let sig = c.types.get(function.signature?)?.signature()?;
    Some(sig.explicit_args().map(|a| a.ty).collect())
}

fn describe_args(c: &Compiler<'_>, args: &[Value]) -> String {
    args.iter()
        .map(|a| c.types.fqn(a.ty))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convert a value to a target type.
///
/// Implicit conversions go through `cvt` for primitives and through
/// conversion operators / converting constructors for classes. Lossy
/// float-to-integer conversion warns unless the cast was explicit.
pub(crate) fn convert_to(
    c: &mut Compiler<'_>,
    value: Value,
    target: TypeId,
    explicit: bool,
    node: NodeId,
) -> Value {
    if value.is_poison() || target.is_poison() {
        return Value::POISON;
    }
    if c.types.is_equal_to(value.ty, target) {
        return value;
    }
    let span = c.node_span(node);

    if c.is_primitive(value.ty) && c.is_primitive(target) {
        let src_prim = c.primitive_of(value.ty);
        let dst_prim = c.primitive_of(target);
        if !explicit
            && matches!(src_prim, Some(p) if p.is_floating_point())
            && matches!(dst_prim, Some(p) if !p.is_floating_point())
        {
            c.diags.push(
                tern_diagnostic::Diagnostic::warn(
                    ErrorCode::E2030,
                    format!(
                        "implicit conversion from `{}` to `{}` loses precision",
                        c.types.fqn(value.ty),
                        c.types.fqn(target)
                    ),
                    span,
                )
                .with_node(node),
            );
        }

        // Immediates convert at compile time.
        if let ValueKind::Imm(imm) = value.kind {
            if let Some(folded) = fold_imm(imm, dst_prim) {
                return Value::imm(folded, target);
            }
        }
        let val = c.rvalue(value, span);
        let src = c.b().operand(&val);
        let reg = c.b().convert(src, target, span);
        return Value::reg(reg, target);
    }

    // Unique conversion operator on the source.
    if let Some(op) = c.types.find_conversion_operator(value.ty, target, c.funcs) {
        return call_with_result(c, op, &[], Some(value), target, span);
    }

    // Unique converting constructor on the target.
    if c
        .types
        .find_converting_constructor(value.ty, target, c.funcs)
        .is_some()
    {
        let dest = c.stack_temp(target, span);
        construct_object(c, dest, target, &[value], node);
        return dest;
    }

    c.error(
        ErrorCode::E2023,
        format!(
            "cannot convert `{}` to `{}`",
            c.types.fqn(value.ty),
            c.types.fqn(target)
        ),
        node,
    )
}

fn fold_imm(imm: Imm, target: Option<Primitive>) -> Option<Imm> {
    let target = target?;
    Some(match (imm, target.is_floating_point()) {
        (Imm::Int(v), true) => Imm::Float(v as f64),
        (Imm::UInt(v), true) => Imm::Float(v as f64),
        (Imm::Float(v), true) => Imm::Float(v),
        (Imm::Float(v), false) => Imm::Int(v as i64),
        (Imm::Int(v), false) => Imm::Int(v),
        (Imm::UInt(v), false) => Imm::UInt(v),
    })
}

/// Call a resolved function, allocating the return destination from its
/// own signature.
pub(crate) fn emit_direct_call_with_result(
    c: &mut Compiler<'_>,
    callee: FunctionId,
    explicit_args: &[Value],
    this_val: Option<Value>,
    span: Span,
) -> Value {
    let ret = c
        .funcs
        .get(callee)
        .and_then(|f| f.signature)
        .and_then(|s| c.types.get(s))
        .and_then(|t| t.signature())
        .map(|sig| sig.ret)
        .unwrap_or(TypeId::POISON);
    call_with_result(c, callee, explicit_args, this_val, ret, span)
}

/// Call a function whose result lands either in a register (primitive)
/// or in a fresh stack temporary (non-primitive).
fn call_with_result(
    c: &mut Compiler<'_>,
    callee: FunctionId,
    explicit_args: &[Value],
    this_val: Option<Value>,
    ret_ty: TypeId,
    span: Span,
) -> Value {
    let dest = if !c.is_primitive(ret_ty) && !is_void(c, ret_ty) {
        Some(c.stack_temp(ret_ty, span))
    } else {
        None
    };
    emit_direct_call(c, callee, explicit_args, this_val, dest, span)
}

pub(crate) fn is_void(c: &Compiler<'_>, ty: TypeId) -> bool {
    c.types.is_equal_to(ty, c.types.primitives().void)
}

/// Emit the param sequence and call for a resolved callee.
///
/// Implicit arguments are synthesized in signature order: the closure
/// pointer and context pointer are placeholders the VM fills in, the
/// return pointer is the caller-provided destination for non-primitive
/// returns, and `this` is the receiver. Explicit arguments are converted
/// to their declared types.
pub(crate) fn emit_direct_call(
    c: &mut Compiler<'_>,
    callee: FunctionId,
    explicit_args: &[Value],
    this_val: Option<Value>,
    ret_dest: Option<Value>,
    span: Span,
) -> Value {
    let Some(function) = c.funcs.get(callee) else {
        return Value::POISON;
    };
    let Some(sig_ty) = function.signature else {
        return Value::POISON;
    };
    let Some(sig) = c.types.get(sig_ty).and_then(|t| t.signature()).cloned() else {
        return Value::POISON;
    };

    emit_call_with_sig(
        c,
        Operand::Func(callee, sig_ty),
        callee,
        &sig,
        sig_ty,
        explicit_args,
        this_val,
        ret_dest,
        span,
    )
}

/// Indirect call through a function-typed value (closure reference).
pub(crate) fn emit_indirect_call(
    c: &mut Compiler<'_>,
    fn_value: Value,
    sig_ty: TypeId,
    explicit_args: &[Value],
    ret_dest: Option<Value>,
    span: Span,
) -> Value {
    let Some(sig) = c.types.get(sig_ty).and_then(|t| t.signature()).cloned() else {
        return Value::POISON;
    };
    let callee_op = c.b().operand(&fn_value);
    emit_call_with_sig(
        c,
        callee_op,
        FunctionId::NULL,
        &sig,
        sig_ty,
        explicit_args,
        None,
        ret_dest,
        span,
    )
}

#[allow(clippy::too_many_arguments)]
fn emit_call_with_sig(
    c: &mut Compiler<'_>,
    callee_op: Operand,
    callee_id: FunctionId,
    sig: &tern_types::Signature,
    sig_ty: TypeId,
    explicit_args: &[Value],
    this_val: Option<Value>,
    ret_dest: Option<Value>,
    span: Span,
) -> Value {
    let ptr = c.prims().ptr;
    let mut explicit_iter = 0usize;
    let mut params: Vec<Operand> = Vec::with_capacity(sig.args.len());

    for arg in &sig.args {
        let operand = match arg.kind {
            ArgKind::FuncPtr => Operand::Imm(Imm::UInt(0), ptr),
            ArgKind::ContextPtr => Operand::Imm(Imm::UInt(0), ptr),
            ArgKind::RetPtr => match &ret_dest {
                Some(dest) => c.b().operand(dest),
                None => Operand::Imm(Imm::UInt(0), ptr),
            },
            ArgKind::ThisPtr => match &this_val {
                Some(this) => c.b().operand(this),
                None => Operand::Imm(Imm::UInt(0), ptr),
            },
            ArgKind::Value | ArgKind::Pointer => {
                let Some(&value) = explicit_args.get(explicit_iter) else {
                    continue;
                };
                explicit_iter += 1;
                if value.is_poison() {
                    return Value::POISON;
                }
                let node = c.cur_node;
                let converted = convert_to(c, value, arg.ty, false, node);
                if converted.is_poison() {
                    return Value::POISON;
                }
                if arg.kind == ArgKind::Value && c.is_primitive(arg.ty) {
                    let loaded = c.rvalue(converted, span);
                    c.b().operand(&loaded)
                } else {
                    // By reference: the operand must be an address.
                    let addressed = ensure_addressable(c, converted, span);
                    c.b().operand(&addressed)
                }
            }
        };
        params.push(operand);
    }

    for operand in params {
        c.b().param(operand, callee_id, span);
    }

    let ret_primitive = c.is_primitive(sig.ret) && !is_void(c, sig.ret);
    let mut operands = vec![callee_op, Operand::Imm(Imm::UInt(u64::from(sig_ty.0)), sig_ty)];
    let dst = if ret_primitive {
        let dst = c.b().alloc_reg();
        operands.push(Operand::Reg(dst, sig.ret));
        Some(dst)
    } else {
        None
    };
    c.b().emit(Instruction::new(Op::Call, span).with_operands(&operands));

    match (dst, ret_dest) {
        (Some(reg), _) => Value::reg(reg, sig.ret),
        (None, Some(dest)) => dest,
        (None, None) => Value::imm(Imm::UInt(0), sig.ret),
    }
}

/// Spill a value to a stack temporary when it has no address yet.
fn ensure_addressable(c: &mut Compiler<'_>, value: Value, span: Span) -> Value {
    if value.is_pointer() {
        return value;
    }
    let temp = c.stack_temp(value.ty, span);
    let val = c.b().operand(&value);
    let dst = c.b().operand(&temp);
    c.b().store(val, dst, span);
    temp
}

/// `constructObject(dest, T, args)`.
///
/// Primitives with one argument compile to a converted store. Classes
/// search their `constructor` overloads with the standard rules; a
/// trivially-constructible class with no constructor and no arguments
/// emits nothing, and a same-type single argument copies memberwise for
/// trivially-copyable classes.
pub(crate) fn construct_object(
    c: &mut Compiler<'_>,
    dest: Value,
    ty: TypeId,
    args: &[Value],
    node: NodeId,
) {
    if dest.is_poison() || ty.is_poison() || args.iter().any(Value::is_poison) {
        return;
    }
    let span = c.node_span(node);

    // Function references are pointer-sized scalars and store directly.
    if c.is_primitive(ty) || c.is_function_type(ty) {
        match args.len() {
            0 => {
                let zero = Operand::Imm(Imm::UInt(0), ty);
                let dst = c.b().operand(&dest);
                c.b().store(zero, dst, span);
            }
            1 => {
                let converted = convert_to(c, args[0], ty, false, node);
                let loaded = c.rvalue(converted, span);
                if loaded.is_poison() {
                    return;
                }
                let val = c.b().operand(&loaded);
                let dst = c.b().operand(&dest);
                c.b().store(val, dst, span);
            }
            _ => {
                c.error(
                    ErrorCode::E2007,
                    format!("no matching constructor for `{}`", c.types.fqn(ty)),
                    node,
                );
            }
        }
        return;
    }

    let candidates = method_candidates(c, ty, "constructor");

    // Copy construction from a same-type value: a constructor taking
    // exactly the class wins; otherwise trivially-copyable classes copy
    // memberwise.
    if let [src] = args {
        if c.types.is_equal_to(src.ty, ty) {
            let copy_ctor = candidates.iter().copied().find(|&id| {
                let Some(function) = c.funcs.get(id) else { return false };
                let Some(sig) = function.signature.and_then(|s| c.types.get(s)).and_then(|t| t.signature())
                else {
                    return false;
                };
                let mut explicit = sig.explicit_args();
                matches!(
                    (explicit.next(), explicit.next()),
                    (Some(first), None) if c.types.is_equal_to(first.ty, ty)
                )
            });
            if let Some(ctor) = copy_ctor {
                emit_direct_call(c, ctor, args, Some(dest), None, span);
                return;
            }
            let copyable = c
                .types
                .effective_type(ty)
                .map(|t| t.meta.is_trivially_copyable())
                .unwrap_or(false);
            if copyable {
                emit_memberwise_copy(c, &dest, src, ty, span);
                return;
            }
        }
    }

    if candidates.is_empty() {
        let effective = c.types.effective_type(ty);
        let trivially_constructible = effective
            .map(|t| t.meta.flags.contains(tern_types::MetaFlags::TRIVIALLY_CONSTRUCTIBLE))
            .unwrap_or(false);
        match args {
            [] if trivially_constructible => {}
            [src]
                if c.types.is_equal_to(src.ty, ty)
                    || c
                        .types
                        .is_implicitly_assignable_to(src.ty, ty, c.funcs) =>
            {
                emit_memberwise_copy(c, &dest, src, ty, span);
            }
            _ => {
                c.error(
                    ErrorCode::E2007,
                    format!("no matching constructor for `{}`", c.types.fqn(ty)),
                    node,
                );
            }
        }
        return;
    }

    let Some(ctor) = resolve_overload(
        c,
        &candidates,
        args,
        node,
        "constructor",
        ErrorCode::E2006,
        ErrorCode::E2007,
    ) else {
        return;
    };
    emit_direct_call(c, ctor, args, Some(dest), None, span);
}

/// Memberwise copy for trivially-copyable class values: each primitive
/// leaf loads from the source address and stores at the same offset in
/// the destination.
fn emit_memberwise_copy(c: &mut Compiler<'_>, dest: &Value, src: &Value, ty: TypeId, span: Span) {
    let mut leaves = Vec::new();
    collect_leaves(c, ty, 0, &mut leaves);
    let ptr = c.prims().ptr;
    let u64_ty = c.prims().u64;

    let Some(src_reg) = src.any_reg() else { return };
    let Some(dst_reg) = dest.any_reg() else { return };
    for (offset, leaf_ty) in leaves {
        let src_addr = if offset == 0 {
            Operand::Reg(src_reg, ptr)
        } else {
            let reg = c.b().bitwise(
                Op::UAdd,
                Operand::Reg(src_reg, u64_ty),
                Operand::Imm(Imm::UInt(u64::from(offset)), u64_ty),
                ptr,
                span,
            );
            Operand::Reg(reg, ptr)
        };
        let loaded = c.b().load(src_addr, leaf_ty, span);
        let dst_addr = if offset == 0 {
            Operand::Reg(dst_reg, ptr)
        } else {
            let reg = c.b().bitwise(
                Op::UAdd,
                Operand::Reg(dst_reg, u64_ty),
                Operand::Imm(Imm::UInt(u64::from(offset)), u64_ty),
                ptr,
                span,
            );
            Operand::Reg(reg, ptr)
        };
        c.b().store(Operand::Reg(loaded, leaf_ty), dst_addr, span);
    }
}

fn collect_leaves(c: &Compiler<'_>, ty: TypeId, base: u32, out: &mut Vec<(u32, TypeId)>) {
    let effective = c.types.effective(ty);
    let Some(t) = c.types.get(effective) else { return };
    if t.is_primitive() {
        out.push((base, effective));
        return;
    }
    if let Some(info) = t.class() {
        for b in &info.bases {
            collect_leaves(c, b.ty, base + b.offset, out);
        }
        for p in &info.properties {
            if p
                .flags
                .intersects(tern_types::PropFlags::STATIC | tern_types::PropFlags::ACCESSOR)
            {
                continue;
            }
            if p.flags.contains(tern_types::PropFlags::POINTER) {
                out.push((base + p.offset, c.prims().ptr));
            } else {
                collect_leaves(c, p.ty, base + p.offset, out);
            }
        }
    }
}
