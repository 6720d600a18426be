//! Expression compilation.

use super::{call, class::op_symbol, Compiler, FnCtx};
use crate::{ArithOp, FuncBuilder, ScopeKind, Symbol, TypeClass, Value, ValueFlags, ValueKind};
use tern_diagnostic::ErrorCode;
use tern_ir::{
    Imm, Instruction, LitKind, LitValue, Name, NodeId, NodeKind, NumberSuffix, Op, OpKind,
    Operand, RegId, Span, TypeId,
};
use tern_types::{Access, ArgKind, PropFlags, ScriptFunction, TypeKind};

impl Compiler<'_> {
    /// Compile an expression node to a value. Never panics on bad input:
    /// every failure records a diagnostic and yields poison, and
    /// operations on poisoned inputs silently yield poison.
    pub(crate) fn compile_expression(&mut self, id: NodeId) -> Value {
        self.cur_node = id;
        let node = self.node(id);
        match node.kind {
            NodeKind::Literal => self.compile_literal(id),
            NodeKind::Identifier => self.compile_identifier(id),
            NodeKind::New => self.compile_new_expression(id),
            NodeKind::Function => self.compile_arrow_function(id),
            NodeKind::Expression => match node.op {
                Some(OpKind::Call) => self.compile_call(id),
                Some(OpKind::Member) => {
                    let Some(obj_node) = node.lvalue else { return Value::POISON };
                    let obj = self.compile_expression(obj_node);
                    let Some(name) = node.name else { return Value::POISON };
                    self.compile_member_value(obj, name, id)
                }
                Some(OpKind::Index) => self.compile_index(id),
                Some(OpKind::Cast) => self.compile_cast(id),
                Some(OpKind::Conditional) => self.compile_conditional(id),
                Some(OpKind::Comma) => {
                    if let Some(lhs) = node.lvalue {
                        self.compile_expression(lhs);
                    }
                    match node.rvalue {
                        Some(rhs) => self.compile_expression(rhs),
                        None => Value::POISON,
                    }
                }
                Some(OpKind::Sizeof) => self.compile_sizeof(id),
                Some(
                    OpKind::Assign
                    | OpKind::AddAssign
                    | OpKind::SubAssign
                    | OpKind::MulAssign
                    | OpKind::DivAssign
                    | OpKind::ModAssign
                    | OpKind::BitAndAssign
                    | OpKind::BitOrAssign
                    | OpKind::BitXorAssign
                    | OpKind::ShlAssign
                    | OpKind::ShrAssign
                    | OpKind::LogAndAssign
                    | OpKind::LogOrAssign,
                ) => self.compile_assignment(id),
                Some(
                    OpKind::PreInc | OpKind::PreDec | OpKind::PostInc | OpKind::PostDec,
                ) => self.compile_incdec(id),
                Some(OpKind::Not | OpKind::Invert | OpKind::Negate) => self.compile_unary(id),
                Some(_) => self.compile_binary(id),
                None => Value::POISON,
            },
            NodeKind::Error => Value::POISON,
            _ => {
                self.error(ErrorCode::E2027, "expected an expression", id);
                Value::POISON
            }
        }
    }

    // ── Literals ─────────────────────────────────────────────────────

    fn compile_literal(&mut self, id: NodeId) -> Value {
        let node = self.node(id);
        let prims = self.prims();
        match (node.lit, node.value) {
            (Some(LitKind::Int(suffix)), LitValue::Int(value)) => {
                let (ty, signed) = match suffix {
                    NumberSuffix::None => (prims.i32, true),
                    NumberSuffix::B => (prims.i8, true),
                    NumberSuffix::S => (prims.i16, true),
                    NumberSuffix::L | NumberSuffix::Ll => (prims.i64, true),
                    NumberSuffix::U => (prims.u32, false),
                    NumberSuffix::Ub => (prims.u8, false),
                    NumberSuffix::Us => (prims.u16, false),
                    NumberSuffix::Ul | NumberSuffix::Ull => (prims.u64, false),
                    NumberSuffix::F => (prims.f32, true),
                };
                if suffix == NumberSuffix::F {
                    Value::imm(Imm::Float(value as f64), ty)
                } else if signed {
                    Value::imm(Imm::Int(value as i64), ty)
                } else {
                    Value::imm(Imm::UInt(value), ty)
                }
            }
            (Some(LitKind::Float(suffix)), LitValue::Float(value)) => {
                let ty = if suffix == NumberSuffix::F {
                    prims.f32
                } else {
                    prims.f64
                };
                Value::imm(Imm::Float(value), ty)
            }
            (Some(LitKind::Bool), LitValue::Bool(v)) => {
                Value::imm(Imm::UInt(u64::from(v)), prims.boolean)
            }
            (Some(LitKind::Null), _) => Value::imm(Imm::UInt(0), prims.null),
            (Some(LitKind::Str | LitKind::TemplateStr), LitValue::Str(text)) => {
                self.compile_string_literal(text, id)
            }
            _ => Value::POISON,
        }
    }

    /// A string literal: raw bytes in a module data slot, wrapped in the
    /// registered `string` class when the builtin module provides one.
    fn compile_string_literal(&mut self, text: Name, id: NodeId) -> Value {
        let span = self.node_span(id);
        let bytes = self.interner.resolve(text).as_bytes().to_vec();
        let len = bytes.len() as u64;
        let prims = self.prims();

        let slot_name = self.string_slot_name();
        let slot = self
            .module
            .add_data(slot_name, prims.u8, bytes.len().max(1) as u32, Access::Private);
        self.module.data[slot].bytes = bytes;
        let offset = self.module.data[slot].offset;
        let module_id = self.module.id;
        let addr = self.b().module_data(module_id, offset, prims.ptr, span);

        match self.types.by_fqn("string") {
            Some(string_ty) => {
                // string layout: { data: ptr, length: u64 }
                let temp = self.stack_temp(string_ty, span);
                let Some(base) = temp.any_reg() else { return Value::POISON };
                self.b()
                    .store(Operand::Reg(addr, prims.ptr), Operand::Reg(base, prims.ptr), span);
                let len_addr = self.b().bitwise(
                    Op::UAdd,
                    Operand::Reg(base, prims.u64),
                    Operand::Imm(Imm::UInt(8), prims.u64),
                    prims.ptr,
                    span,
                );
                self.b().store(
                    Operand::Imm(Imm::UInt(len), prims.u64),
                    Operand::Reg(len_addr, prims.ptr),
                    span,
                );
                temp
            }
            None => Value::reg(addr, prims.ptr),
        }
    }

    // ── Names ────────────────────────────────────────────────────────

    fn compile_identifier(&mut self, id: NodeId) -> Value {
        let node = self.node(id);
        let Some(name) = node.name else { return Value::POISON };
        if name == self.names.this_ {
            return self.this_value(id);
        }

        match self.scopes.lookup_with_depth(name).map(|(d, s)| (d, s.clone())) {
            Some((depth, Symbol::Value(value))) => {
                if depth != 0 && depth < self.fn_ctx().scope_base {
                    let text = self.interner.resolve(name).to_owned();
                    return self.error(
                        ErrorCode::E2029,
                        format!("`{text}` would be captured; closures cannot capture locals"),
                        id,
                    );
                }
                value
            }
            Some((_, Symbol::ModuleSlot(module_id, slot, is_const))) => {
                self.module_slot_value(module_id, slot, is_const, id)
            }
            Some((_, Symbol::Function(ids))) => self.function_value(&ids, id),
            Some((_, Symbol::FunctionDef(_))) => Value::POISON,
            Some((_, Symbol::Type(ty))) => Value::type_ref(ty),
            Some((_, Symbol::Module(module_id))) => {
                Value::module_ref(module_id, self.prims().ptr)
            }
            None => {
                // `this` members are in scope inside methods.
                if let Some(owner) = self.fn_ctx().owner {
                    if call::find_property(self, owner, name).is_some()
                        || !call::method_candidates(
                            self,
                            owner,
                            self.interner.resolve(name),
                        )
                        .is_empty()
                    {
                        let this = self.this_value(id);
                        return self.compile_member_value(this, name, id);
                    }
                }
                // Builtins register under their bare name.
                let text = self.interner.resolve(name).to_owned();
                let builtins = self.funcs.by_fqn(&text).to_vec();
                if !builtins.is_empty() {
                    return self.function_value(&builtins, id);
                }
                self.error(ErrorCode::E2001, format!("`{text}` not found"), id)
            }
        }
    }

    pub(crate) fn module_slot_value(
        &mut self,
        module_id: tern_ir::ModuleId,
        slot: usize,
        is_const: bool,
        node: NodeId,
    ) -> Value {
        let span = self.node_span(node);
        let ptr = self.prims().ptr;
        let (ty, offset) = if module_id == self.module.id {
            let data = &self.module.data[slot];
            (data.ty, data.offset)
        } else {
            match self.host.find_module_by_id(module_id).map(|m| &m.data[slot]) {
                Some(data) => (data.ty, data.offset),
                None => return Value::POISON,
            }
        };
        let addr = self.b().module_data(module_id, offset, ptr, span);
        let mut value = Value::pointer(addr, ty).with_flags(ValueFlags::MODULE_DATA);
        if is_const {
            value = value.with_flags(ValueFlags::CONST);
        }
        value
    }

    /// A function reference as a first-class value. Overloaded names
    /// cannot be taken as values without a call to disambiguate.
    fn function_value(&mut self, ids: &[tern_ir::FunctionId], node: NodeId) -> Value {
        let concrete: Vec<_> = ids
            .iter()
            .filter(|&&id| {
                self.funcs
                    .get(id)
                    .map(|f| f.signature.is_some())
                    .unwrap_or(false)
            })
            .copied()
            .collect();
        match concrete.as_slice() {
            [single] => {
                let Some(sig) = self.funcs.get(*single).and_then(|f| f.signature) else {
                    return Value::POISON;
                };
                Value::function(*single, sig)
            }
            [] => self.error(ErrorCode::E2001, "function has no usable overload", node),
            _ => {
                let v = self.error(
                    ErrorCode::E2004,
                    "cannot take the value of an overloaded function",
                    node,
                );
                for id in &concrete {
                    if let Some(f) = self.funcs.get(*id) {
                        let display = f.display_name.clone();
                        let span = f.span.unwrap_or_else(|| self.node_span(node));
                        self.info(ErrorCode::E2004, format!("could be `{display}`"), span);
                    }
                }
                v
            }
        }
    }

    // ── Member access ────────────────────────────────────────────────

    /// `obj.name` as a value (property read or bound storage address).
    pub(crate) fn compile_member_value(&mut self, obj: Value, name: Name, node: NodeId) -> Value {
        if obj.is_poison() {
            return Value::POISON;
        }
        let span = self.node_span(node);
        let text = self.interner.resolve(name).to_owned();

        // Module member: `M.sym`.
        if let ValueKind::Module(module_id) = obj.kind {
            return self.module_member(module_id, name, node);
        }

        // Static member through the type name: `Class.sym`.
        if let ValueKind::Type(ty) = obj.kind {
            return self.static_member(ty, name, node);
        }

        if self.is_primitive(obj.ty) {
            return self.error(
                ErrorCode::E2025,
                format!("`{}` has no member `{text}`", self.types.fqn(obj.ty)),
                node,
            );
        }

        let effective = self.types.effective(obj.ty);
        if let Some((prop, offset)) = call::find_property(self, effective, name) {
            if !self.can_access(prop.access, effective) {
                return self.error(
                    ErrorCode::E2008,
                    format!("`{text}` is private to `{}`", self.types.fqn(effective)),
                    node,
                );
            }
            if prop.flags.contains(PropFlags::STATIC) {
                let module_id = self
                    .types
                    .get(effective)
                    .and_then(|t| t.owner)
                    .unwrap_or(self.module.id);
                let ptr = self.prims().ptr;
                let addr = self.b().module_data(module_id, prop.offset, ptr, span);
                return Value::pointer(addr, prop.ty);
            }
            if let Some(getter) = prop.getter.filter(|_| prop.flags.contains(PropFlags::ACCESSOR)) {
                return call::emit_direct_call_with_result(self, getter, &[], Some(obj), span);
            }
            // Address of the stored property.
            let Some(base) = obj.any_reg() else { return Value::POISON };
            let prims = self.prims();
            let addr = if offset == 0 {
                base
            } else {
                self.b().bitwise(
                    Op::UAdd,
                    Operand::Reg(base, prims.u64),
                    Operand::Imm(Imm::UInt(u64::from(offset)), prims.u64),
                    prims.ptr,
                    span,
                )
            };
            let mut value = Value::pointer(addr, prop.ty).named(name);
            if !prop.flags.contains(PropFlags::WRITABLE) {
                value = value.with_flags(ValueFlags::CONST);
            }
            return value;
        }

        // A method referenced as a value.
        let methods = call::method_candidates(self, effective, &text);
        if !methods.is_empty() {
            return self.function_value(&methods, node);
        }

        self.error(
            ErrorCode::E2025,
            format!("`{}` has no member `{text}`", self.types.fqn(effective)),
            node,
        )
    }

    fn module_member(&mut self, module_id: tern_ir::ModuleId, name: Name, node: NodeId) -> Value {
        let text = self.interner.resolve(name).to_owned();
        let Some(source) = self.host.find_module_by_id(module_id) else {
            return Value::POISON;
        };
        let fn_ids: Vec<_> = source
            .functions
            .iter()
            .copied()
            .filter(|id| !id.is_null())
            .collect();
        let slot = source.data.iter().position(|d| d.name == text && d.access == Access::Public);

        let matching: Vec<_> = fn_ids
            .iter()
            .copied()
            .filter(|&id| {
                self.funcs
                    .get(id)
                    .map(|f| f.name == text && f.access == Access::Public)
                    .unwrap_or(false)
            })
            .collect();
        if let Some(slot) = slot {
            return self.module_slot_value(module_id, slot, false, node);
        }
        if !matching.is_empty() {
            return self.function_value(&matching, node);
        }
        self.error(ErrorCode::E2025, format!("module has no member `{text}`"), node)
    }

    fn static_member(&mut self, ty: TypeId, name: Name, node: NodeId) -> Value {
        let text = self.interner.resolve(name).to_owned();
        let effective = self.types.effective(ty);
        if let Some((prop, _)) = call::find_property(self, effective, name) {
            if prop.flags.contains(PropFlags::STATIC) {
                if !self.can_access(prop.access, effective) {
                    return self.error(
                        ErrorCode::E2008,
                        format!("`{text}` is private to `{}`", self.types.fqn(effective)),
                        node,
                    );
                }
                let span = self.node_span(node);
                let module_id = self
                    .types
                    .get(effective)
                    .and_then(|t| t.owner)
                    .unwrap_or(self.module.id);
                let ptr = self.prims().ptr;
                let addr = self.b().module_data(module_id, prop.offset, ptr, span);
                return Value::pointer(addr, prop.ty);
            }
        }
        let statics: Vec<_> = call::method_candidates(self, effective, &text)
            .into_iter()
            .filter(|&id| self.funcs.get(id).map(|f| !f.is_method).unwrap_or(false))
            .collect();
        if !statics.is_empty() {
            return self.function_value(&statics, node);
        }
        self.error(
            ErrorCode::E2025,
            format!("`{}` has no static member `{text}`", self.types.fqn(effective)),
            node,
        )
    }

    // ── Calls ────────────────────────────────────────────────────────

    fn compile_call(&mut self, id: NodeId) -> Value {
        let node = self.node(id);
        let span = self.node_span(id);
        let Some(callee_node_id) = node.lvalue else { return Value::POISON };
        let callee_node = self.node(callee_node_id);

        let args: Vec<Value> = self
            .siblings(node.parameters)
            .into_iter()
            .map(|arg| self.compile_expression(arg))
            .collect();
        self.cur_node = id;

        // Method call: `obj.name(args)`: the hint that member access
        // should produce a method, with `this` materialized from `obj`.
        if callee_node.kind == NodeKind::Expression && callee_node.op == Some(OpKind::Member) {
            let Some(obj_node) = callee_node.lvalue else { return Value::POISON };
            let obj = self.compile_expression(obj_node);
            let Some(name) = callee_node.name else { return Value::POISON };
            return self.compile_method_call(obj, name, &args, id, span);
        }

        // Free call through a name.
        if callee_node.kind == NodeKind::Identifier {
            let Some(name) = callee_node.name else { return Value::POISON };
            if name != self.names.this_ {
                match self.scopes.lookup(name).cloned() {
                    Some(Symbol::Function(ids)) => {
                        return self.dispatch_overloads(&ids, &args, None, id, span);
                    }
                    Some(Symbol::Type(_)) => {
                        let text = self.interner.resolve(name).to_owned();
                        return self.error(
                            ErrorCode::E2022,
                            format!("`{text}` is a type; use `new {text}(...)`"),
                            id,
                        );
                    }
                    None => {
                        // Methods of the enclosing class are callable
                        // unqualified.
                        if let Some(owner) = self.fn_ctx().owner {
                            let text = self.interner.resolve(name).to_owned();
                            let methods = call::method_candidates(self, owner, &text);
                            if !methods.is_empty() {
                                let this = self.this_value(id);
                                return self.dispatch_overloads(&methods, &args, Some(this), id, span);
                            }
                        }
                        // Builtins (`print`, host intrinsics) register
                        // under their bare name.
                        let text = self.interner.resolve(name).to_owned();
                        let builtins = self.funcs.by_fqn(&text).to_vec();
                        if !builtins.is_empty() {
                            return self.dispatch_overloads(&builtins, &args, None, id, span);
                        }
                        return self.error(ErrorCode::E2001, format!("`{text}` not found"), id);
                    }
                    _ => {}
                }
            }
        }

        // Anything else must evaluate to a callable value.
        let callee = self.compile_expression(callee_node_id);
        self.compile_indirect_call(callee, &args, id, span)
    }

    pub(crate) fn compile_method_call(
        &mut self,
        obj: Value,
        name: Name,
        args: &[Value],
        node: NodeId,
        span: Span,
    ) -> Value {
        if obj.is_poison() {
            return Value::POISON;
        }
        let text = self.interner.resolve(name).to_owned();

        if let ValueKind::Module(module_id) = obj.kind {
            let member = self.module_member(module_id, name, node);
            return self.compile_indirect_or_set(member, args, node, span);
        }
        if let ValueKind::Type(ty) = obj.kind {
            let member = self.static_member(ty, name, node);
            return self.compile_indirect_or_set(member, args, node, span);
        }
        if self.is_primitive(obj.ty) {
            return self.error(
                ErrorCode::E2025,
                format!("`{}` has no method `{text}`", self.types.fqn(obj.ty)),
                node,
            );
        }

        let effective = self.types.effective(obj.ty);
        let candidates = call::method_candidates(self, effective, &text);
        if candidates.is_empty() {
            // A function-typed property is callable.
            if call::find_property(self, effective, name).is_some() {
                let member = self.compile_member_value(obj, name, node);
                return self.compile_indirect_call(member, args, node, span);
            }
            return self.error(
                ErrorCode::E2025,
                format!("`{}` has no method `{text}`", self.types.fqn(effective)),
                node,
            );
        }
        self.dispatch_overloads(&candidates, args, Some(obj), node, span)
    }

    /// A member value that turned out to be a function reference or
    /// value: call it.
    fn compile_indirect_or_set(
        &mut self,
        member: Value,
        args: &[Value],
        node: NodeId,
        span: Span,
    ) -> Value {
        if member.is_poison() {
            return member;
        }
        if let ValueKind::Func(id) = member.kind {
            let is_method = self.funcs.get(id).map(|f| f.is_method).unwrap_or(false);
            let this = None;
            if is_method {
                return self.error(ErrorCode::E2022, "method requires an instance", node);
            }
            let ret = self.ret_dest_for(id, span);
            return call::emit_direct_call(self, id, args, this, ret, span);
        }
        self.compile_indirect_call(member, args, node, span)
    }

    /// Resolve an overload set (instantiating any template candidates
    /// first) and emit the call.
    pub(crate) fn dispatch_overloads(
        &mut self,
        ids: &[tern_ir::FunctionId],
        args: &[Value],
        this_val: Option<Value>,
        node: NodeId,
        span: Span,
    ) -> Value {
        let mut candidates = Vec::with_capacity(ids.len());
        for &id in ids {
            let (is_template, has_sig) = self
                .funcs
                .get(id)
                .map(|f| (f.is_template, f.signature.is_some()))
                .unwrap_or((false, false));
            if is_template {
                if let Some(instance) = self.instantiate_function_template(id, args, node) {
                    candidates.push(instance);
                }
            } else if has_sig {
                candidates.push(id);
            }
        }

        let Some(selected) = call::resolve_overload(
            self,
            &candidates,
            args,
            node,
            "overload",
            ErrorCode::E2004,
            ErrorCode::E2005,
        ) else {
            return Value::POISON;
        };

        let this = if self.funcs.get(selected).map(|f| f.is_method).unwrap_or(false) {
            this_val
        } else {
            None
        };
        let ret = self.ret_dest_for(selected, span);
        call::emit_direct_call(self, selected, args, this, ret, span)
    }

    /// Stack destination for a non-primitive return, bound to the
    /// current scope.
    pub(crate) fn ret_dest_for(&mut self, id: tern_ir::FunctionId, span: Span) -> Option<Value> {
        let ret = self
            .funcs
            .get(id)
            .and_then(|f| f.signature)
            .and_then(|s| self.types.get(s))
            .and_then(|t| t.signature())
            .map(|sig| sig.ret)?;
        if self.is_primitive(ret) || call::is_void(self, ret) {
            None
        } else {
            Some(self.stack_temp(ret, span))
        }
    }

    /// Call through a function-typed value (closure reference).
    fn compile_indirect_call(
        &mut self,
        callee: Value,
        args: &[Value],
        node: NodeId,
        span: Span,
    ) -> Value {
        if callee.is_poison() {
            return Value::POISON;
        }
        let is_function_type = matches!(
            self.types.effective_type(callee.ty).map(|t| &t.kind),
            Some(TypeKind::Function(_))
        );
        if !is_function_type {
            return self.error(
                ErrorCode::E2022,
                format!("`{}` is not callable", self.types.fqn(callee.ty)),
                node,
            );
        }
        let sig_ty = self.types.effective(callee.ty);
        let ret = self
            .types
            .get(sig_ty)
            .and_then(|t| t.signature())
            .map(|s| s.ret)
            .unwrap_or(TypeId::POISON);
        let dest = if self.is_primitive(ret) || call::is_void(self, ret) {
            None
        } else {
            Some(self.stack_temp(ret, span))
        };
        let loaded = self.rvalue(callee, span);
        call::emit_indirect_call(self, loaded, sig_ty, args, dest, span)
    }

    // ── Operators ────────────────────────────────────────────────────

    fn compile_binary(&mut self, id: NodeId) -> Value {
        let node = self.node(id);
        let span = self.node_span(id);
        let Some(op) = node.op else { return Value::POISON };
        let (Some(lhs_node), Some(rhs_node)) = (node.lvalue, node.rvalue) else {
            return Value::POISON;
        };

        // Short-circuit forms first; the right side must not evaluate
        // eagerly.
        if matches!(op, OpKind::LogAnd | OpKind::LogOr) {
            return self.compile_short_circuit(op, lhs_node, rhs_node, id, span);
        }

        let lhs = self.compile_expression(lhs_node);
        let rhs = self.compile_expression(rhs_node);
        if lhs.is_poison() || rhs.is_poison() {
            return Value::POISON;
        }

        // Class operands dispatch to operator overloads on the left side.
        if !self.is_primitive(lhs.ty) {
            let method = format!("operator{}", op_symbol(op));
            let effective = self.types.effective(lhs.ty);
            let candidates = call::method_candidates(self, effective, &method);
            if candidates.is_empty() {
                return self.error(
                    ErrorCode::E2027,
                    format!(
                        "`{}` does not define `{method}`",
                        self.types.fqn(effective)
                    ),
                    id,
                );
            }
            return self.dispatch_overloads(&candidates, &[rhs], Some(lhs), id, span);
        }
        if !self.is_primitive(rhs.ty) {
            return self.error(
                ErrorCode::E2027,
                format!(
                    "invalid operands `{}` and `{}`",
                    self.types.fqn(lhs.ty),
                    self.types.fqn(rhs.ty)
                ),
                id,
            );
        }

        self.primitive_binary(op, lhs, rhs, id, span)
    }

    pub(crate) fn primitive_binary(
        &mut self,
        op: OpKind,
        lhs: Value,
        rhs: Value,
        node: NodeId,
        span: Span,
    ) -> Value {
        let boolean = self.prims().boolean;
        let unified = self.unify_primitives(lhs.ty, rhs.ty);
        let lhs = self.convert_to(lhs, unified, false, node);
        let rhs = self.convert_to(rhs, unified, false, node);
        let lhs = self.rvalue(lhs, span);
        let rhs = self.rvalue(rhs, span);
        if lhs.is_poison() || rhs.is_poison() {
            return Value::POISON;
        }
        let class = self.type_class(unified);
        let a = self.b().operand(&lhs);
        let b = self.b().operand(&rhs);

        let (family, result_ty) = match op {
            OpKind::Add => (ArithOp::Add, unified),
            OpKind::Sub => (ArithOp::Sub, unified),
            OpKind::Mul => (ArithOp::Mul, unified),
            OpKind::Div => (ArithOp::Div, unified),
            OpKind::Mod => (ArithOp::Mod, unified),
            OpKind::Eq => (ArithOp::Eq, boolean),
            OpKind::NotEq => (ArithOp::Neq, boolean),
            OpKind::Less => (ArithOp::Lt, boolean),
            OpKind::LessEq => (ArithOp::Lte, boolean),
            OpKind::Greater => (ArithOp::Gt, boolean),
            OpKind::GreaterEq => (ArithOp::Gte, boolean),
            OpKind::Shl | OpKind::Shr | OpKind::BitAnd | OpKind::BitOr | OpKind::BitXor => {
                if matches!(class, TypeClass::Float | TypeClass::Double) {
                    return self.error(
                        ErrorCode::E2027,
                        "bitwise operators require integral operands",
                        node,
                    );
                }
                let bit_op = match op {
                    OpKind::Shl => Op::Shl,
                    OpKind::Shr => Op::Shr,
                    OpKind::BitAnd => Op::Band,
                    OpKind::BitOr => Op::Bor,
                    _ => Op::Xor,
                };
                let reg = self.b().bitwise(bit_op, a, b, unified, span);
                return Value::reg(reg, unified);
            }
            _ => {
                return self.error(ErrorCode::E2027, "invalid binary operator", node);
            }
        };
        let reg = self.b().binary(class, family, a, b, result_ty, span);
        Value::reg(reg, result_ty)
    }

    /// `&&` / `||` with branches and a reserved result register, so the
    /// right side only evaluates when needed.
    fn compile_short_circuit(
        &mut self,
        op: OpKind,
        lhs_node: NodeId,
        rhs_node: NodeId,
        id: NodeId,
        span: Span,
    ) -> Value {
        let boolean = self.prims().boolean;
        let lhs = self.compile_expression(lhs_node);
        let lhs = self.coerce_bool(lhs, lhs_node);
        if lhs.is_poison() {
            // Still compile the right side for its diagnostics.
            let rhs = self.compile_expression(rhs_node);
            let _ = self.coerce_bool(rhs, rhs_node);
            return Value::POISON;
        }

        let (result, _) = self.b().reserve(boolean, span);
        let l_rhs = self.b().alloc_label();
        let l_skip = self.b().alloc_label();
        let l_end = self.b().alloc_label();
        let cond = self.b().operand(&lhs);
        if op == OpKind::LogAnd {
            self.b().branch(cond, l_rhs, l_skip, span);
        } else {
            self.b().branch(cond, l_skip, l_rhs, span);
        }

        self.b().place_label(l_rhs, span);
        let rhs = self.compile_expression(rhs_node);
        let rhs = self.coerce_bool(rhs, rhs_node);
        if rhs.is_poison() {
            return Value::POISON;
        }
        let rhs_op = self.b().operand(&rhs);
        self.b().resolve(result, boolean, rhs_op, span);
        self.b().jump(l_end, span);

        self.b().place_label(l_skip, span);
        let short_val = Imm::UInt(u64::from(op == OpKind::LogOr));
        self.b()
            .resolve(result, boolean, Operand::Imm(short_val, boolean), span);
        self.b().place_label(l_end, span);
        let _ = id;
        Value::reg(result, boolean)
    }

    fn compile_unary(&mut self, id: NodeId) -> Value {
        let node = self.node(id);
        let span = self.node_span(id);
        let Some(operand_node) = node.lvalue else { return Value::POISON };
        let value = self.compile_expression(operand_node);
        if value.is_poison() {
            return Value::POISON;
        }

        match node.op {
            Some(OpKind::Not) => {
                let value = self.coerce_bool(value, operand_node);
                if value.is_poison() {
                    return Value::POISON;
                }
                let boolean = self.prims().boolean;
                let src = self.b().operand(&value);
                let reg = self.b().unary(Op::Not, src, boolean, span);
                Value::reg(reg, boolean)
            }
            Some(OpKind::Invert) => {
                if !self.is_primitive(value.ty)
                    || matches!(self.type_class(value.ty), TypeClass::Float | TypeClass::Double)
                {
                    return self.error(
                        ErrorCode::E2027,
                        "`~` requires an integral operand",
                        id,
                    );
                }
                let value = self.rvalue(value, span);
                let src = self.b().operand(&value);
                let reg = self.b().unary(Op::Inv, src, value.ty, span);
                Value::reg(reg, value.ty)
            }
            Some(OpKind::Negate) => {
                if !self.is_primitive(value.ty) {
                    let effective = self.types.effective(value.ty);
                    let candidates = call::method_candidates(self, effective, "operator-");
                    if !candidates.is_empty() {
                        return self.dispatch_overloads(&candidates, &[], Some(value), id, span);
                    }
                    return self.error(
                        ErrorCode::E2027,
                        format!("`{}` cannot be negated", self.types.fqn(value.ty)),
                        id,
                    );
                }
                let value = self.rvalue(value, span);
                let class = self.type_class(value.ty);
                let src = self.b().operand(&value);
                let reg = self.b().unary(class.op(ArithOp::Neg), src, value.ty, span);
                Value::reg(reg, value.ty)
            }
            _ => Value::POISON,
        }
    }

    fn compile_incdec(&mut self, id: NodeId) -> Value {
        let node = self.node(id);
        let span = self.node_span(id);
        let Some(target_node) = node.lvalue else { return Value::POISON };
        let target = self.compile_expression(target_node);
        if target.is_poison() {
            return Value::POISON;
        }
        if !target.is_pointer() || !self.is_primitive(target.ty) {
            return self.error(
                ErrorCode::E2027,
                "`++`/`--` require a numeric variable",
                id,
            );
        }
        let old = self.rvalue(target, span);
        let class = self.type_class(target.ty);
        let family = match node.op {
            Some(OpKind::PreInc | OpKind::PostInc) => ArithOp::Inc,
            _ => ArithOp::Dec,
        };
        let src = self.b().operand(&old);
        let new = self.b().unary(class.op(family), src, target.ty, span);
        let dst = self.b().operand(&target);
        self.b().store(Operand::Reg(new, target.ty), dst, span);

        match node.op {
            Some(OpKind::PreInc | OpKind::PreDec) => Value::reg(new, target.ty),
            _ => old,
        }
    }

    fn compile_assignment(&mut self, id: NodeId) -> Value {
        let node = self.node(id);
        let span = self.node_span(id);
        let Some(op) = node.op else { return Value::POISON };
        let (Some(target_node), Some(value_node)) = (node.lvalue, node.rvalue) else {
            return Value::POISON;
        };

        // Setter property: `obj.prop = value` routes through the setter.
        let target_info = self.node(target_node);
        if target_info.kind == NodeKind::Expression
            && target_info.op == Some(OpKind::Member)
            && op == OpKind::Assign
        {
            if let (Some(obj_node), Some(prop_name)) = (target_info.lvalue, target_info.name) {
                let obj = self.compile_expression(obj_node);
                if !obj.is_poison()
                    && !self.is_primitive(obj.ty)
                    && !matches!(obj.kind, ValueKind::Module(_) | ValueKind::Type(_))
                {
                    let effective = self.types.effective(obj.ty);
                    if let Some((prop, _)) = call::find_property(self, effective, prop_name) {
                        if let Some(setter) =
                            prop.setter.filter(|_| prop.flags.contains(PropFlags::ACCESSOR))
                        {
                            let value = self.compile_expression(value_node);
                            return call::emit_direct_call_with_result(
                                self,
                                setter,
                                &[value],
                                Some(obj),
                                span,
                            );
                        }
                    }
                }
                // Recompiled below through the general path; obj side
                // effects are assumed idempotent for plain addresses.
            }
        }

        let target = self.compile_expression(target_node);
        if target.is_poison() {
            // Compile the value anyway for its diagnostics.
            self.compile_expression(value_node);
            return Value::POISON;
        }

        let value = match op.compound_base() {
            None => self.compile_expression(value_node),
            Some(base) => {
                // Compound form: read-modify-write.
                let rhs = self.compile_expression(value_node);
                if matches!(base, OpKind::LogAnd | OpKind::LogOr) {
                    let lhs = self.rvalue(target, span);
                    let lhs = self.coerce_bool(lhs, target_node);
                    let rhs = self.coerce_bool(rhs, value_node);
                    if lhs.is_poison() || rhs.is_poison() {
                        return Value::POISON;
                    }
                    let boolean = self.prims().boolean;
                    let logic_op = if base == OpKind::LogAnd { Op::Land } else { Op::Lor };
                    let a = self.b().operand(&lhs);
                    let b = self.b().operand(&rhs);
                    let reg = self.b().bitwise(logic_op, a, b, boolean, span);
                    Value::reg(reg, boolean)
                } else {
                    let lhs = self.rvalue(target, span);
                    self.primitive_binary(base, lhs, rhs, id, span)
                }
            }
        };
        if value.is_poison() {
            return Value::POISON;
        }
        self.write(&target, value, id);
        value
    }

    // ── Conditional ──────────────────────────────────────────────────

    /// `a ? b : c` with the reserve/resolve idiom: the result register
    /// is reserved before the branch so both arms fulfil a single
    /// definition. A non-primitive result rewrites the reservation into
    /// a stack allocation and constructs each arm in place, keeping the
    /// temporary's address stable.
    fn compile_conditional(&mut self, id: NodeId) -> Value {
        let node = self.node(id);
        let span = self.node_span(id);
        let (Some(cond_node), Some(true_node), Some(false_node)) =
            (node.cond, node.lvalue, node.rvalue)
        else {
            return Value::POISON;
        };

        let cond = self.compile_expression(cond_node);
        let cond = self.coerce_bool(cond, cond_node);
        if cond.is_poison() {
            return Value::POISON;
        }

        let (result_reg, reserve_idx) = self.b().reserve(TypeId::POISON, span);
        let l_true = self.b().alloc_label();
        let l_false = self.b().alloc_label();
        let l_end = self.b().alloc_label();
        let cond_op = self.b().operand(&cond);
        self.b().branch(cond_op, l_true, l_false, span);

        // True arm decides the result type.
        self.b().place_label(l_true, span);
        let truthy = self.compile_expression(true_node);
        if truthy.is_poison() {
            return Value::POISON;
        }
        let result_ty = truthy.ty;

        let result = if self.is_primitive(result_ty) {
            // Patch the reservation's type now that it is known.
            let instr = Instruction::new(Op::Reserve, span)
                .with_operands(&[Operand::Reg(result_reg, result_ty)]);
            self.b().code.replace(reserve_idx, instr);

            let truthy = self.rvalue(truthy, span);
            let op = self.b().operand(&truthy);
            self.b().resolve(result_reg, result_ty, op, span);
            self.b().jump(l_end, span);

            self.b().place_label(l_false, span);
            let falsy = self.compile_expression(false_node);
            let falsy = self.convert_to(falsy, result_ty, false, false_node);
            let falsy = self.rvalue(falsy, span);
            if falsy.is_poison() {
                return Value::POISON;
            }
            let op = self.b().operand(&falsy);
            self.b().resolve(result_reg, result_ty, op, span);
            Value::reg(result_reg, result_ty)
        } else {
            // Rewrite the reservation into a stack allocation so the
            // temporary has a stable address in both arms.
            let size = self.size_of(result_ty).max(1);
            let alloc = self.b().code.alloc_stack_id();
            let ptr = self.prims().ptr;
            let instr = Instruction::new(Op::StackAllocate, span).with_operands(&[
                Operand::Reg(result_reg, ptr),
                Operand::Imm(Imm::UInt(u64::from(size)), result_ty),
                Operand::Imm(Imm::UInt(u64::from(alloc.0)), result_ty),
            ]);
            self.b().code.replace(reserve_idx, instr);
            let dest = Value::stack(alloc, result_reg, result_ty);
            self.scopes.bind_stack(dest);

            self.construct_object(dest, result_ty, &[truthy], true_node);
            self.b().jump(l_end, span);

            self.b().place_label(l_false, span);
            let falsy = self.compile_expression(false_node);
            if falsy.is_poison() {
                return Value::POISON;
            }
            self.construct_object(dest, result_ty, &[falsy], false_node);
            dest
        };

        self.b().place_label(l_end, span);
        result
    }

    // ── Misc ─────────────────────────────────────────────────────────

    fn compile_cast(&mut self, id: NodeId) -> Value {
        let node = self.node(id);
        let (Some(operand_node), Some(spec)) = (node.lvalue, node.data_type) else {
            return Value::POISON;
        };
        let value = self.compile_expression(operand_node);
        let target = self.resolve_type(spec);
        if value.is_poison() || target.is_poison() {
            return Value::POISON;
        }
        self.convert_to(value, target, true, id)
    }

    fn compile_sizeof(&mut self, id: NodeId) -> Value {
        let node = self.node(id);
        let Some(spec) = node.data_type else { return Value::POISON };
        let ty = self.resolve_type(spec);
        if ty.is_poison() {
            return Value::POISON;
        }
        Value::imm(Imm::UInt(u64::from(self.size_of(ty))), self.prims().u64)
    }

    fn compile_index(&mut self, id: NodeId) -> Value {
        let node = self.node(id);
        let span = self.node_span(id);
        let (Some(obj_node), Some(index_node)) = (node.lvalue, node.rvalue) else {
            return Value::POISON;
        };
        let obj = self.compile_expression(obj_node);
        let index = self.compile_expression(index_node);
        if obj.is_poison() || index.is_poison() {
            return Value::POISON;
        }
        if self.is_primitive(obj.ty) {
            return self.error(
                ErrorCode::E2028,
                format!("`{}` cannot be indexed", self.types.fqn(obj.ty)),
                id,
            );
        }
        let effective = self.types.effective(obj.ty);
        let candidates = call::method_candidates(self, effective, "operator[]");
        if candidates.is_empty() {
            return self.error(
                ErrorCode::E2028,
                format!("`{}` does not define `operator[]`", self.types.fqn(effective)),
                id,
            );
        }
        self.dispatch_overloads(&candidates, &[index], Some(obj), id, span)
    }

    fn compile_new_expression(&mut self, id: NodeId) -> Value {
        let node = self.node(id);
        let span = self.node_span(id);
        let Some(spec) = node.data_type else { return Value::POISON };
        let ty = self.resolve_type(spec);
        if ty.is_poison() {
            return Value::POISON;
        }
        let args: Vec<Value> = self
            .siblings(node.parameters)
            .into_iter()
            .map(|arg| self.compile_expression(arg))
            .collect();
        let dest = self.stack_temp(ty, span);
        self.construct_object(dest, ty, &args, id);
        dest
    }

    /// Arrow function: compiled as an anonymous module function. Locals
    /// of enclosing functions are not capturable; resolving one is a
    /// diagnostic (see `compile_identifier`).
    fn compile_arrow_function(&mut self, id: NodeId) -> Value {
        let node = self.node(id);
        let span = self.node_span(id);
        let ptr = self.prims().ptr;
        let void = self.prims().void;

        // Parameter types are required (no inference across the closure
        // boundary).
        let params = self.siblings(node.parameters);
        let mut arg_list: Vec<(ArgKind, TypeId)> = vec![
            (ArgKind::FuncPtr, ptr),
            (ArgKind::RetPtr, ptr),
            (ArgKind::ContextPtr, ptr),
        ];
        let mut param_names = Vec::with_capacity(params.len());
        for &param in &params {
            let param_node = self.node(param);
            let ty = match param_node.data_type {
                Some(spec) => self.resolve_type(spec),
                None => {
                    self.error(
                        ErrorCode::E2002,
                        "arrow function parameters require type annotations",
                        param,
                    );
                    return Value::POISON;
                }
            };
            if ty.is_poison() {
                return Value::POISON;
            }
            let kind = if self.is_primitive(ty) {
                ArgKind::Value
            } else {
                ArgKind::Pointer
            };
            param_names.push(param_node.name);
            arg_list.push((kind, ty));
        }

        let Some(body) = node.body else { return Value::POISON };
        let body_is_block = self.node(body).kind == NodeKind::Block;

        let builder = FuncBuilder::new(arg_list.len() as u32);
        let ctx = FnCtx {
            ret: void, // expression bodies infer below
            owner: None,
            args: arg_list.clone(),
            saw_return: false,
            scope_base: self.scopes.depth(),
        };
        self.push_function(builder, ctx);
        self.scopes.push(ScopeKind::Function);

        let first_explicit = self.fn_ctx().first_explicit();
        for (idx, name) in param_names.iter().enumerate() {
            let Some(name) = *name else { continue };
            let (kind, ty) = self.fn_ctx().args[(first_explicit as usize) + idx];
            let reg = RegId(first_explicit + idx as u32);
            let value = if kind == ArgKind::Value && self.is_primitive(ty) {
                let slot = self.stack_temp(ty, span);
                let dst = self.b().operand(&slot);
                self.b().store(Operand::Reg(reg, ty), dst, span);
                slot.named(name).with_flags(ValueFlags::ARGUMENT)
            } else {
                Value::pointer(reg, ty).named(name).with_flags(ValueFlags::ARGUMENT)
            };
            self.scopes.declare(name, Symbol::Value(value));
        }

        let ret_ty = if body_is_block {
            self.compile_statement(body);
            self.emit_scope_exit(span);
            self.b().ret(None, span);
            void
        } else {
            let value = self.compile_expression(body);
            let value = self.rvalue(value, span);
            self.emit_scope_exit(span);
            if value.is_poison() {
                self.b().ret(None, span);
                void
            } else if self.is_primitive(value.ty) {
                let op = self.b().operand(&value);
                self.b().ret(Some(op), span);
                value.ty
            } else {
                // Construct the result into the caller's return slot.
                let ret_reg = self.fn_ctx().ret_ptr_reg();
                let dest = Value::pointer(RegId(ret_reg), value.ty);
                self.construct_object(dest, value.ty, &[value], body);
                self.b().ret(None, span);
                value.ty
            }
        };
        self.scopes.pop();
        let (builder, _) = self.pop_function();

        let sig_ty = self.function_type(ret_ty, &arg_list);
        let name = self.anon_name();
        let mut function = ScriptFunction::new(name.clone(), format!("{}::{name}", self.module.name));
        function.signature = Some(sig_ty);
        function.module = Some(self.module.id);
        function.span = Some(span);
        function.code = Some(builder.code);
        let fn_id = self.funcs.register(function);
        self.module.add_function(fn_id);

        Value::function(fn_id, sig_ty)
    }

    /// Promote two primitive operand types to a common type.
    fn unify_primitives(&self, a: TypeId, b: TypeId) -> TypeId {
        if self.types.is_equal_to(a, b) {
            return self.types.effective(a);
        }
        let prims = self.prims();
        let class_a = self.type_class(a);
        let class_b = self.type_class(b);
        let float = |c: TypeClass| matches!(c, TypeClass::Float | TypeClass::Double);
        if float(class_a) || float(class_b) {
            return if class_a == TypeClass::Float && class_b == TypeClass::Float {
                prims.f32
            } else {
                prims.f64
            };
        }
        let size_a = self.size_of(a);
        let size_b = self.size_of(b);
        let size = size_a.max(size_b).max(4);
        let unsigned = (size_a >= size_b && class_a == TypeClass::Unsigned)
            || (size_b >= size_a && class_b == TypeClass::Unsigned);
        match (size, unsigned) {
            (8, true) => prims.u64,
            (8, false) => prims.i64,
            (_, true) => prims.u32,
            (_, false) => prims.i32,
        }
    }
}
