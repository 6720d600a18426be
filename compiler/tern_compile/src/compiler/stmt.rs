//! Statement compilation and the two top-level passes.

use super::{call, Compiler, FnCtx};
use crate::{FuncBuilder, ScopeKind, Symbol, Value, ValueFlags};
use tern_diagnostic::ErrorCode;
use tern_ir::{
    Imm, Instruction, LitValue, ModKind, Name, NodeId, NodeKind, Op, Operand, Span, TypeId,
};
use tern_types::{
    Access, ArgKind, ClassInfo, DataType, FunctionTemplate, MetaFlags, ScriptFunction,
    TemplateInfo, TypeKind, TypeMeta,
};
use tracing::trace;

impl Compiler<'_> {
    // ── Pass 1: symbol installation ──────────────────────────────────

    /// Install the symbols a top-level statement introduces, so forward
    /// references resolve during pass 2.
    pub(crate) fn install_symbols(&mut self, stmt: NodeId) {
        let node = self.node(stmt);
        match node.kind {
            NodeKind::Export => {
                let prev = self.exporting;
                self.exporting = true;
                if let Some(inner) = node.body {
                    self.install_symbols(inner);
                }
                self.exporting = prev;
            }
            NodeKind::Class => self.install_class_stub(stmt),
            // Aliases and function signatures resolve in pass 1b, once
            // every type stub exists; see `install_function_signatures`.
            _ => {}
        }
    }

    fn access(&self) -> Access {
        if self.exporting {
            Access::Public
        } else {
            Access::Private
        }
    }

    fn install_class_stub(&mut self, stmt: NodeId) {
        let node = self.node(stmt);
        let Some(name) = node.name else { return };
        let text = self.interner.resolve(name).to_owned();
        let fqn = format!("{}::{}", self.module.name, text);
        let access = self.access();

        if self.scopes.declared_in_current(name) {
            self.error(ErrorCode::E2026, format!("`{text}` is already defined"), stmt);
            return;
        }

        let template_params = self.siblings(node.template_parameters);
        let ty = if template_params.is_empty() {
            // Concrete class: an empty stub filled by pass 2.
            self.types.insert(DataType {
                id: TypeId::POISON,
                name: text,
                fqn,
                access,
                owner: Some(self.module.id),
                meta: TypeMeta::new(MetaFlags::TRIVIAL, 0),
                kind: TypeKind::Class(ClassInfo::default()),
            })
        } else {
            // Template: detach the defining subtree so it outlives this
            // parse.
            let params: Vec<Name> = template_params
                .iter()
                .filter_map(|&p| self.node(p).name)
                .collect();
            let mut arena = tern_ir::ParseArena::new();
            let root = self.arena().deep_clone_detached(stmt, &mut arena);
            self.types.insert(DataType {
                id: TypeId::POISON,
                name: text,
                fqn,
                access,
                owner: Some(self.module.id),
                meta: TypeMeta::new(MetaFlags::TEMPLATE, 0),
                kind: TypeKind::Template(TemplateInfo { arena, root, params }),
            })
        };
        self.module.types.push(ty);
        self.scopes.declare(name, Symbol::Type(ty));
    }

    /// Pass 1b: with every type stub installed, build function
    /// signatures and register stubs (overload sets accumulate).
    pub(crate) fn install_function_signatures(&mut self, statements: &[NodeId]) {
        for &stmt in statements {
            let node = self.node(stmt);
            match node.kind {
                NodeKind::Export => {
                    let prev = self.exporting;
                    self.exporting = true;
                    if let Some(inner) = node.body {
                        if self.node(inner).kind == NodeKind::Function {
                            self.register_function_stub(inner);
                        }
                    }
                    self.exporting = prev;
                }
                NodeKind::Function => {
                    self.register_function_stub(stmt);
                }
                NodeKind::TypeAlias => self.resolve_type_alias(stmt),
                _ => {}
            }
        }
    }

    fn resolve_type_alias(&mut self, stmt: NodeId) {
        let node = self.node(stmt);
        let (Some(name), Some(spec)) = (node.name, node.data_type) else {
            return;
        };
        let target = self.resolve_type(spec);
        if target.is_poison() {
            return;
        }
        let text = self.interner.resolve(name).to_owned();
        let size = self.size_of(target);
        let alias = self.types.insert(DataType {
            id: TypeId::POISON,
            name: text.clone(),
            fqn: format!("{}::{}", self.module.name, text),
            access: self.access(),
            owner: Some(self.module.id),
            meta: TypeMeta::new(MetaFlags::ALIAS, size),
            kind: TypeKind::Alias { target },
        });
        self.module.types.push(alias);
        self.scopes.declare(name, Symbol::Type(alias));
    }

    /// Register a function declaration: signature type, registry entry,
    /// overload-set symbol. Template functions register without a
    /// signature, carrying their defining subtree instead.
    pub(crate) fn register_function_stub(&mut self, stmt: NodeId) -> Option<tern_ir::FunctionId> {
        let node = self.node(stmt);
        let name = node.name?;
        let text = self.interner.resolve(name).to_owned();
        let fqn = format!("{}::{}", self.module.name, text);
        let span = self.node_span(stmt);

        let template_params = self.siblings(node.template_parameters);
        let mut function = ScriptFunction::new(text.clone(), fqn);
        function.access = self.access();
        function.module = Some(self.module.id);
        function.span = Some(span);

        if template_params.is_empty() {
            let (sig_ty, display) = self.build_signature(stmt, None)?;
            function.signature = Some(sig_ty);
            function.display_name = display;
        } else {
            function.is_template = true;
            let params: Vec<Name> = template_params
                .iter()
                .filter_map(|&p| self.node(p).name)
                .collect();
            let mut arena = tern_ir::ParseArena::new();
            let root = self.arena().deep_clone_detached(stmt, &mut arena);
            function.template = Some(FunctionTemplate { arena, root, params });
            function.display_name = format!("{text}<...>");
        }

        let id = self.funcs.register(function);
        self.module.add_function(id);
        self.fn_stubs.insert(stmt, id);

        match self.scopes.lookup(name).cloned() {
            Some(Symbol::Function(mut ids)) => {
                ids.push(id);
                self.scopes.declare(name, Symbol::Function(ids));
            }
            Some(_) => {
                self.error(ErrorCode::E2026, format!("`{text}` is already defined"), stmt);
            }
            None => self.scopes.declare(name, Symbol::Function(vec![id])),
        }
        Some(id)
    }

    /// Build the signature type for a function node: implicit prefix
    /// (`func_ptr`, `ret_ptr`, `ctx_ptr`, and `this_ptr` for methods)
    /// followed by the declared arguments. Returns the signature type id
    /// and a display name.
    pub(crate) fn build_signature(
        &mut self,
        stmt: NodeId,
        owner: Option<TypeId>,
    ) -> Option<(TypeId, String)> {
        let node = self.node(stmt);
        let ptr = self.prims().ptr;
        let void = self.prims().void;

        let ret = match node.data_type {
            Some(spec) => self.resolve_type(spec),
            None => void,
        };

        let mut args: Vec<(ArgKind, TypeId)> = vec![
            (ArgKind::FuncPtr, ptr),
            (ArgKind::RetPtr, ptr),
            (ArgKind::ContextPtr, ptr),
        ];
        if let Some(owner) = owner {
            args.push((ArgKind::ThisPtr, owner));
        }

        let mut display_args = Vec::new();
        for param in self.siblings(node.parameters) {
            let param_node = self.node(param);
            let ty = match param_node.data_type {
                Some(spec) => self.resolve_type(spec),
                None => {
                    self.error(
                        ErrorCode::E2002,
                        "parameter requires a type annotation",
                        param,
                    );
                    TypeId::POISON
                }
            };
            let kind = if self.is_primitive(ty) {
                ArgKind::Value
            } else {
                ArgKind::Pointer
            };
            display_args.push(self.types.fqn(ty).to_owned());
            args.push((kind, ty));
        }

        let sig_ty = self.function_type(ret, &args);
        let name = node
            .name
            .map(|n| self.interner.resolve(n).to_owned())
            .unwrap_or_default();
        Some((sig_ty, format!("{}({})", name, display_args.join(", "))))
    }

    // ── Pass 2: statement compilation ────────────────────────────────

    pub(crate) fn compile_statement(&mut self, stmt: NodeId) {
        self.cur_node = stmt;
        let node = self.node(stmt);
        trace!(kind = ?node.kind, "compile statement");
        match node.kind {
            NodeKind::Root => {}
            NodeKind::Error => {} // already diagnosed by the parser
            NodeKind::Block => self.compile_block(stmt),
            NodeKind::Variable => self.compile_variable(stmt),
            NodeKind::ObjectDecompositor => self.compile_decompositor(stmt),
            NodeKind::Class => self.compile_class_statement(stmt),
            NodeKind::Function => {
                self.compile_function_statement(stmt);
            }
            NodeKind::TypeAlias => {
                // Registered during pass 1b at module root; nested
                // aliases resolve here.
                if !self.at_module_root() {
                    self.resolve_type_alias(stmt);
                }
            }
            NodeKind::Import => self.compile_import(stmt),
            NodeKind::Export => self.compile_export(stmt),
            NodeKind::If => self.compile_if(stmt),
            NodeKind::WhileLoop => self.compile_while(stmt),
            NodeKind::DoWhileLoop => self.compile_do_while(stmt),
            NodeKind::ForLoop => self.compile_for(stmt),
            NodeKind::Switch => self.compile_switch(stmt),
            NodeKind::Try => self.compile_try(stmt),
            NodeKind::Throw => self.compile_throw(stmt),
            NodeKind::Return => self.compile_return(stmt),
            NodeKind::Break => self.compile_break(stmt),
            NodeKind::Continue => self.compile_continue(stmt),
            NodeKind::New if node.lvalue.is_some() => self.compile_placement_new(stmt),
            _ => {
                // Expression statement.
                self.compile_expression(stmt);
            }
        }
    }

    fn compile_block(&mut self, stmt: NodeId) {
        let node = self.node(stmt);
        self.scopes.push(ScopeKind::Plain);
        for child in self.siblings(node.body) {
            self.compile_statement(child);
        }
        let span = self.node_span(stmt);
        self.emit_scope_exit(span);
        self.scopes.pop();
    }

    fn compile_class_statement(&mut self, stmt: NodeId) {
        let node = self.node(stmt);
        if !self.siblings(node.template_parameters).is_empty() {
            // Template bodies compile at instantiation time.
            return;
        }
        let Some(name) = node.name else { return };
        let Some(Symbol::Type(ty)) = self.scopes.lookup(name).cloned() else {
            // Nested class: install + compile in place.
            self.install_class_stub(stmt);
            if let Some(Symbol::Type(ty)) = self.scopes.lookup(name).cloned() {
                self.compile_class_body(stmt, ty);
            }
            return;
        };
        self.compile_class_body(stmt, ty);
    }

    fn compile_function_statement(&mut self, stmt: NodeId) {
        match self.fn_stubs.get(&stmt).copied() {
            Some(id) => {
                let is_template = self
                    .funcs
                    .get(id)
                    .map(|f| f.is_template)
                    .unwrap_or(false);
                if !is_template {
                    self.compile_function_body(stmt, id, None);
                }
            }
            None => {
                // Nested function declaration: register and compile here.
                if let Some(id) = self.register_function_stub(stmt) {
                    let is_template = self
                        .funcs
                        .get(id)
                        .map(|f| f.is_template)
                        .unwrap_or(false);
                    if !is_template {
                        self.compile_function_body(stmt, id, None);
                    }
                }
            }
        }
    }

    /// Compile a function body for an already-registered function.
    pub(crate) fn compile_function_body(
        &mut self,
        stmt: NodeId,
        id: tern_ir::FunctionId,
        owner: Option<TypeId>,
    ) {
        let node = self.node(stmt);
        let span = self.node_span(stmt);
        let Some(sig_ty) = self.funcs.get(id).and_then(|f| f.signature) else {
            return;
        };
        let Some(sig) = self.types.get(sig_ty).and_then(|t| t.signature()).cloned() else {
            return;
        };

        let args: Vec<(ArgKind, TypeId)> = sig.args.iter().map(|a| (a.kind, a.ty)).collect();
        let builder = FuncBuilder::new(args.len() as u32);
        let ctx = FnCtx {
            ret: sig.ret,
            owner,
            args,
            saw_return: false,
            scope_base: self.scopes.depth(),
        };
        self.push_function(builder, ctx);
        self.scopes.push(ScopeKind::Function);

        // Prologue: bind parameters. Primitive by-value arguments are
        // copied into stack slots so assignment through the name works;
        // by-reference arguments bind their address register directly.
        let first_explicit = self.fn_ctx().first_explicit();
        let params = self.siblings(node.parameters);
        for (idx, &param) in params.iter().enumerate() {
            let param_node = self.node(param);
            let Some(param_name) = param_node.name else { continue };
            let reg = tern_ir::RegId(first_explicit + idx as u32);
            let (kind, ty) = self.fn_ctx().args[(first_explicit as usize) + idx];
            let value = if kind == ArgKind::Value && self.is_primitive(ty) {
                let slot = self.stack_temp(ty, span);
                let src = Operand::Reg(reg, ty);
                let dst = self.b().operand(&slot);
                self.b().store(src, dst, span);
                slot.named(param_name).with_flags(ValueFlags::ARGUMENT)
            } else {
                Value::pointer(reg, ty)
                    .named(param_name)
                    .with_flags(ValueFlags::ARGUMENT)
            };
            self.scopes.declare(param_name, Symbol::Value(value));
        }

        if let Some(body) = node.body {
            self.compile_statement(body);
        }

        // Fall-off-the-end path.
        let void = self.prims().void;
        let ctx_ret = self.fn_ctx().ret;
        let saw_return = self.fn_ctx().saw_return;
        if !self.types.is_equal_to(ctx_ret, void) && !saw_return {
            self.error(
                ErrorCode::E2012,
                format!(
                    "function must return a value of type `{}`",
                    self.types.fqn(ctx_ret)
                ),
                stmt,
            );
        }
        self.emit_scope_exit(span);
        self.scopes.pop();
        self.b().ret(None, span);

        let (builder, _) = self.pop_function();
        if let Some(function) = self.funcs.get_mut(id) {
            function.code = Some(builder.code);
        }
    }

    // ── Variables ────────────────────────────────────────────────────

    fn compile_variable(&mut self, stmt: NodeId) {
        let node = self.node(stmt);
        let Some(name) = node.name else { return };
        let is_const = self.has_modifier(node.modifier, ModKind::Const);
        let span = self.node_span(stmt);

        // The declared or inferred type.
        let annotated = node.data_type.map(|spec| self.resolve_type(spec));

        // A `new T(...)` initializer constructs directly into the
        // variable's storage instead of building a temporary first.
        if let Some(init) = node.initializer {
            let init_node = self.node(init);
            if init_node.kind == NodeKind::New && init_node.lvalue.is_none() {
                self.compile_variable_from_new(stmt, name, is_const, annotated, init, span);
                return;
            }
        }

        let init_value = node.initializer.map(|init| self.compile_expression(init));

        let ty = match (annotated, &init_value) {
            (Some(ty), _) => ty,
            (None, Some(v)) if !v.is_poison() => v.ty,
            (None, Some(_)) => return, // poisoned initializer, already reported
            (None, None) => {
                self.error(
                    ErrorCode::E2002,
                    "variable needs a type annotation or an initializer",
                    stmt,
                );
                return;
            }
        };
        if ty.is_poison() {
            return;
        }

        // A fresh non-primitive temporary (call result, conditional)
        // becomes the variable directly: the binding takes over the
        // temporary's storage and destructor responsibility instead of
        // copy-constructing. Named values never take this path, so two
        // variables cannot alias.
        if !self.at_module_root() {
            if let Some(v) = init_value {
                if v.flags.contains(ValueFlags::STACK_BOUND)
                    && v.name.is_none()
                    && !self.is_primitive(v.ty)
                    && annotated
                        .map(|a| self.types.is_equal_to(a, v.ty))
                        .unwrap_or(true)
                {
                    let mut value = v.named(name);
                    if is_const {
                        value = value.with_flags(ValueFlags::CONST);
                    }
                    self.scopes.declare(name, Symbol::Value(value));
                    return;
                }
            }
        }

        if self.at_module_root() {
            // Module-level variable: a typed global slot, initialized by
            // `__init__`.
            let size = self.size_of(ty).max(1);
            let slot = self.module.add_data(
                self.interner.resolve(name),
                ty,
                size,
                self.access(),
            );
            let offset = self.module.data[slot].offset;
            let module_id = self.module.id;
            let ptr = self.prims().ptr;
            let addr = self.b().module_data(module_id, offset, ptr, span);
            let dest = Value::pointer(addr, ty);
            match init_value {
                Some(v) => self.construct_object(dest, ty, &[v], stmt),
                None => self.construct_object(dest, ty, &[], stmt),
            }
            self.scopes
                .declare(name, Symbol::ModuleSlot(module_id, slot, is_const));
        } else {
            let slot = self.stack_temp(ty, span);
            match init_value {
                Some(v) => self.construct_object(slot, ty, &[v], stmt),
                None => self.construct_object(slot, ty, &[], stmt),
            }
            let mut value = slot.named(name);
            if is_const {
                value = value.with_flags(ValueFlags::CONST);
            }
            self.scopes.declare(name, Symbol::Value(value));
        }
    }

    /// `let x = new T(args);`: allocate the variable's storage and
    /// construct in place.
    fn compile_variable_from_new(
        &mut self,
        stmt: NodeId,
        name: Name,
        is_const: bool,
        annotated: Option<TypeId>,
        init: NodeId,
        span: Span,
    ) {
        let init_node = self.node(init);
        let Some(spec) = init_node.data_type else { return };
        let new_ty = self.resolve_type(spec);
        if new_ty.is_poison() {
            return;
        }
        if let Some(annotated) = annotated {
            if !annotated.is_poison() && !self.types.is_equal_to(annotated, new_ty) {
                self.error(
                    ErrorCode::E2023,
                    format!(
                        "cannot initialize `{}` with `new {}`",
                        self.types.fqn(annotated),
                        self.types.fqn(new_ty)
                    ),
                    stmt,
                );
                return;
            }
        }
        let args: Vec<crate::Value> = self
            .siblings(init_node.parameters)
            .into_iter()
            .map(|arg| self.compile_expression(arg))
            .collect();

        if self.at_module_root() {
            let size = self.size_of(new_ty).max(1);
            let slot = self
                .module
                .add_data(self.interner.resolve(name), new_ty, size, self.access());
            let offset = self.module.data[slot].offset;
            let module_id = self.module.id;
            let ptr = self.prims().ptr;
            let addr = self.b().module_data(module_id, offset, ptr, span);
            let dest = Value::pointer(addr, new_ty);
            self.construct_object(dest, new_ty, &args, init);
            self.scopes
                .declare(name, Symbol::ModuleSlot(module_id, slot, is_const));
        } else {
            let slot = self.stack_temp(new_ty, span);
            self.construct_object(slot, new_ty, &args, init);
            let mut value = slot.named(name);
            if is_const {
                value = value.with_flags(ValueFlags::CONST);
            }
            self.scopes.declare(name, Symbol::Value(value));
        }
    }

    fn compile_decompositor(&mut self, stmt: NodeId) {
        let node = self.node(stmt);
        let Some(init) = node.initializer else { return };
        let source = self.compile_expression(init);
        if source.is_poison() {
            return;
        }
        if self.is_primitive(source.ty) {
            self.error(
                ErrorCode::E2025,
                format!("`{}` has no members to decompose", self.types.fqn(source.ty)),
                stmt,
            );
            return;
        }
        let is_const = self.has_modifier(node.modifier, ModKind::Const);
        let span = self.node_span(stmt);

        for binding in self.siblings(node.parameters) {
            let Some(name) = self.node(binding).name else { continue };
            let member = self.compile_member_value(source, name, binding);
            if member.is_poison() {
                continue;
            }
            let slot = self.stack_temp(member.ty, span);
            self.construct_object(slot, member.ty, &[member], binding);
            let mut value = slot.named(name);
            if is_const {
                value = value.with_flags(ValueFlags::CONST);
            }
            self.scopes.declare(name, Symbol::Value(value));
        }
    }

    pub(crate) fn has_modifier(&self, first: Option<NodeId>, kind: ModKind) -> bool {
        self.arena()
            .siblings(first)
            .any(|m| self.arena().get(m).modifier_kind == Some(kind))
    }

    // ── Control flow ─────────────────────────────────────────────────

    fn compile_if(&mut self, stmt: NodeId) {
        let node = self.node(stmt);
        let span = self.node_span(stmt);
        let Some(cond) = node.cond else { return };
        let cond_val = self.compile_expression(cond);
        let cond_val = self.coerce_bool(cond_val, cond);

        let l_true = self.b().alloc_label();
        let l_end = self.b().alloc_label();
        let l_false = if node.else_body.is_some() {
            self.b().alloc_label()
        } else {
            l_end
        };

        if !cond_val.is_poison() {
            let op = self.b().operand(&cond_val);
            self.b().branch(op, l_true, l_false, span);
        }
        self.b().place_label(l_true, span);
        if let Some(body) = node.body {
            self.compile_statement(body);
        }
        if let Some(else_body) = node.else_body {
            self.b().jump(l_end, span);
            self.b().place_label(l_false, span);
            self.compile_statement(else_body);
        }
        self.b().place_label(l_end, span);
    }

    fn compile_while(&mut self, stmt: NodeId) {
        let node = self.node(stmt);
        let span = self.node_span(stmt);
        let l_header = self.b().alloc_label();
        let l_body = self.b().alloc_label();
        let l_break = self.b().alloc_label();

        self.b().place_label(l_header, span);
        if let Some(cond) = node.cond {
            let cond_val = self.compile_expression(cond);
            let cond_val = self.coerce_bool(cond_val, cond);
            if !cond_val.is_poison() {
                let op = self.b().operand(&cond_val);
                self.b().branch(op, l_body, l_break, span);
            }
        }
        self.b().place_label(l_body, span);

        self.scopes.push(ScopeKind::Loop {
            continue_label: l_header,
            break_label: l_break,
        });
        if let Some(body) = node.body {
            self.compile_statement(body);
        }
        self.emit_scope_exit(span);
        self.scopes.pop();

        self.b().jump(l_header, span);
        self.b().place_label(l_break, span);
    }

    fn compile_do_while(&mut self, stmt: NodeId) {
        let node = self.node(stmt);
        let span = self.node_span(stmt);
        let l_body = self.b().alloc_label();
        let l_cond = self.b().alloc_label();
        let l_break = self.b().alloc_label();

        self.b().place_label(l_body, span);
        self.scopes.push(ScopeKind::Loop {
            continue_label: l_cond,
            break_label: l_break,
        });
        if let Some(body) = node.body {
            self.compile_statement(body);
        }
        self.emit_scope_exit(span);
        self.scopes.pop();

        self.b().place_label(l_cond, span);
        if let Some(cond) = node.cond {
            let cond_val = self.compile_expression(cond);
            let cond_val = self.coerce_bool(cond_val, cond);
            if !cond_val.is_poison() {
                let op = self.b().operand(&cond_val);
                self.b().branch(op, l_body, l_break, span);
            }
        }
        self.b().place_label(l_break, span);
    }

    fn compile_for(&mut self, stmt: NodeId) {
        let node = self.node(stmt);
        let span = self.node_span(stmt);

        // The initializer lives in its own scope that survives the loop.
        self.scopes.push(ScopeKind::Plain);
        if let Some(init) = node.initializer {
            self.compile_statement(init);
        }

        let l_header = self.b().alloc_label();
        let l_body = self.b().alloc_label();
        let l_post = self.b().alloc_label();
        let l_break = self.b().alloc_label();

        self.b().place_label(l_header, span);
        match node.cond {
            Some(cond) => {
                let cond_val = self.compile_expression(cond);
                let cond_val = self.coerce_bool(cond_val, cond);
                if !cond_val.is_poison() {
                    let op = self.b().operand(&cond_val);
                    self.b().branch(op, l_body, l_break, span);
                }
            }
            None => {} // falls through to the body
        }
        self.b().place_label(l_body, span);

        self.scopes.push(ScopeKind::Loop {
            continue_label: l_post,
            break_label: l_break,
        });
        if let Some(body) = node.body {
            self.compile_statement(body);
        }
        self.emit_scope_exit(span);
        self.scopes.pop();

        // The post-expression evaluates before the back-edge.
        self.b().place_label(l_post, span);
        if let Some(post) = node.rvalue {
            self.compile_expression(post);
        }
        self.b().jump(l_header, span);

        self.b().place_label(l_break, span);
        self.emit_scope_exit(span);
        self.scopes.pop();
    }

    fn compile_switch(&mut self, stmt: NodeId) {
        let node = self.node(stmt);
        let span = self.node_span(stmt);
        let Some(cond) = node.cond else { return };
        let subject = self.compile_expression(cond);
        let subject = self.rvalue(subject, span);
        if subject.is_poison() {
            return;
        }
        if !self.is_primitive(subject.ty) {
            self.error(
                ErrorCode::E2027,
                format!("`{}` cannot be switched on", self.types.fqn(subject.ty)),
                cond,
            );
            return;
        }

        let cases = self.siblings(node.body);
        let l_break = self.b().alloc_label();
        let mut case_labels = Vec::with_capacity(cases.len());
        let mut default_label = None;
        for &case in &cases {
            let label = self.b().alloc_label();
            case_labels.push(label);
            if self.node(case).cond.is_none() {
                default_label = Some(label);
            }
        }

        // Comparison chain.
        let class = self.type_class(subject.ty);
        for (idx, &case) in cases.iter().enumerate() {
            let Some(case_cond) = self.node(case).cond else { continue };
            let case_val = self.compile_expression(case_cond);
            let case_val = self.convert_to(case_val, subject.ty, false, case_cond);
            let case_val = self.rvalue(case_val, span);
            if case_val.is_poison() {
                continue;
            }
            let boolean = self.prims().boolean;
            let a = self.b().operand(&subject);
            let b = self.b().operand(&case_val);
            let cmp = self.b().binary(class, crate::ArithOp::Eq, a, b, boolean, span);
            let l_next = self.b().alloc_label();
            self.b()
                .branch(Operand::Reg(cmp, boolean), case_labels[idx], l_next, span);
            self.b().place_label(l_next, span);
        }
        self.b().jump(default_label.unwrap_or(l_break), span);

        // Case bodies, with fallthrough.
        self.scopes.push(ScopeKind::Switch { break_label: l_break });
        for (idx, &case) in cases.iter().enumerate() {
            self.b().place_label(case_labels[idx], span);
            for body_stmt in self.siblings(self.node(case).body) {
                self.compile_statement(body_stmt);
            }
        }
        self.emit_scope_exit(span);
        self.scopes.pop();
        self.b().place_label(l_break, span);
    }

    fn compile_try(&mut self, stmt: NodeId) {
        let node = self.node(stmt);
        let span = self.node_span(stmt);
        let l_catch = self.b().alloc_label();
        let l_end = self.b().alloc_label();

        // The register the VM deposits the thrown value into on unwind.
        let u64_ty = self.prims().u64;
        let catch_reg = self.b().alloc_reg();
        self.b().emit(
            Instruction::new(Op::TryBegin, span)
                .with_operands(&[Operand::Reg(catch_reg, u64_ty)])
                .with_labels(&[l_catch]),
        );

        if let Some(body) = node.body {
            self.compile_statement(body);
        }
        self.b().emit(Instruction::new(Op::TryEnd, span));
        self.b().jump(l_end, span);

        self.b().place_label(l_catch, span);
        if let Some(catch) = node.else_body {
            let catch_node = self.node(catch);
            self.scopes.push(ScopeKind::Plain);
            if let Some(param) = catch_node.parameters {
                let param_node = self.node(param);
                if let (Some(param_name), Some(spec)) = (param_node.name, param_node.data_type) {
                    let ty = self.resolve_type(spec);
                    if !ty.is_poison() {
                        let value = if self.is_primitive(ty) {
                            let slot = self.stack_temp(ty, span);
                            let dst = self.b().operand(&slot);
                            self.b().store(Operand::Reg(catch_reg, ty), dst, span);
                            slot.named(param_name)
                        } else {
                            // Non-primitive thrown values arrive by
                            // address.
                            Value::pointer(catch_reg, ty).named(param_name)
                        };
                        self.scopes.declare(param_name, Symbol::Value(value));
                    }
                }
            }
            if let Some(body) = catch_node.body {
                self.compile_statement(body);
            }
            self.emit_scope_exit(span);
            self.scopes.pop();
        }
        self.b().place_label(l_end, span);
    }

    fn compile_throw(&mut self, stmt: NodeId) {
        let node = self.node(stmt);
        let span = self.node_span(stmt);
        let Some(value_node) = node.rvalue else { return };
        let value = self.compile_expression(value_node);
        if value.is_poison() {
            return;
        }
        let value = if self.is_primitive(value.ty) {
            self.rvalue(value, span)
        } else {
            value
        };

        // Raising goes through the `__throw` intrinsic registered by the
        // embedding context.
        let throw_fns = self.funcs.by_fqn("__throw").to_vec();
        let Some(&throw_fn) = throw_fns.first() else {
            self.error(
                ErrorCode::E2001,
                "`throw` requires the runtime intrinsic `__throw`",
                stmt,
            );
            return;
        };
        let ty_imm = Value::imm(
            Imm::UInt(u64::from(self.types.effective(value.ty).0)),
            self.prims().u64,
        );
        self.emit_direct_call(throw_fn, &[value, ty_imm], None, None, span);
    }

    fn compile_return(&mut self, stmt: NodeId) {
        let node = self.node(stmt);
        let span = self.node_span(stmt);
        let ret_ty = self.fn_ctx().ret;
        let void = self.prims().void;
        self.fn_ctx_mut().saw_return = true;

        let result = match node.rvalue {
            Some(value_node) => {
                let value = self.compile_expression(value_node);
                if value.is_poison() {
                    None
                } else if self.types.is_equal_to(ret_ty, void) {
                    self.error(ErrorCode::E2012, "function does not return a value", stmt);
                    None
                } else if self.is_primitive(ret_ty) {
                    let converted = self.convert_to(value, ret_ty, false, value_node);
                    let converted = self.rvalue(converted, span);
                    Some(converted)
                } else {
                    // Construct directly into the caller-provided return
                    // storage.
                    let ret_reg = self.fn_ctx().ret_ptr_reg();
                    let dest = Value::pointer(tern_ir::RegId(ret_reg), ret_ty);
                    self.construct_object(dest, ret_ty, &[value], stmt);
                    None
                }
            }
            None => {
                if !self.types.is_equal_to(ret_ty, void) {
                    self.error(
                        ErrorCode::E2012,
                        format!("expected a return value of type `{}`", self.types.fqn(ret_ty)),
                        stmt,
                    );
                }
                None
            }
        };

        // Unwind every scope up to the function root before returning.
        if let Some(vals) = self
            .scopes
            .unwind_vals(|k| *k == ScopeKind::Function)
        {
            self.emit_destructions(&vals, span);
        }
        let op = result.map(|v| self.b().operand(&v));
        self.b().ret(op, span);
    }

    fn compile_break(&mut self, stmt: NodeId) {
        let span = self.node_span(stmt);
        let Some(label) = self.scopes.break_label() else {
            self.error(ErrorCode::E2014, "`break` outside of a loop", stmt);
            return;
        };
        let vals = self
            .scopes
            .unwind_vals(|k| matches!(k, ScopeKind::Loop { .. } | ScopeKind::Switch { .. }))
            .unwrap_or_default();
        self.emit_destructions(&vals, span);
        self.b().jump(label, span);
    }

    fn compile_continue(&mut self, stmt: NodeId) {
        let span = self.node_span(stmt);
        let Some((continue_label, _)) = self.scopes.loop_labels() else {
            self.error(ErrorCode::E2015, "`continue` outside of a loop", stmt);
            return;
        };
        let vals = self
            .scopes
            .unwind_vals(|k| matches!(k, ScopeKind::Loop { .. }))
            .unwrap_or_default();
        self.emit_destructions(&vals, span);
        self.b().jump(continue_label, span);
    }

    fn compile_placement_new(&mut self, stmt: NodeId) {
        let node = self.node(stmt);
        let (Some(spec), Some(target_node)) = (node.data_type, node.lvalue) else {
            return;
        };
        let ty = self.resolve_type(spec);
        let target = self.compile_expression(target_node);
        if ty.is_poison() || target.is_poison() {
            return;
        }
        if !target.is_pointer() {
            self.error(
                ErrorCode::E2027,
                "placement target must be addressable",
                target_node,
            );
            return;
        }
        if !self.types.is_equal_to(target.ty, ty) {
            self.error(
                ErrorCode::E2023,
                format!(
                    "placement target is `{}`, not `{}`",
                    self.types.fqn(target.ty),
                    self.types.fqn(ty)
                ),
                target_node,
            );
            return;
        }
        let args: Vec<Value> = self
            .siblings(node.parameters)
            .into_iter()
            .map(|arg| self.compile_expression(arg))
            .collect();
        self.construct_object(target, ty, &args, stmt);
    }

    // ── Imports / exports ────────────────────────────────────────────

    fn compile_import(&mut self, stmt: NodeId) {
        let node = self.node(stmt);
        if !self.at_module_root() {
            self.error(ErrorCode::E2020, "`import` is only allowed at module root", stmt);
            return;
        }
        let LitValue::Str(module_name) = node.value else { return };
        let module_text = self.interner.resolve(module_name).to_owned();
        let Some(source) = self.host.find_module(&module_text) else {
            self.error(
                ErrorCode::E2021,
                format!("module `{module_text}` not found"),
                stmt,
            );
            return;
        };
        let source_id = source.id;
        let source_functions = source.functions.clone();
        let source_data: Vec<(String, TypeId, Access)> = source
            .data
            .iter()
            .map(|d| (d.name.clone(), d.ty, d.access))
            .collect();

        for symbol in self.siblings(node.body) {
            let sym_node = self.node(symbol);
            let Some(sym_name) = sym_node.name else { continue };

            if sym_name == self.names.star {
                // `* as M` binds the module itself.
                let Some(alias) = sym_node.alias.and_then(|a| self.node(a).name) else {
                    continue;
                };
                self.scopes.declare(alias, Symbol::Module(source_id));
                continue;
            }

            let text = self.interner.resolve(sym_name).to_owned();
            let want_ty = sym_node.data_type.map(|spec| self.resolve_type(spec));

            // Candidate functions by name (public only), then data slots.
            let mut fn_matches: Vec<tern_ir::FunctionId> = source_functions
                .iter()
                .filter_map(|&id| self.funcs.get(id))
                .filter(|f| f.name == text && f.access == Access::Public)
                .map(|f| f.id)
                .collect();
            if let Some(want) = want_ty {
                fn_matches.retain(|&id| {
                    self.funcs
                        .get(id)
                        .and_then(|f| f.signature)
                        .map(|s| self.types.is_equal_to(s, want))
                        .unwrap_or(false)
                });
            }
            let data_match = source_data.iter().enumerate().find(|(_, (name, ty, access))| {
                name == &text
                    && *access == Access::Public
                    && want_ty.map(|w| self.types.is_equal_to(*ty, w)).unwrap_or(true)
            });

            let alias = sym_node
                .alias
                .and_then(|a| self.node(a).name)
                .unwrap_or(sym_name);

            let total = fn_matches.len() + usize::from(data_match.is_some());
            if total == 0 {
                self.error(
                    ErrorCode::E2017,
                    format!("`{text}` not found in module `{module_text}`"),
                    symbol,
                );
            } else if total > 1 {
                self.error(
                    ErrorCode::E2018,
                    format!("`{text}` is ambiguous in module `{module_text}`"),
                    symbol,
                );
                let span = self.node_span(symbol);
                for id in &fn_matches {
                    if let Some(f) = self.funcs.get(*id) {
                        let display = f.display_name.clone();
                        self.info(ErrorCode::E2018, format!("could be `{display}`"), span);
                    }
                }
                if data_match.is_some() {
                    self.info(ErrorCode::E2018, format!("could be the global `{text}`"), span);
                }
            } else if let Some((slot, _)) = data_match {
                self.scopes
                    .declare(alias, Symbol::ModuleSlot(source_id, slot, false));
            } else {
                self.scopes.declare(alias, Symbol::Function(fn_matches));
            }
        }
    }

    fn compile_export(&mut self, stmt: NodeId) {
        let node = self.node(stmt);
        if !self.at_module_root() {
            self.error(ErrorCode::E2016, "`export` is only allowed at module root", stmt);
            return;
        }
        let prev = self.exporting;
        self.exporting = true;
        if let Some(inner) = node.body {
            self.compile_statement(inner);
        }
        self.exporting = prev;
    }
}
