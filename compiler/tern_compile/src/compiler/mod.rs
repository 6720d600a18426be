//! The semantic compiler: two passes over the parse tree, producing a
//! [`Module`] of registered types, functions, and per-function IR.
//!
//! Pass 1 installs symbols (type stubs, templates, function stubs) so
//! forward references resolve inside `__init__`; pass 2 compiles every
//! top-level statement. Root-level non-declaration statements compile
//! into the module's synthetic `__init__` function, which populates the
//! module's data slots when the module is loaded.

mod class;
mod expr;
mod stmt;
mod template;

pub(crate) mod call;

use crate::{ArithOp, FuncBuilder, ScopeKind, ScopeStack, Symbol, TypeClass, Value};
use tern_diagnostic::{Diagnostic, Diagnostics, ErrorCode, Severity};
use tern_ir::{
    FunctionId, Imm, Name, NodeId, Operand, ParseArena, ParseNode, SourceMap, Span,
    StringInterner, TypeId,
};
use tern_module::Module;
use tern_parse::ParseTree;
use tern_types::{
    Access, ArgKind, FunctionRegistry, Primitive, TypeKind, TypeRegistry,
};
use tracing::debug;

/// Resolves module names for `import`; implemented by the embedding
/// context over its loaded-module set.
pub trait ModuleHost {
    fn find_module(&self, name: &str) -> Option<&Module>;

    fn find_module_by_id(&self, id: tern_ir::ModuleId) -> Option<&Module>;
}

/// A host with no modules (tests, single-module compilations).
pub struct NoModules;

impl ModuleHost for NoModules {
    fn find_module(&self, _name: &str) -> Option<&Module> {
        None
    }

    fn find_module_by_id(&self, _id: tern_ir::ModuleId) -> Option<&Module> {
        None
    }
}

/// Interned names the compiler keeps asking for.
pub(crate) struct KnownNames {
    pub this_: Name,
    pub constructor: Name,
    pub destructor: Name,
    pub star: Name,
}

impl KnownNames {
    fn new(interner: &StringInterner) -> KnownNames {
        KnownNames {
            this_: interner.intern("this"),
            constructor: interner.intern("constructor"),
            destructor: interner.intern("destructor"),
            star: interner.intern("*"),
        }
    }
}

/// Context of the function currently being compiled.
pub(crate) struct FnCtx {
    /// Declared return type.
    pub ret: TypeId,
    /// Owning class for methods.
    pub owner: Option<TypeId>,
    /// Full argument list (implicit prefix included); argument `i` is
    /// register `i`.
    pub args: Vec<(ArgKind, TypeId)>,
    /// Whether any `return` statement was compiled.
    pub saw_return: bool,
    /// Scope depth at function entry; resolving a local from below this
    /// depth (and above module scope) is a capture, which closures do
    /// not support.
    pub scope_base: usize,
}

impl FnCtx {
    /// Register index of the implicit `this` argument, if present.
    pub fn this_reg(&self) -> Option<u32> {
        self.args
            .iter()
            .position(|(kind, _)| *kind == ArgKind::ThisPtr)
            .map(|idx| idx as u32)
    }

    /// Register index of the implicit return pointer.
    pub fn ret_ptr_reg(&self) -> u32 {
        self.args
            .iter()
            .position(|(kind, _)| *kind == ArgKind::RetPtr)
            .unwrap_or(1) as u32
    }

    /// Register index of the first explicit argument.
    pub fn first_explicit(&self) -> u32 {
        self.args
            .iter()
            .position(|(kind, _)| !kind.is_implicit())
            .unwrap_or(self.args.len()) as u32
    }
}

/// The semantic compiler for one module.
pub struct Compiler<'a> {
    /// Arena 0 is the module's parse tree; template instantiations push
    /// their cloned arenas on top.
    arenas: Vec<ParseArena>,
    cur_arena: usize,
    pub(crate) types: &'a mut TypeRegistry,
    pub(crate) funcs: &'a mut FunctionRegistry,
    pub(crate) interner: &'a StringInterner,
    pub(crate) diags: &'a mut Diagnostics,
    pub(crate) host: &'a dyn ModuleHost,
    pub(crate) module: Module,
    pub(crate) scopes: ScopeStack,
    builders: Vec<FuncBuilder>,
    fn_stack: Vec<FnCtx>,
    pub(crate) names: KnownNames,
    /// Class whose members are being compiled; enables private access.
    pub(crate) current_class: Option<TypeId>,
    /// Set by `export` for the wrapped declaration.
    pub(crate) exporting: bool,
    /// Node currently being compiled; anchors diagnostics raised from
    /// deep inside call marshalling.
    pub(crate) cur_node: NodeId,
    /// Pass-1 function stubs: declaration node -> registered id.
    pub(crate) fn_stubs: rustc_hash::FxHashMap<NodeId, FunctionId>,
    anon_counter: u32,
    string_counter: u32,
}

/// Compile a parsed module.
///
/// Parse errors are forwarded into `diags`; compilation proceeds
/// regardless, substituting poison values where necessary, so a single
/// run reports as much as possible.
pub fn compile(
    tree: ParseTree,
    name: &str,
    path: &str,
    source: &str,
    types: &mut TypeRegistry,
    funcs: &mut FunctionRegistry,
    interner: &StringInterner,
    diags: &mut Diagnostics,
    host: &dyn ModuleHost,
) -> Module {
    debug!(module = name, "compiling module");
    for err in &tree.errors {
        diags.push(err.clone().into_diagnostic());
    }

    let mut module = Module::new(name, path);
    module.source_map = SourceMap::new(source);

    let names = KnownNames::new(interner);
    let root = tree.root;
    let mut compiler = Compiler {
        arenas: vec![tree.arena],
        cur_arena: 0,
        types,
        funcs,
        interner,
        diags,
        host,
        module,
        scopes: ScopeStack::new(),
        builders: Vec::new(),
        fn_stack: Vec::new(),
        names,
        current_class: None,
        exporting: false,
        cur_node: root,
        fn_stubs: rustc_hash::FxHashMap::default(),
        anon_counter: 0,
        string_counter: 0,
    };
    compiler.run(root);
    compiler.module
}

impl<'a> Compiler<'a> {
    fn run(&mut self, root: NodeId) {
        // Module (root) scope.
        self.scopes.push(ScopeKind::Function);

        // The synthetic module initializer: a free function, so three
        // implicit argument slots.
        let ptr = self.types.primitives().ptr;
        let void = self.types.primitives().void;
        self.builders.push(FuncBuilder::new(3));
        self.fn_stack.push(FnCtx {
            ret: void,
            owner: None,
            args: vec![
                (ArgKind::FuncPtr, ptr),
                (ArgKind::RetPtr, ptr),
                (ArgKind::ContextPtr, ptr),
            ],
            saw_return: false,
            scope_base: 0,
        });

        let statements: Vec<NodeId> = {
            let body = self.node(root).body;
            self.arena().siblings(body).collect()
        };

        // Pass 1: install symbols so forward references work. Type
        // stubs land first so that function signatures can refer to
        // types declared later in the file.
        for &stmt in &statements {
            self.install_symbols(stmt);
        }
        self.install_function_signatures(&statements);
        // Pass 2: compile.
        for &stmt in &statements {
            self.compile_statement(stmt);
        }

        // Finish __init__.
        let span = self.node(root).span;
        self.emit_scope_exit(span);
        self.scopes.pop();
        let builder = self.builders.pop().expect("init builder");
        self.fn_stack.pop();

        let init_sig = self.function_type(
            void,
            &[
                (ArgKind::FuncPtr, ptr),
                (ArgKind::RetPtr, ptr),
                (ArgKind::ContextPtr, ptr),
            ],
        );
        let mut init = tern_types::ScriptFunction::new(
            "__init__",
            format!("{}::__init__", self.module.name),
        );
        init.signature = Some(init_sig);
        init.module = Some(self.module.id);
        let mut code = builder.code;
        code.emit(
            tern_ir::Instruction::new(tern_ir::Op::Ret, span),
        );
        init.code = Some(code);
        let init_id = self.funcs.register(init);
        self.module.add_function(init_id);
        self.module.init = init_id;
    }

    // ── Node access ──────────────────────────────────────────────────

    pub(crate) fn arena(&self) -> &ParseArena {
        &self.arenas[self.cur_arena]
    }

    /// Clone out a node (nodes are small and flat; cloning sidesteps
    /// borrow conflicts with `&mut self` compilation calls).
    pub(crate) fn node(&self, id: NodeId) -> ParseNode {
        self.arena().get(id).clone()
    }

    pub(crate) fn node_span(&self, id: NodeId) -> Span {
        self.arena().full_span(id)
    }

    pub(crate) fn siblings(&self, first: Option<NodeId>) -> Vec<NodeId> {
        self.arena().siblings(first).collect()
    }

    /// Run `f` with a different arena current (template instantiation).
    pub(crate) fn with_arena<T>(
        &mut self,
        arena: ParseArena,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        self.arenas.push(arena);
        let saved = self.cur_arena;
        self.cur_arena = self.arenas.len() - 1;
        let result = f(self);
        self.cur_arena = saved;
        self.arenas.pop();
        result
    }

    // ── Diagnostics ──────────────────────────────────────────────────

    /// Record an error and return poison. Poisoned inputs are expected to
    /// be filtered by the caller before reaching here.
    pub(crate) fn error(&mut self, code: ErrorCode, message: impl Into<String>, node: NodeId) -> Value {
        let span = self.node_span(node);
        self.diags
            .push(Diagnostic::error(code, message, span).with_node(node));
        Value::POISON
    }

    pub(crate) fn info(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        self.diags.push(Diagnostic {
            severity: Severity::Info,
            code,
            message: message.into(),
            span,
            node: None,
        });
    }

    // ── Builders / function context ──────────────────────────────────

    pub(crate) fn b(&mut self) -> &mut FuncBuilder {
        self.builders.last_mut().expect("no active function builder")
    }

    pub(crate) fn fn_ctx(&self) -> &FnCtx {
        self.fn_stack.last().expect("no active function")
    }

    pub(crate) fn fn_ctx_mut(&mut self) -> &mut FnCtx {
        self.fn_stack.last_mut().expect("no active function")
    }

    pub(crate) fn push_function(&mut self, builder: FuncBuilder, ctx: FnCtx) {
        self.builders.push(builder);
        self.fn_stack.push(ctx);
    }

    pub(crate) fn pop_function(&mut self) -> (FuncBuilder, FnCtx) {
        let builder = self.builders.pop().expect("unbalanced function stack");
        let ctx = self.fn_stack.pop().expect("unbalanced function stack");
        (builder, ctx)
    }

    /// True when compiling a root-level statement of the module (the
    /// `__init__` body).
    pub(crate) fn at_module_root(&self) -> bool {
        self.builders.len() == 1 && self.scopes.is_root()
    }

    // ── Types ────────────────────────────────────────────────────────

    pub(crate) fn prims(&self) -> tern_types::PrimitiveIds {
        *self.types.primitives()
    }

    /// Numeric class of a type; drives typed op-code selection.
    pub(crate) fn type_class(&self, ty: TypeId) -> TypeClass {
        let Some(t) = self.types.effective_type(ty) else {
            return TypeClass::Signed;
        };
        if t.meta.is_floating_point() {
            if t.meta.size == 4 {
                TypeClass::Float
            } else {
                TypeClass::Double
            }
        } else if t.meta.is_unsigned() {
            TypeClass::Unsigned
        } else {
            TypeClass::Signed
        }
    }

    pub(crate) fn is_primitive(&self, ty: TypeId) -> bool {
        self.types
            .effective_type(ty)
            .map(|t| t.is_primitive())
            .unwrap_or(false)
    }

    pub(crate) fn is_function_type(&self, ty: TypeId) -> bool {
        matches!(
            self.types.effective_type(ty).map(|t| &t.kind),
            Some(TypeKind::Function(_))
        )
    }

    /// Find or create the function type for a signature.
    pub(crate) fn function_type(&mut self, ret: TypeId, args: &[(ArgKind, TypeId)]) -> TypeId {
        let sig = tern_types::Signature::new(
            ret,
            args.iter()
                .map(|&(kind, ty)| tern_types::FunctionArgument { kind, ty })
                .collect(),
        );
        let id = self.types.function_type(sig, &self.module.types);
        if !self.module.types.contains(&id) {
            self.module.types.push(id);
        }
        id
    }

    /// Resolve a type-specifier node to a type id, instantiating
    /// templates on demand. Poison (with a diagnostic) on failure.
    pub(crate) fn resolve_type(&mut self, spec: NodeId) -> TypeId {
        let node = self.node(spec);
        let Some(name) = node.name else {
            self.error(ErrorCode::E2002, "expected a type", spec);
            return TypeId::POISON;
        };

        // Template arguments resolve first (they are valid in any scope).
        let arg_specs = self.siblings(node.template_parameters);
        let mut args = Vec::with_capacity(arg_specs.len());
        for arg in arg_specs {
            let ty = self.resolve_type(arg);
            if ty.is_poison() {
                return TypeId::POISON;
            }
            args.push(ty);
        }

        let base = match self.scopes.lookup(name) {
            Some(Symbol::Type(ty)) => *ty,
            Some(_) => {
                let text = self.interner.resolve(name);
                self.error(ErrorCode::E2003, format!("`{text}` is not a type"), spec);
                return TypeId::POISON;
            }
            None => {
                // Primitives and registered builtins resolve by name.
                let text = self.interner.resolve(name);
                match self.types.by_fqn(text) {
                    Some(ty) => ty,
                    None => {
                        // Host-instantiated generics (`Array<i32>`) are
                        // cached under their instantiated names.
                        if !args.is_empty() {
                            let plain = self.types.instantiation_fqn(text, &args);
                            if let Some(ty) = self.types.by_fqn(&plain) {
                                return ty;
                            }
                            let namespaced = self
                                .types
                                .instantiation_fqn(&format!("builtin::{text}"), &args);
                            if let Some(ty) = self.types.by_fqn(&namespaced) {
                                return ty;
                            }
                        }
                        self.error(
                            ErrorCode::E2001,
                            format!("type `{text}` not found"),
                            spec,
                        );
                        return TypeId::POISON;
                    }
                }
            }
        };

        let is_template = matches!(
            self.types.get(base).map(|t| &t.kind),
            Some(TypeKind::Template(_))
        );
        if is_template {
            self.instantiate_class_template(base, &args, spec)
        } else if args.is_empty() {
            base
        } else {
            let fqn = self.types.fqn(base).to_owned();
            self.error(
                ErrorCode::E2010,
                format!("type `{fqn}` is not a template"),
                spec,
            );
            TypeId::POISON
        }
    }

    /// `sizeof` a type, or the size of a primitive literal.
    pub(crate) fn size_of(&self, ty: TypeId) -> u32 {
        self.types.size_of(ty)
    }

    // ── Value plumbing ───────────────────────────────────────────────

    /// Materialize a value for reading: loads primitives (and
    /// pointer-sized function references) out of their storage;
    /// non-primitives stay as addresses.
    pub(crate) fn rvalue(&mut self, value: Value, span: Span) -> Value {
        if value.is_poison() {
            return value;
        }
        if value.is_pointer() && (self.is_primitive(value.ty) || self.is_function_type(value.ty)) {
            let src = self.b().operand(&value);
            let reg = self.b().load(src, value.ty, span);
            let mut out = Value::reg(reg, value.ty);
            out.name = value.name;
            return out;
        }
        value
    }

    /// Store `val` into the storage backing `target`.
    pub(crate) fn write(&mut self, target: &Value, val: Value, node: NodeId) {
        if target.is_poison() || val.is_poison() {
            return;
        }
        if target.is_const() {
            let what = target
                .name
                .map(|n| self.interner.resolve(n).to_owned())
                .unwrap_or_else(|| "value".to_owned());
            self.error(ErrorCode::E2024, format!("cannot assign to constant `{what}`"), node);
            return;
        }
        if !target.is_pointer() {
            self.error(ErrorCode::E2027, "expression is not assignable", node);
            return;
        }
        let span = self.node_span(node);
        if self.is_primitive(target.ty) {
            let converted = self.convert_to(val, target.ty, false, node);
            let converted = self.rvalue(converted, span);
            if converted.is_poison() {
                return;
            }
            let val_op = self.b().operand(&converted);
            let dst = self.b().operand(target);
            self.b().store(val_op, dst, span);
        } else {
            // Non-primitive assignment constructs into the destination.
            self.construct_object(*target, target.ty, &[val], node);
        }
    }

    /// Coerce a value to `bool` for a branch condition.
    pub(crate) fn coerce_bool(&mut self, value: Value, node: NodeId) -> Value {
        if value.is_poison() {
            return value;
        }
        let boolean = self.prims().boolean;
        if self.types.is_equal_to(value.ty, boolean) {
            let span = self.node_span(node);
            return self.rvalue(value, span);
        }
        if !self.is_primitive(value.ty) {
            return self.error(
                ErrorCode::E2027,
                format!(
                    "`{}` cannot be used as a condition",
                    self.types.fqn(value.ty)
                ),
                node,
            );
        }
        // value != 0
        let span = self.node_span(node);
        let val = self.rvalue(value, span);
        let class = self.type_class(val.ty);
        let a = self.b().operand(&val);
        let zero = if matches!(class, TypeClass::Float | TypeClass::Double) {
            Operand::Imm(Imm::Float(0.0), val.ty)
        } else {
            Operand::Imm(Imm::UInt(0), val.ty)
        };
        let reg = self.b().binary(class, ArithOp::Neq, a, zero, boolean, span);
        Value::reg(reg, boolean)
    }

    /// Emit destructor calls + `stack_free` for a list of stack-bound
    /// values (already in emission order).
    pub(crate) fn emit_destructions(&mut self, vals: &[Value], span: Span) {
        for value in vals {
            let effective = self.types.effective(value.ty);
            let destructor = self
                .types
                .get(effective)
                .and_then(|t| t.class())
                .and_then(|c| c.destructor);
            if let Some(dtor) = destructor {
                self.emit_direct_call(dtor, &[], Some(*value), None, span);
            }
            if let Some(alloc) = value.stack_id() {
                self.b().stack_free(alloc, span);
            }
        }
    }

    /// Scope exit for the innermost scope (destructors LIFO, then
    /// frees), without popping the scope.
    pub(crate) fn emit_scope_exit(&mut self, span: Span) {
        let vals = self.scopes.current_stack_vals_rev();
        self.emit_destructions(&vals, span);
    }

    /// A fresh anonymous function name.
    pub(crate) fn anon_name(&mut self) -> String {
        self.anon_counter += 1;
        format!("$anon_{}", self.anon_counter)
    }

    /// A fresh string-literal data slot name.
    pub(crate) fn string_slot_name(&mut self) -> String {
        self.string_counter += 1;
        format!("$str_{}", self.string_counter)
    }

    /// Direct call helper exposed to scope-exit destructor emission;
    /// defined in `call.rs`.
    pub(crate) fn emit_direct_call(
        &mut self,
        callee: FunctionId,
        explicit_args: &[Value],
        this_val: Option<Value>,
        ret_dest: Option<Value>,
        span: Span,
    ) -> Value {
        call::emit_direct_call(self, callee, explicit_args, this_val, ret_dest, span)
    }

    /// Convert a value to a target type; defined in `call.rs`.
    pub(crate) fn convert_to(
        &mut self,
        value: Value,
        target: TypeId,
        explicit: bool,
        node: NodeId,
    ) -> Value {
        call::convert_to(self, value, target, explicit, node)
    }

    /// Construct into `dest`; defined in `call.rs`.
    pub(crate) fn construct_object(
        &mut self,
        dest: Value,
        ty: TypeId,
        args: &[Value],
        node: NodeId,
    ) {
        call::construct_object(self, dest, ty, args, node)
    }

    /// Instantiate a class template; defined in `template.rs`.
    pub(crate) fn instantiate_class_template(
        &mut self,
        template: TypeId,
        args: &[TypeId],
        node: NodeId,
    ) -> TypeId {
        template::instantiate_class_template(self, template, args, node)
    }

    /// Allocate a stack temporary of `ty`, bound to the current scope.
    pub(crate) fn stack_temp(&mut self, ty: TypeId, span: Span) -> Value {
        let size = self.size_of(ty).max(1);
        let ptr = self.prims().ptr;
        let (alloc, addr) = self.b().stack_allocate(size, ty, span, ptr);
        let value = Value::stack(alloc, addr, ty);
        self.scopes.bind_stack(value);
        value
    }

    /// The `this` value inside a method, or a diagnostic outside one.
    pub(crate) fn this_value(&mut self, node: NodeId) -> Value {
        let ctx = self.fn_ctx();
        match (ctx.owner, ctx.this_reg()) {
            (Some(owner), Some(reg)) => Value::pointer(tern_ir::RegId(reg), owner),
            _ => self.error(ErrorCode::E2013, "`this` is only valid inside a class", node),
        }
    }

    /// Effective primitive kind of a type, if it is primitive.
    pub(crate) fn primitive_of(&self, ty: TypeId) -> Option<Primitive> {
        self.types.effective_type(ty).and_then(|t| t.primitive_kind())
    }

    /// Whether `access` is visible on `owner` from the current class.
    pub(crate) fn can_access(&self, access: Access, owner: TypeId) -> bool {
        access == Access::Public || self.current_class == Some(self.types.effective(owner))
    }
}
