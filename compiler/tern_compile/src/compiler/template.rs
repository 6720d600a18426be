//! Template instantiation.
//!
//! A template owns the deep-cloned parse subtree it was declared with.
//! Instantiation binds each template parameter name to its argument
//! type in a fresh scope and re-runs class (or function) compilation
//! over the subtree. Instances are cached by their fully-qualified name
//! `Base<Arg1FQN, Arg2FQN, ...>`, so repeated instantiation with the
//! same arguments returns the same type, regardless of where in the
//! source the instantiations appear.

use super::Compiler;
use crate::{Symbol, Value};
use tern_diagnostic::ErrorCode;
use tern_ir::{FunctionId, NodeId, TypeId};
use tern_types::{Access, ClassInfo, DataType, MetaFlags, TypeKind, TypeMeta};
use tracing::debug;

pub(crate) fn instantiate_class_template(
    c: &mut Compiler<'_>,
    template: TypeId,
    args: &[TypeId],
    node: NodeId,
) -> TypeId {
    let Some(info) = c.types.get(template).and_then(|t| t.template()).cloned() else {
        return TypeId::POISON;
    };
    let base_fqn = c.types.fqn(template).to_owned();

    if args.len() < info.params.len() {
        c.error(
            ErrorCode::E2009,
            format!(
                "`{base_fqn}` expects {} template arguments, got {}",
                info.params.len(),
                args.len()
            ),
            node,
        );
        return TypeId::POISON;
    }
    if args.len() > info.params.len() {
        c.error(
            ErrorCode::E2010,
            format!(
                "`{base_fqn}` expects {} template arguments, got {}",
                info.params.len(),
                args.len()
            ),
            node,
        );
        return TypeId::POISON;
    }

    let inst_fqn = c.types.instantiation_fqn(&base_fqn, args);
    if let Some(cached) = c.types.by_fqn(&inst_fqn) {
        return cached;
    }
    debug!(fqn = %inst_fqn, "instantiating class template");

    let short_name = {
        let base_name = c
            .types
            .get(template)
            .map(|t| t.name.clone())
            .unwrap_or_default();
        let args_text: Vec<_> = args.iter().map(|&a| c.types.fqn(a).to_owned()).collect();
        format!("{}<{}>", base_name, args_text.join(", "))
    };

    let owner = c.types.get(template).and_then(|t| t.owner);
    let access = c.types.get(template).map(|t| t.access).unwrap_or(Access::Public);
    let instance = c.types.insert(DataType {
        id: TypeId::POISON,
        name: short_name,
        fqn: inst_fqn,
        access,
        owner,
        meta: TypeMeta::new(MetaFlags::TRIVIAL, 0),
        kind: TypeKind::Class(ClassInfo {
            template_base: Some(template),
            template_args: args.to_vec(),
            ..ClassInfo::default()
        }),
    });
    c.module.types.push(instance);

    // Bind parameter names to argument types and re-run class
    // compilation over the template body.
    c.scopes.push(crate::ScopeKind::Plain);
    for (&param, &arg) in info.params.iter().zip(args) {
        c.scopes.declare(param, Symbol::Type(arg));
    }
    c.with_arena(info.arena, |c| {
        c.compile_class_body(info.root, instance);
    });
    c.scopes.pop();

    instance
}

/// Instantiate a function template against a call's argument values by
/// matching parameter type names. Returns `None` (with no diagnostic)
/// when inference fails, so overload resolution can consider other
/// candidates.
pub(crate) fn instantiate_function_template(
    c: &mut Compiler<'_>,
    template_fn: FunctionId,
    args: &[Value],
    node: NodeId,
) -> Option<FunctionId> {
    let function = c.funcs.get(template_fn)?;
    let info = function.template.clone()?;
    let base_fqn = function.fqn.clone();
    let owner = function.owner;
    let is_method = function.is_method;

    // Infer each template parameter from the first argument whose
    // declared type names it directly.
    let root_node = info.arena.get(info.root).clone();
    let param_nodes: Vec<NodeId> = info.arena.siblings(root_node.parameters).collect();
    if param_nodes.len() != args.len() {
        return None;
    }
    let mut bindings: Vec<Option<TypeId>> = vec![None; info.params.len()];
    for (&param, arg) in param_nodes.iter().zip(args) {
        let spec = info.arena.get(param).data_type;
        let Some(spec) = spec else { continue };
        let spec_node = info.arena.get(spec);
        let Some(spec_name) = spec_node.name else { continue };
        if spec_node.template_parameters.is_some() {
            continue; // nested template matching is out of reach here
        }
        if let Some(idx) = info.params.iter().position(|&p| p == spec_name) {
            let inferred = c.types.effective(arg.ty);
            match bindings[idx] {
                None => bindings[idx] = Some(inferred),
                Some(existing) if existing == inferred => {}
                Some(_) => return None, // conflicting inference
            }
        }
    }
    let bound: Vec<TypeId> = bindings.into_iter().collect::<Option<_>>()?;

    // Cache by instantiated name.
    let inst_fqn = c.types.instantiation_fqn(&base_fqn, &bound);
    if let Some(&cached) = c.funcs.by_fqn(&inst_fqn).first() {
        return Some(cached);
    }
    debug!(fqn = %inst_fqn, "instantiating function template");

    c.scopes.push(crate::ScopeKind::Plain);
    for (&param, &arg) in info.params.iter().zip(&bound) {
        c.scopes.declare(param, Symbol::Type(arg));
    }
    let instance = c.with_arena(info.arena, |c| {
        let sig_owner = if is_method { owner } else { None };
        let (sig_ty, display) = c.build_signature(info.root, sig_owner)?;
        let name = c
            .funcs
            .get(template_fn)
            .map(|f| f.name.clone())
            .unwrap_or_default();
        let mut function = tern_types::ScriptFunction::new(name, inst_fqn.clone());
        function.display_name = display;
        function.signature = Some(sig_ty);
        function.module = Some(c.module.id);
        function.owner = owner;
        function.is_method = is_method;
        function.span = c
            .funcs
            .get(template_fn)
            .and_then(|f| f.span);
        let id = c.funcs.register(function);
        c.module.add_function(id);
        c.compile_function_body(info.root, id, sig_owner);
        Some(id)
    });
    c.scopes.pop();
    let _ = node;
    instance
}

impl Compiler<'_> {
    pub(crate) fn instantiate_function_template(
        &mut self,
        template_fn: FunctionId,
        args: &[Value],
        node: NodeId,
    ) -> Option<FunctionId> {
        instantiate_function_template(self, template_fn, args, node)
    }
}
