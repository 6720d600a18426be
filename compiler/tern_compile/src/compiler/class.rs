//! Class compilation: layout, members, methods, operators, accessors.

use super::Compiler;
use tern_diagnostic::ErrorCode;
use tern_ir::{Name, NodeId, NodeKind, OpKind, TypeId};
use tern_types::{
    Access, FunctionTemplate, MetaFlags, PropFlags, ScriptFunction, TypeProperty,
};

/// Spelling of an overloadable operator, used in the method's name.
pub(crate) fn op_symbol(op: OpKind) -> &'static str {
    match op {
        OpKind::Add => "+",
        OpKind::Sub => "-",
        OpKind::Mul => "*",
        OpKind::Div => "/",
        OpKind::Mod => "%",
        OpKind::Eq => "==",
        OpKind::NotEq => "!=",
        OpKind::Less => "<",
        OpKind::LessEq => "<=",
        OpKind::Greater => ">",
        OpKind::GreaterEq => ">=",
        OpKind::Shl => "<<",
        OpKind::Shr => ">>",
        OpKind::BitAnd => "&",
        OpKind::BitOr => "|",
        OpKind::BitXor => "^",
        OpKind::LogAnd => "&&",
        OpKind::LogOr => "||",
        OpKind::Not => "!",
        OpKind::Invert => "~",
        OpKind::Assign => "=",
        OpKind::AddAssign => "+=",
        OpKind::SubAssign => "-=",
        OpKind::MulAssign => "*=",
        OpKind::DivAssign => "/=",
        OpKind::Index => "[]",
        _ => "?",
    }
}

impl Compiler<'_> {
    /// Fill a class stub: bases, properties (in declaration order),
    /// method registration, accessor linking, then method bodies.
    pub(crate) fn compile_class_body(&mut self, stmt: NodeId, ty: TypeId) {
        let node = self.node(stmt);
        let saved_class = self.current_class;
        self.current_class = Some(ty);

        // Bases extend the layout first.
        for base_spec in self.siblings(node.inheritance) {
            let base = self.resolve_type(base_spec);
            if base.is_poison() {
                continue;
            }
            if self.types.effective(base) == ty {
                self.error(
                    ErrorCode::E2002,
                    "a class cannot extend itself",
                    base_spec,
                );
                continue;
            }
            if self.types.get(self.types.effective(base)).and_then(|t| t.class()).is_none() {
                self.error(
                    ErrorCode::E2002,
                    format!("`{}` cannot be extended", self.types.fqn(base)),
                    base_spec,
                );
                continue;
            }
            self.types.add_base(ty, base, Access::Public);
        }

        let members = self.siblings(node.body);

        // Properties in declaration order; each offset is the class size
        // so far.
        for &member in &members {
            if self.node(member).kind == NodeKind::Property {
                self.compile_property(member, ty);
            }
        }

        // Methods: register all stubs first so bodies can call each
        // other, then compile the bodies.
        let mut registered = Vec::new();
        for &member in &members {
            if self.node(member).kind == NodeKind::Function {
                if let Some(entry) = self.register_method(member, ty) {
                    registered.push(entry);
                }
            }
        }
        for (member, id, is_static) in registered {
            let is_template = self.funcs.get(id).map(|f| f.is_template).unwrap_or(false);
            if !is_template {
                let owner = (!is_static).then_some(ty);
                self.compile_function_body(member, id, owner);
            }
        }

        self.current_class = saved_class;
    }

    fn compile_property(&mut self, member: NodeId, ty: TypeId) {
        let node = self.node(member);
        let (Some(name), Some(spec)) = (node.name, node.data_type) else {
            return;
        };
        let prop_ty = self.resolve_type(spec);
        if prop_ty.is_poison() {
            return;
        }
        let access = if self.has_modifier(node.modifier, tern_ir::ModKind::Private) {
            Access::Private
        } else {
            Access::Public
        };
        let is_static = self.has_modifier(node.modifier, tern_ir::ModKind::Static);

        if is_static {
            // Static storage lives in the module's data area.
            let class_fqn = self.types.fqn(ty).to_owned();
            let slot_name = format!("{}::{}", class_fqn, self.interner.resolve(name));
            let size = self.size_of(prop_ty).max(1);
            let slot = self.module.add_data(slot_name, prop_ty, size, access);
            let offset = self.module.data[slot].offset;
            if let Some(info) = self.types.get_mut(ty).and_then(|t| t.class_mut()) {
                info.properties.push(TypeProperty {
                    name,
                    offset,
                    ty: prop_ty,
                    flags: PropFlags::READABLE | PropFlags::WRITABLE | PropFlags::STATIC,
                    access,
                    getter: None,
                    setter: None,
                });
            }
        } else {
            self.types.add_property(
                ty,
                name,
                prop_ty,
                PropFlags::READABLE | PropFlags::WRITABLE,
                access,
            );
        }
    }

    /// Register one method (constructor, destructor, accessor, operator,
    /// or plain). Returns `(node, id, is_static)` for the body pass.
    fn register_method(&mut self, member: NodeId, ty: TypeId) -> Option<(NodeId, tern_ir::FunctionId, bool)> {
        let node = self.node(member);
        let class_fqn = self.types.fqn(ty).to_owned();

        let is_operator = self.has_modifier(node.modifier, tern_ir::ModKind::Operator);
        let is_static = self.has_modifier(node.modifier, tern_ir::ModKind::Static);
        let is_getter = self.has_modifier(node.modifier, tern_ir::ModKind::Getter);
        let is_setter = self.has_modifier(node.modifier, tern_ir::ModKind::Setter);
        let access = if self.has_modifier(node.modifier, tern_ir::ModKind::Private) {
            Access::Private
        } else {
            Access::Public
        };

        // The method's name.
        let (method_name, prop_link): (String, Option<Name>) = if is_operator {
            match (node.op, node.alias) {
                (Some(op), _) => (format!("operator{}", op_symbol(op)), None),
                (None, Some(target_spec)) => {
                    let target = self.resolve_type(target_spec);
                    if target.is_poison() {
                        return None;
                    }
                    (format!("operator {}", self.types.fqn(target)), None)
                }
                (None, None) => return None,
            }
        } else {
            let name = node.name?;
            let text = self.interner.resolve(name).to_owned();
            if is_getter {
                (format!("$get_{text}"), Some(name))
            } else if is_setter {
                (format!("$set_{text}"), Some(name))
            } else {
                (text, None)
            }
        };

        let template_params = self.siblings(node.template_parameters);
        let mut function = ScriptFunction::new(
            method_name.clone(),
            format!("{class_fqn}::{method_name}"),
        );
        function.access = access;
        function.module = Some(self.module.id);
        function.is_method = !is_static;
        function.owner = Some(ty);
        function.span = Some(self.node_span(member));

        if template_params.is_empty() {
            let owner = (!is_static).then_some(ty);
            let (sig_ty, display) = self.build_signature(member, owner)?;
            function.signature = Some(sig_ty);
            // The signature display carries the node's (possibly empty)
            // name; rebuild it around the resolved method name.
            let args = &display[display.find('(').unwrap_or(0)..];
            function.display_name = format!("{class_fqn}::{method_name}{args}");
        } else {
            function.is_template = true;
            let params: Vec<Name> = template_params
                .iter()
                .filter_map(|&p| self.node(p).name)
                .collect();
            let mut arena = tern_ir::ParseArena::new();
            let root = self.arena().deep_clone_detached(member, &mut arena);
            function.template = Some(FunctionTemplate { arena, root, params });
            function.display_name = format!("{class_fqn}::{method_name}<...>");
        }

        let id = self.funcs.register(function);
        self.module.add_function(id);

        // Hook the method into the class record.
        let is_destructor = method_name == "destructor";
        if let Some(info) = self.types.get_mut(ty).and_then(|t| t.class_mut()) {
            info.methods.push(id);
        }
        if is_destructor {
            let duplicate = self
                .types
                .get(ty)
                .and_then(|t| t.class())
                .map(|c| c.destructor.is_some())
                .unwrap_or(false);
            if duplicate {
                self.error(ErrorCode::E2011, "duplicate destructor", member);
            } else if let Some(info) = self.types.get_mut(ty).and_then(|t| t.class_mut()) {
                info.destructor = Some(id);
            }
            // A class with a destructor is no longer trivially
            // destructible.
            if let Some(t) = self.types.get_mut(ty) {
                t.meta.flags.remove(MetaFlags::TRIVIALLY_DESTRUCTIBLE | MetaFlags::POD);
            }
        }
        if method_name == "constructor" {
            if let Some(t) = self.types.get_mut(ty) {
                t.meta.flags.remove(MetaFlags::TRIVIALLY_CONSTRUCTIBLE | MetaFlags::POD);
            }
        }

        // Link accessors to their property, creating an accessor-only
        // property when no backing field exists.
        if let Some(prop_name) = prop_link {
            self.link_accessor(ty, prop_name, id, is_getter, member);
        }

        Some((member, id, is_static))
    }

    fn link_accessor(
        &mut self,
        ty: TypeId,
        prop_name: Name,
        accessor: tern_ir::FunctionId,
        is_getter: bool,
        member: NodeId,
    ) {
        let accessor_ret = self
            .funcs
            .get(accessor)
            .and_then(|f| f.signature)
            .and_then(|s| self.types.get(s))
            .and_then(|t| t.signature())
            .map(|sig| {
                if is_getter {
                    sig.ret
                } else {
                    sig.explicit_args().next().map(|a| a.ty).unwrap_or(TypeId::POISON)
                }
            })
            .unwrap_or(TypeId::POISON);
        if accessor_ret.is_poison() && !is_getter {
            self.error(
                ErrorCode::E2002,
                "setter requires exactly one parameter",
                member,
            );
            return;
        }

        let Some(info) = self.types.get_mut(ty).and_then(|t| t.class_mut()) else {
            return;
        };
        let existing = info.properties.iter_mut().find(|p| p.name == prop_name);
        match existing {
            Some(prop) => {
                if is_getter {
                    prop.getter = Some(accessor);
                    prop.flags |= PropFlags::READABLE;
                } else {
                    prop.setter = Some(accessor);
                    prop.flags |= PropFlags::WRITABLE;
                }
            }
            None => {
                // Accessor-only property: no storage, no layout impact.
                let flags = PropFlags::ACCESSOR
                    | if is_getter {
                        PropFlags::READABLE
                    } else {
                        PropFlags::WRITABLE
                    };
                info.properties.push(TypeProperty {
                    name: prop_name,
                    offset: 0,
                    ty: accessor_ret,
                    flags,
                    access: Access::Public,
                    getter: is_getter.then_some(accessor),
                    setter: (!is_getter).then_some(accessor),
                });
            }
        }
    }
}
