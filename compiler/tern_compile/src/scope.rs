//! Lexical scopes and the stack-bound value lists that drive destructor
//! emission.
//!
//! Destructor tracking is an explicit list on each scope rather than any
//! deferred-action mechanism: the compiler controls emission order
//! deterministically. Scope exit destructs stack-bound values in LIFO
//! order, and `break`/`continue` walk scopes inside-out up to (and
//! including) the enclosing loop scope.

use crate::Value;
use rustc_hash::FxHashMap;
use tern_ir::{FunctionId, LabelId, ModuleId, Name, NodeId, TypeId};

/// What a name resolves to.
#[derive(Clone, Debug, PartialEq)]
pub enum Symbol {
    Value(Value),
    Type(TypeId),
    /// An overload set.
    Function(Vec<FunctionId>),
    /// A declared-but-not-yet-compiled function (pass 1 stub).
    FunctionDef(NodeId),
    Module(ModuleId),
    /// A module data slot: (module, slot index, declared const).
    ModuleSlot(ModuleId, usize, bool),
}

/// Control-flow role of a scope.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    Plain,
    /// Function body root.
    Function,
    /// Loop body; `break` and `continue` target these labels.
    Loop {
        continue_label: LabelId,
        break_label: LabelId,
    },
    /// Switch body; a breakable non-loop scope.
    Switch { break_label: LabelId },
}

/// One nested symbol table plus its stack-bound values.
#[derive(Clone, Debug)]
pub struct Scope {
    symbols: FxHashMap<Name, Symbol>,
    /// Values whose destructor + `stack_free` this scope owns, in
    /// insertion order (destructed in reverse).
    stack_vals: Vec<Value>,
    pub kind: ScopeKind,
}

impl Scope {
    fn new(kind: ScopeKind) -> Scope {
        Scope {
            symbols: FxHashMap::default(),
            stack_vals: Vec::new(),
            kind,
        }
    }
}

/// Stack of nested scopes; lookup walks innermost to outermost, so
/// shadowing is permitted.
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack { scopes: Vec::new() }
    }

    pub fn push(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope::new(kind));
    }

    /// Pop the innermost scope, returning its stack-bound values for
    /// destructor emission.
    pub fn pop(&mut self) -> Vec<Value> {
        self.scopes
            .pop()
            .map(|s| s.stack_vals)
            .unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_root(&self) -> bool {
        self.scopes.len() <= 1
    }

    /// Bind a name in the innermost scope (shadowing outer bindings).
    pub fn declare(&mut self, name: Name, symbol: Symbol) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.symbols.insert(name, symbol);
        }
    }

    /// True when the innermost scope already binds `name` (shadowing an
    /// outer scope does not count).
    pub fn declared_in_current(&self, name: Name) -> bool {
        self.scopes
            .last()
            .is_some_and(|s| s.symbols.contains_key(&name))
    }

    /// Innermost-to-outermost lookup.
    pub fn lookup(&self, name: Name) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|s| s.symbols.get(&name))
    }

    /// Lookup that also reports the depth (scope index, outermost = 0)
    /// the symbol was found at; used for captured-variable detection.
    pub fn lookup_with_depth(&self, name: Name) -> Option<(usize, &Symbol)> {
        for (depth, scope) in self.scopes.iter().enumerate().rev() {
            if let Some(symbol) = scope.symbols.get(&name) {
                return Some((depth, symbol));
            }
        }
        None
    }

    /// Record a stack-bound value on the innermost scope.
    pub fn bind_stack(&mut self, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.stack_vals.push(value);
        }
    }

    /// Promote a value out of the innermost scope: its destructor
    /// responsibility transfers to the parent scope. Returns false when
    /// the value was not bound to the innermost scope.
    pub fn promote(&mut self, value: &Value) -> bool {
        let len = self.scopes.len();
        if len < 2 {
            return false;
        }
        let Some(alloc) = value.stack_id() else {
            return false;
        };
        let inner = &mut self.scopes[len - 1];
        let Some(pos) = inner.stack_vals.iter().position(|v| v.stack_id() == Some(alloc)) else {
            return false;
        };
        let moved = inner.stack_vals.remove(pos);
        self.scopes[len - 2].stack_vals.push(moved);
        true
    }

    /// Stack-bound values of the innermost scope, in reverse insertion
    /// order (the destructor emission order), without popping.
    pub fn current_stack_vals_rev(&self) -> Vec<Value> {
        self.scopes
            .last()
            .map(|s| s.stack_vals.iter().rev().copied().collect())
            .unwrap_or_default()
    }

    /// Stack-bound values to destruct for a `break`/`continue`: every
    /// scope inside-out up to and including the innermost scope matching
    /// `target`. Returns `None` when no such scope exists.
    pub fn unwind_vals(
        &self,
        target: impl Fn(&ScopeKind) -> bool,
    ) -> Option<Vec<Value>> {
        let mut vals = Vec::new();
        for scope in self.scopes.iter().rev() {
            vals.extend(scope.stack_vals.iter().rev().copied());
            if target(&scope.kind) {
                return Some(vals);
            }
            if scope.kind == ScopeKind::Function {
                return None;
            }
        }
        None
    }

    /// The innermost loop scope's labels, if inside a loop.
    pub fn loop_labels(&self) -> Option<(LabelId, LabelId)> {
        for scope in self.scopes.iter().rev() {
            match scope.kind {
                ScopeKind::Loop {
                    continue_label,
                    break_label,
                } => return Some((continue_label, break_label)),
                ScopeKind::Function => return None,
                _ => {}
            }
        }
        None
    }

    /// The innermost breakable scope's break label (loop or switch).
    pub fn break_label(&self) -> Option<LabelId> {
        for scope in self.scopes.iter().rev() {
            match scope.kind {
                ScopeKind::Loop { break_label, .. } | ScopeKind::Switch { break_label } => {
                    return Some(break_label)
                }
                ScopeKind::Function => return None,
                _ => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_ir::{AllocId, RegId, StringInterner};

    fn stack_val(alloc: u32) -> Value {
        Value::stack(AllocId(alloc), RegId(alloc), TypeId::of("i32"))
    }

    #[test]
    fn test_shadowing_lookup() {
        let interner = StringInterner::new();
        let x = interner.intern("x");
        let mut scopes = ScopeStack::new();
        scopes.push(ScopeKind::Function);
        scopes.declare(x, Symbol::Type(TypeId::of("i32")));
        scopes.push(ScopeKind::Plain);
        scopes.declare(x, Symbol::Type(TypeId::of("f64")));
        assert_eq!(scopes.lookup(x), Some(&Symbol::Type(TypeId::of("f64"))));
        scopes.pop();
        assert_eq!(scopes.lookup(x), Some(&Symbol::Type(TypeId::of("i32"))));
    }

    #[test]
    fn test_stack_vals_lifo() {
        let mut scopes = ScopeStack::new();
        scopes.push(ScopeKind::Function);
        scopes.bind_stack(stack_val(0));
        scopes.bind_stack(stack_val(1));
        let rev = scopes.current_stack_vals_rev();
        assert_eq!(rev[0].stack_id(), Some(AllocId(1)));
        assert_eq!(rev[1].stack_id(), Some(AllocId(0)));
    }

    #[test]
    fn test_promote_moves_to_parent() {
        let mut scopes = ScopeStack::new();
        scopes.push(ScopeKind::Function);
        scopes.push(ScopeKind::Plain);
        let v = stack_val(4);
        scopes.bind_stack(v);
        assert!(scopes.promote(&v));
        assert!(scopes.pop().is_empty());
        let parent_vals = scopes.pop();
        assert_eq!(parent_vals.len(), 1);
        assert_eq!(parent_vals[0].stack_id(), Some(AllocId(4)));
    }

    #[test]
    fn test_unwind_vals_inside_out_through_loop() {
        let mut scopes = ScopeStack::new();
        scopes.push(ScopeKind::Function);
        scopes.bind_stack(stack_val(0)); // function scope: not unwound by break
        scopes.push(ScopeKind::Loop {
            continue_label: LabelId(0),
            break_label: LabelId(1),
        });
        scopes.bind_stack(stack_val(1));
        scopes.push(ScopeKind::Plain); // the `if` body
        scopes.bind_stack(stack_val(2));

        let vals = scopes
            .unwind_vals(|k| matches!(k, ScopeKind::Loop { .. }))
            .unwrap();
        let ids: Vec<_> = vals.iter().map(|v| v.stack_id().unwrap().0).collect();
        // Inner `if` scope first, then the loop body scope; function
        // scope untouched.
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_unwind_outside_loop_is_none() {
        let mut scopes = ScopeStack::new();
        scopes.push(ScopeKind::Function);
        scopes.push(ScopeKind::Plain);
        assert!(scopes
            .unwind_vals(|k| matches!(k, ScopeKind::Loop { .. }))
            .is_none());
    }
}
