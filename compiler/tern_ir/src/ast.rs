//! Parse-tree nodes and their owning arena.
//!
//! Nodes are allocated out of a [`ParseArena`] tied to one parse and
//! referenced by [`NodeId`]. Named child slots plus the `next` sibling
//! chain form the tree; a node's full source range is computed on demand
//! by walking its children. Template types deep-clone their defining
//! subtree into a private arena so it outlives the parse.

use crate::{Name, NumberSuffix, Span};
use std::fmt;

/// Index of a node within its [`ParseArena`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Structural kind of a parse node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Root,
    Block,
    /// Operator application; `op` says which. Operands in `lvalue` /
    /// `rvalue` (`cond` carries the condition of `?:`).
    Expression,
    Literal,
    Identifier,
    TypeSpecifier,
    TypeAlias,
    Variable,
    ObjectDecompositor,
    Function,
    Class,
    Property,
    Modifier,
    If,
    WhileLoop,
    DoWhileLoop,
    ForLoop,
    Switch,
    SwitchCase,
    Return,
    Break,
    Continue,
    Import,
    ImportSymbol,
    Export,
    Try,
    Catch,
    Throw,
    /// `new T(args)` (expression) or `new T(args) => target;` (placement).
    New,
    /// Recovery placeholder emitted where a construct failed to parse.
    Error,
}

/// Operator tag for `Expression` nodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    LogAnd,
    LogOr,
    Not,
    Invert,
    Negate,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    BitAndAssign,
    BitOrAssign,
    BitXorAssign,
    ShlAssign,
    ShrAssign,
    LogAndAssign,
    LogOrAssign,
    PreInc,
    PostInc,
    PreDec,
    PostDec,
    Conditional,
    Comma,
    Call,
    Index,
    Member,
    Cast,
    Sizeof,
}

impl OpKind {
    /// The non-assigning operator behind a compound assignment.
    pub fn compound_base(self) -> Option<OpKind> {
        Some(match self {
            OpKind::AddAssign => OpKind::Add,
            OpKind::SubAssign => OpKind::Sub,
            OpKind::MulAssign => OpKind::Mul,
            OpKind::DivAssign => OpKind::Div,
            OpKind::ModAssign => OpKind::Mod,
            OpKind::BitAndAssign => OpKind::BitAnd,
            OpKind::BitOrAssign => OpKind::BitOr,
            OpKind::BitXorAssign => OpKind::BitXor,
            OpKind::ShlAssign => OpKind::Shl,
            OpKind::ShrAssign => OpKind::Shr,
            OpKind::LogAndAssign => OpKind::LogAnd,
            OpKind::LogOrAssign => OpKind::LogOr,
            _ => return None,
        })
    }
}

/// Literal-type tag for `Literal` nodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LitKind {
    Int(NumberSuffix),
    Float(NumberSuffix),
    Str,
    TemplateStr,
    Bool,
    Null,
}

/// Literal payload.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub enum LitValue {
    #[default]
    None,
    Int(u64),
    Float(f64),
    Str(Name),
    Bool(bool),
}

/// Modifier tag for `Modifier` nodes (chained via `next`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModKind {
    Public,
    Private,
    Static,
    Getter,
    Setter,
    Const,
    Operator,
}

/// A heterogeneous parse-tree node.
///
/// Child slots are all optional; which are populated depends on `kind`.
/// `next` forms a singly-linked sibling chain (statement lists, parameter
/// lists, case lists, base-class lists).
#[derive(Clone, Debug, PartialEq)]
pub struct ParseNode {
    pub kind: NodeKind,
    pub op: Option<OpKind>,
    pub lit: Option<LitKind>,
    pub modifier_kind: Option<ModKind>,
    pub value: LitValue,
    pub name: Option<Name>,
    /// Span of the node's start token. Use [`ParseArena::full_span`] for
    /// the complete range.
    pub span: Span,

    // Named child slots.
    pub data_type: Option<NodeId>,
    pub lvalue: Option<NodeId>,
    pub rvalue: Option<NodeId>,
    pub cond: Option<NodeId>,
    pub body: Option<NodeId>,
    pub else_body: Option<NodeId>,
    pub initializer: Option<NodeId>,
    pub parameters: Option<NodeId>,
    pub template_parameters: Option<NodeId>,
    pub modifier: Option<NodeId>,
    pub alias: Option<NodeId>,
    pub inheritance: Option<NodeId>,
    pub next: Option<NodeId>,
}

impl ParseNode {
    /// A bare node of the given kind at a span.
    pub fn new(kind: NodeKind, span: Span) -> Self {
        ParseNode {
            kind,
            op: None,
            lit: None,
            modifier_kind: None,
            value: LitValue::None,
            name: None,
            span,
            data_type: None,
            lvalue: None,
            rvalue: None,
            cond: None,
            body: None,
            else_body: None,
            initializer: None,
            parameters: None,
            template_parameters: None,
            modifier: None,
            alias: None,
            inheritance: None,
            next: None,
        }
    }

    /// All child slots in a fixed order (including `next`).
    pub fn child_slots(&self) -> [Option<NodeId>; 13] {
        [
            self.data_type,
            self.lvalue,
            self.rvalue,
            self.cond,
            self.body,
            self.else_body,
            self.initializer,
            self.parameters,
            self.template_parameters,
            self.modifier,
            self.alias,
            self.inheritance,
            self.next,
        ]
    }
}

/// Arena owning every node of one parse.
///
/// Nodes are append-only; the parser's speculative rollback truncates to a
/// checkpoint length, which is valid because reverted nodes are always the
/// most recently allocated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParseArena {
    nodes: Vec<ParseNode>,
}

impl ParseArena {
    pub fn new() -> Self {
        ParseArena { nodes: Vec::new() }
    }

    /// Allocate a node, returning its id.
    pub fn alloc(&mut self, node: ParseNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> &ParseNode {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut ParseNode {
        &mut self.nodes[id.index()]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Roll back to a previous length (parser revert).
    pub fn truncate(&mut self, len: usize) {
        debug_assert!(len <= self.nodes.len());
        self.nodes.truncate(len);
    }

    /// Full source range of a node: its own span merged with every
    /// descendant's. Child chains are followed through `next` (parameter
    /// lists, statement bodies), but a node's own `next` sibling is not
    /// part of its range.
    pub fn full_span(&self, id: NodeId) -> Span {
        let node = self.get(id);
        let mut span = node.span;
        let slots = node.child_slots();
        // All named slots except the trailing `next`.
        for slot in &slots[..slots.len() - 1] {
            let mut cur = *slot;
            while let Some(child) = cur {
                span = span.merge(self.full_span(child));
                cur = self.get(child).next;
            }
        }
        span
    }

    /// Deep-clone the subtree rooted at `id` into `target`, with the
    /// root detached from its own sibling chain. Used when a template
    /// body must outlive its parse: the declaration is cloned, not the
    /// statements that happen to follow it.
    pub fn deep_clone_detached(&self, id: NodeId, target: &mut ParseArena) -> NodeId {
        let root = self.deep_clone_without_next(id, target);
        target.get_mut(root).next = None;
        root
    }

    fn deep_clone_without_next(&self, id: NodeId, target: &mut ParseArena) -> NodeId {
        let mut node = self.get(id).clone();
        node.data_type = node.data_type.map(|c| self.deep_clone(c, target));
        node.lvalue = node.lvalue.map(|c| self.deep_clone(c, target));
        node.rvalue = node.rvalue.map(|c| self.deep_clone(c, target));
        node.cond = node.cond.map(|c| self.deep_clone(c, target));
        node.body = node.body.map(|c| self.deep_clone(c, target));
        node.else_body = node.else_body.map(|c| self.deep_clone(c, target));
        node.initializer = node.initializer.map(|c| self.deep_clone(c, target));
        node.parameters = node.parameters.map(|c| self.deep_clone(c, target));
        node.template_parameters = node
            .template_parameters
            .map(|c| self.deep_clone(c, target));
        node.modifier = node.modifier.map(|c| self.deep_clone(c, target));
        node.alias = node.alias.map(|c| self.deep_clone(c, target));
        node.inheritance = node.inheritance.map(|c| self.deep_clone(c, target));
        node.next = None;
        target.alloc(node)
    }

    /// Deep-clone the subtree rooted at `id` into `target`, returning the
    /// new root id. Follows the root's `next` chain (child lists).
    pub fn deep_clone(&self, id: NodeId, target: &mut ParseArena) -> NodeId {
        let mut node = self.get(id).clone();
        node.data_type = node.data_type.map(|c| self.deep_clone(c, target));
        node.lvalue = node.lvalue.map(|c| self.deep_clone(c, target));
        node.rvalue = node.rvalue.map(|c| self.deep_clone(c, target));
        node.cond = node.cond.map(|c| self.deep_clone(c, target));
        node.body = node.body.map(|c| self.deep_clone(c, target));
        node.else_body = node.else_body.map(|c| self.deep_clone(c, target));
        node.initializer = node.initializer.map(|c| self.deep_clone(c, target));
        node.parameters = node.parameters.map(|c| self.deep_clone(c, target));
        node.template_parameters = node
            .template_parameters
            .map(|c| self.deep_clone(c, target));
        node.modifier = node.modifier.map(|c| self.deep_clone(c, target));
        node.alias = node.alias.map(|c| self.deep_clone(c, target));
        node.inheritance = node.inheritance.map(|c| self.deep_clone(c, target));
        node.next = node.next.map(|c| self.deep_clone(c, target));
        target.alloc(node)
    }

    /// Iterate a `next`-linked sibling chain starting at `first`.
    pub fn siblings(&self, first: Option<NodeId>) -> SiblingIter<'_> {
        SiblingIter {
            arena: self,
            cur: first,
        }
    }

    /// Count the nodes in a sibling chain.
    pub fn sibling_count(&self, first: Option<NodeId>) -> usize {
        self.siblings(first).count()
    }
}

/// Iterator over a `next` chain.
pub struct SiblingIter<'a> {
    arena: &'a ParseArena,
    cur: Option<NodeId>,
}

impl Iterator for SiblingIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.cur?;
        self.cur = self.arena.get(id).next;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(arena: &mut ParseArena, kind: NodeKind, start: u32, end: u32) -> NodeId {
        arena.alloc(ParseNode::new(kind, Span::new(start, end)))
    }

    #[test]
    fn test_full_span_walks_children() {
        let mut arena = ParseArena::new();
        let lhs = leaf(&mut arena, NodeKind::Identifier, 0, 1);
        let rhs = leaf(&mut arena, NodeKind::Literal, 4, 6);
        let mut expr = ParseNode::new(NodeKind::Expression, Span::new(2, 3));
        expr.op = Some(OpKind::Add);
        expr.lvalue = Some(lhs);
        expr.rvalue = Some(rhs);
        let expr = arena.alloc(expr);
        assert_eq!(arena.full_span(expr), Span::new(0, 6));
    }

    #[test]
    fn test_full_span_includes_child_chain_but_not_own_sibling() {
        let mut arena = ParseArena::new();
        // A parameter chain: the owner's range covers both parameters.
        let second = leaf(&mut arena, NodeKind::Variable, 10, 12);
        let mut first = ParseNode::new(NodeKind::Variable, Span::new(5, 7));
        first.next = Some(second);
        let first = arena.alloc(first);
        let mut func = ParseNode::new(NodeKind::Function, Span::new(0, 3));
        func.parameters = Some(first);
        let func = arena.alloc(func);
        assert_eq!(arena.full_span(func), Span::new(0, 12));

        // A statement's own `next` sibling is not part of its range.
        assert_eq!(arena.full_span(first), Span::new(5, 7));
    }

    #[test]
    fn test_deep_clone_is_structural() {
        let mut arena = ParseArena::new();
        let child = leaf(&mut arena, NodeKind::Literal, 4, 5);
        let mut root = ParseNode::new(NodeKind::Return, Span::new(0, 3));
        root.rvalue = Some(child);
        let root = arena.alloc(root);

        let mut target = ParseArena::new();
        let cloned = arena.deep_clone(root, &mut target);
        assert_eq!(target.get(cloned).kind, NodeKind::Return);
        let cloned_child = target.get(cloned).rvalue.unwrap();
        assert_eq!(target.get(cloned_child).kind, NodeKind::Literal);
        // The clone is independent of the source arena.
        assert_eq!(target.len(), 2);
    }

    #[test]
    fn test_truncate_rolls_back() {
        let mut arena = ParseArena::new();
        leaf(&mut arena, NodeKind::Identifier, 0, 1);
        let mark = arena.len();
        leaf(&mut arena, NodeKind::Identifier, 1, 2);
        leaf(&mut arena, NodeKind::Identifier, 2, 3);
        arena.truncate(mark);
        assert_eq!(arena.len(), mark);
    }

    #[test]
    fn test_sibling_iter() {
        let mut arena = ParseArena::new();
        let c = leaf(&mut arena, NodeKind::Identifier, 4, 5);
        let mut b = ParseNode::new(NodeKind::Identifier, Span::new(2, 3));
        b.next = Some(c);
        let b = arena.alloc(b);
        let mut a = ParseNode::new(NodeKind::Identifier, Span::new(0, 1));
        a.next = Some(b);
        let a = arena.alloc(a);
        let chain: Vec<_> = arena.siblings(Some(a)).collect();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0], a);
        assert_eq!(chain[2], c);
    }
}
