//! Recursive-descent parser with explicit backtracking.
//!
//! The parser owns the node arena, a cursor over the token stream, and a
//! growing error list. Speculative parsing uses an explicit
//! checkpoint stack: a grammar rule `push`es on entry and either
//! `commit`s (discard the save) or `revert`s (restore the token index,
//! truncate the error list and arena back to the save) on exit. There is
//! no exception-based control flow; every rule returns an explicit
//! `Option<NodeId>`.
//!
//! On a rule failure at statement level the parser resynchronizes by
//! scanning to the nearest statement boundary (`;`, `}`, or a
//! declaration keyword), emits an [`NodeKind::Error`] node in place of
//! the failed construct, and continues.

mod cursor;
mod error;
pub mod grammar;
pub mod recovery;
#[cfg(test)]
mod tests;

pub use cursor::Cursor;
pub use error::ParseError;
pub use recovery::TokenSet;

use tern_diagnostic::ErrorCode;
use tern_ir::{
    Name, NodeId, NodeKind, ParseArena, ParseNode, Span, StringInterner, TokenKind, TokenList,
};
use tracing::trace;

/// Result of parsing one source unit.
#[derive(Debug)]
pub struct ParseTree {
    pub arena: ParseArena,
    pub root: NodeId,
    pub errors: Vec<ParseError>,
}

impl ParseTree {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// A saved parser state: token index, error count, arena length.
#[derive(Copy, Clone, Debug)]
struct Checkpoint {
    cursor_pos: usize,
    error_count: usize,
    arena_len: usize,
}

/// A grammar rule: consumes tokens, returns a node or fails.
pub type Rule = fn(&mut Parser<'_>) -> Option<NodeId>;

/// The parser state shared by all grammar rules.
pub struct Parser<'a> {
    pub(crate) cursor: Cursor<'a>,
    pub(crate) arena: ParseArena,
    pub(crate) errors: Vec<ParseError>,
    saved: Vec<Checkpoint>,
    pub(crate) interner: &'a StringInterner,
    /// Token position of the most recent panic-mode recovery; prevents
    /// infinite loops when the boundary token itself fails to parse.
    last_recovery: usize,
}

/// Parse a token stream into a tree rooted at a [`NodeKind::Root`] node
/// whose `body` is the statement chain.
pub fn parse(tokens: &TokenList, interner: &StringInterner) -> ParseTree {
    let mut parser = Parser {
        cursor: Cursor::new(tokens),
        arena: ParseArena::new(),
        errors: Vec::new(),
        saved: Vec::new(),
        interner,
        last_recovery: usize::MAX,
    };

    let root_span = parser.cursor.current_span();
    let first = parser.statement_list(&TokenKind::Eof);
    let mut root = ParseNode::new(NodeKind::Root, root_span);
    root.body = first;
    let root = parser.arena.alloc(root);

    debug_assert!(parser.saved.is_empty(), "unbalanced checkpoint stack");
    ParseTree {
        arena: parser.arena,
        root,
        errors: parser.errors,
    }
}

impl<'a> Parser<'a> {
    // ── Checkpointing ────────────────────────────────────────────────

    /// Save the current state for speculative parsing.
    pub fn push_state(&mut self) {
        self.saved.push(Checkpoint {
            cursor_pos: self.cursor.position(),
            error_count: self.errors.len(),
            arena_len: self.arena.len(),
        });
    }

    /// Accept the speculative parse: discard the save.
    pub fn commit(&mut self) {
        let popped = self.saved.pop();
        debug_assert!(popped.is_some(), "commit without push");
    }

    /// Reject the speculative parse: restore token index, truncate the
    /// error list and arena back to the save.
    pub fn revert(&mut self) {
        let Some(save) = self.saved.pop() else {
            debug_assert!(false, "revert without push");
            return;
        };
        self.cursor.set_position(save.cursor_pos);
        self.errors.truncate(save.error_count);
        self.arena.truncate(save.arena_len);
    }

    // ── Errors and nodes ─────────────────────────────────────────────

    pub(crate) fn error(&mut self, err: ParseError) {
        trace!(code = %err.code, "parse error: {}", err.message);
        self.errors.push(err);
    }

    pub(crate) fn alloc(&mut self, node: ParseNode) -> NodeId {
        self.arena.alloc(node)
    }

    /// Allocate an error placeholder node.
    pub(crate) fn error_node(&mut self, span: Span) -> NodeId {
        self.alloc(ParseNode::new(NodeKind::Error, span))
    }

    pub(crate) fn intern(&self, s: &str) -> Name {
        self.interner.intern(s)
    }

    // ── Primitive combinators ────────────────────────────────────────

    /// Try each rule in order; the first success wins. Each attempt runs
    /// under its own checkpoint, so a failed alternative leaves no trace.
    pub fn one_of(&mut self, rules: &[Rule]) -> Option<NodeId> {
        for rule in rules {
            self.push_state();
            match rule(self) {
                Some(node) => {
                    self.commit();
                    return Some(node);
                }
                None => self.revert(),
            }
        }
        None
    }

    /// Parse every rule in sequence; all must succeed or the whole
    /// sequence reverts.
    pub fn all_of(&mut self, rules: &[Rule]) -> Option<Vec<NodeId>> {
        self.push_state();
        let mut nodes = Vec::with_capacity(rules.len());
        for rule in rules {
            match rule(self) {
                Some(node) => nodes.push(node),
                None => {
                    self.revert();
                    return None;
                }
            }
        }
        self.commit();
        Some(nodes)
    }

    /// Parse zero or more repetitions of `rule`, chaining the results via
    /// `next`. Returns the head of the chain (`None` for zero matches).
    pub fn array_of(&mut self, rule: Rule) -> Option<NodeId> {
        let mut first: Option<NodeId> = None;
        let mut last: Option<NodeId> = None;
        loop {
            self.push_state();
            let before = self.cursor.position();
            match rule(self) {
                // A rule that consumes nothing would loop forever; treat
                // it as the end of the array.
                Some(_) if self.cursor.position() == before => {
                    self.revert();
                    break;
                }
                Some(node) => {
                    self.commit();
                    match last {
                        Some(prev) => self.arena.get_mut(prev).next = Some(node),
                        None => first = Some(node),
                    }
                    last = Some(node);
                }
                None => {
                    self.revert();
                    break;
                }
            }
        }
        first
    }

    /// Parse one or more `rule`s separated by `separator`, chaining via
    /// `next`. Fails (reverting) if the first element is missing; a
    /// separator with no following element is an error.
    pub fn list_of(&mut self, rule: Rule, separator: &TokenKind) -> Option<NodeId> {
        self.push_state();
        let Some(first) = rule(self) else {
            self.revert();
            return None;
        };
        let mut last = first;
        while self.cursor.eat(separator) {
            match rule(self) {
                Some(node) => {
                    self.arena.get_mut(last).next = Some(node);
                    last = node;
                }
                None => {
                    let err = ParseError::new(
                        ErrorCode::E1002,
                        format!("expected expression after {}", separator.display_name()),
                        self.cursor.current_span(),
                    );
                    self.error(err);
                    break;
                }
            }
        }
        self.commit();
        Some(first)
    }

    // ── Statement list with recovery ─────────────────────────────────

    /// Parse statements until `terminator`, recovering at statement
    /// boundaries. Returns the head of the statement chain.
    pub(crate) fn statement_list(&mut self, terminator: &TokenKind) -> Option<NodeId> {
        let mut first: Option<NodeId> = None;
        let mut last: Option<NodeId> = None;
        while !self.cursor.check(terminator) && !self.cursor.is_at_end() {
            let errors_before = self.errors.len();
            let node = match grammar::stmt::statement(self) {
                Some(node) => node,
                None => {
                    let span = self.cursor.current_span();
                    if self.errors.len() == errors_before {
                        let err = ParseError::new(
                            ErrorCode::E1010,
                            format!(
                                "expected a statement, found {}",
                                self.cursor.current_kind().display_name()
                            ),
                            span,
                        );
                        self.error(err);
                    }
                    if self.cursor.position() == self.last_recovery {
                        // No progress since the previous recovery; skip a
                        // token so the loop always terminates.
                        self.cursor.advance();
                    }
                    recovery::synchronize(&mut self.cursor, recovery::STMT_BOUNDARY);
                    self.cursor.eat(&TokenKind::Semicolon);
                    self.last_recovery = self.cursor.position();
                    self.error_node(span)
                }
            };
            match last {
                Some(prev) => self.arena.get_mut(prev).next = Some(node),
                None => first = Some(node),
            }
            last = Some(node);
        }
        first
    }
}
