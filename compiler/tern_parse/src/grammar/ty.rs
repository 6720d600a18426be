//! Type specifiers.

use crate::Parser;
use tern_diagnostic::ErrorCode;
use tern_ir::{NodeId, NodeKind, ParseNode, TokenKind};

/// `type_spec := ident ('<' type_spec (',' type_spec)* '>')?`
///
/// Primitive names (`i32`, `bool`, ...) are ordinary identifiers here;
/// the compiler resolves them against the registry.
pub fn type_specifier(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    let Ok(name) = p.cursor.expect_ident() else {
        return None;
    };

    let mut node = ParseNode::new(NodeKind::TypeSpecifier, span);
    node.name = Some(name);

    if p.cursor.check(&TokenKind::Lt) {
        p.push_state();
        if let Some(args) = template_argument_list(p) {
            p.commit();
            node.template_parameters = Some(args);
        } else {
            // `<` belonged to a comparison, not template arguments.
            p.revert();
        }
    }
    Some(p.alloc(node))
}

/// `'<' type_spec (',' type_spec)* '>'`
fn template_argument_list(p: &mut Parser<'_>) -> Option<NodeId> {
    if !p.cursor.eat(&TokenKind::Lt) {
        return None;
    }
    let first = p.list_of(type_specifier, &TokenKind::Comma)?;
    if !p.cursor.eat(&TokenKind::Gt) {
        return None;
    }
    Some(first)
}

/// A type specifier in a position where one is required; records a
/// diagnostic and fails when absent.
pub fn required_type_specifier(p: &mut Parser<'_>) -> Option<NodeId> {
    let result = type_specifier(p);
    if result.is_none() {
        let err = crate::ParseError::new(
            ErrorCode::E1005,
            format!(
                "expected a type specifier, found {}",
                p.cursor.current_kind().display_name()
            ),
            p.cursor.current_span(),
        );
        p.error(err);
    }
    result
}
