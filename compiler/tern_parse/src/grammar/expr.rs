//! Expression grammar.
//!
//! A conventional sixteen-level precedence climb from the comma operator
//! at the bottom to primary expressions at the top. Binary levels are
//! left-associative; assignment and the conditional are right-associative.
//! Arrow functions are parsed speculatively before the alternatives they
//! overlap with (`(` grouping, plain identifiers).

use super::{stmt, ty};
use crate::{ParseError, Parser};
use tern_diagnostic::ErrorCode;
use tern_ir::{
    LitKind, LitValue, NodeId, NodeKind, OpKind, ParseNode, Span, TokenKind,
};

/// Full expression including the comma operator.
pub fn expression(p: &mut Parser<'_>) -> Option<NodeId> {
    let mut lhs = assignment(p)?;
    while p.cursor.check(&TokenKind::Comma) {
        let span = p.cursor.current_span();
        p.cursor.advance();
        let Some(rhs) = assignment(p) else {
            expected_expression(p);
            return Some(lhs);
        };
        lhs = binary(p, OpKind::Comma, span, lhs, rhs);
    }
    Some(lhs)
}

/// Assignment level: the entry point for call arguments and initializers
/// (which must not swallow commas).
pub fn assignment(p: &mut Parser<'_>) -> Option<NodeId> {
    let lhs = conditional(p)?;
    let op = match p.cursor.current_kind() {
        TokenKind::Eq => OpKind::Assign,
        TokenKind::PlusEq => OpKind::AddAssign,
        TokenKind::MinusEq => OpKind::SubAssign,
        TokenKind::StarEq => OpKind::MulAssign,
        TokenKind::SlashEq => OpKind::DivAssign,
        TokenKind::PercentEq => OpKind::ModAssign,
        TokenKind::AmpEq => OpKind::BitAndAssign,
        TokenKind::PipeEq => OpKind::BitOrAssign,
        TokenKind::CaretEq => OpKind::BitXorAssign,
        TokenKind::ShlEq => OpKind::ShlAssign,
        TokenKind::ShrEq => OpKind::ShrAssign,
        TokenKind::AmpAmpEq => OpKind::LogAndAssign,
        TokenKind::PipePipeEq => OpKind::LogOrAssign,
        _ => return Some(lhs),
    };
    let span = p.cursor.current_span();
    p.cursor.advance();
    // Right-associative.
    let Some(rhs) = assignment(p) else {
        expected_expression(p);
        return Some(lhs);
    };
    Some(binary(p, op, span, lhs, rhs))
}

/// `cond ? a : b` (right-associative).
fn conditional(p: &mut Parser<'_>) -> Option<NodeId> {
    let cond = logical_or(p)?;
    if !p.cursor.check(&TokenKind::Question) {
        return Some(cond);
    }
    let span = p.cursor.current_span();
    p.cursor.advance();
    let truthy = expression(p).or_else(|| {
        expected_expression(p);
        None
    })?;
    if let Err(err) = p.cursor.expect(&TokenKind::Colon) {
        p.error(err);
        return Some(cond);
    }
    let falsy = assignment(p).or_else(|| {
        expected_expression(p);
        None
    })?;

    let mut node = ParseNode::new(NodeKind::Expression, span);
    node.op = Some(OpKind::Conditional);
    node.cond = Some(cond);
    node.lvalue = Some(truthy);
    node.rvalue = Some(falsy);
    Some(p.alloc(node))
}

macro_rules! binary_level {
    ($name:ident, $next:ident, $(($token:pat, $op:expr)),+ $(,)?) => {
        fn $name(p: &mut Parser<'_>) -> Option<NodeId> {
            let mut lhs = $next(p)?;
            loop {
                let op = match p.cursor.current_kind() {
                    $($token => $op,)+
                    _ => break,
                };
                let span = p.cursor.current_span();
                p.cursor.advance();
                let Some(rhs) = $next(p) else {
                    expected_expression(p);
                    break;
                };
                lhs = binary(p, op, span, lhs, rhs);
            }
            Some(lhs)
        }
    };
}

binary_level!(logical_or, logical_and, (TokenKind::PipePipe, OpKind::LogOr));
binary_level!(logical_and, bitwise_or, (TokenKind::AmpAmp, OpKind::LogAnd));
binary_level!(bitwise_or, bitwise_xor, (TokenKind::Pipe, OpKind::BitOr));
binary_level!(bitwise_xor, bitwise_and, (TokenKind::Caret, OpKind::BitXor));
binary_level!(bitwise_and, equality, (TokenKind::Amp, OpKind::BitAnd));
binary_level!(
    equality,
    relational,
    (TokenKind::EqEq, OpKind::Eq),
    (TokenKind::BangEq, OpKind::NotEq),
);
binary_level!(
    relational,
    shift,
    (TokenKind::Lt, OpKind::Less),
    (TokenKind::LtEq, OpKind::LessEq),
    (TokenKind::Gt, OpKind::Greater),
    (TokenKind::GtEq, OpKind::GreaterEq),
);
binary_level!(
    shift,
    additive,
    (TokenKind::Shl, OpKind::Shl),
    (TokenKind::Shr, OpKind::Shr),
);
binary_level!(
    additive,
    multiplicative,
    (TokenKind::Plus, OpKind::Add),
    (TokenKind::Minus, OpKind::Sub),
);
binary_level!(
    multiplicative,
    unary,
    (TokenKind::Star, OpKind::Mul),
    (TokenKind::Slash, OpKind::Div),
    (TokenKind::Percent, OpKind::Mod),
);

fn unary(p: &mut Parser<'_>) -> Option<NodeId> {
    let op = match p.cursor.current_kind() {
        TokenKind::Bang => Some(OpKind::Not),
        TokenKind::Tilde => Some(OpKind::Invert),
        TokenKind::Minus => Some(OpKind::Negate),
        TokenKind::Plus => None, // unary plus is a no-op
        TokenKind::PlusPlus => Some(OpKind::PreInc),
        TokenKind::MinusMinus => Some(OpKind::PreDec),
        TokenKind::Sizeof => return sizeof_expression(p),
        _ => return postfix(p),
    };
    let span = p.cursor.current_span();
    p.cursor.advance();
    let operand = unary(p).or_else(|| {
        expected_expression(p);
        None
    })?;
    match op {
        Some(op) => {
            let mut node = ParseNode::new(NodeKind::Expression, span);
            node.op = Some(op);
            node.lvalue = Some(operand);
            Some(p.alloc(node))
        }
        None => Some(operand),
    }
}

/// `sizeof '(' type_spec ')'`
fn sizeof_expression(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    p.cursor.advance(); // sizeof
    if let Err(err) = p.cursor.expect(&TokenKind::LParen) {
        p.error(err);
        return None;
    }
    let data_type = ty::required_type_specifier(p)?;
    if let Err(err) = p.cursor.expect(&TokenKind::RParen) {
        p.error(err);
    }
    let mut node = ParseNode::new(NodeKind::Expression, span);
    node.op = Some(OpKind::Sizeof);
    node.data_type = Some(data_type);
    Some(p.alloc(node))
}

/// Postfix operators: `++`, `--`, and `as` casts.
fn postfix(p: &mut Parser<'_>) -> Option<NodeId> {
    let mut operand = call_member_index(p)?;
    loop {
        match p.cursor.current_kind() {
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let op = if p.cursor.check(&TokenKind::PlusPlus) {
                    OpKind::PostInc
                } else {
                    OpKind::PostDec
                };
                let span = p.cursor.current_span();
                p.cursor.advance();
                let mut node = ParseNode::new(NodeKind::Expression, span);
                node.op = Some(op);
                node.lvalue = Some(operand);
                operand = p.alloc(node);
            }
            TokenKind::As => {
                let span = p.cursor.current_span();
                p.cursor.advance();
                let Some(target) = ty::required_type_specifier(p) else {
                    return Some(operand);
                };
                let mut node = ParseNode::new(NodeKind::Expression, span);
                node.op = Some(OpKind::Cast);
                node.lvalue = Some(operand);
                node.data_type = Some(target);
                operand = p.alloc(node);
            }
            _ => break,
        }
    }
    Some(operand)
}

/// Call, member access, and indexing: the tightest-binding operator
/// chain.
fn call_member_index(p: &mut Parser<'_>) -> Option<NodeId> {
    let mut operand = primary(p)?;
    loop {
        match p.cursor.current_kind() {
            TokenKind::LParen => {
                let span = p.cursor.current_span();
                p.cursor.advance();
                let args = if p.cursor.check(&TokenKind::RParen) {
                    None
                } else {
                    p.list_of(assignment, &TokenKind::Comma)
                };
                if let Err(err) = p.cursor.expect(&TokenKind::RParen) {
                    p.error(ParseError::new(
                        ErrorCode::E1003,
                        err.message,
                        err.span,
                    ));
                }
                let mut node = ParseNode::new(NodeKind::Expression, span);
                node.op = Some(OpKind::Call);
                node.lvalue = Some(operand);
                node.parameters = args;
                operand = p.alloc(node);
            }
            TokenKind::Dot => {
                let span = p.cursor.current_span();
                p.cursor.advance();
                let name = match p.cursor.expect_ident() {
                    Ok(name) => name,
                    Err(err) => {
                        p.error(err);
                        return Some(operand);
                    }
                };
                let mut node = ParseNode::new(NodeKind::Expression, span);
                node.op = Some(OpKind::Member);
                node.lvalue = Some(operand);
                node.name = Some(name);
                operand = p.alloc(node);
            }
            TokenKind::LBracket => {
                let span = p.cursor.current_span();
                p.cursor.advance();
                let Some(index) = expression(p) else {
                    expected_expression(p);
                    return Some(operand);
                };
                if let Err(err) = p.cursor.expect(&TokenKind::RBracket) {
                    p.error(ParseError::new(ErrorCode::E1003, err.message, err.span));
                }
                let mut node = ParseNode::new(NodeKind::Expression, span);
                node.op = Some(OpKind::Index);
                node.lvalue = Some(operand);
                node.rvalue = Some(index);
                operand = p.alloc(node);
            }
            _ => break,
        }
    }
    Some(operand)
}

fn primary(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    match *p.cursor.current_kind() {
        TokenKind::Int { value, suffix } => {
            p.cursor.advance();
            Some(literal(p, span, LitKind::Int(suffix), LitValue::Int(value)))
        }
        TokenKind::Float { bits, suffix } => {
            p.cursor.advance();
            Some(literal(
                p,
                span,
                LitKind::Float(suffix),
                LitValue::Float(f64::from_bits(bits)),
            ))
        }
        TokenKind::Str(name) => {
            p.cursor.advance();
            Some(literal(p, span, LitKind::Str, LitValue::Str(name)))
        }
        TokenKind::TemplateStr(name) => {
            p.cursor.advance();
            Some(literal(p, span, LitKind::TemplateStr, LitValue::Str(name)))
        }
        TokenKind::True => {
            p.cursor.advance();
            Some(literal(p, span, LitKind::Bool, LitValue::Bool(true)))
        }
        TokenKind::False => {
            p.cursor.advance();
            Some(literal(p, span, LitKind::Bool, LitValue::Bool(false)))
        }
        TokenKind::Null => {
            p.cursor.advance();
            Some(literal(p, span, LitKind::Null, LitValue::None))
        }
        TokenKind::This => {
            p.cursor.advance();
            let mut node = ParseNode::new(NodeKind::Identifier, span);
            node.name = Some(p.intern("this"));
            Some(p.alloc(node))
        }
        TokenKind::New => new_expression(p),
        TokenKind::Ident(name) => {
            // `id => body` arrow function, parsed speculatively.
            if matches!(p.cursor.peek_kind(), TokenKind::Arrow) {
                if let Some(node) = arrow_function(p) {
                    return Some(node);
                }
            }
            p.cursor.advance();
            let mut node = ParseNode::new(NodeKind::Identifier, span);
            node.name = Some(name);
            Some(p.alloc(node))
        }
        TokenKind::LParen => {
            // `(params) => body` arrow function, parsed speculatively;
            // falls back to a parenthesized expression.
            if let Some(node) = arrow_function(p) {
                return Some(node);
            }
            p.cursor.advance();
            let inner = expression(p)?;
            if let Err(err) = p.cursor.expect(&TokenKind::RParen) {
                p.error(ParseError::new(ErrorCode::E1003, err.message, err.span));
            }
            Some(inner)
        }
        _ => None,
    }
}

/// `new Type(args)`: allocation expression. The placement form
/// (`new Type(args) => target;`) is recognized at statement level by
/// filling the node's `lvalue` with the target.
pub(crate) fn new_expression(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    if !p.cursor.eat(&TokenKind::New) {
        return None;
    }
    let data_type = ty::required_type_specifier(p)?;
    let args = if p.cursor.eat(&TokenKind::LParen) {
        let args = if p.cursor.check(&TokenKind::RParen) {
            None
        } else {
            p.list_of(assignment, &TokenKind::Comma)
        };
        if let Err(err) = p.cursor.expect(&TokenKind::RParen) {
            p.error(ParseError::new(ErrorCode::E1003, err.message, err.span));
        }
        args
    } else {
        None
    };
    let mut node = ParseNode::new(NodeKind::New, span);
    node.data_type = Some(data_type);
    node.parameters = args;
    Some(p.alloc(node))
}

/// Speculative arrow function: `(a: T, b) => body` or `a => body`.
///
/// Returns `None` (with the parser fully reverted) when the tokens turn
/// out not to be an arrow function.
fn arrow_function(p: &mut Parser<'_>) -> Option<NodeId> {
    p.push_state();
    let span = p.cursor.current_span();

    let params = if p.cursor.check_ident() && matches!(p.cursor.peek_kind(), TokenKind::Arrow) {
        // Single bare parameter.
        let name = match p.cursor.expect_ident() {
            Ok(name) => name,
            Err(_) => {
                p.revert();
                return None;
            }
        };
        let mut param = ParseNode::new(NodeKind::Variable, span);
        param.name = Some(name);
        Some(p.alloc(param))
    } else if p.cursor.eat(&TokenKind::LParen) {
        let params = if p.cursor.check(&TokenKind::RParen) {
            None
        } else {
            match p.list_of(stmt::parameter, &TokenKind::Comma) {
                Some(params) => Some(params),
                None => {
                    p.revert();
                    return None;
                }
            }
        };
        if !p.cursor.eat(&TokenKind::RParen) {
            p.revert();
            return None;
        }
        params
    } else {
        p.revert();
        return None;
    };

    if !p.cursor.eat(&TokenKind::Arrow) {
        p.revert();
        return None;
    }

    let body = if p.cursor.check(&TokenKind::LBrace) {
        stmt::block(p)
    } else {
        assignment(p)
    };
    let Some(body) = body else {
        p.revert();
        return None;
    };

    p.commit();
    let mut node = ParseNode::new(NodeKind::Function, span);
    node.parameters = params;
    node.body = Some(body);
    Some(p.alloc(node))
}

// ── Shared helpers ───────────────────────────────────────────────────

fn literal(p: &mut Parser<'_>, span: Span, lit: LitKind, value: LitValue) -> NodeId {
    let mut node = ParseNode::new(NodeKind::Literal, span);
    node.lit = Some(lit);
    node.value = value;
    p.alloc(node)
}

fn binary(p: &mut Parser<'_>, op: OpKind, span: Span, lhs: NodeId, rhs: NodeId) -> NodeId {
    let mut node = ParseNode::new(NodeKind::Expression, span);
    node.op = Some(op);
    node.lvalue = Some(lhs);
    node.rvalue = Some(rhs);
    p.alloc(node)
}

#[cold]
fn expected_expression(p: &mut Parser<'_>) {
    let err = ParseError::new(
        ErrorCode::E1002,
        format!(
            "expected an expression, found {}",
            p.cursor.current_kind().display_name()
        ),
        p.cursor.current_span(),
    );
    p.error(err);
}
