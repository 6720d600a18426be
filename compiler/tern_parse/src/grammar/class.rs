//! Class definitions: properties, methods, operators, accessors.

use super::{stmt, ty};
use crate::{ParseError, Parser};
use tern_diagnostic::ErrorCode;
use tern_ir::{ModKind, NodeId, NodeKind, OpKind, ParseNode, TokenKind};

/// `'class' name template_params? ('extends' type_list)? '{' member* '}'`
pub fn class_definition(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    p.cursor.advance(); // class
    let name = match p.cursor.expect_ident() {
        Ok(name) => name,
        Err(err) => {
            p.error(err);
            return None;
        }
    };

    let template_parameters = if p.cursor.check(&TokenKind::Lt) {
        stmt::template_parameter_list(p)
    } else {
        None
    };

    let inheritance = if p.cursor.eat(&TokenKind::Extends) {
        let bases = p.list_of(ty::type_specifier, &TokenKind::Comma);
        if bases.is_none() {
            p.error(ParseError::new(
                ErrorCode::E1005,
                "expected a base type after `extends`",
                p.cursor.current_span(),
            ));
        }
        bases
    } else {
        None
    };

    if let Err(err) = p.cursor.expect(&TokenKind::LBrace) {
        p.error(err);
        return None;
    }

    let mut first: Option<NodeId> = None;
    let mut last: Option<NodeId> = None;
    while !p.cursor.check(&TokenKind::RBrace) && !p.cursor.is_at_end() {
        let Some(member) = class_member(p) else {
            crate::recovery::synchronize(&mut p.cursor, crate::recovery::MEMBER_BOUNDARY);
            p.cursor.eat(&TokenKind::Semicolon);
            continue;
        };
        match last {
            Some(prev) => p.arena.get_mut(prev).next = Some(member),
            None => first = Some(member),
        }
        last = Some(member);
    }

    if first.is_none() {
        p.error(ParseError::new(
            ErrorCode::E1007,
            "class body must declare at least one member",
            span,
        ));
    }

    if let Err(err) = p.cursor.expect(&TokenKind::RBrace) {
        p.error(ParseError::new(ErrorCode::E1003, err.message, err.span));
    }

    let mut node = ParseNode::new(NodeKind::Class, span);
    node.name = Some(name);
    node.template_parameters = template_parameters;
    node.inheritance = inheritance;
    node.body = first;
    Some(p.alloc(node))
}

/// One class member: `modifier* (operator_method | method | property)`.
fn class_member(p: &mut Parser<'_>) -> Option<NodeId> {
    let modifiers = modifier_chain(p);

    if p.cursor.check(&TokenKind::Operator) {
        return operator_method(p, modifiers);
    }

    let span = p.cursor.current_span();
    let name = match p.cursor.expect_ident() {
        Ok(name) => name,
        Err(err) => {
            p.error(err);
            return None;
        }
    };

    if p.cursor.check(&TokenKind::LParen) || p.cursor.check(&TokenKind::Lt) {
        // Method (constructors and destructors are methods named
        // `constructor` / `destructor`).
        let template_parameters = if p.cursor.check(&TokenKind::Lt) {
            stmt::template_parameter_list(p)
        } else {
            None
        };
        let (parameters, data_type, body) = method_tail(p)?;
        let mut node = ParseNode::new(NodeKind::Function, span);
        node.name = Some(name);
        node.modifier = modifiers;
        node.template_parameters = template_parameters;
        node.parameters = parameters;
        node.data_type = data_type;
        node.body = Some(body);
        return Some(p.alloc(node));
    }

    // Property: `name ':' type ';'`
    if let Err(err) = p.cursor.expect(&TokenKind::Colon) {
        p.error(err);
        return None;
    }
    let data_type = ty::required_type_specifier(p)?;
    stmt::expect_semicolon(p);

    let mut node = ParseNode::new(NodeKind::Property, span);
    node.name = Some(name);
    node.modifier = modifiers;
    node.data_type = Some(data_type);
    Some(p.alloc(node))
}

/// `'operator' (symbol | type_spec) '(' params ')' (':' type)? block`
fn operator_method(p: &mut Parser<'_>, modifiers: Option<NodeId>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    p.cursor.advance(); // operator

    let op = operator_symbol(p);
    let target_type = if op.is_none() {
        // Conversion operator: `operator i32() { ... }`.
        match ty::type_specifier(p) {
            Some(t) => Some(t),
            None => {
                p.error(ParseError::new(
                    ErrorCode::E1008,
                    "expected an operator symbol or conversion target type",
                    p.cursor.current_span(),
                ));
                return None;
            }
        }
    } else {
        None
    };

    let (parameters, data_type, body) = method_tail(p)?;

    let op_mod = stmt::alloc_modifier(p, ModKind::Operator, span);
    let modifiers = match modifiers {
        Some(first) => {
            let mut cur = first;
            while let Some(next) = p.arena.get(cur).next {
                cur = next;
            }
            p.arena.get_mut(cur).next = Some(op_mod);
            Some(first)
        }
        None => Some(op_mod),
    };

    let mut node = ParseNode::new(NodeKind::Function, span);
    node.op = op;
    node.modifier = modifiers;
    node.parameters = parameters;
    // A conversion operator's return type is the conversion target.
    node.data_type = data_type.or(target_type);
    node.alias = target_type;
    node.body = Some(body);
    Some(p.alloc(node))
}

/// Consume an overloadable operator symbol token, if present.
fn operator_symbol(p: &mut Parser<'_>) -> Option<OpKind> {
    let op = match p.cursor.current_kind() {
        TokenKind::Plus => OpKind::Add,
        TokenKind::Minus => OpKind::Sub,
        TokenKind::Star => OpKind::Mul,
        TokenKind::Slash => OpKind::Div,
        TokenKind::Percent => OpKind::Mod,
        TokenKind::EqEq => OpKind::Eq,
        TokenKind::BangEq => OpKind::NotEq,
        TokenKind::Lt => OpKind::Less,
        TokenKind::LtEq => OpKind::LessEq,
        TokenKind::Gt => OpKind::Greater,
        TokenKind::GtEq => OpKind::GreaterEq,
        TokenKind::Shl => OpKind::Shl,
        TokenKind::Shr => OpKind::Shr,
        TokenKind::Amp => OpKind::BitAnd,
        TokenKind::Pipe => OpKind::BitOr,
        TokenKind::Caret => OpKind::BitXor,
        TokenKind::AmpAmp => OpKind::LogAnd,
        TokenKind::PipePipe => OpKind::LogOr,
        TokenKind::Bang => OpKind::Not,
        TokenKind::Tilde => OpKind::Invert,
        TokenKind::Eq => OpKind::Assign,
        TokenKind::PlusEq => OpKind::AddAssign,
        TokenKind::MinusEq => OpKind::SubAssign,
        TokenKind::StarEq => OpKind::MulAssign,
        TokenKind::SlashEq => OpKind::DivAssign,
        TokenKind::LBracket => {
            // `operator [](index)` spans two tokens.
            p.cursor.advance();
            if let Err(err) = p.cursor.expect(&TokenKind::RBracket) {
                p.error(err);
            }
            return Some(OpKind::Index);
        }
        _ => return None,
    };
    p.cursor.advance();
    Some(op)
}

/// `'(' params? ')' (':' type)? block`: shared tail of every method form.
fn method_tail(p: &mut Parser<'_>) -> Option<(Option<NodeId>, Option<NodeId>, NodeId)> {
    if let Err(err) = p.cursor.expect(&TokenKind::LParen) {
        p.error(err);
        return None;
    }
    let parameters = if p.cursor.check(&TokenKind::RParen) {
        None
    } else {
        p.list_of(stmt::parameter, &TokenKind::Comma)
    };
    if let Err(err) = p.cursor.expect(&TokenKind::RParen) {
        p.error(ParseError::new(ErrorCode::E1003, err.message, err.span));
    }
    let data_type = if p.cursor.eat(&TokenKind::Colon) {
        ty::required_type_specifier(p)
    } else {
        None
    };
    let body = stmt::block(p).or_else(|| {
        p.error(ParseError::new(
            ErrorCode::E1008,
            "expected a method body",
            p.cursor.current_span(),
        ));
        None
    })?;
    Some((parameters, data_type, body))
}

/// Zero or more member modifiers chained via `next`.
fn modifier_chain(p: &mut Parser<'_>) -> Option<NodeId> {
    let mut first: Option<NodeId> = None;
    let mut last: Option<NodeId> = None;
    loop {
        let kind = match p.cursor.current_kind() {
            TokenKind::Public => ModKind::Public,
            TokenKind::Private => ModKind::Private,
            TokenKind::Static => ModKind::Static,
            TokenKind::Get => ModKind::Getter,
            TokenKind::Set => ModKind::Setter,
            _ => break,
        };
        let span = p.cursor.current_span();
        p.cursor.advance();
        let node = stmt::alloc_modifier(p, kind, span);
        match last {
            Some(prev) => p.arena.get_mut(prev).next = Some(node),
            None => first = Some(node),
        }
        last = Some(node);
    }
    first
}
