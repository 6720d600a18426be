//! Statement grammar.

use super::{class, expr, ty};
use crate::{ParseError, Parser};
use tern_diagnostic::ErrorCode;
use tern_ir::{
    LitValue, ModKind, NodeId, NodeKind, ParseNode, Span, TokenKind,
};

/// Parse one statement. Returns `None` (with errors recorded) when the
/// tokens do not form a statement; the caller resynchronizes.
pub fn statement(p: &mut Parser<'_>) -> Option<NodeId> {
    match p.cursor.current_kind() {
        TokenKind::Let | TokenKind::Const => variable_statement(p),
        TokenKind::Class => class::class_definition(p),
        TokenKind::Function => function_declaration(p),
        TokenKind::Type => type_alias(p),
        TokenKind::Import => import_statement(p),
        TokenKind::Export => export_statement(p),
        TokenKind::If => if_statement(p),
        TokenKind::While => while_statement(p),
        TokenKind::Do => do_while_statement(p),
        TokenKind::For => for_statement(p),
        TokenKind::Switch => switch_statement(p),
        TokenKind::Try => try_statement(p),
        TokenKind::Throw => throw_statement(p),
        TokenKind::Return => return_statement(p),
        TokenKind::Break => jump_statement(p, NodeKind::Break),
        TokenKind::Continue => jump_statement(p, NodeKind::Continue),
        TokenKind::LBrace => block(p),
        TokenKind::Semicolon => {
            // Empty statement.
            let span = p.cursor.current_span();
            p.cursor.advance();
            Some(p.alloc(ParseNode::new(NodeKind::Block, span)))
        }
        TokenKind::New => {
            p.push_state();
            if let Some(node) = placement_new_statement(p) {
                p.commit();
                return Some(node);
            }
            p.revert();
            expression_statement(p)
        }
        _ => expression_statement(p),
    }
}

/// `'{' statement* '}'`
pub fn block(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    if !p.cursor.eat(&TokenKind::LBrace) {
        return None;
    }
    let body = p.statement_list(&TokenKind::RBrace);
    if let Err(err) = p.cursor.expect(&TokenKind::RBrace) {
        p.error(ParseError::new(ErrorCode::E1003, err.message, err.span));
    }
    let mut node = ParseNode::new(NodeKind::Block, span);
    node.body = body;
    Some(p.alloc(node))
}

/// `('let' | 'const') declarator ';'` where the declarator is either
/// `name (':' type)? ('=' init)?` or an object decompositor
/// `'{' name (',' name)* '}' '=' init`.
fn variable_statement(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    let is_const = p.cursor.check(&TokenKind::Const);
    p.cursor.advance(); // let | const

    let modifier = is_const.then(|| alloc_modifier(p, ModKind::Const, span));

    if p.cursor.check(&TokenKind::LBrace) {
        return object_decompositor(p, span, modifier);
    }

    let name = match p.cursor.expect_ident() {
        Ok(name) => name,
        Err(err) => {
            p.error(err);
            return None;
        }
    };
    let data_type = if p.cursor.eat(&TokenKind::Colon) {
        ty::required_type_specifier(p)
    } else {
        None
    };
    let initializer = if p.cursor.eat(&TokenKind::Eq) {
        expr::assignment(p).or_else(|| {
            p.error(ParseError::new(
                ErrorCode::E1002,
                "expected an initializer expression",
                p.cursor.current_span(),
            ));
            None
        })
    } else {
        None
    };
    expect_semicolon(p);

    let mut node = ParseNode::new(NodeKind::Variable, span);
    node.name = Some(name);
    node.data_type = data_type;
    node.initializer = initializer;
    node.modifier = modifier;
    Some(p.alloc(node))
}

/// `'{' name (',' name)* '}' '=' init ';'` after `let`/`const`.
fn object_decompositor(
    p: &mut Parser<'_>,
    span: Span,
    modifier: Option<NodeId>,
) -> Option<NodeId> {
    p.cursor.advance(); // {
    let names = p.list_of(bare_variable, &TokenKind::Comma);
    if names.is_none() {
        p.error(ParseError::new(
            ErrorCode::E1004,
            "expected at least one binding in object decompositor",
            p.cursor.current_span(),
        ));
    }
    if let Err(err) = p.cursor.expect(&TokenKind::RBrace) {
        p.error(ParseError::new(ErrorCode::E1003, err.message, err.span));
    }
    if let Err(err) = p.cursor.expect(&TokenKind::Eq) {
        p.error(err);
        return None;
    }
    let initializer = expr::assignment(p)?;
    expect_semicolon(p);

    let mut node = ParseNode::new(NodeKind::ObjectDecompositor, span);
    node.parameters = names;
    node.initializer = Some(initializer);
    node.modifier = modifier;
    Some(p.alloc(node))
}

/// A bare `name` binding (decompositor element).
fn bare_variable(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    let name = p.cursor.expect_ident().ok()?;
    let mut node = ParseNode::new(NodeKind::Variable, span);
    node.name = Some(name);
    Some(p.alloc(node))
}

/// `name (':' type)?`: function parameter.
pub(crate) fn parameter(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    let name = p.cursor.expect_ident().ok()?;
    let data_type = if p.cursor.eat(&TokenKind::Colon) {
        Some(ty::type_specifier(p)?)
    } else {
        None
    };
    let mut node = ParseNode::new(NodeKind::Variable, span);
    node.name = Some(name);
    node.data_type = data_type;
    Some(p.alloc(node))
}

/// `'<' ident (',' ident)* '>'`: template parameter declaration.
pub(crate) fn template_parameter_list(p: &mut Parser<'_>) -> Option<NodeId> {
    if !p.cursor.eat(&TokenKind::Lt) {
        return None;
    }
    let first = p.list_of(template_parameter, &TokenKind::Comma);
    if first.is_none() {
        p.error(ParseError::new(
            ErrorCode::E1004,
            "expected template parameter name",
            p.cursor.current_span(),
        ));
    }
    if let Err(err) = p.cursor.expect(&TokenKind::Gt) {
        p.error(err);
    }
    first
}

fn template_parameter(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    let name = p.cursor.expect_ident().ok()?;
    let mut node = ParseNode::new(NodeKind::Identifier, span);
    node.name = Some(name);
    Some(p.alloc(node))
}

/// `'function' name template_params? '(' params? ')' (':' type)? block`
pub(crate) fn function_declaration(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    p.cursor.advance(); // function
    let name = match p.cursor.expect_ident() {
        Ok(name) => name,
        Err(err) => {
            p.error(err);
            return None;
        }
    };

    let template_parameters = if p.cursor.check(&TokenKind::Lt) {
        template_parameter_list(p)
    } else {
        None
    };

    if let Err(err) = p.cursor.expect(&TokenKind::LParen) {
        p.error(err);
        return None;
    }
    let parameters = if p.cursor.check(&TokenKind::RParen) {
        None
    } else {
        p.list_of(parameter, &TokenKind::Comma)
    };
    if let Err(err) = p.cursor.expect(&TokenKind::RParen) {
        p.error(ParseError::new(ErrorCode::E1003, err.message, err.span));
    }

    let data_type = if p.cursor.eat(&TokenKind::Colon) {
        ty::required_type_specifier(p)
    } else {
        None
    };

    let body = block(p).or_else(|| {
        p.error(ParseError::new(
            ErrorCode::E1008,
            "expected a function body",
            p.cursor.current_span(),
        ));
        None
    })?;

    let mut node = ParseNode::new(NodeKind::Function, span);
    node.name = Some(name);
    node.template_parameters = template_parameters;
    node.parameters = parameters;
    node.data_type = data_type;
    node.body = Some(body);
    Some(p.alloc(node))
}

/// `'type' name '=' type_spec ';'`
fn type_alias(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    p.cursor.advance(); // type
    let name = match p.cursor.expect_ident() {
        Ok(name) => name,
        Err(err) => {
            p.error(err);
            return None;
        }
    };
    if let Err(err) = p.cursor.expect(&TokenKind::Eq) {
        p.error(err);
        return None;
    }
    let data_type = ty::required_type_specifier(p)?;
    expect_semicolon(p);

    let mut node = ParseNode::new(NodeKind::TypeAlias, span);
    node.name = Some(name);
    node.data_type = Some(data_type);
    Some(p.alloc(node))
}

/// `'if' '(' cond ')' statement ('else' statement)?`
fn if_statement(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    p.cursor.advance(); // if
    let cond = parenthesized_condition(p)?;
    let body = statement(p)?;
    let else_body = if p.cursor.eat(&TokenKind::Else) {
        statement(p)
    } else {
        None
    };

    let mut node = ParseNode::new(NodeKind::If, span);
    node.cond = Some(cond);
    node.body = Some(body);
    node.else_body = else_body;
    Some(p.alloc(node))
}

/// `'while' '(' cond ')' statement`
fn while_statement(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    p.cursor.advance(); // while
    let cond = parenthesized_condition(p)?;
    let body = statement(p)?;

    let mut node = ParseNode::new(NodeKind::WhileLoop, span);
    node.cond = Some(cond);
    node.body = Some(body);
    Some(p.alloc(node))
}

/// `'do' statement 'while' '(' cond ')' ';'`
fn do_while_statement(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    p.cursor.advance(); // do
    let body = statement(p)?;
    if let Err(err) = p.cursor.expect(&TokenKind::While) {
        p.error(err);
        return None;
    }
    let cond = parenthesized_condition(p)?;
    expect_semicolon(p);

    let mut node = ParseNode::new(NodeKind::DoWhileLoop, span);
    node.cond = Some(cond);
    node.body = Some(body);
    Some(p.alloc(node))
}

/// `'for' '(' init? ';' cond? ';' post? ')' statement`
fn for_statement(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    p.cursor.advance(); // for
    if let Err(err) = p.cursor.expect(&TokenKind::LParen) {
        p.error(err);
        return None;
    }

    let initializer = if p.cursor.check(&TokenKind::Semicolon) {
        p.cursor.advance();
        None
    } else if matches!(p.cursor.current_kind(), TokenKind::Let | TokenKind::Const) {
        // The declaration consumes its own semicolon.
        variable_statement(p)
    } else {
        let init = expr::expression(p);
        expect_semicolon(p);
        init
    };

    let cond = if p.cursor.check(&TokenKind::Semicolon) {
        None
    } else {
        expr::expression(p)
    };
    expect_semicolon(p);

    let post = if p.cursor.check(&TokenKind::RParen) {
        None
    } else {
        expr::expression(p)
    };
    if let Err(err) = p.cursor.expect(&TokenKind::RParen) {
        p.error(ParseError::new(ErrorCode::E1003, err.message, err.span));
    }

    let body = statement(p)?;

    let mut node = ParseNode::new(NodeKind::ForLoop, span);
    node.initializer = initializer;
    node.cond = cond;
    node.rvalue = post;
    node.body = Some(body);
    Some(p.alloc(node))
}

/// `'switch' '(' expr ')' '{' case* '}'`
fn switch_statement(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    p.cursor.advance(); // switch
    let cond = parenthesized_condition(p)?;
    if let Err(err) = p.cursor.expect(&TokenKind::LBrace) {
        p.error(err);
        return None;
    }

    let cases = p.array_of(switch_case);
    if let Err(err) = p.cursor.expect(&TokenKind::RBrace) {
        p.error(ParseError::new(ErrorCode::E1003, err.message, err.span));
    }

    let mut node = ParseNode::new(NodeKind::Switch, span);
    node.cond = Some(cond);
    node.body = cases;
    Some(p.alloc(node))
}

/// `'case' expr ':' statement*` or `'default' ':' statement*`
fn switch_case(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    let cond = if p.cursor.eat(&TokenKind::Case) {
        let cond = expr::expression(p);
        if cond.is_none() {
            p.error(ParseError::new(
                ErrorCode::E1002,
                "expected a case expression",
                p.cursor.current_span(),
            ));
            return None;
        }
        cond
    } else if p.cursor.eat(&TokenKind::Default) {
        None
    } else {
        return None;
    };
    if let Err(err) = p.cursor.expect(&TokenKind::Colon) {
        p.error(err);
    }

    // Statements until the next case/default/closing brace.
    let mut first: Option<NodeId> = None;
    let mut last: Option<NodeId> = None;
    while !matches!(
        p.cursor.current_kind(),
        TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof
    ) {
        let Some(node) = statement(p) else { break };
        match last {
            Some(prev) => p.arena.get_mut(prev).next = Some(node),
            None => first = Some(node),
        }
        last = Some(node);
    }

    let mut node = ParseNode::new(NodeKind::SwitchCase, span);
    node.cond = cond;
    node.body = first;
    Some(p.alloc(node))
}

/// `'try' block 'catch' '(' name ':' type ')' block`
fn try_statement(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    p.cursor.advance(); // try
    let body = block(p).or_else(|| {
        p.error(ParseError::new(
            ErrorCode::E1008,
            "expected a block after `try`",
            p.cursor.current_span(),
        ));
        None
    })?;

    let catch_span = p.cursor.current_span();
    if let Err(err) = p.cursor.expect(&TokenKind::Catch) {
        p.error(err);
        return None;
    }
    if let Err(err) = p.cursor.expect(&TokenKind::LParen) {
        p.error(err);
        return None;
    }
    let param = catch_parameter(p)?;
    if let Err(err) = p.cursor.expect(&TokenKind::RParen) {
        p.error(ParseError::new(ErrorCode::E1003, err.message, err.span));
    }
    let catch_body = block(p)?;

    let mut catch = ParseNode::new(NodeKind::Catch, catch_span);
    catch.parameters = Some(param);
    catch.body = Some(catch_body);
    let catch = p.alloc(catch);

    let mut node = ParseNode::new(NodeKind::Try, span);
    node.body = Some(body);
    node.else_body = Some(catch);
    Some(p.alloc(node))
}

/// Catch parameter; the type annotation is required.
fn catch_parameter(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    let name = match p.cursor.expect_ident() {
        Ok(name) => name,
        Err(err) => {
            p.error(err);
            return None;
        }
    };
    if !p.cursor.eat(&TokenKind::Colon) {
        p.error(ParseError::new(
            ErrorCode::E1009,
            "catch parameter requires a type annotation",
            span,
        ));
        return None;
    }
    let data_type = ty::required_type_specifier(p)?;
    let mut node = ParseNode::new(NodeKind::Variable, span);
    node.name = Some(name);
    node.data_type = Some(data_type);
    Some(p.alloc(node))
}

/// `'throw' expr ';'`
fn throw_statement(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    p.cursor.advance(); // throw
    let value = expr::expression(p).or_else(|| {
        p.error(ParseError::new(
            ErrorCode::E1002,
            "expected an expression after `throw`",
            p.cursor.current_span(),
        ));
        None
    })?;
    expect_semicolon(p);

    let mut node = ParseNode::new(NodeKind::Throw, span);
    node.rvalue = Some(value);
    Some(p.alloc(node))
}

/// `'return' expr? ';'`
fn return_statement(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    p.cursor.advance(); // return
    let value = if p.cursor.check(&TokenKind::Semicolon) {
        None
    } else {
        expr::expression(p)
    };
    expect_semicolon(p);

    let mut node = ParseNode::new(NodeKind::Return, span);
    node.rvalue = value;
    Some(p.alloc(node))
}

/// `'break' ';'` or `'continue' ';'`
fn jump_statement(p: &mut Parser<'_>, kind: NodeKind) -> Option<NodeId> {
    let span = p.cursor.current_span();
    p.cursor.advance();
    expect_semicolon(p);
    Some(p.alloc(ParseNode::new(kind, span)))
}

/// `'import' '{' import_symbols '}' 'from' string ';'`
fn import_statement(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    p.cursor.advance(); // import
    if let Err(err) = p.cursor.expect(&TokenKind::LBrace) {
        p.error(err);
        return None;
    }

    let symbols = if p.cursor.check(&TokenKind::Star) {
        // `* as M`
        let star_span = p.cursor.current_span();
        p.cursor.advance();
        if let Err(err) = p.cursor.expect(&TokenKind::As) {
            p.error(err);
            return None;
        }
        let alias = match p.cursor.expect_ident() {
            Ok(alias) => alias,
            Err(err) => {
                p.error(err);
                return None;
            }
        };
        let mut sym = ParseNode::new(NodeKind::ImportSymbol, star_span);
        sym.name = Some(p.intern("*"));
        sym.alias = Some(alloc_ident(p, alias, star_span));
        Some(p.alloc(sym))
    } else {
        p.list_of(import_symbol, &TokenKind::Comma)
    };
    if symbols.is_none() {
        p.error(ParseError::new(
            ErrorCode::E1004,
            "expected at least one imported symbol",
            p.cursor.current_span(),
        ));
    }

    if let Err(err) = p.cursor.expect(&TokenKind::RBrace) {
        p.error(ParseError::new(ErrorCode::E1003, err.message, err.span));
    }
    if let Err(err) = p.cursor.expect(&TokenKind::From) {
        p.error(err);
        return None;
    }
    let module = match *p.cursor.current_kind() {
        TokenKind::Str(name) => {
            p.cursor.advance();
            name
        }
        _ => {
            p.error(ParseError::new(
                ErrorCode::E1001,
                format!(
                    "expected a module name string, found {}",
                    p.cursor.current_kind().display_name()
                ),
                p.cursor.current_span(),
            ));
            return None;
        }
    };
    expect_semicolon(p);

    let mut node = ParseNode::new(NodeKind::Import, span);
    node.body = symbols;
    node.value = LitValue::Str(module);
    Some(p.alloc(node))
}

/// `name ('as' alias)? (':' type)?`: one imported symbol.
fn import_symbol(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    let name = p.cursor.expect_ident().ok()?;
    let alias = if p.cursor.eat(&TokenKind::As) {
        let alias_span = p.cursor.previous_span();
        let alias = p.cursor.expect_ident().ok()?;
        Some(alloc_ident(p, alias, alias_span))
    } else {
        None
    };
    let data_type = if p.cursor.eat(&TokenKind::Colon) {
        Some(ty::type_specifier(p)?)
    } else {
        None
    };

    let mut node = ParseNode::new(NodeKind::ImportSymbol, span);
    node.name = Some(name);
    node.alias = alias;
    node.data_type = data_type;
    Some(p.alloc(node))
}

/// `'export' declaration`
fn export_statement(p: &mut Parser<'_>) -> Option<NodeId> {
    let span = p.cursor.current_span();
    p.cursor.advance(); // export
    let inner = match p.cursor.current_kind() {
        TokenKind::Class => class::class_definition(p),
        TokenKind::Function => function_declaration(p),
        TokenKind::Let | TokenKind::Const => variable_statement(p),
        TokenKind::Type => type_alias(p),
        _ => {
            p.error(ParseError::new(
                ErrorCode::E1008,
                "expected a declaration after `export`",
                p.cursor.current_span(),
            ));
            return None;
        }
    }?;

    let mut node = ParseNode::new(NodeKind::Export, span);
    node.body = Some(inner);
    Some(p.alloc(node))
}

/// `new Type(args) => target ';'`
fn placement_new_statement(p: &mut Parser<'_>) -> Option<NodeId> {
    let new_node = expr::new_expression(p)?;
    if !p.cursor.eat(&TokenKind::Arrow) {
        return None;
    }
    let target = expr::assignment(p)?;
    expect_semicolon(p);
    p.arena.get_mut(new_node).lvalue = Some(target);
    Some(new_node)
}

/// `expr ';'`
fn expression_statement(p: &mut Parser<'_>) -> Option<NodeId> {
    let node = expr::expression(p)?;
    expect_semicolon(p);
    Some(node)
}

// ── Helpers ──────────────────────────────────────────────────────────

fn parenthesized_condition(p: &mut Parser<'_>) -> Option<NodeId> {
    if let Err(err) = p.cursor.expect(&TokenKind::LParen) {
        p.error(err);
        return None;
    }
    let cond = expr::expression(p).or_else(|| {
        p.error(ParseError::new(
            ErrorCode::E1002,
            "expected a condition expression",
            p.cursor.current_span(),
        ));
        None
    })?;
    if let Err(err) = p.cursor.expect(&TokenKind::RParen) {
        p.error(ParseError::new(ErrorCode::E1003, err.message, err.span));
    }
    Some(cond)
}

/// Consume `;`, recording a missing-semicolon error when absent.
pub(crate) fn expect_semicolon(p: &mut Parser<'_>) {
    if !p.cursor.eat(&TokenKind::Semicolon) {
        let err = ParseError::new(
            ErrorCode::E1006,
            format!(
                "expected `;`, found {}",
                p.cursor.current_kind().display_name()
            ),
            p.cursor.previous_span(),
        );
        p.error(err);
    }
}

pub(crate) fn alloc_modifier(p: &mut Parser<'_>, kind: ModKind, span: Span) -> NodeId {
    let mut node = ParseNode::new(NodeKind::Modifier, span);
    node.modifier_kind = Some(kind);
    p.alloc(node)
}

fn alloc_ident(p: &mut Parser<'_>, name: tern_ir::Name, span: Span) -> NodeId {
    let mut node = ParseNode::new(NodeKind::Identifier, span);
    node.name = Some(name);
    p.alloc(node)
}
