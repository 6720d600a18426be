//! Raw token conversion: interning, numeric parsing, escape cooking.

use crate::raw_token::RawToken;
use tern_diagnostic::{Diagnostic, ErrorCode};
use tern_ir::{Name, NumberSuffix, Span, StringInterner, TokenKind};

/// Convert one raw token into its final [`TokenKind`].
///
/// Returns the kind plus an optional diagnostic (invalid suffix,
/// unterminated literal). Tokens that fail conversion come back as
/// `TokenKind::Error` so the stream stays total.
pub(crate) fn convert_token(
    raw: RawToken,
    slice: &str,
    span: Span,
    interner: &StringInterner,
) -> (TokenKind, Option<Diagnostic>) {
    let kind = match raw {
        RawToken::BlockComment(terminated) => {
            // Terminated comments are dropped by the caller; only the
            // unterminated case reaches conversion.
            debug_assert!(!terminated);
            return (
                TokenKind::Error,
                Some(Diagnostic::error(
                    ErrorCode::E0005,
                    "unterminated block comment",
                    span,
                )),
            );
        }

        RawToken::If => TokenKind::If,
        RawToken::Else => TokenKind::Else,
        RawToken::While => TokenKind::While,
        RawToken::Do => TokenKind::Do,
        RawToken::For => TokenKind::For,
        RawToken::Switch => TokenKind::Switch,
        RawToken::Case => TokenKind::Case,
        RawToken::Default => TokenKind::Default,
        RawToken::Break => TokenKind::Break,
        RawToken::Continue => TokenKind::Continue,
        RawToken::Return => TokenKind::Return,
        RawToken::Throw => TokenKind::Throw,
        RawToken::Try => TokenKind::Try,
        RawToken::Catch => TokenKind::Catch,
        RawToken::New => TokenKind::New,
        RawToken::As => TokenKind::As,
        RawToken::Sizeof => TokenKind::Sizeof,
        RawToken::This => TokenKind::This,
        RawToken::Null => TokenKind::Null,
        RawToken::True => TokenKind::True,
        RawToken::False => TokenKind::False,
        RawToken::Import => TokenKind::Import,
        RawToken::Export => TokenKind::Export,
        RawToken::From => TokenKind::From,
        RawToken::Type => TokenKind::Type,
        RawToken::Class => TokenKind::Class,
        RawToken::Extends => TokenKind::Extends,
        RawToken::Function => TokenKind::Function,
        RawToken::Let => TokenKind::Let,
        RawToken::Const => TokenKind::Const,
        RawToken::Public => TokenKind::Public,
        RawToken::Private => TokenKind::Private,
        RawToken::Static => TokenKind::Static,
        RawToken::Get => TokenKind::Get,
        RawToken::Set => TokenKind::Set,
        RawToken::Operator => TokenKind::Operator,

        RawToken::Ident => TokenKind::Ident(interner.intern(slice)),
        RawToken::Int => return convert_int(slice, span),
        RawToken::Float => return convert_float(slice, span),
        RawToken::Str => TokenKind::Str(cook_string(&slice[1..slice.len() - 1], interner)),
        RawToken::UnterminatedStr => {
            return (
                TokenKind::Error,
                Some(Diagnostic::error(
                    ErrorCode::E0001,
                    "unterminated string literal",
                    span,
                )),
            );
        }
        RawToken::TemplateStr => {
            TokenKind::TemplateStr(cook_string(&slice[1..slice.len() - 1], interner))
        }
        RawToken::UnterminatedTemplateStr => {
            return (
                TokenKind::Error,
                Some(Diagnostic::error(
                    ErrorCode::E0004,
                    "unterminated template string",
                    span,
                )),
            );
        }

        RawToken::ShlEq => TokenKind::ShlEq,
        RawToken::ShrEq => TokenKind::ShrEq,
        RawToken::AmpAmpEq => TokenKind::AmpAmpEq,
        RawToken::PipePipeEq => TokenKind::PipePipeEq,
        RawToken::PlusEq => TokenKind::PlusEq,
        RawToken::MinusEq => TokenKind::MinusEq,
        RawToken::StarEq => TokenKind::StarEq,
        RawToken::SlashEq => TokenKind::SlashEq,
        RawToken::PercentEq => TokenKind::PercentEq,
        RawToken::AmpEq => TokenKind::AmpEq,
        RawToken::PipeEq => TokenKind::PipeEq,
        RawToken::CaretEq => TokenKind::CaretEq,
        RawToken::EqEq => TokenKind::EqEq,
        RawToken::BangEq => TokenKind::BangEq,
        RawToken::LtEq => TokenKind::LtEq,
        RawToken::GtEq => TokenKind::GtEq,
        RawToken::Shl => TokenKind::Shl,
        RawToken::Shr => TokenKind::Shr,
        RawToken::AmpAmp => TokenKind::AmpAmp,
        RawToken::PipePipe => TokenKind::PipePipe,
        RawToken::PlusPlus => TokenKind::PlusPlus,
        RawToken::MinusMinus => TokenKind::MinusMinus,
        RawToken::Arrow => TokenKind::Arrow,

        RawToken::Plus => TokenKind::Plus,
        RawToken::Minus => TokenKind::Minus,
        RawToken::Star => TokenKind::Star,
        RawToken::Slash => TokenKind::Slash,
        RawToken::Percent => TokenKind::Percent,
        RawToken::Eq => TokenKind::Eq,
        RawToken::Lt => TokenKind::Lt,
        RawToken::Gt => TokenKind::Gt,
        RawToken::Bang => TokenKind::Bang,
        RawToken::Amp => TokenKind::Amp,
        RawToken::Pipe => TokenKind::Pipe,
        RawToken::Caret => TokenKind::Caret,
        RawToken::Tilde => TokenKind::Tilde,
        RawToken::Question => TokenKind::Question,
        RawToken::Colon => TokenKind::Colon,
        RawToken::Dot => TokenKind::Dot,
        RawToken::Comma => TokenKind::Comma,
        RawToken::Semicolon => TokenKind::Semicolon,

        RawToken::LParen => TokenKind::LParen,
        RawToken::RParen => TokenKind::RParen,
        RawToken::LBrace => TokenKind::LBrace,
        RawToken::RBrace => TokenKind::RBrace,
        RawToken::LBracket => TokenKind::LBracket,
        RawToken::RBracket => TokenKind::RBracket,
    };
    (kind, None)
}

fn convert_int(slice: &str, span: Span) -> (TokenKind, Option<Diagnostic>) {
    let digits_end = slice
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(slice.len());
    let (digits, suffix_text) = slice.split_at(digits_end);

    let Some(suffix) = NumberSuffix::parse(suffix_text) else {
        return (
            TokenKind::Error,
            Some(Diagnostic::error(
                ErrorCode::E0003,
                format!("invalid numeric suffix `{suffix_text}`"),
                span,
            )),
        );
    };
    match digits.parse::<u64>() {
        Ok(value) => (TokenKind::Int { value, suffix }, None),
        Err(_) => (
            TokenKind::Error,
            Some(Diagnostic::error(
                ErrorCode::E0003,
                "integer literal too large",
                span,
            )),
        ),
    }
}

fn convert_float(slice: &str, span: Span) -> (TokenKind, Option<Diagnostic>) {
    // The numeric part ends where the (optional) suffix tail begins. An
    // exponent's sign and `e` are part of the number, so scan from the end.
    let digits_end = slice.len()
        - slice
            .bytes()
            .rev()
            .position(|b| b.is_ascii_digit())
            .unwrap_or(0);
    let (number, suffix_text) = slice.split_at(digits_end);

    let suffix = match suffix_text {
        "" => NumberSuffix::None,
        "f" => NumberSuffix::F,
        other => {
            return (
                TokenKind::Error,
                Some(Diagnostic::error(
                    ErrorCode::E0003,
                    format!("invalid numeric suffix `{other}`"),
                    span,
                )),
            );
        }
    };
    match number.parse::<f64>() {
        Ok(value) => (
            TokenKind::Float {
                bits: value.to_bits(),
                suffix,
            },
            None,
        ),
        Err(_) => (
            TokenKind::Error,
            Some(Diagnostic::error(
                ErrorCode::E0003,
                "invalid float literal",
                span,
            )),
        ),
    }
}

/// Process escape sequences in a string or template-string body.
/// Unknown escapes are preserved literally.
fn cook_string(body: &str, interner: &StringInterner) -> Name {
    if !body.contains('\\') {
        return interner.intern(body);
    }
    let mut cooked = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            cooked.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => cooked.push('\n'),
            Some('r') => cooked.push('\r'),
            Some('t') => cooked.push('\t'),
            Some('0') => cooked.push('\0'),
            Some('\\') => cooked.push('\\'),
            Some('"') => cooked.push('"'),
            Some('\'') => cooked.push('\''),
            Some('`') => cooked.push('`'),
            Some(other) => {
                cooked.push('\\');
                cooked.push(other);
            }
            None => cooked.push('\\'),
        }
    }
    interner.intern(&cooked)
}
