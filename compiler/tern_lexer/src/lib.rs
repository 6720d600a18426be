//! Lexer for tern using logos with string interning.
//!
//! The entry point is [`lex()`], which converts source text into a
//! [`LexOutput`]: an `Eof`-terminated [`TokenList`] plus the file-level
//! diagnostics. The lexer is total: any unrecognized input becomes a
//! `TokenKind::Error` token with the offending range and lexing
//! continues.
//!
//! # Literals
//!
//! - Integers are decimal with an optional lowercase suffix
//!   (`b s l ll u ub us ul ull`); suffixes are case-sensitive.
//! - Floats require digits on both sides of the dot, allow an exponent,
//!   and accept the `f` suffix for 32-bit width.
//! - Strings are double-quoted, single-line; template strings use
//!   back-ticks and may span lines. Both support `\n \r \t \0 \\ \" \' \``
//!   escapes; unknown escapes are preserved literally.
//!
//! Line comments (`//`) and block comments (`/* */`) are trivia; an
//! unterminated block comment or string is a diagnostic.

mod convert;
mod raw_token;

use convert::convert_token;
use logos::Logos;
use raw_token::RawToken;
use tern_diagnostic::{Diagnostic, ErrorCode};
use tern_ir::{Span, StringInterner, Token, TokenKind, TokenList};

/// Lexer output: the token stream plus file-level diagnostics.
#[derive(Debug, Default)]
pub struct LexOutput {
    pub tokens: TokenList,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lex source text into a token stream.
///
/// The returned list always ends with exactly one `Eof` token, which is
/// the invariant the parser's cursor relies on to avoid bounds checks.
pub fn lex(source: &str, interner: &StringInterner) -> LexOutput {
    let mut output = LexOutput::default();
    let mut logos = RawToken::lexer(source);

    while let Some(result) = logos.next() {
        let span = Span::from_range(logos.span());
        match result {
            Ok(RawToken::BlockComment(true)) => {}
            Ok(raw) => {
                let (kind, diagnostic) = convert_token(raw, logos.slice(), span, interner);
                if let Some(diagnostic) = diagnostic {
                    output.diagnostics.push(diagnostic);
                }
                output.tokens.push(Token::new(kind, span));
            }
            Err(()) => {
                output.diagnostics.push(Diagnostic::error(
                    ErrorCode::E0002,
                    format!("unexpected character `{}`", logos.slice()),
                    span,
                ));
                output.tokens.push(Token::new(TokenKind::Error, span));
            }
        }
    }

    let eof = u32::try_from(source.len()).unwrap_or(u32::MAX);
    output.tokens.push(Token::new(TokenKind::Eof, Span::point(eof)));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_ir::NumberSuffix;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let interner = StringInterner::new();
        lex(source, &interner).tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_and_idents() {
        let interner = StringInterner::new();
        let out = lex("let xs = sizeofx;", &interner);
        assert!(out.diagnostics.is_empty());
        let kinds: Vec<_> = out.tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds[0], TokenKind::Let);
        assert!(matches!(kinds[1], TokenKind::Ident(_)));
        assert_eq!(kinds[2], TokenKind::Eq);
        // `sizeofx` is an identifier, not `sizeof` + `x`.
        assert!(matches!(kinds[3], TokenKind::Ident(_)));
        assert_eq!(kinds[4], TokenKind::Semicolon);
        assert_eq!(kinds[5], TokenKind::Eof);
    }

    #[test]
    fn test_integer_suffixes() {
        assert_eq!(
            kinds("5 5b 5ull")[..3],
            [
                TokenKind::Int { value: 5, suffix: NumberSuffix::None },
                TokenKind::Int { value: 5, suffix: NumberSuffix::B },
                TokenKind::Int { value: 5, suffix: NumberSuffix::Ull },
            ]
        );
    }

    #[test]
    fn test_uppercase_suffix_is_error() {
        let interner = StringInterner::new();
        let out = lex("5UL", &interner);
        assert_eq!(out.tokens[0].kind, TokenKind::Error);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].code, ErrorCode::E0003);
    }

    #[test]
    fn test_floats() {
        let ks = kinds("1.5 2.0e3 1.25f");
        assert_eq!(ks[0], TokenKind::Float { bits: 1.5f64.to_bits(), suffix: NumberSuffix::None });
        assert_eq!(ks[1], TokenKind::Float { bits: 2000.0f64.to_bits(), suffix: NumberSuffix::None });
        assert_eq!(ks[2], TokenKind::Float { bits: 1.25f64.to_bits(), suffix: NumberSuffix::F });
    }

    #[test]
    fn test_string_escapes() {
        let interner = StringInterner::new();
        let out = lex(r#""a\tb\q""#, &interner);
        let TokenKind::Str(name) = out.tokens[0].kind else {
            panic!("expected string, got {:?}", out.tokens[0].kind);
        };
        // Known escapes cook; unknown escapes survive literally.
        assert_eq!(interner.resolve(name), "a\tb\\q");
    }

    #[test]
    fn test_unterminated_string() {
        let interner = StringInterner::new();
        let out = lex("\"abc\nlet x", &interner);
        assert_eq!(out.tokens[0].kind, TokenKind::Error);
        assert_eq!(out.diagnostics[0].code, ErrorCode::E0001);
        // Lexing continues after the error.
        assert_eq!(out.tokens[1].kind, TokenKind::Let);
    }

    #[test]
    fn test_template_string_multiline() {
        let interner = StringInterner::new();
        let out = lex("`a\nb`", &interner);
        assert!(matches!(out.tokens[0].kind, TokenKind::TemplateStr(_)));
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_compound_operators() {
        assert_eq!(
            kinds("<<= >>= &&= ||= => ++ -- <= >= == != << >>")[..13],
            [
                TokenKind::ShlEq,
                TokenKind::ShrEq,
                TokenKind::AmpAmpEq,
                TokenKind::PipePipeEq,
                TokenKind::Arrow,
                TokenKind::PlusPlus,
                TokenKind::MinusMinus,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::EqEq,
                TokenKind::BangEq,
                TokenKind::Shl,
                TokenKind::Shr,
            ]
        );
    }

    #[test]
    fn test_unexpected_character_is_total() {
        let interner = StringInterner::new();
        let out = lex("let @ x", &interner);
        assert_eq!(out.tokens[0].kind, TokenKind::Let);
        assert_eq!(out.tokens[1].kind, TokenKind::Error);
        assert!(matches!(out.tokens[2].kind, TokenKind::Ident(_)));
        assert_eq!(out.diagnostics[0].code, ErrorCode::E0002);
    }

    #[test]
    fn test_comments_are_trivia() {
        let ks = kinds("1 // line\n/* block\nstill */ 2");
        assert_eq!(ks.len(), 3); // 1, 2, eof
    }

    #[test]
    fn test_unterminated_block_comment() {
        let interner = StringInterner::new();
        let out = lex("1 /* never closed", &interner);
        assert_eq!(out.diagnostics[0].code, ErrorCode::E0005);
        assert_eq!(out.tokens[1].kind, TokenKind::Error);
    }

    #[test]
    fn test_eof_always_last() {
        for src in ["", "let", "\"unterminated", "@@@"] {
            let interner = StringInterner::new();
            let out = lex(src, &interner);
            assert_eq!(out.tokens[out.tokens.len() - 1].kind, TokenKind::Eof);
        }
    }
}
