//! Token cursor for navigating the token stream.

use crate::error::ParseError;
use tern_ir::{Name, Span, Token, TokenKind, TokenList};

/// Cursor over an `Eof`-terminated token list.
///
/// Provides access, lookahead, and consumption; the position can be saved
/// and restored for speculative parsing.
pub struct Cursor<'a> {
    tokens: &'a TokenList,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(tokens: &'a TokenList) -> Self {
        debug_assert!(
            matches!(tokens[tokens.len() - 1].kind, TokenKind::Eof),
            "token list must end with Eof"
        );
        Cursor { tokens, pos: 0 }
    }

    /// Current position (for checkpoints and progress checks).
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Restore a previously saved position.
    pub fn set_position(&mut self, pos: usize) {
        debug_assert!(pos <= self.tokens.len());
        self.pos = pos;
    }

    /// Invariant: the position never passes the final `Eof` token.
    #[inline]
    pub fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    #[inline]
    pub fn current_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    #[inline]
    pub fn current_span(&self) -> Span {
        self.current().span
    }

    /// Span of the most recently consumed token.
    pub fn previous_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::DUMMY
        }
    }

    #[inline]
    pub fn is_at_end(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    /// Check the current token by discriminant (payloads ignored).
    #[inline]
    pub fn check(&self, kind: &TokenKind) -> bool {
        self.current_kind().discriminant_index() == kind.discriminant_index()
    }

    #[inline]
    pub fn check_ident(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Ident(_))
    }

    /// One-token lookahead.
    #[inline]
    pub fn peek_kind(&self) -> &TokenKind {
        static EOF: TokenKind = TokenKind::Eof;
        self.tokens
            .get(self.pos + 1)
            .map(|t| &t.kind)
            .unwrap_or(&EOF)
    }

    /// Advance and return the consumed token.
    #[inline]
    pub fn advance(&mut self) -> &Token {
        let current = self.pos;
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        &self.tokens[current]
    }

    /// Consume the current token if it matches, by discriminant.
    pub fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expect and consume a token kind, or produce an error.
    #[inline]
    pub fn expect(&mut self, kind: &TokenKind) -> Result<&Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(ParseError::expected(
                kind,
                self.current_kind(),
                self.current_span(),
            ))
        }
    }

    /// Expect and consume an identifier, returning its interned name.
    pub fn expect_ident(&mut self) -> Result<Name, ParseError> {
        if let TokenKind::Ident(name) = *self.current_kind() {
            self.advance();
            Ok(name)
        } else {
            Err(ParseError::new(
                tern_diagnostic::ErrorCode::E1004,
                format!("expected identifier, found {}", self.current_kind().display_name()),
                self.current_span(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_ir::StringInterner;

    fn tokens(src: &str) -> TokenList {
        let interner = StringInterner::new();
        tern_lexer::lex(src, &interner).tokens
    }

    #[test]
    fn test_navigation() {
        let list = tokens("let x = 42;");
        let mut cursor = Cursor::new(&list);
        assert!(cursor.check(&TokenKind::Let));
        cursor.advance();
        assert!(cursor.check_ident());
        assert!(matches!(cursor.peek_kind(), TokenKind::Eq));
    }

    #[test]
    fn test_advance_stops_at_eof() {
        let list = tokens("x");
        let mut cursor = Cursor::new(&list);
        cursor.advance();
        assert!(cursor.is_at_end());
        cursor.advance();
        assert!(cursor.is_at_end());
    }

    #[test]
    fn test_check_ignores_payload() {
        let list = tokens("42");
        let cursor = Cursor::new(&list);
        assert!(cursor.check(&TokenKind::Int {
            value: 0,
            suffix: tern_ir::NumberSuffix::None
        }));
    }

    #[test]
    fn test_expect_error() {
        let list = tokens("let");
        let mut cursor = Cursor::new(&list);
        assert!(cursor.expect(&TokenKind::If).is_err());
        assert!(cursor.expect(&TokenKind::Let).is_ok());
    }
}
