//! Error recovery: token sets and panic-mode synchronization.
//!
//! Token sets use a `u128` bitset over token-kind discriminants for O(1)
//! membership tests, so the synchronize scan is one AND per token.

use crate::cursor::Cursor;
use tern_ir::TokenKind;

/// A set of token kinds as a bitset over discriminant indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenSet(u128);

impl TokenSet {
    #[inline]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Add a token kind (builder pattern for const contexts).
    #[inline]
    #[must_use]
    pub const fn with(self, kind: TokenKind) -> Self {
        Self(self.0 | (1u128 << kind.discriminant_index()))
    }

    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn contains(&self, kind: &TokenKind) -> bool {
        (self.0 & (1u128 << kind.discriminant_index())) != 0
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TokenSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Statement boundaries: where a failed statement parse resynchronizes.
pub const STMT_BOUNDARY: TokenSet = TokenSet::new()
    .with(TokenKind::Semicolon)
    .with(TokenKind::RBrace)
    .with(TokenKind::Class)
    .with(TokenKind::Function)
    .with(TokenKind::Let)
    .with(TokenKind::Const)
    .with(TokenKind::Import)
    .with(TokenKind::Export)
    .with(TokenKind::Type)
    .with(TokenKind::Eof);

/// Class-member boundaries.
pub const MEMBER_BOUNDARY: TokenSet = TokenSet::new()
    .with(TokenKind::Semicolon)
    .with(TokenKind::RBrace)
    .with(TokenKind::Eof);

/// Expression follow tokens (closers and separators).
pub const EXPR_FOLLOW: TokenSet = TokenSet::new()
    .with(TokenKind::RParen)
    .with(TokenKind::RBracket)
    .with(TokenKind::RBrace)
    .with(TokenKind::Comma)
    .with(TokenKind::Semicolon)
    .with(TokenKind::Eof);

/// Advance until a token in `recovery` or EOF.
///
/// Returns `true` if a recovery token was found before EOF.
pub fn synchronize(cursor: &mut Cursor<'_>, recovery: TokenSet) -> bool {
    while !cursor.is_at_end() {
        if recovery.contains(cursor.current_kind()) {
            return true;
        }
        cursor.advance();
    }
    recovery.contains(&TokenKind::Eof)
}
