//! Shared data model for the tern compiler and VM.
//!
//! Everything that crosses a component boundary lives here so that the
//! lexer, parser, compiler, module container, and VM can exchange values
//! without depending on each other:
//!
//! - [`Span`] / [`SourceMap`]: byte-offset source locations and their
//!   resolution to line/column.
//! - [`Name`] / [`StringInterner`]: interned identifier storage.
//! - [`Token`] / [`TokenKind`] / [`TokenList`]: lexer output.
//! - [`ParseArena`] / [`ParseNode`] / [`NodeId`]: the parse tree.
//! - [`Op`] / [`Instruction`] / [`CodeHolder`]: the three-address IR.
//! - Id newtypes ([`TypeId`], [`FunctionId`], [`ModuleId`], ...) used to
//!   break ownership cycles: cross-references are always id + registry
//!   lookup, never direct pointers.

pub mod ast;
mod ids;
mod interner;
mod name;
mod source;
mod span;
pub mod tac;
mod token;

pub use ast::{LitKind, LitValue, ModKind, NodeId, NodeKind, OpKind, ParseArena, ParseNode};
pub use ids::{AllocId, FunctionId, LabelId, ModuleId, RegId, TypeId};
pub use interner::StringInterner;
pub use name::Name;
pub use source::{SourceLoc, SourceMap};
pub use span::Span;
pub use tac::{CodeHolder, Imm, Instruction, Op, Operand, OperandFlags};
pub use token::{NumberSuffix, Token, TokenKind, TokenList};
