//! Grammar rules.
//!
//! Rules are free functions over [`Parser`](crate::Parser); each takes
//! the parser, consumes tokens on success, and returns the produced node.
//! Failing rules revert whatever they consumed (via the checkpoint stack)
//! unless they have already committed to the construct, in which case
//! they record an error and recover.

pub mod class;
pub mod expr;
pub mod stmt;
pub mod ty;
