//! Semantic analysis and IR emission for tern.
//!
//! The [`compile`] entry point turns one parsed source unit into a
//! [`tern_module::Module`]: it resolves names through nested scopes,
//! performs overload resolution and implicit conversions, manages
//! destructor emission for stack-bound values, instantiates templates on
//! demand, and emits the three-address IR executed by the VM.
//!
//! Compile-time problems never abort compilation: they are recorded as
//! diagnostics and replaced by poison values that suppress follow-on
//! messages from the same root cause.

mod compiler;
mod func_builder;
pub mod optimize;
mod scope;
mod value;

#[cfg(test)]
mod tests;

pub use compiler::{compile, Compiler, ModuleHost, NoModules};
pub use func_builder::{ArithOp, FuncBuilder, TypeClass};
pub use optimize::{IrPass, PassGroup};
pub use scope::{Scope, ScopeKind, ScopeStack, Symbol};
pub use value::{Value, ValueFlags, ValueKind};
