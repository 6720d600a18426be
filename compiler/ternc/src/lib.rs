//! Embedding context and compilation pipeline for tern.
//!
//! [`Context`] owns the process-wide state: the type and function
//! registries, the loaded-module set, the VM, and the host-function
//! table. Compilation and execution are single-threaded cooperative:
//! one logical thread owns the context, and hosts embedding the engine
//! must externally serialize access.

mod builtin;
mod context;
pub mod reporting;

pub use builtin::Builtins;
pub use context::{Config, Context, ModuleSet};
