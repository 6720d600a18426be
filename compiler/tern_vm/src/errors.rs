//! Runtime errors.
//!
//! Runtime problems unwind out of the current `execute` nest as `Err`;
//! they are never recorded-and-continued the way compile diagnostics
//! are. A script exception additionally carries the thrown value so an
//! enclosing `try` handler (or the embedding host) can inspect it.

use std::fmt;
use tern_diagnostic::ErrorCode;
use tern_ir::{FunctionId, TypeId};

/// Errors raised by the dispatch loop or the host bridge.
#[derive(Clone, Debug, PartialEq)]
pub enum RuntimeError {
    /// A load or store hit the stack guard region.
    StackOverflow { address: u64 },
    /// A load or store left the VM's memory entirely.
    BadAddress { address: u64 },
    /// Op-code invalid in its position (malformed artifact or emitter
    /// bug).
    InvalidInstruction { function: FunctionId, ip: usize },
    /// `call` through a register that does not hold a valid function.
    InvalidCallback { value: u64 },
    /// `call` with an unknown function id.
    InvalidFunction { id: FunctionId },
    /// A host function declared pass-by-value for a non-primitive.
    HostSignatureMismatch { function: FunctionId, arg: usize },
    /// An uncaught script `throw`.
    ScriptException { value: u64, ty: TypeId },
}

impl RuntimeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RuntimeError::StackOverflow { .. } | RuntimeError::BadAddress { .. } => {
                ErrorCode::E6001
            }
            RuntimeError::InvalidInstruction { .. } => ErrorCode::E6002,
            RuntimeError::InvalidCallback { .. } | RuntimeError::InvalidFunction { .. } => {
                ErrorCode::E6003
            }
            RuntimeError::HostSignatureMismatch { .. } => ErrorCode::E6004,
            RuntimeError::ScriptException { .. } => ErrorCode::E6005,
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::StackOverflow { address } => {
                write!(f, "VM stack overflow at address {address:#x}")
            }
            RuntimeError::BadAddress { address } => {
                write!(f, "access outside VM memory at address {address:#x}")
            }
            RuntimeError::InvalidInstruction { function, ip } => {
                write!(f, "invalid instruction in {function:?} at {ip}")
            }
            RuntimeError::InvalidCallback { value } => {
                write!(f, "invalid callback value {value:#x}")
            }
            RuntimeError::InvalidFunction { id } => write!(f, "invalid function id {id:?}"),
            RuntimeError::HostSignatureMismatch { function, arg } => {
                write!(
                    f,
                    "host function {function:?} declares pass-by-value for non-primitive argument {arg}"
                )
            }
            RuntimeError::ScriptException { ty, .. } => {
                write!(f, "uncaught script exception of type {ty:?}")
            }
        }
    }
}

impl std::error::Error for RuntimeError {}
