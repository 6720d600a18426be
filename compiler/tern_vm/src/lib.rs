//! Register-based virtual machine for the tern three-address IR.
//!
//! The interpreter owns a guarded stack memory, a compact special
//! register file, and per-call register banks. Host functions are boxed
//! Rust closures reached through the [`HostTable`]; the bridge contract
//! is in [`bridge`].

mod bridge;
mod errors;
mod memory;
mod registers;
mod vm;

#[cfg(test)]
mod tests;

pub use bridge::{HostCall, HostFn, HostTable, HostValue};
pub use errors::RuntimeError;
pub use memory::{Memory, STACK_GUARD_SIZE};
pub use registers::{Registers, VmReg};
pub use vm::{raise, Vm, VmConfig, VmEnv, VmState};
