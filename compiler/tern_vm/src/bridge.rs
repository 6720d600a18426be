//! Host-function bridge.
//!
//! A host function is a boxed Rust closure registered with the context
//! and referenced from the function registry by handle. At call time the
//! VM reads the declared arguments in order and unwraps each according
//! to its declared kind: primitive value-kind arguments are passed by
//! value as a typed [`HostValue`]; any non-primitive or pointer-kind
//! argument is passed by reference (the address in VM memory). The
//! return value is written back through [`HostCall::set_return`], or,
//! for non-primitive returns, constructed directly into the
//! caller-provided return pointer.
//!
//! No ABI tricks: the bridge is specified entirely in terms of "for this
//! declared kind, read this register and pass it this way".

use crate::{Memory, RuntimeError};
use tern_types::{HostFnHandle, Primitive, TypeRegistry};

/// A primitive argument or return value crossing the host boundary.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum HostValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    /// Address in VM memory (non-primitive and pointer-kind arguments).
    Ptr(u64),
}

impl HostValue {
    /// Raw register encoding of the value.
    pub fn to_bits(self) -> u64 {
        match self {
            HostValue::I8(v) => v as u8 as u64,
            HostValue::I16(v) => v as u16 as u64,
            HostValue::I32(v) => v as u32 as u64,
            HostValue::I64(v) => v as u64,
            HostValue::U8(v) => u64::from(v),
            HostValue::U16(v) => u64::from(v),
            HostValue::U32(v) => u64::from(v),
            HostValue::U64(v) => v,
            HostValue::F32(v) => u64::from(v.to_bits()),
            HostValue::F64(v) => v.to_bits(),
            HostValue::Bool(v) => u64::from(v),
            HostValue::Ptr(v) => v,
        }
    }

    /// Decode a register value as a primitive of the given kind.
    pub fn from_bits(raw: u64, prim: Primitive) -> HostValue {
        match prim {
            Primitive::I8 => HostValue::I8(raw as u8 as i8),
            Primitive::I16 => HostValue::I16(raw as u16 as i16),
            Primitive::I32 => HostValue::I32(raw as u32 as i32),
            Primitive::I64 => HostValue::I64(raw as i64),
            Primitive::U8 => HostValue::U8(raw as u8),
            Primitive::U16 => HostValue::U16(raw as u16),
            Primitive::U32 => HostValue::U32(raw as u32),
            Primitive::U64 => HostValue::U64(raw),
            Primitive::F32 => HostValue::F32(f32::from_bits(raw as u32)),
            Primitive::F64 => HostValue::F64(f64::from_bits(raw)),
            Primitive::Bool => HostValue::Bool(raw != 0),
            Primitive::Void | Primitive::Null | Primitive::Ptr => HostValue::Ptr(raw),
        }
    }
}

/// Everything a host function can see during one call.
pub struct HostCall<'a> {
    /// Unwrapped arguments: `this` (for methods) followed by the
    /// explicit arguments.
    pub args: &'a [HostValue],
    /// The VM's memory, shared with the script.
    pub memory: &'a mut Memory,
    pub types: &'a TypeRegistry,
    /// Caller-provided storage for non-primitive returns (0 when the
    /// return type is primitive or void).
    pub ret_ptr: u64,
    ret: u64,
}

impl<'a> HostCall<'a> {
    pub(crate) fn new(
        args: &'a [HostValue],
        memory: &'a mut Memory,
        types: &'a TypeRegistry,
        ret_ptr: u64,
    ) -> Self {
        HostCall {
            args,
            memory,
            types,
            ret_ptr,
            ret: 0,
        }
    }

    /// Argument accessor with a defensive default.
    pub fn arg(&self, idx: usize) -> HostValue {
        self.args.get(idx).copied().unwrap_or(HostValue::U64(0))
    }

    /// Set the primitive return value (written back to the return
    /// register by the VM).
    pub fn set_return(&mut self, value: HostValue) {
        self.ret = value.to_bits();
    }

    pub(crate) fn return_bits(&self) -> u64 {
        self.ret
    }
}

/// A host entry point.
pub type HostFn = Box<dyn FnMut(&mut HostCall<'_>) -> Result<(), RuntimeError>>;

/// The context's table of host entry points, referenced by handle from
/// the function registry.
#[derive(Default)]
pub struct HostTable {
    entries: Vec<HostFn>,
}

impl HostTable {
    pub fn new() -> Self {
        HostTable::default()
    }

    pub fn register(&mut self, entry: HostFn) -> HostFnHandle {
        self.entries.push(entry);
        HostFnHandle(self.entries.len() as u32 - 1)
    }

    pub fn get_mut(&mut self, handle: HostFnHandle) -> Option<&mut HostFn> {
        self.entries.get_mut(handle.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_round_trip() {
        let cases = [
            (HostValue::I32(-5), Primitive::I32),
            (HostValue::U8(200), Primitive::U8),
            (HostValue::F64(2.5), Primitive::F64),
            (HostValue::Bool(true), Primitive::Bool),
        ];
        for (value, prim) in cases {
            assert_eq!(HostValue::from_bits(value.to_bits(), prim), value);
        }
    }

    #[test]
    fn test_table_handles() {
        let mut table = HostTable::new();
        let a = table.register(Box::new(|_| Ok(())));
        let b = table.register(Box::new(|_| Ok(())));
        assert_ne!(a, b);
        assert!(table.get_mut(a).is_some());
    }
}
