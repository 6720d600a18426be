//! Id newtypes used for all cross-component references.
//!
//! Types, functions, and modules refer to each other by id + registry
//! lookup, never by ownership pointer; this is what lets serialization
//! rebuild cyclic structures skeleton-first.

use std::fmt;

/// Canonical identity of a type: the FNV-1a hash of its fully-qualified
/// name. The registry guarantees at most one type per id.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    /// Sentinel type of the poison value; suppresses cascade diagnostics.
    pub const POISON: TypeId = TypeId(0);

    /// Hash a fully-qualified name into its id.
    ///
    /// FNV-1a over the UTF-8 bytes. Hash 0 is reserved for the poison
    /// sentinel and remapped.
    pub fn of(fqn: &str) -> TypeId {
        let mut hash: u32 = 0x811c_9dc5;
        for byte in fqn.bytes() {
            hash ^= u32::from(byte);
            hash = hash.wrapping_mul(0x0100_0193);
        }
        if hash == 0 {
            hash = 0x811c_9dc5;
        }
        TypeId(hash)
    }

    #[inline]
    pub const fn is_poison(self) -> bool {
        self.0 == Self::POISON.0
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_poison() {
            write!(f, "TypeId(poison)")
        } else {
            write!(f, "TypeId({:#010x})", self.0)
        }
    }
}

/// Stable function id assigned by the function registry. Id 0 is reserved
/// as the null function.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

impl FunctionId {
    pub const NULL: FunctionId = FunctionId(0);

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn#{}", self.0)
    }
}

/// Module id: hash of the module name.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

impl ModuleId {
    pub fn of(name: &str) -> ModuleId {
        ModuleId(TypeId::of(name).0)
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mod#{:#010x}", self.0)
    }
}

/// Virtual register within one function; strictly increasing as values
/// are produced.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct RegId(pub u32);

impl fmt::Debug for RegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Label within one function; dense, defined exactly once by an
/// `Op::Label` instruction.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl fmt::Debug for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Stack allocation id within one function; pairs each `stack_allocate`
/// with its `stack_free` instructions.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct AllocId(pub u32);

impl fmt::Debug for AllocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_id_deterministic() {
        assert_eq!(TypeId::of("test::Array<i32>"), TypeId::of("test::Array<i32>"));
        assert_ne!(TypeId::of("test::Array<i32>"), TypeId::of("test::Array<u32>"));
    }

    #[test]
    fn test_type_id_never_poison() {
        assert!(!TypeId::of("").is_poison());
        assert!(!TypeId::of("i32").is_poison());
    }

    #[test]
    fn test_null_function() {
        assert!(FunctionId::NULL.is_null());
        assert!(!FunctionId(1).is_null());
    }
}
