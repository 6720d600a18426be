//! Type metadata: trait flags, size, host hash.

use bitflags::bitflags;

bitflags! {
    /// Per-type trait flags.
    ///
    /// The `TRIVIALLY_*` and `POD` bits are downgraded on a class as
    /// non-trivial members are added; see `TypeRegistry::add_property`.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct MetaFlags: u16 {
        const POD = 1 << 0;
        const TRIVIALLY_CONSTRUCTIBLE = 1 << 1;
        const TRIVIALLY_COPYABLE = 1 << 2;
        const TRIVIALLY_DESTRUCTIBLE = 1 << 3;
        const PRIMITIVE = 1 << 4;
        const FLOATING_POINT = 1 << 5;
        const INTEGRAL = 1 << 6;
        const UNSIGNED = 1 << 7;
        const FUNCTION = 1 << 8;
        const TEMPLATE = 1 << 9;
        const ALIAS = 1 << 10;
        const HOST = 1 << 11;
        const ANONYMOUS = 1 << 12;

        const TRIVIAL = Self::POD.bits()
            | Self::TRIVIALLY_CONSTRUCTIBLE.bits()
            | Self::TRIVIALLY_COPYABLE.bits()
            | Self::TRIVIALLY_DESTRUCTIBLE.bits();
    }
}

/// Type metadata: flags, size in bytes, and a host hash for ABI
/// identification of host-bound types.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeMeta {
    pub flags: MetaFlags,
    pub size: u32,
    pub host_hash: u64,
}

impl TypeMeta {
    pub fn new(flags: MetaFlags, size: u32) -> Self {
        TypeMeta {
            flags,
            size,
            host_hash: 0,
        }
    }

    #[inline]
    pub fn is_primitive(&self) -> bool {
        self.flags.contains(MetaFlags::PRIMITIVE)
    }

    #[inline]
    pub fn is_pod(&self) -> bool {
        self.flags.contains(MetaFlags::POD)
    }

    #[inline]
    pub fn is_floating_point(&self) -> bool {
        self.flags.contains(MetaFlags::FLOATING_POINT)
    }

    #[inline]
    pub fn is_integral(&self) -> bool {
        self.flags.contains(MetaFlags::INTEGRAL)
    }

    #[inline]
    pub fn is_unsigned(&self) -> bool {
        self.flags.contains(MetaFlags::UNSIGNED)
    }

    #[inline]
    pub fn is_trivially_copyable(&self) -> bool {
        self.flags.contains(MetaFlags::TRIVIALLY_COPYABLE)
    }

    #[inline]
    pub fn is_trivially_destructible(&self) -> bool {
        self.flags.contains(MetaFlags::TRIVIALLY_DESTRUCTIBLE)
    }

    /// Clear the POD/trivial bits; called when a non-POD member lands in
    /// a class.
    pub fn downgrade_pod(&mut self) {
        self.flags.remove(MetaFlags::TRIVIAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downgrade_pod() {
        let mut meta = TypeMeta::new(MetaFlags::TRIVIAL, 8);
        assert!(meta.is_pod());
        meta.downgrade_pod();
        assert!(!meta.is_pod());
        assert!(!meta.flags.contains(MetaFlags::TRIVIALLY_COPYABLE));
    }
}
