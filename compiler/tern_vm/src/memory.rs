//! VM memory: the guarded stack buffer plus module data areas.
//!
//! One contiguous byte buffer backs everything the VM can address.
//! Layout: `[ stack (stack_size bytes) | 8-byte guard | module areas ]`.
//! Addresses are plain offsets into the buffer, so the interpreter and
//! host functions share an address space without raw pointers.
//!
//! Every load and store checks the guard: an effective address inside
//! `[stack_size, stack_size + 8]` raises the stack-overflow error. The
//! check is on the access address (the original implementation's
//! convention), so a `store64` at `stack_size - 8` still succeeds while
//! one at `stack_size` faults.

use crate::RuntimeError;
use rustc_hash::FxHashMap;
use tern_ir::ModuleId;
use tern_module::Module;

/// Width of the guard region after the usable stack.
pub const STACK_GUARD_SIZE: u64 = 8;

/// The VM's linear memory.
pub struct Memory {
    bytes: Vec<u8>,
    stack_size: u64,
    module_bases: FxHashMap<ModuleId, u64>,
}

impl Memory {
    /// Allocate a memory with a stack of `stack_size` bytes.
    pub fn new(stack_size: u64) -> Memory {
        Memory {
            bytes: vec![0; (stack_size + STACK_GUARD_SIZE) as usize],
            stack_size,
            module_bases: FxHashMap::default(),
        }
    }

    /// Base address of the stack (always 0).
    pub const fn stack_base(&self) -> u64 {
        0
    }

    pub fn stack_size(&self) -> u64 {
        self.stack_size
    }

    /// First address past the usable stack (start of the guard).
    pub fn guard_start(&self) -> u64 {
        self.stack_size
    }

    /// Append a module's data area, copying each slot's initial bytes,
    /// and remember its base address.
    pub fn map_module(&mut self, module: &Module) -> u64 {
        if let Some(&base) = self.module_bases.get(&module.id) {
            return base;
        }
        let base = self.bytes.len() as u64;
        let size = module.data_size().max(1) as usize;
        self.bytes.resize(self.bytes.len() + size, 0);
        for data in &module.data {
            let start = base as usize + data.offset as usize;
            self.bytes[start..start + data.bytes.len()].copy_from_slice(&data.bytes);
        }
        self.module_bases.insert(module.id, base);
        base
    }

    pub fn module_base(&self, id: ModuleId) -> Option<u64> {
        self.module_bases.get(&id).copied()
    }

    /// Raw area for host allocations (e.g. builtin array storage).
    /// Returns the base address of the new area.
    pub fn host_alloc(&mut self, size: u64) -> u64 {
        let base = self.bytes.len() as u64;
        self.bytes.resize(self.bytes.len() + size.max(1) as usize, 0);
        base
    }

    #[inline]
    fn check(&self, address: u64, width: u64) -> Result<usize, RuntimeError> {
        if address >= self.guard_start() && address < self.guard_start() + STACK_GUARD_SIZE {
            return Err(RuntimeError::StackOverflow { address });
        }
        let end = address.checked_add(width).ok_or(RuntimeError::BadAddress { address })?;
        if end > self.bytes.len() as u64 {
            return Err(RuntimeError::BadAddress { address });
        }
        Ok(address as usize)
    }

    /// Typed load of `width` bytes (1, 2, 4, or 8), zero-extended.
    pub fn load(&self, address: u64, width: u64) -> Result<u64, RuntimeError> {
        let at = self.check(address, width)?;
        let mut raw = [0u8; 8];
        raw[..width as usize].copy_from_slice(&self.bytes[at..at + width as usize]);
        Ok(u64::from_le_bytes(raw))
    }

    /// Typed store of the low `width` bytes of `value`.
    pub fn store(&mut self, address: u64, value: u64, width: u64) -> Result<(), RuntimeError> {
        let at = self.check(address, width)?;
        self.bytes[at..at + width as usize]
            .copy_from_slice(&value.to_le_bytes()[..width as usize]);
        Ok(())
    }

    /// Borrow a raw byte range (host bridge helpers).
    pub fn slice(&self, address: u64, len: u64) -> Result<&[u8], RuntimeError> {
        let at = self.check(address, len)?;
        Ok(&self.bytes[at..at + len as usize])
    }

    /// Mutable raw byte range (host bridge helpers).
    pub fn slice_mut(&mut self, address: u64, len: u64) -> Result<&mut [u8], RuntimeError> {
        let at = self.check(address, len)?;
        Ok(&mut self.bytes[at..at + len as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_faults() {
        let mut memory = Memory::new(64);
        // store64 at stack_size - 8 succeeds...
        assert!(memory.store(56, 7, 8).is_ok());
        // ...at stack_size it faults...
        assert!(matches!(
            memory.store(64, 7, 8),
            Err(RuntimeError::StackOverflow { address: 64 })
        ));
        // ...and loads inside the guard fault too.
        assert!(matches!(
            memory.load(70, 1),
            Err(RuntimeError::StackOverflow { .. })
        ));
    }

    #[test]
    fn test_load_store_round_trip() {
        let mut memory = Memory::new(128);
        memory.store(8, 0x1122_3344_5566_7788, 8).unwrap();
        assert_eq!(memory.load(8, 8).unwrap(), 0x1122_3344_5566_7788);
        assert_eq!(memory.load(8, 4).unwrap(), 0x5566_7788);
        assert_eq!(memory.load(8, 1).unwrap(), 0x88);
    }

    #[test]
    fn test_module_mapping_past_guard() {
        let mut module = Module::new("m", "m.tn");
        let slot = module.add_data("g", tern_ir::TypeId::of("i32"), 4, tern_types::Access::Public);
        module.data[slot].bytes.copy_from_slice(&42i32.to_le_bytes());

        let mut memory = Memory::new(64);
        let base = memory.map_module(&module);
        assert!(base >= 64 + STACK_GUARD_SIZE);
        assert_eq!(memory.load(base, 4).unwrap(), 42);
        // Mapping twice reuses the area.
        assert_eq!(memory.map_module(&module), base);
    }

    #[test]
    fn test_out_of_range() {
        let memory = Memory::new(32);
        assert!(matches!(
            memory.load(10_000, 8),
            Err(RuntimeError::BadAddress { .. })
        ));
    }
}
