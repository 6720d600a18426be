//! String interner for identifier storage.
//!
//! Interned strings live for the life of the process; [`Name`] handles are
//! plain indices, so comparison never touches string content.

use crate::Name;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

struct Inner {
    map: FxHashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

/// Interner mapping strings to dense [`Name`] indices.
///
/// Wrapped in a `RwLock` so lookups from immutable contexts (diagnostics,
/// serialization) do not require `&mut`. The compilation core itself is
/// single-threaded; the lock is uncontended.
pub struct StringInterner {
    inner: RwLock<Inner>,
}

impl StringInterner {
    /// Create an interner with the empty string pre-interned at index 0.
    pub fn new() -> Self {
        let mut inner = Inner {
            map: FxHashMap::default(),
            strings: Vec::with_capacity(256),
        };
        inner.map.insert("", 0);
        inner.strings.push("");
        StringInterner {
            inner: RwLock::new(inner),
        }
    }

    /// Intern a string, returning its [`Name`].
    pub fn intern(&self, s: &str) -> Name {
        {
            let inner = self.inner.read();
            if let Some(&idx) = inner.map.get(s) {
                return Name(idx);
            }
        }
        let mut inner = self.inner.write();
        // Re-check under the write lock.
        if let Some(&idx) = inner.map.get(s) {
            return Name(idx);
        }
        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        let idx = inner.strings.len() as u32;
        inner.strings.push(leaked);
        inner.map.insert(leaked, idx);
        Name(idx)
    }

    /// Resolve a [`Name`] back to its string.
    ///
    /// # Panics
    ///
    /// Panics if `name` came from a different interner with more entries.
    pub fn resolve(&self, name: Name) -> &'static str {
        self.inner.read().strings[name.0 as usize]
    }

    /// Number of interned strings (including the empty string).
    pub fn len(&self) -> usize {
        self.inner.read().strings.len()
    }

    /// True if only the empty string is interned.
    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        StringInterner::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_dedup() {
        let interner = StringInterner::new();
        let a = interner.intern("foo");
        let b = interner.intern("foo");
        let c = interner.intern("bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_resolve() {
        let interner = StringInterner::new();
        let name = interner.intern("hello");
        assert_eq!(interner.resolve(name), "hello");
    }

    #[test]
    fn test_empty_preinterned() {
        let interner = StringInterner::new();
        assert_eq!(interner.intern(""), Name::EMPTY);
        assert_eq!(interner.resolve(Name::EMPTY), "");
    }
}
