//! Hashed identifiers for logic monitor states.
//!
//! States are compared as 64-bit FNV-1a hashes. The text behind a hash is
//! kept in an [`IdentifierRegistry`] purely for diagnostics, so logs and
//! errors can print `Running` instead of a number.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use parking_lot::RwLock;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit hash of an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdentifierHash(u64);

impl IdentifierHash {
    /// Hash `name` and record it in the process-wide registry.
    pub fn new(name: &str) -> Self {
        global().register(name)
    }

    /// Hash `name` without recording it anywhere.
    pub const fn of(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl From<&str> for IdentifierHash {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for IdentifierHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&global().describe(*self))
    }
}

/// Maps hashes back to the text they were computed from.
///
/// Safe to share between threads. Stores its own copy of every name, so
/// callers may drop their strings right after registering.
#[derive(Debug, Default)]
pub struct IdentifierRegistry {
    names: RwLock<HashMap<u64, String>>,
}

impl IdentifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash `name` and remember its text.
    pub fn register(&self, name: &str) -> IdentifierHash {
        let hash = IdentifierHash::of(name);
        if self.names.read().contains_key(&hash.0) {
            return hash;
        }
        self.names
            .write()
            .entry(hash.0)
            .or_insert_with(|| name.to_owned());
        hash
    }

    pub fn lookup(&self, hash: IdentifierHash) -> Option<String> {
        self.names.read().get(&hash.0).cloned()
    }

    /// The registered text, or a placeholder naming the raw value.
    pub fn describe(&self, hash: IdentifierHash) -> String {
        self.lookup(hash)
            .unwrap_or_else(|| format!("Unknown IdentifierHash: {}", hash.0))
    }

    pub fn clear(&self) {
        self.names.write().clear();
    }

    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}

/// The process-wide registry behind [`IdentifierHash::new`] and `Display`.
pub fn global() -> &'static IdentifierRegistry {
    static REGISTRY: OnceLock<IdentifierRegistry> = OnceLock::new();
    REGISTRY.get_or_init(IdentifierRegistry::new)
}
