//! Structural hashing of IR nodes.
//!
//! Hashes are 64-bit FNV-1a so they are stable across processes and can key
//! caches of compiled graphs.

use std::fmt;
use std::hash::{Hash, Hasher};

const FNV1A_OFFSET: u64 = 0xcbf29ce484222325;
const FNV1A_PRIME: u64 = 0x100000001b3;

/// Content derived identity of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashValue(pub u64);

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Deterministic hasher used for node hashes.
#[derive(Debug, Clone)]
pub struct StructuralHasher {
    state: u64,
}

impl StructuralHasher {
    pub fn new() -> Self {
        Self {
            state: FNV1A_OFFSET,
        }
    }

    /// Start a hash for a node kind. The kind name and discriminant always
    /// come first so two kinds never share a hash domain.
    pub fn salted(kind: &str, discriminant: u8) -> Self {
        let mut hasher = Self::new();
        hasher.write(kind.as_bytes());
        hasher.write_u8(0xff);
        hasher.write_u8(discriminant);
        hasher
    }

    pub fn update<T: Hash + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.hash(self);
        self
    }

    pub fn finish_value(&self) -> HashValue {
        HashValue(self.state)
    }
}

impl Default for StructuralHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for StructuralHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.state ^= u64::from(*byte);
            self.state = self.state.wrapping_mul(FNV1A_PRIME);
        }
    }

    // Integers are written as u64 so node hashes do not depend on the pointer width.
    fn write_usize(&mut self, i: usize) {
        self.write(&(i as u64).to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv_reference_vectors() {
        assert_eq!(StructuralHasher::new().finish(), FNV1A_OFFSET);
        let mut h = StructuralHasher::new();
        h.write(b"a");
        assert_eq!(h.finish(), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn salt_separates_kinds() {
        let a = StructuralHasher::salted("masked_select", 4).finish_value();
        let b = StructuralHasher::salted("symeig", 4).finish_value();
        let c = StructuralHasher::salted("masked_select", 5).finish_value();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
