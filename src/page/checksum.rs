// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Page checksums, computed with xxh3 (the same hash used for zone-map
//! Bloom filters) rather than a bespoke mix.

use std::ops::Deref;

/// A 64-bit checksum over a page's payload bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Checksum(u64);

impl Deref for Checksum {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Checksum {
    /// Computes the checksum of `bytes`.
    #[must_use]
    pub fn compute(bytes: &[u8]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_64(bytes))
    }

    /// Wraps an already-computed raw value, e.g. one just read off disk.
    #[must_use]
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn same_bytes_same_checksum() {
        let a = Checksum::compute(b"hello world");
        let b = Checksum::compute(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn different_bytes_different_checksum() {
        let a = Checksum::compute(b"hello world");
        let b = Checksum::compute(b"hello worle");
        assert_ne!(a, b);
    }
}
