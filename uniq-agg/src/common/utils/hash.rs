//! Utils for hash

use super::super::types::HashValue;

/// Default hash builder
pub type BuildHasherDefault = ahash::RandomState;

/// Constant build hasher default. Seeds are fixed such that the hash of a value
/// is identical across processes
pub const BUILD_HASHER_DEFAULT: BuildHasherDefault = BuildHasherDefault::with_seeds(9, 7, 9, 8);

/// Hash the bytes with [`BUILD_HASHER_DEFAULT`]
#[inline]
pub fn hash_bytes(bytes: &[u8]) -> HashValue {
    BUILD_HASHER_DEFAULT.hash_one(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let other = BuildHasherDefault::with_seeds(9, 7, 9, 8);
        assert_eq!(hash_bytes(b"curvature"), other.hash_one(b"curvature".as_slice()));
        assert_ne!(hash_bytes(b"a"), hash_bytes(b"b"));
    }
}
