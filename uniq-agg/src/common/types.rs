//! Common type alias

/// Result type of the hash function
pub type HashValue = u64;
