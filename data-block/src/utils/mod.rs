//! Utils

/// Computing the smallest value that is multiple of `base` and greater than
/// or equal to size.
///
/// Note that `base` must be power of two. Otherwise, the returned value is incorrect!
#[inline]
pub fn roundup_to_multiple_of_pow_of_two_base(size: usize, base: usize) -> usize {
    let mask = base - 1;
    (size + mask) & !mask
}

/// Read the little-endian u64 at the start of the bytes. Returns `None` if the
/// bytes is shorter than 8
#[inline]
pub(crate) fn read_u64_le(bytes: &[u8]) -> Option<u64> {
    bytes.first_chunk::<8>().map(|prefix| u64::from_le_bytes(*prefix))
}
