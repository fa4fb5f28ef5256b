//! Bitmap that stores the validity of the arrays

use std::fmt::Debug;

use crate::aligned_vec::AlignedVec;
use crate::cow::CowClone;

/// Underling type that stores the bitmap
pub(crate) type BitStore = u64;

const BITS: usize = BitStore::BITS as usize;

/// Bitmap in data-block, each boolean is stored as a single bit. Bits are stored
/// in LSB order
///
/// Note that if all of the elements in the array are not null, the [`Bitmap`]
/// could be empty
#[derive(Clone, Default)]
pub struct Bitmap {
    /// Internal buffer stores the bits
    buffer: AlignedVec<BitStore>,
    /// Number of live bits in the allocation
    num_bits: usize,
}

#[inline]
fn elts(num_bits: usize) -> usize {
    num_bits.div_ceil(BITS)
}

impl Bitmap {
    /// Create a new [`Bitmap`]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new [`Bitmap`] with `len` bits that are all `val`
    pub fn from_elem(val: bool, len: usize) -> Self {
        let fill = if val { BitStore::MAX } else { 0 };
        let mut buffer = AlignedVec::with_capacity(elts(len));
        (0..elts(len)).for_each(|_| buffer.push(fill));
        Self {
            buffer,
            num_bits: len,
        }
    }

    /// Returns true if the bitmap is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    /// Get number of bits in the bitmap
    #[inline]
    pub fn len(&self) -> usize {
        self.num_bits
    }

    /// Get the bit at index
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        assert!(
            index < self.num_bits,
            "Index `{index}` is out of bounds of the bitmap with `{}` bits",
            self.num_bits
        );
        unsafe { self.get_unchecked(index) }
    }

    /// Get the bit at index without bound check
    ///
    /// # Safety
    ///
    /// `index < self.len()`
    #[inline]
    pub unsafe fn get_unchecked(&self, index: usize) -> bool {
        #[cfg(feature = "verify")]
        assert!(index < self.num_bits);

        let elt = unsafe { *self.buffer.get_unchecked(index / BITS) };
        elt & (1 << (index % BITS)) != 0
    }

    /// Get the iterator that produce bool
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.num_bits).map(|index| unsafe { self.get_unchecked(index) })
    }

    /// Count the number of zeros in the bitmap
    #[inline]
    pub fn count_zeros(&self) -> usize {
        self.num_bits - self.count_ones()
    }

    /// Count the number of ones in the bitmap
    pub fn count_ones(&self) -> usize {
        let full = self.num_bits / BITS;
        let slice = self.buffer.as_slice();
        let ones = slice[..full]
            .iter()
            .map(|elt| elt.count_ones() as usize)
            .sum::<usize>();
        let remainder = self.num_bits % BITS;
        if remainder == 0 {
            ones
        } else {
            let mask = (1 << remainder) - 1;
            ones + (slice[full] & mask).count_ones() as usize
        }
    }

    /// Appends a single bit into the bitmap
    pub fn push(&mut self, val: bool) {
        let index = self.num_bits;
        if index % BITS == 0 {
            self.buffer.push(0);
        }
        self.num_bits += 1;
        let elt = &mut self.buffer.as_mut_slice()[index / BITS];
        if val {
            *elt |= 1 << (index % BITS);
        } else {
            *elt &= !(1 << (index % BITS));
        }
    }

    /// Keep the first `len` bits
    pub fn truncate(&mut self, len: usize) {
        if len < self.num_bits {
            self.num_bits = len;
            self.buffer.truncate(elts(len));
        }
    }

    /// Clear the bitmap, it only set the num_bits to 0 and do not free the
    /// underling buffer
    #[inline]
    pub fn clear(&mut self) {
        self.num_bits = 0;
        self.buffer.clear();
    }
}

impl FromIterator<bool> for Bitmap {
    fn from_iter<T: IntoIterator<Item = bool>>(iter: T) -> Self {
        let mut bitmap = Self::new();
        iter.into_iter().for_each(|val| bitmap.push(val));
        bitmap
    }
}

impl CowClone for Bitmap {
    #[inline]
    fn cow_clone(&self) -> Self {
        self.clone()
    }
}

impl Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bitmap {{ len: {}, data: [", self.num_bits)?;
        self.iter()
            .try_for_each(|val| write!(f, "{}", if val { '1' } else { '0' }))?;
        write!(f, "] }}")
    }
}
