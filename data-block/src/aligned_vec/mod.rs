//! Implementation of the Cache line aligned [`Vec`]
//!
//! Heavily adapted from [Arrow](https://github.com/apache/arrow-rs)

use std::alloc::{Layout, alloc, dealloc, handle_alloc_error, realloc};
use std::fmt::Debug;
use std::mem::size_of;
use std::ptr::{NonNull, copy_nonoverlapping};

use crate::cow::CowClone;
use crate::private::Sealed;
use crate::utils::roundup_to_multiple_of_pow_of_two_base;

/// Size of the cache line in bytes
pub const CACHE_LINE_SIZE: usize = 64;

/// Alignment of the memory region
const ALIGNMENT: usize = CACHE_LINE_SIZE;

/// Trait for types that can be allocated on the [`AlignedVec`]. This trait is
/// sealed to avoid other types implement it
pub trait AllocType: Sealed + Copy + Sized + Debug + Default + 'static + Send + Sync {}

macro_rules! impl_alloc_types {
    ($($ty:ty),*) => {
        $(
            impl Sealed for $ty {}

            impl AllocType for $ty {}
        )*
    };
}

impl_alloc_types!(i8, u8, i16, u16, i32, u32, i64, u64, i128, u128, f32, f64);

/// [`AlignedVec`] is a continuous memory region that allocated from memory
/// allocator. The memory is **cache line aligned** and its **capacity in bytes**
/// is multiple of **cache line size**
#[repr(C)]
pub struct AlignedVec<T: AllocType> {
    /// Pointer to the start of the memory region
    pub(crate) ptr: NonNull<T>,
    /// Number of elements in the AlignedVec
    pub(crate) len: usize,
    /// Memory layout of the region
    capacity_in_bytes: usize,
}

impl<T: AllocType> AlignedVec<T> {
    /// Create a new [`AlignedVec`]
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
            capacity_in_bytes: 0,
        }
    }

    /// Create a new [`AlignedVec`] with given capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut this = Self::new();
        this.reserve(capacity);
        this
    }

    #[inline]
    fn layout(&self) -> Layout {
        unsafe { Layout::from_size_align_unchecked(self.capacity_in_bytes, ALIGNMENT) }
    }

    /// Returns the raw pointer to the aligned memory region
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr() as _
    }

    /// Get the number of elements in the [`AlignedVec`], also referred to its 'length'
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the [`AlignedVec`] contains no elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the entire vector as a slice
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: Self guarantees memory region from self.ptr to self.ptr+self.len is always valid
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// View the entire vector as a mutable slice
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: Self guarantees memory region from self.ptr to self.ptr+self.len is always valid
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Append an element to the back of the vector
    #[inline]
    pub fn push(&mut self, value: T) {
        self.reserve(1);
        // SAFETY: reserve guarantees the capacity is enough
        unsafe { self.ptr.as_ptr().add(self.len).write(value) };
        self.len += 1;
    }

    /// Append all of the elements in the slice to the back of the vector
    #[inline]
    pub fn extend_from_slice(&mut self, values: &[T]) {
        self.reserve(values.len());
        // SAFETY: reserve guarantees the capacity is enough, values can not overlap
        // with the spare capacity of self
        unsafe {
            copy_nonoverlapping(values.as_ptr(), self.ptr.as_ptr().add(self.len), values.len())
        };
        self.len += values.len();
    }

    /// Shortens the vector, keeping the first `len` elements. It has no effect if
    /// `len` is greater than the vector's current length
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.len = std::cmp::min(self.len, len);
    }

    /// Clear the [`AlignedVec`], removing all elements.
    ///
    /// Note that this method has no effect on the allocated capacity
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0
    }

    /// Reserves capacity for at least additional more elements to be inserted
    #[inline]
    pub fn reserve(&mut self, additional: usize) {
        let new_len_in_bytes = (self.len + additional) * size_of::<T>();

        if new_len_in_bytes > self.capacity_in_bytes {
            self.realloc(new_len_in_bytes);
        }
    }

    #[cold]
    fn realloc(&mut self, new_cap_in_bytes: usize) {
        // SAFETY:
        // 1. self.ptr and self.layout is pre-allocated by the allocator
        // 2. [`ALIGNMENT`] is guaranteed to be power of two
        unsafe {
            let new_cap_in_bytes =
                roundup_to_multiple_of_pow_of_two_base(new_cap_in_bytes, CACHE_LINE_SIZE);
            // The new memory region is at least two times larger than the old region
            let new_cap_in_bytes = std::cmp::max(new_cap_in_bytes, self.capacity_in_bytes * 2);
            let new_layout = Layout::from_size_align_unchecked(new_cap_in_bytes, ALIGNMENT);
            let ptr = if self.capacity_in_bytes == 0 {
                // ptr is not allocated, according to [`Safety`](https://doc.rust-lang.org/std/alloc/trait.GlobalAlloc.html#safety-4)
                // section, we should use alloc instead of realloc
                alloc(new_layout)
            } else {
                realloc(self.ptr.as_ptr() as _, self.layout(), new_cap_in_bytes)
            };

            self.ptr = NonNull::new(ptr as _).unwrap_or_else(|| handle_alloc_error(new_layout));
            self.capacity_in_bytes = new_cap_in_bytes;
        }
    }

    /// Returns a T at the given index without bound check
    ///
    /// # Safety
    /// Caller should guarantee `index < self.len()`, otherwise, [undefined behavior] happens
    ///
    /// [undefined behavior]: https://doc.rust-lang.org/reference/behavior-considered-undefined.html
    #[inline]
    pub unsafe fn get_unchecked(&self, index: usize) -> &T {
        #[cfg(feature = "verify")]
        assert!(index < self.len);

        unsafe { &*self.ptr.as_ptr().add(index) }
    }

    /// Returns a `&[T]` start from the given index with given length without bound check
    ///
    /// # Safety
    /// Caller should guarantee `index + len <= self.len()`, otherwise, [undefined behavior] happens
    ///
    /// [undefined behavior]: https://doc.rust-lang.org/reference/behavior-considered-undefined.html
    #[inline]
    pub unsafe fn get_slice_unchecked(&self, index: usize, len: usize) -> &[T] {
        #[cfg(feature = "verify")]
        assert!(index + len <= self.len);

        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(index), len) }
    }
}

unsafe impl<T: AllocType> Send for AlignedVec<T> {}
unsafe impl<T: AllocType> Sync for AlignedVec<T> {}

impl<T: AllocType> Drop for AlignedVec<T> {
    #[inline]
    fn drop(&mut self) {
        if self.capacity_in_bytes != 0 {
            // Not dangling pointer
            unsafe { dealloc(self.ptr.as_ptr() as _, self.layout()) };
        }
    }
}

impl<T: AllocType> Default for AlignedVec<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: AllocType> Clone for AlignedVec<T> {
    fn clone(&self) -> Self {
        if self.capacity_in_bytes == 0 {
            // Not allocated
            Self::new()
        } else {
            // SAFETY: layout is correct and the new allocated memory region never overlap with self
            unsafe {
                let ptr = NonNull::new(alloc(self.layout()) as _)
                    .unwrap_or_else(|| handle_alloc_error(self.layout()));
                copy_nonoverlapping(self.ptr.as_ptr(), ptr.as_ptr(), self.len);

                Self {
                    ptr,
                    len: self.len,
                    capacity_in_bytes: self.capacity_in_bytes,
                }
            }
        }
    }
}

impl<T: AllocType> CowClone for AlignedVec<T> {
    #[inline]
    fn cow_clone(&self) -> Self {
        self.clone()
    }
}

impl<T: AllocType> Debug for AlignedVec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice().iter()).finish()
    }
}

/// Ergonomic helper functions
impl<T: AllocType> AlignedVec<T> {
    /// Construct Self from slice
    pub fn from_slice(slice: &[T]) -> Self {
        let mut new = Self::with_capacity(slice.len());
        new.extend_from_slice(slice);
        new
    }
}

impl<T: AllocType> FromIterator<T> for AlignedVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut new = Self::with_capacity(iter.size_hint().0);
        iter.for_each(|value| new.push(value));
        new
    }
}
