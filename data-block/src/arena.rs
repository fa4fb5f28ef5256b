//! Arena that owns the variable length values referenced by the aggregation states
//!
//! Allocations live as long as the arena, they are freed when the arena is dropped.
//! The only exception is [`Arena::rollback`]: the most recent allocation can be given
//! back, such that speculatively serialized keys that turn out to be duplicates do
//! not waste memory

use std::alloc::Layout;
use std::cell::Cell;
use std::ptr::NonNull;

use allocator_api2::alloc::Allocator;
use bumpalo::Bump;
use snafu::Snafu;

#[allow(missing_docs)]
/// Error returned by the arena
#[derive(Debug, Snafu)]
pub enum ArenaError {
    #[snafu(display(
        "Arena failed to allocate `{requested}` bytes. `{used}` bytes are in use and the allocation limit is `{limit:?}`"
    ))]
    OutOfMemory {
        requested: usize,
        used: usize,
        limit: Option<usize>,
    },
}

type Result<T> = std::result::Result<T, ArenaError>;

/// Bump allocator with rollback of the most recent allocation.
///
/// Arena is `Send` but not `Sync`. It is owned by a single aggregation task
#[derive(Debug, Default)]
pub struct Arena {
    bump: Bump,
    /// Bytes of the values that are alive in the arena
    used: Cell<usize>,
    /// Address and length of the most recent allocation
    last: Cell<Option<(usize, usize)>>,
}

impl Arena {
    /// Create a new arena without allocation limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new arena that fails to allocate when the memory it requested from
    /// the system exceeds the `limit`
    pub fn with_allocation_limit(limit: usize) -> Self {
        let arena = Self::default();
        arena.bump.set_allocation_limit(Some(limit));
        arena
    }

    /// Bytes of the values that are alive in the arena
    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.used.get()
    }

    /// Bytes the arena requested from the system, including the memory of the
    /// values that are rolled back
    #[inline]
    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }

    /// Allocate `len` zeroed bytes in the arena. Caller can fill it and
    /// [`rollback`](Self::rollback) it if filling fails
    pub fn alloc_zeroed(&self, len: usize) -> Result<&mut [u8]> {
        if len == 0 {
            return Ok(&mut []);
        }

        let oom = || {
            OutOfMemorySnafu {
                requested: len,
                used: self.used.get(),
                limit: self.bump.allocation_limit(),
            }
            .build()
        };

        let layout = Layout::from_size_align(len, 1).map_err(|_| oom())?;
        let ptr = self.bump.try_alloc_layout(layout).map_err(|_| oom())?;
        // SAFETY: ptr points to `len` bytes that are just allocated, nobody else
        // references them
        let buf = unsafe {
            ptr.as_ptr().write_bytes(0, len);
            std::slice::from_raw_parts_mut(ptr.as_ptr(), len)
        };
        self.used.set(self.used.get() + len);
        self.last.set(Some((ptr.as_ptr() as usize, len)));
        Ok(buf)
    }

    /// Allocate `len` bytes in the arena and fill it with `fill`
    #[inline]
    pub fn alloc_with(&self, len: usize, fill: impl FnOnce(&mut [u8])) -> Result<&[u8]> {
        let buf = self.alloc_zeroed(len)?;
        fill(buf);
        Ok(buf)
    }

    /// Copy the bytes into the arena
    #[inline]
    pub fn insert(&self, bytes: &[u8]) -> Result<&[u8]> {
        self.alloc_with(bytes.len(), |buf| buf.copy_from_slice(bytes))
    }

    /// Give back the most recent allocation. Rollback of other allocations is
    /// ignored in release mode
    ///
    /// # Safety
    ///
    /// - `bytes` must be the value returned by the most recent allocation of this arena
    ///
    /// - `bytes` must not be accessed after rollback, its memory will be reused
    pub unsafe fn rollback(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        let is_last = self.last.get() == Some((bytes.as_ptr() as usize, bytes.len()));
        debug_assert!(
            is_last,
            "Arena can only rollback the most recent allocation"
        );
        if is_last {
            let ptr = NonNull::from(bytes).cast::<u8>();
            // SAFETY: the memory is allocated by the bump with the same layout and
            // caller guarantees it is not accessed anymore
            unsafe {
                (&self.bump).deallocate(ptr, Layout::from_size_align_unchecked(bytes.len(), 1));
            }
            self.used.set(self.used.get() - bytes.len());
            self.last.set(None);
        }
    }
}
