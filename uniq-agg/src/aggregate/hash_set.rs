//! Hash set that stores the unique values of the `groupUniqArray`
//!
//! Small sets store the cells inline and find them with linear scan. When the
//! inline buffer is full, all of the cells are moved into the swiss table. Cells
//! never own the variable length keys, byte spans are borrowed from the arena

use std::fmt::Debug;
use std::hash::Hash;

use hashbrown::hash_table::{self, HashTable as SwissTable};

use crate::common::types::HashValue;
use crate::common::utils::hash::BUILD_HASHER_DEFAULT;

/// Cell stored in the [`UniqHashSet`]
pub trait UniqCell: Debug + Copy + Default {
    /// Hash value of the cell. It is used to probe the swiss table and to rehash
    /// the cells when the table grows
    fn hash_value(&self) -> HashValue;
}

/// Cell of the fixed width key, the hash is computed on demand
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct ScalarCell<K>(pub K);

impl<K: Debug + Copy + Default + Hash> UniqCell for ScalarCell<K> {
    #[inline]
    fn hash_value(&self) -> HashValue {
        BUILD_HASHER_DEFAULT.hash_one(self.0)
    }
}

/// Cell that references the bytes in the arena, with the saved hash of the bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct SavedHashCell<'a> {
    bytes: &'a [u8],
    hash: HashValue,
}

impl<'a> SavedHashCell<'a> {
    /// Create a new cell, `hash` should be the hash of the bytes
    #[inline]
    pub fn new(bytes: &'a [u8], hash: HashValue) -> Self {
        Self { bytes, hash }
    }

    /// Referenced bytes
    #[inline]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Returns true if the cell stores the given bytes
    #[inline]
    pub fn matches(&self, bytes: &[u8], hash: HashValue) -> bool {
        self.hash == hash && self.bytes == bytes
    }
}

impl UniqCell for SavedHashCell<'_> {
    #[inline]
    fn hash_value(&self) -> HashValue {
        self.hash
    }
}

enum Storage<C, const N: usize> {
    Inline { cells: [C; N], len: usize },
    Spilled(SwissTable<C>),
}

/// Hash set of the unique cells. The first `N` cells are stored inline, the set
/// spills to the swiss table with capacity `2N` when the `N+1`-th cell is inserted
///
/// Iteration order is the insertion order while the cells are inline and the
/// bucket order after the set is spilled
pub struct UniqHashSet<C, const N: usize> {
    storage: Storage<C, N>,
}

impl<C: UniqCell, const N: usize> Default for UniqHashSet<C, N> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<C: UniqCell, const N: usize> Debug for UniqHashSet<C, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UniqHashSet {{ len: {}, data: ", self.len())?;
        f.debug_list().entries(self.iter()).finish()?;
        write!(f, " }}")
    }
}

impl<C: UniqCell, const N: usize> UniqHashSet<C, N> {
    /// Create a new empty set, it does not allocate
    #[inline]
    pub fn new() -> Self {
        Self {
            storage: Storage::Inline {
                cells: [C::default(); N],
                len: 0,
            },
        }
    }

    /// Number of the cells in the set
    #[inline]
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Inline { len, .. } => *len,
            Storage::Spilled(table) => table.len(),
        }
    }

    /// Returns true if the set does not contain any cell
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the cells are moved into the swiss table
    #[inline]
    pub fn is_spilled(&self) -> bool {
        matches!(self.storage, Storage::Spilled(_))
    }

    /// Iterate the cells in the set
    #[inline]
    pub fn iter(&self) -> Iter<'_, C> {
        match &self.storage {
            Storage::Inline { cells, len } => Iter::Inline(cells[..*len].iter()),
            Storage::Spilled(table) => Iter::Spilled(table.iter()),
        }
    }

    /// Insert the cell if the set does not contain it. Returns true if the cell
    /// is inserted
    #[inline]
    pub fn insert(&mut self, cell: C) -> bool
    where
        C: PartialEq,
    {
        let hash = cell.hash_value();
        match self.insert_with(
            hash,
            |stored| *stored == cell,
            || Ok::<_, std::convert::Infallible>(cell),
        ) {
            Ok(inserted) => inserted.is_some(),
            Err(e) => match e {},
        }
    }

    /// Probe the set with the key whose hash is `hash`, `is_match` tells whether
    /// the stored cell equals to the key. If the key is absent, `make` is called to
    /// produce the cell that will be stored and the stored cell is returned. If the
    /// key is present, `make` is not called and `None` is returned
    ///
    /// `make` should produce a cell whose hash value is `hash`
    pub fn insert_with<E>(
        &mut self,
        hash: HashValue,
        mut is_match: impl FnMut(&C) -> bool,
        make: impl FnOnce() -> Result<C, E>,
    ) -> Result<Option<&C>, E> {
        let is_full = match &mut self.storage {
            Storage::Inline { cells, len } => {
                if cells[..*len].iter().any(&mut is_match) {
                    return Ok(None);
                }
                *len == N
            }
            Storage::Spilled(_) => false,
        };

        if is_full {
            // The cell created by make will be the N+1-th cell
            let cell = make()?;
            debug_assert_eq!(cell.hash_value(), hash);
            self.spill();
            let Storage::Spilled(table) = &mut self.storage else {
                unreachable!("The set is spilled above")
            };
            return Ok(Some(
                &*table.insert_unique(hash, cell, UniqCell::hash_value).into_mut(),
            ));
        }

        match &mut self.storage {
            Storage::Inline { cells, len } => {
                let cell = make()?;
                debug_assert_eq!(cell.hash_value(), hash);
                let index = *len;
                cells[index] = cell;
                *len += 1;
                Ok(Some(&cells[index]))
            }
            Storage::Spilled(table) => match table.entry(hash, is_match, UniqCell::hash_value) {
                hash_table::Entry::Occupied(_) => Ok(None),
                hash_table::Entry::Vacant(vacant) => {
                    let cell = make()?;
                    debug_assert_eq!(cell.hash_value(), hash);
                    Ok(Some(&*vacant.insert(cell).into_mut()))
                }
            },
        }
    }

    /// Insert all of the cells in the `other` into self, duplicates are skipped
    pub fn merge(&mut self, other: &Self)
    where
        C: PartialEq,
    {
        other.iter().for_each(|&cell| {
            self.insert(cell);
        });
    }

    #[cold]
    fn spill(&mut self) {
        let Storage::Inline { cells, len } = &self.storage else {
            return;
        };

        tracing::trace!(
            "UniqHashSet with {} inline cells is full, spill the cells into the swiss table",
            N
        );
        let mut table = SwissTable::with_capacity(2 * N);
        cells[..*len].iter().for_each(|&cell| {
            table.insert_unique(cell.hash_value(), cell, UniqCell::hash_value);
        });
        self.storage = Storage::Spilled(table);
    }
}

/// Iterator over the cells of the [`UniqHashSet`]
pub enum Iter<'a, C> {
    /// Iterate the inline cells
    Inline(std::slice::Iter<'a, C>),
    /// Iterate the swiss table
    Spilled(hash_table::Iter<'a, C>),
}

impl<'a, C> Iterator for Iter<'a, C> {
    type Item = &'a C;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Inline(iter) => iter.next(),
            Self::Spilled(iter) => iter.next(),
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Self::Inline(iter) => iter.size_hint(),
            Self::Spilled(iter) => iter.size_hint(),
        }
    }
}

impl<C> ExactSizeIterator for Iter<'_, C> {}

impl<C> Debug for Iter<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (storage, remaining) = match self {
            Self::Inline(iter) => ("Inline", iter.len()),
            Self::Spilled(iter) => ("Spilled", iter.len()),
        };
        f.debug_struct("Iter")
            .field("storage", &storage)
            .field("remaining", &remaining)
            .finish()
    }
}
