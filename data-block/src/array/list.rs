//! [`ListArray`] whose elements are lists of another array

use std::fmt::Debug;
use std::ops::Range;

use snafu::ensure;

use super::{Array, ArenaSerde, ArrayImpl, InvalidLogicalTypeSnafu, Result, TruncatedSnafu};
use crate::aligned_vec::AlignedVec;
use crate::bitmap::Bitmap;
use crate::cow::{CowClone, Exclusive, Shared};
use crate::private::Sealed;
use crate::types::{LogicalType, PhysicalType};
use crate::utils::read_u64_le;

/// Number of bytes of the length prefix of the serialized list
const LENGTH_PREFIX: usize = size_of::<u64>();

/// Array of lists. All of the lists are stored back to back in the `elements` array,
/// `offsets[i]` is the end of the i-th list and the start is `offsets[i-1]` (0 for
/// the first list)
#[derive(Clone)]
pub struct ListArray {
    logical_type: LogicalType,
    elements: Shared<ArrayImpl>,
    offsets: Shared<AlignedVec<u64>>,
    validity: Shared<Bitmap>,
}

/// Reference to a list in the [`ListArray`]
#[derive(Clone, Copy)]
pub struct ListElementRef<'a> {
    /// Array that contains the elements of the list
    pub elements: &'a ArrayImpl,
    /// Start index of the list in the elements
    pub start: usize,
    /// Number of the elements in the list
    pub len: usize,
}

impl Debug for ListElementRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.elements.debug_array_slice(f, self.start, self.len)
    }
}

impl ListArray {
    /// Create a new empty [`ListArray`]
    pub fn new(logical_type: LogicalType) -> Result<Self> {
        ensure!(
            logical_type.physical_type() == PhysicalType::List,
            InvalidLogicalTypeSnafu {
                array_name: "ListArray".to_string(),
                array_physical_type: PhysicalType::List,
                logical_type,
            }
        );
        // SAFETY: we check the physical type above
        unsafe { Ok(Self::new_unchecked(logical_type)) }
    }

    /// Create a new empty [`ListArray`] without check
    ///
    /// # Safety
    ///
    /// physical type of the logical type should be `PhysicalType::List`
    pub unsafe fn new_unchecked(logical_type: LogicalType) -> Self {
        let elements = match logical_type.list_element() {
            Some((element_type, _)) => ArrayImpl::new(element_type.clone()),
            None => unreachable!("Caller guarantees the logical type is list"),
        };

        Self {
            logical_type,
            elements: Exclusive::create(elements).into(),
            offsets: Shared::default(),
            validity: Shared::default(),
        }
    }

    /// Array that contains the elements of all of the lists
    #[inline]
    pub fn elements(&self) -> &ArrayImpl {
        &self.elements
    }

    /// End offsets of the lists
    #[inline]
    pub fn offsets(&self) -> &[u64] {
        self.offsets.as_slice()
    }

    /// Range of the list at index in the elements, it will panic if the index out
    /// of bounds
    #[inline]
    pub fn value_range(&self, index: usize) -> Range<usize> {
        let offsets = self.offsets();
        let start = if index == 0 {
            0
        } else {
            offsets[index - 1] as usize
        };
        start..offsets[index] as usize
    }

    #[inline]
    fn is_element_nullable(&self) -> bool {
        self.logical_type
            .list_element()
            .is_some_and(|(_, is_nullable)| is_nullable)
    }

    /// Append a list to the back of the array. `build` appends the elements of the
    /// list to the elements array, the new offset is the previous offset plus the
    /// number of elements it appends. If `build` fails, the elements it appended are
    /// removed and the array is not changed
    pub fn push_list_with<E>(
        &mut self,
        build: impl FnOnce(&mut ArrayImpl) -> std::result::Result<(), E>,
    ) -> std::result::Result<(), E> {
        let elements = Shared::make_mut(&mut self.elements);
        let start = elements.len();
        if let Err(e) = build(&mut *elements) {
            elements.truncate(start);
            return Err(e);
        }
        let end = elements.len() as u64;
        Shared::make_mut(&mut self.offsets).push(end);
        if !self.validity.is_empty() {
            Shared::make_mut(&mut self.validity).push(true);
        }
        Ok(())
    }
}

impl Debug for ListArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ListArray {{ logical_type: {:?}, len: {}, data: ",
            self.logical_type,
            self.len()
        )?;
        f.debug_list().entries(self.iter()).finish()?;
        write!(f, " }}")
    }
}

impl Sealed for ListArray {}

impl CowClone for ListArray {
    #[inline]
    fn cow_clone(&self) -> Self {
        self.clone()
    }

    fn mutate_children(&mut self) {
        Shared::make_mut(&mut self.elements);
        Shared::make_mut(&mut self.offsets);
        Shared::make_mut(&mut self.validity);
    }
}

impl Array for ListArray {
    const PHYSICAL_TYPE: PhysicalType = PhysicalType::List;

    type ElementRef<'a>
        = ListElementRef<'a>
    where
        Self: 'a;

    #[inline]
    fn validity(&self) -> &Bitmap {
        &self.validity
    }

    #[inline]
    fn len(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    fn logical_type(&self) -> &LogicalType {
        &self.logical_type
    }

    #[inline]
    unsafe fn get_value_unchecked(&self, index: usize) -> ListElementRef<'_> {
        let range = self.value_range(index);
        ListElementRef {
            elements: &self.elements,
            start: range.start,
            len: range.len(),
        }
    }

    fn push_null(&mut self) {
        let len = self.len();
        let validity = Shared::make_mut(&mut self.validity);
        if validity.is_empty() {
            *validity = Bitmap::from_elem(true, len);
        }
        validity.push(false);
        let end = self.elements.len() as u64;
        Shared::make_mut(&mut self.offsets).push(end);
    }

    fn truncate(&mut self, len: usize) {
        if len >= self.len() {
            return;
        }
        let offsets = Shared::make_mut(&mut self.offsets);
        offsets.truncate(len);
        let end = offsets.as_slice().last().map_or(0, |&end| end as usize);
        Shared::make_mut(&mut self.elements).truncate(end);
        if !self.validity.is_empty() {
            Shared::make_mut(&mut self.validity).truncate(len);
        }
    }
}

impl ArenaSerde for ListArray {
    fn serialized_size(&self, index: usize) -> usize {
        let is_nullable = self.is_element_nullable();
        self.value_range(index)
            .map(|i| {
                let valid = self.elements.is_valid(i);
                let flag = usize::from(is_nullable);
                if valid || !is_nullable {
                    flag + self.elements.serialized_size(i)
                } else {
                    flag
                }
            })
            .sum::<usize>()
            + LENGTH_PREFIX
    }

    fn serialize_value(&self, index: usize, buf: &mut [u8]) -> usize {
        let is_nullable = self.is_element_nullable();
        let range = self.value_range(index);
        buf[..LENGTH_PREFIX].copy_from_slice(&(range.len() as u64).to_le_bytes());
        let mut written = LENGTH_PREFIX;
        for i in range {
            if is_nullable {
                let valid = self.elements.is_valid(i);
                buf[written] = u8::from(valid);
                written += 1;
                if !valid {
                    continue;
                }
            }
            written += self.elements.serialize_value(i, &mut buf[written..]);
        }
        written
    }

    fn deserialize_and_insert_from_arena(&mut self, bytes: &[u8]) -> Result<usize> {
        let len = read_u64_le(bytes).ok_or_else(|| {
            TruncatedSnafu {
                array: "ListArray",
                expected: LENGTH_PREFIX,
                remaining: bytes.len(),
            }
            .build()
        })?;
        let is_nullable = self.is_element_nullable();

        let mut consumed = LENGTH_PREFIX;
        self.push_list_with(|elements: &mut ArrayImpl| -> Result<()> {
            for _ in 0..len {
                if is_nullable {
                    ensure!(
                        consumed < bytes.len(),
                        TruncatedSnafu {
                            array: "ListArray",
                            expected: 1_usize,
                            remaining: 0_usize,
                        }
                    );
                    let valid = bytes[consumed] != 0;
                    consumed += 1;
                    if !valid {
                        elements.push_null();
                        continue;
                    }
                }
                consumed += elements.deserialize_and_insert_from_arena(&bytes[consumed..])?;
            }
            Ok(())
        })?;
        Ok(consumed)
    }
}
