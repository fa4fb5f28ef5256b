//! [`BytesArray`] that stores variable length values, [`BinaryArray`] is the
//! [`BytesArray`] of `[u8]`

use super::{
    Array, ArenaSerde, InvalidLogicalTypeSnafu, PlainArray, Result, TruncatedSnafu,
};
use snafu::ensure;
use std::fmt::Debug;
use std::marker::PhantomData;

use crate::aligned_vec::AlignedVec;
use crate::bitmap::Bitmap;
use crate::cow::{CowClone, Exclusive, Shared};
use crate::private::Sealed;
use crate::types::{LogicalType, PhysicalType};
use crate::utils::read_u64_le;

/// Number of bytes of the length prefix of the serialized value
const LENGTH_PREFIX: usize = size_of::<u64>();

/// Trait for the unsized values that can be placed on the [`BytesArray`]
pub trait BytesValue: Sealed + Debug + 'static {
    /// Physical type of the array that stores this type
    const PHYSICAL_TYPE: PhysicalType;
    /// Default logical type of this type
    const LOGICAL_TYPE: LogicalType;
    /// Name of the array
    const ARRAY_NAME: &'static str;

    /// View the value as bytes
    fn as_bytes(&self) -> &[u8];

    /// Validate the bytes and view them as value
    fn from_bytes(bytes: &[u8]) -> Result<&Self>;

    /// View the bytes as value without validation
    ///
    /// # Safety
    ///
    /// bytes should be created from [`Self::as_bytes`]
    unsafe fn from_bytes_unchecked(bytes: &[u8]) -> &Self;
}

impl Sealed for [u8] {}

impl BytesValue for [u8] {
    const PHYSICAL_TYPE: PhysicalType = PhysicalType::Binary;
    const LOGICAL_TYPE: LogicalType = LogicalType::VarBinary;
    const ARRAY_NAME: &'static str = "BinaryArray";

    #[inline]
    fn as_bytes(&self) -> &[u8] {
        self
    }

    #[inline]
    fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        Ok(bytes)
    }

    #[inline]
    unsafe fn from_bytes_unchecked(bytes: &[u8]) -> &Self {
        bytes
    }
}

/// Array that stores variable length values. Values are stored back to back in a
/// single buffer, `offsets[i]..offsets[i+1]` is the range of the i-th value
pub struct BytesArray<V: ?Sized + BytesValue> {
    logical_type: LogicalType,
    /// Always has `len + 1` offsets, the first one is 0
    offsets: Shared<AlignedVec<u64>>,
    bytes: Shared<AlignedVec<u8>>,
    validity: Shared<Bitmap>,
    _phantom: PhantomData<V>,
}

/// Array of the variable length binary
pub type BinaryArray = BytesArray<[u8]>;

impl<V: ?Sized + BytesValue> BytesArray<V> {
    /// Create a new empty [`BytesArray`]
    pub fn new(logical_type: LogicalType) -> Result<Self> {
        ensure!(
            logical_type.physical_type() == V::PHYSICAL_TYPE,
            InvalidLogicalTypeSnafu {
                array_name: V::ARRAY_NAME.to_string(),
                array_physical_type: V::PHYSICAL_TYPE,
                logical_type,
            }
        );
        // SAFETY: we check the physical type above
        unsafe { Ok(Self::new_unchecked(logical_type)) }
    }

    /// Create a new empty [`BytesArray`] without check
    ///
    /// # Safety
    ///
    /// physical type of the logical type should be `V::PHYSICAL_TYPE`
    pub unsafe fn new_unchecked(logical_type: LogicalType) -> Self {
        Self {
            logical_type,
            offsets: Exclusive::create(AlignedVec::from_slice(&[0])).into(),
            bytes: Shared::default(),
            validity: Shared::default(),
            _phantom: PhantomData,
        }
    }

    /// Get the bytes of the value at index, it will panic if the index out of bounds
    #[inline]
    pub fn value_bytes(&self, index: usize) -> &[u8] {
        let offsets = self.offsets.as_slice();
        let (start, end) = (offsets[index] as usize, offsets[index + 1] as usize);
        &self.bytes.as_slice()[start..end]
    }

    /// Append a value to the back of the array
    pub fn push(&mut self, value: &V) {
        let bytes = Shared::make_mut(&mut self.bytes);
        bytes.extend_from_slice(value.as_bytes());
        let end = bytes.len() as u64;
        Shared::make_mut(&mut self.offsets).push(end);
        if !self.validity.is_empty() {
            Shared::make_mut(&mut self.validity).push(true);
        }
    }
}

impl<V: ?Sized + BytesValue> Clone for BytesArray<V> {
    fn clone(&self) -> Self {
        Self {
            logical_type: self.logical_type.clone(),
            offsets: self.offsets.clone(),
            bytes: self.bytes.clone(),
            validity: self.validity.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<V: ?Sized + BytesValue> Default for BytesArray<V> {
    fn default() -> Self {
        // SAFETY: default logical type matches the physical type
        unsafe { Self::new_unchecked(V::LOGICAL_TYPE) }
    }
}

impl<V: ?Sized + BytesValue> Debug for BytesArray<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {{ logical_type: {:?}, len: {}, data: ",
            V::ARRAY_NAME,
            self.logical_type,
            self.len()
        )?;
        f.debug_list().entries(self.iter()).finish()?;
        write!(f, " }}")
    }
}

impl<V: ?Sized + BytesValue, A: AsRef<V>> FromIterator<Option<A>> for BytesArray<V> {
    fn from_iter<T: IntoIterator<Item = Option<A>>>(iter: T) -> Self {
        let mut array = Self::default();
        iter.into_iter().for_each(|value| match value {
            Some(value) => array.push(value.as_ref()),
            None => array.push_null(),
        });
        array
    }
}

impl<V: ?Sized + BytesValue> Sealed for BytesArray<V> {}

impl<V: ?Sized + BytesValue> CowClone for BytesArray<V> {
    #[inline]
    fn cow_clone(&self) -> Self {
        self.clone()
    }

    #[inline]
    fn mutate_children(&mut self) {
        Shared::make_mut(&mut self.offsets);
        Shared::make_mut(&mut self.bytes);
        Shared::make_mut(&mut self.validity);
    }
}

impl<V: ?Sized + BytesValue> Array for BytesArray<V> {
    const PHYSICAL_TYPE: PhysicalType = V::PHYSICAL_TYPE;

    type ElementRef<'a>
        = &'a V
    where
        Self: 'a;

    #[inline]
    fn validity(&self) -> &Bitmap {
        &self.validity
    }

    #[inline]
    fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    #[inline]
    fn logical_type(&self) -> &LogicalType {
        &self.logical_type
    }

    #[inline]
    unsafe fn get_value_unchecked(&self, index: usize) -> &V {
        unsafe {
            let start = *self.offsets.get_unchecked(index) as usize;
            let end = *self.offsets.get_unchecked(index + 1) as usize;
            V::from_bytes_unchecked(self.bytes.get_slice_unchecked(start, end - start))
        }
    }

    fn push_null(&mut self) {
        let len = self.len();
        let validity = Shared::make_mut(&mut self.validity);
        if validity.is_empty() {
            *validity = Bitmap::from_elem(true, len);
        }
        validity.push(false);
        let end = self.bytes.len() as u64;
        Shared::make_mut(&mut self.offsets).push(end);
    }

    fn truncate(&mut self, len: usize) {
        if len >= self.len() {
            return;
        }
        let offsets = Shared::make_mut(&mut self.offsets);
        offsets.truncate(len + 1);
        let end = offsets.as_slice()[len] as usize;
        Shared::make_mut(&mut self.bytes).truncate(end);
        if !self.validity.is_empty() {
            Shared::make_mut(&mut self.validity).truncate(len);
        }
    }
}

impl<V: ?Sized + BytesValue> PlainArray for BytesArray<V> {
    #[inline]
    fn data_at(&self, index: usize) -> &[u8] {
        self.value_bytes(index)
    }

    #[inline]
    fn insert_data(&mut self, bytes: &[u8]) -> Result<()> {
        let value = V::from_bytes(bytes)?;
        self.push(value);
        Ok(())
    }
}

impl<V: ?Sized + BytesValue> ArenaSerde for BytesArray<V> {
    #[inline]
    fn serialized_size(&self, index: usize) -> usize {
        LENGTH_PREFIX + self.value_bytes(index).len()
    }

    fn serialize_value(&self, index: usize, buf: &mut [u8]) -> usize {
        let value = self.value_bytes(index);
        buf[..LENGTH_PREFIX].copy_from_slice(&(value.len() as u64).to_le_bytes());
        buf[LENGTH_PREFIX..LENGTH_PREFIX + value.len()].copy_from_slice(value);
        LENGTH_PREFIX + value.len()
    }

    fn deserialize_and_insert_from_arena(&mut self, bytes: &[u8]) -> Result<usize> {
        let len = read_u64_le(bytes).ok_or_else(|| {
            TruncatedSnafu {
                array: V::ARRAY_NAME,
                expected: LENGTH_PREFIX,
                remaining: bytes.len(),
            }
            .build()
        })? as usize;
        let remaining = bytes.len() - LENGTH_PREFIX;
        ensure!(
            remaining >= len,
            TruncatedSnafu {
                array: V::ARRAY_NAME,
                expected: len,
                remaining,
            }
        );
        let value = V::from_bytes(&bytes[LENGTH_PREFIX..LENGTH_PREFIX + len])?;
        self.push(value);
        Ok(LENGTH_PREFIX + len)
    }
}
