//! [`Array`] is the memory format of the columnar storage.
//!
//! Heavily adapted from [`type-exercise-in-rust`](https://github.com/skyzh/type-exercise-in-rust)
//!
//! Arrays hold their buffers through [`Shared`](crate::cow::Shared). Cloning an
//! array is shallow, methods that mutate the array copy the buffers that are shared
//! with other arrays before writing them.

pub mod binary;
pub mod list;
pub mod primitive;
pub mod string;

use crate::arena::{Arena, ArenaError};
use crate::bitmap::Bitmap;
use crate::cow::CowClone;
use crate::private::Sealed;
use crate::types::{LogicalType, PhysicalType};
pub use binary::*;
pub use list::{ListArray, ListElementRef};
pub use primitive::*;
use snafu::Snafu;
use std::fmt::Debug;
pub use string::StringArray;

#[allow(missing_docs)]
#[derive(Debug, Snafu)]
pub enum ArrayError {
    #[snafu(display(
        "Invalid logical type `{:?}({})` passed to creating a new array `{}` that has `{}`",
        logical_type,
        logical_type.physical_type(),
        array_name,
        array_physical_type
    ))]
    InvalidLogicalType {
        array_name: String,
        array_physical_type: PhysicalType,
        logical_type: LogicalType,
    },
    #[snafu(display("Can not convert `ArrayImpl::{array}` array into `{target}` array"))]
    Convert {
        array: &'static str,
        target: &'static str,
    },
    #[snafu(display(
        "`{array}` requires `{expected}` bytes to deserialize the element, only `{remaining}` bytes remain"
    ))]
    Truncated {
        array: &'static str,
        expected: usize,
        remaining: usize,
    },
    #[snafu(display(
        "`{array}` can not insert the data with `{actual}` bytes, its element has `{expected}` bytes"
    ))]
    WidthMismatch {
        array: &'static str,
        expected: usize,
        actual: usize,
    },
    #[snafu(display("Data inserted into the StringArray is not valid utf8"))]
    InvalidUtf8 { source: std::str::Utf8Error },
    #[snafu(display(
        "Elements of `ArrayImpl::{array}` can not be viewed as a contiguous memory region"
    ))]
    NotPlain { array: &'static str },
}

type Result<T> = std::result::Result<T, ArrayError>;

/// A trait over all arrays
pub trait Array: Sealed + Debug + Clone + CowClone + 'static {
    /// Physical type of the array
    const PHYSICAL_TYPE: PhysicalType;

    /// Reference to the element in the [`Array`]
    type ElementRef<'a>: Copy + Debug
    where
        Self: 'a;

    /// Get the validity. **If the validity is not empty, the length must equal to
    /// [`Self::len`]**
    fn validity(&self) -> &Bitmap;

    /// Get the number of elements in the [`Array`]
    fn len(&self) -> usize;

    /// Returns `true` if the [`Array`] contains no elements
    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the logical type of the array. This function enforces each array implementation
    /// should have a [`LogicalType`] as its field
    fn logical_type(&self) -> &LogicalType;

    /// Returns a reference to the element at the given index without bound check
    ///
    /// # Safety
    /// Caller should guarantee `index < self.len()`, otherwise, [undefined behavior] happens
    ///
    /// [undefined behavior]: https://doc.rust-lang.org/reference/behavior-considered-undefined.html
    unsafe fn get_value_unchecked(&self, index: usize) -> Self::ElementRef<'_>;

    /// Returns true if the element at the given index is not null. It will panic if
    /// the index out of bounds
    #[inline]
    fn is_valid(&self, index: usize) -> bool {
        assert!(index < self.len());
        let validity = self.validity();
        validity.is_empty() || unsafe { validity.get_unchecked(index) }
    }

    /// Returns a reference to the element at the given index. It will panic if the index
    /// out of bounds
    #[inline]
    fn get(&self, index: usize) -> Option<Self::ElementRef<'_>> {
        assert!(index < self.len());
        unsafe { self.get_unchecked(index) }
    }

    /// Returns a reference to the element at the given index without bound check
    ///
    /// # Safety
    /// Caller should guarantee `index < self.len()`, otherwise, [undefined behavior] happens
    ///
    /// [undefined behavior]: https://doc.rust-lang.org/reference/behavior-considered-undefined.html
    #[inline]
    unsafe fn get_unchecked(&self, index: usize) -> Option<Self::ElementRef<'_>> {
        let validity = self.validity();
        unsafe {
            if validity.is_empty() || validity.get_unchecked(index) {
                Some(self.get_value_unchecked(index))
            } else {
                None
            }
        }
    }

    /// Get iterator of the array
    #[inline]
    fn iter(&self) -> impl Iterator<Item = Option<Self::ElementRef<'_>>> + '_ {
        (0..self.len()).map(|index| unsafe { self.get_unchecked(index) })
    }

    // Mutate array

    /// Append a null to the back of the array
    fn push_null(&mut self);

    /// Shortens the array, keeping the first `len` elements. It has no effect if
    /// `len` is greater than the array's current length
    fn truncate(&mut self, len: usize);
}

/// Capability of the arrays whose elements are stored in a contiguous memory region,
/// the bytes in the region unambiguously represent the element
pub trait PlainArray: Array {
    /// View the element at the given index as bytes, zero copy. If the element is
    /// null, the returned bytes are unspecified. It will panic if the index out of
    /// bounds
    fn data_at(&self, index: usize) -> &[u8];

    /// Append the element represented by the bytes to the back of the array
    fn insert_data(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Capability of the arrays that can serialize their elements into the [`Arena`] as
/// self-delimiting bytes. Arrays of any shape, including nested arrays, implement it
///
/// Serialized formats:
///
/// - Primitive: fixed width little-endian bytes
///
/// - String/Binary: `u64` little-endian length followed by the bytes
///
/// - List: `u64` little-endian number of elements followed by the elements. If the
///   elements are nullable, each element is prefixed with a byte: `1` for valid and
///   `0` for null. Null elements do not have payload
pub trait ArenaSerde: Array {
    /// Number of bytes required to serialize the value at given index
    fn serialized_size(&self, index: usize) -> usize;

    /// Serialize the value at given index into buf, returns the number of the bytes
    /// written. `buf.len()` should be greater than or equal to the serialized size
    fn serialize_value(&self, index: usize, buf: &mut [u8]) -> usize;

    /// Serialize the value at given index into the arena with a single allocation.
    /// The returned bytes are the most recent allocation of the arena, caller can
    /// [`rollback`](Arena::rollback) it
    fn serialize_value_into_arena<'a>(
        &self,
        index: usize,
        arena: &'a Arena,
    ) -> std::result::Result<&'a [u8], ArenaError> {
        arena.alloc_with(self.serialized_size(index), |buf| {
            self.serialize_value(index, buf);
        })
    }

    /// Parse a value from the start of the bytes and append it to the back of the
    /// array. Returns the number of bytes consumed. If bytes are truncated, the
    /// array is not changed
    fn deserialize_and_insert_from_arena(&mut self, bytes: &[u8]) -> Result<usize>;
}

macro_rules! array_impl {
    ($({$variant:ident, $element_ty:ty, $array_ty:ident}),+) => {
        /// Implementations of the [`Array`], enum dispatch
        #[derive(Debug, Clone)]
        pub enum ArrayImpl {
            $(
                #[doc = concat!("Array of `", stringify!($element_ty), "`")]
                $variant($array_ty)
            ),+
        }

        impl ArrayImpl{
            /// Create a new empty [`ArrayImpl`] based on the [`LogicalType`]
            pub fn new(logical_type: LogicalType) -> Self {
                let physical_type = logical_type.physical_type();
                macro_rules! create_array_with_physical_type {
                    () => {
                        match physical_type {
                            $(
                                PhysicalType::$variant => ArrayImpl::$variant($array_ty::new_unchecked(logical_type)),
                            )+
                        }
                    }
                }

                // SAFETY: physical type of the logical type matches the array
                unsafe {
                    create_array_with_physical_type!()
                }
            }

            /// Get the number of elements in the Array
            pub fn len(&self) -> usize {
                match self{
                    $(
                        Self::$variant(array) => array.len(),
                    )+
                }
            }

            /// Returns `true` if the Array contains no elements
            pub fn is_empty(&self) -> bool {
                match self{
                    $(
                        Self::$variant(array) => array.is_empty(),
                    )+
                }
            }

            /// Get ident of the array
            pub fn ident(&self) -> &'static str{
                match self{
                    $(
                        Self::$variant(_) => stringify!($variant),
                    )+
                }
            }

            /// Return the [`LogicalType`] of the array
            pub fn logical_type(&self) -> &LogicalType{
                match self{
                    $(
                        Self::$variant(array) => array.logical_type(),
                    )+
                }
            }

            /// Get the validity bitmap
            pub fn validity(&self) -> &Bitmap{
                match self{
                    $(
                        Self::$variant(array) => array.validity(),
                    )+
                }
            }

            /// Returns true if the element at the given index is not null. It will
            /// panic if the index out of bounds
            pub fn is_valid(&self, index: usize) -> bool {
                match self{
                    $(
                        Self::$variant(array) => array.is_valid(index),
                    )+
                }
            }

            /// Append a null to the back of the array
            pub fn push_null(&mut self) {
                match self{
                    $(
                        Self::$variant(array) => array.push_null(),
                    )+
                }
            }

            /// Shortens the array, keeping the first `len` elements
            pub fn truncate(&mut self, len: usize) {
                match self{
                    $(
                        Self::$variant(array) => array.truncate(len),
                    )+
                }
            }

            /// Number of bytes required to serialize the value at given index
            pub fn serialized_size(&self, index: usize) -> usize {
                match self{
                    $(
                        Self::$variant(array) => array.serialized_size(index),
                    )+
                }
            }

            /// Serialize the value at given index into buf, returns the number of
            /// the bytes written
            pub fn serialize_value(&self, index: usize, buf: &mut [u8]) -> usize {
                match self{
                    $(
                        Self::$variant(array) => array.serialize_value(index, buf),
                    )+
                }
            }

            /// Serialize the value at given index into the arena, see
            /// [`ArenaSerde::serialize_value_into_arena`]
            pub fn serialize_value_into_arena<'a>(
                &self,
                index: usize,
                arena: &'a Arena,
            ) -> std::result::Result<&'a [u8], ArenaError> {
                match self{
                    $(
                        Self::$variant(array) => array.serialize_value_into_arena(index, arena),
                    )+
                }
            }

            /// Parse a value from the start of the bytes and append it to the back
            /// of the array, see [`ArenaSerde::deserialize_and_insert_from_arena`]
            pub fn deserialize_and_insert_from_arena(&mut self, bytes: &[u8]) -> Result<usize> {
                match self{
                    $(
                        Self::$variant(array) => array.deserialize_and_insert_from_arena(bytes),
                    )+
                }
            }

            /// Debug the array slice
            ///
            /// `start + len <= self.len()`
            pub(crate) fn debug_array_slice(
                &self,
                f: &mut std::fmt::Formatter<'_>,
                start: usize,
                len: usize
            ) -> std::fmt::Result {
                match self{
                    $(
                        Self::$variant(array) => {
                            f.debug_list().entries((start..start + len).map(|index| array.get(index))).finish()
                        }
                    )+
                }
            }
        }

        impl CowClone for ArrayImpl {
            #[inline]
            fn cow_clone(&self) -> Self {
                self.clone()
            }

            fn mutate_children(&mut self) {
                match self{
                    $(
                        Self::$variant(array) => array.mutate_children(),
                    )+
                }
            }
        }

        $(
            impl<'a> TryFrom<&'a ArrayImpl> for &'a $array_ty {
                type Error = ArrayError;

                fn try_from(array: &'a ArrayImpl) -> Result<&'a $array_ty>{
                    if let ArrayImpl::$variant(array) = array{
                        Ok(array)
                    }else{
                        ConvertSnafu{
                            array: array.ident(),
                            target: stringify!($array_ty),
                        }.fail()
                    }
                }
            }

            impl<'a> TryFrom<&'a mut ArrayImpl> for &'a mut $array_ty {
                type Error = ArrayError;

                fn try_from(array: &'a mut ArrayImpl) -> Result<&'a mut $array_ty>{
                    if let ArrayImpl::$variant(array) = array{
                        Ok(array)
                    }else{
                        ConvertSnafu{
                            array: array.ident(),
                            target: stringify!($array_ty),
                        }.fail()
                    }
                }
            }

            impl From<$array_ty> for ArrayImpl {
                #[inline]
                fn from(array: $array_ty) -> Self {
                    Self::$variant(array)
                }
            }
        )+
    };
}

crate::macros::for_all_variants!(array_impl);

macro_rules! plain_array_impl {
    ($({$variant:ident, $element_ty:ty, $array_ty:ident}),+) => {
        impl ArrayImpl {
            /// Returns true if the array implements [`PlainArray`]
            pub fn is_plain(&self) -> bool {
                matches!(self, $(Self::$variant(_))|+)
            }

            /// View the element at the given index as bytes, see [`PlainArray::data_at`]
            pub fn data_at(&self, index: usize) -> Result<&[u8]> {
                match self {
                    $(
                        Self::$variant(array) => Ok(array.data_at(index)),
                    )+
                    #[allow(unreachable_patterns)]
                    _ => NotPlainSnafu { array: self.ident() }.fail(),
                }
            }

            /// Append the element represented by the bytes, see [`PlainArray::insert_data`]
            pub fn insert_data(&mut self, bytes: &[u8]) -> Result<()> {
                match self {
                    $(
                        Self::$variant(array) => array.insert_data(bytes),
                    )+
                    #[allow(unreachable_patterns)]
                    _ => NotPlainSnafu { array: self.ident() }.fail(),
                }
            }
        }
    };
}

crate::macros::for_all_plain_variants!(plain_array_impl);
