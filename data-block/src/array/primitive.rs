//! [`PrimitiveArray`] that stores fixed byte-width data

use super::{
    Array, ArenaSerde, InvalidLogicalTypeSnafu, PlainArray, Result, TruncatedSnafu,
    WidthMismatchSnafu,
};
use snafu::ensure;
use std::fmt::Debug;
use std::mem::size_of;

use crate::aligned_vec::{AlignedVec, AllocType};
use crate::bitmap::Bitmap;
use crate::cow::{CowClone, Exclusive, Shared};
use crate::for_all_primitive_types;
use crate::private::Sealed;
use crate::types::{LogicalType, PhysicalType};

/// Trait for types that can be placed on the [`PrimitiveArray`]
pub trait PrimitiveType: AllocType + PartialEq + PartialOrd {
    /// Physical type of the array that stores this type
    const PHYSICAL_TYPE: PhysicalType;
    /// Default logical type of this primitive type
    const LOGICAL_TYPE: LogicalType;
    /// Name of the type
    const NAME: &'static str;
    /// Number of bytes of the type
    const WIDTH: usize = size_of::<Self>();

    /// Write the little-endian bytes of self to the start of the buf
    fn write_le(self, buf: &mut [u8]);

    /// Read self from the little-endian bytes at the start of the buf. Caller should
    /// guarantee `buf.len() >= Self::WIDTH`
    fn read_le(buf: &[u8]) -> Self;
}

macro_rules! impl_primitive_type {
    ($({$pt_variant:ident, $primitive_element_ty:ty, $alias:ident, $lt:ident}),*) => {
        $(
            impl PrimitiveType for $primitive_element_ty {
                const PHYSICAL_TYPE: PhysicalType = PhysicalType::$pt_variant;
                const LOGICAL_TYPE: LogicalType = LogicalType::$lt;
                const NAME: &'static str = stringify!($pt_variant);

                #[inline]
                fn write_le(self, buf: &mut [u8]) {
                    buf[..size_of::<$primitive_element_ty>()].copy_from_slice(&self.to_le_bytes())
                }

                #[inline]
                fn read_le(buf: &[u8]) -> Self {
                    let mut bytes = [0; size_of::<$primitive_element_ty>()];
                    bytes.copy_from_slice(&buf[..size_of::<$primitive_element_ty>()]);
                    <$primitive_element_ty>::from_le_bytes(bytes)
                }
            }
        )*
    };
}

for_all_primitive_types!(impl_primitive_type);

/// [`PrimitiveArray`] that stores fixed byte-width data, such as `i32` or `f64`
#[derive(Clone)]
pub struct PrimitiveArray<T: PrimitiveType> {
    logical_type: LogicalType,
    data: Shared<AlignedVec<T>>,
    validity: Shared<Bitmap>,
}

impl<T: PrimitiveType> PrimitiveArray<T> {
    /// Create a new empty [`PrimitiveArray`]
    #[inline]
    pub fn new(logical_type: LogicalType) -> Result<Self> {
        Self::with_capacity(logical_type, 0)
    }

    /// Create a new empty [`PrimitiveArray`] without check
    ///
    /// # Safety
    ///
    /// physical type of the logical type should be `T::PHYSICAL_TYPE`
    #[inline]
    pub unsafe fn new_unchecked(logical_type: LogicalType) -> Self {
        unsafe { Self::with_capacity_unchecked(logical_type, 0) }
    }

    /// Create a new empty [`PrimitiveArray`] with given capacity
    #[inline]
    pub fn with_capacity(logical_type: LogicalType, capacity: usize) -> Result<Self> {
        ensure!(
            logical_type.physical_type() == T::PHYSICAL_TYPE,
            InvalidLogicalTypeSnafu {
                array_name: format!("{}Array", T::NAME),
                array_physical_type: T::PHYSICAL_TYPE,
                logical_type,
            }
        );
        // SAFETY: we check the physical type above
        unsafe { Ok(Self::with_capacity_unchecked(logical_type, capacity)) }
    }

    /// Create a new empty [`PrimitiveArray`] with given capacity without check
    ///
    /// # Safety
    ///
    /// physical type of the logical type should be `T::PHYSICAL_TYPE`
    #[inline]
    pub unsafe fn with_capacity_unchecked(logical_type: LogicalType, capacity: usize) -> Self {
        Self {
            logical_type,
            data: Shared::from(Exclusive::create(AlignedVec::with_capacity(
                capacity,
            ))),
            validity: Shared::default(),
        }
    }

    /// Get the values of the array
    #[inline]
    pub fn values(&self) -> &[T] {
        self.data.as_slice()
    }

    /// Construct [`Self`] from iterator of values
    pub fn from_values_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            logical_type: T::LOGICAL_TYPE,
            data: Shared::from(Exclusive::create(
                iter.into_iter().collect::<AlignedVec<T>>(),
            )),
            validity: Shared::default(),
        }
    }

    /// Append a value to the back of the array
    #[inline]
    pub fn push(&mut self, value: T) {
        Shared::make_mut(&mut self.data).push(value);
        if !self.validity.is_empty() {
            Shared::make_mut(&mut self.validity).push(true);
        }
    }

    /// Append the values to the back of the array
    pub fn extend_from_slice(&mut self, values: &[T]) {
        Shared::make_mut(&mut self.data).extend_from_slice(values);
        if !self.validity.is_empty() {
            let validity = Shared::make_mut(&mut self.validity);
            values.iter().for_each(|_| validity.push(true));
        }
    }
}

macro_rules! alias {
    ($({$_:ident, $ty:ty, $alias:ident, $lt:ident}),*) => {
        $(
            #[doc = concat!("A [`PrimitiveArray`] of [`", stringify!($ty), "`]")]
            pub type $alias = PrimitiveArray<$ty>;
        )*
    };
}

for_all_primitive_types!(alias);

impl<T: PrimitiveType> Debug for PrimitiveArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Array {{ logical_type: {:?}, len: {}, data: ",
            T::NAME,
            self.logical_type,
            self.len()
        )?;
        f.debug_list().entries(self.iter()).finish()?;
        write!(f, " }}")
    }
}

impl<T: PrimitiveType> Sealed for PrimitiveArray<T> {}

impl<T: PrimitiveType> CowClone for PrimitiveArray<T> {
    #[inline]
    fn cow_clone(&self) -> Self {
        self.clone()
    }

    #[inline]
    fn mutate_children(&mut self) {
        Shared::make_mut(&mut self.data);
        Shared::make_mut(&mut self.validity);
    }
}

impl<T: PrimitiveType> Array for PrimitiveArray<T> {
    const PHYSICAL_TYPE: PhysicalType = T::PHYSICAL_TYPE;

    type ElementRef<'a>
        = T
    where
        Self: 'a;

    #[inline]
    fn validity(&self) -> &Bitmap {
        &self.validity
    }

    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn logical_type(&self) -> &LogicalType {
        &self.logical_type
    }

    #[inline]
    unsafe fn get_value_unchecked(&self, index: usize) -> T {
        unsafe { *self.data.get_unchecked(index) }
    }

    fn push_null(&mut self) {
        let len = self.len();
        let validity = Shared::make_mut(&mut self.validity);
        if validity.is_empty() {
            *validity = Bitmap::from_elem(true, len);
        }
        validity.push(false);
        Shared::make_mut(&mut self.data).push(T::default());
    }

    fn truncate(&mut self, len: usize) {
        if len >= self.len() {
            return;
        }
        Shared::make_mut(&mut self.data).truncate(len);
        if !self.validity.is_empty() {
            Shared::make_mut(&mut self.validity).truncate(len);
        }
    }
}

impl<T: PrimitiveType> PlainArray for PrimitiveArray<T> {
    #[inline]
    fn data_at(&self, index: usize) -> &[u8] {
        let value = &self.values()[index];
        // SAFETY: the value is a plain old data that has `T::WIDTH` bytes
        unsafe { std::slice::from_raw_parts(value as *const T as *const u8, T::WIDTH) }
    }

    fn insert_data(&mut self, bytes: &[u8]) -> Result<()> {
        ensure!(
            bytes.len() == T::WIDTH,
            WidthMismatchSnafu {
                array: T::NAME,
                expected: T::WIDTH,
                actual: bytes.len(),
            }
        );
        // SAFETY: length is checked above and all of the bit patterns are valid for
        // primitive types
        let value = unsafe { (bytes.as_ptr() as *const T).read_unaligned() };
        self.push(value);
        Ok(())
    }
}

impl<T: PrimitiveType> ArenaSerde for PrimitiveArray<T> {
    #[inline]
    fn serialized_size(&self, _index: usize) -> usize {
        T::WIDTH
    }

    #[inline]
    fn serialize_value(&self, index: usize, buf: &mut [u8]) -> usize {
        self.values()[index].write_le(buf);
        T::WIDTH
    }

    fn deserialize_and_insert_from_arena(&mut self, bytes: &[u8]) -> Result<usize> {
        ensure!(
            bytes.len() >= T::WIDTH,
            TruncatedSnafu {
                array: T::NAME,
                expected: T::WIDTH,
                remaining: bytes.len(),
            }
        );
        self.push(T::read_le(bytes));
        Ok(T::WIDTH)
    }
}
