//! Numeric path of the `groupUniqArray`, values are stored in the hash set directly

use std::cmp::Ordering;
use std::fmt::Debug;
use std::hash::Hash;
use std::io::{Read, Write};
use std::marker::PhantomData;

use data_block::arena::Arena;
use data_block::array::{Array, ArrayError, ArrayImpl, ListArray, PrimitiveArray};
use data_block::types::{LogicalType, PrimitiveType};
use snafu::{ResultExt, ensure};

use super::{FUNC_NAME, GroupUniqArrayArgs, NUMERIC_INLINE_CELLS};
use crate::aggregate::hash_set::{ScalarCell, UniqCell, UniqHashSet};
use crate::aggregate::{
    AggregateFunction, ArgTypeMismatchSnafu, DecodeSnafu, EncodeSnafu, InsertResultSnafu, Result,
    TooManyElementsSnafu,
};
use crate::function::{Function, Stringify};
use crate::io::{read_binary, read_var_uint, write_binary, write_var_uint};
use crate::private::Sealed;

/// Primitive types collected by [`GroupUniqArrayNumeric`]
pub trait UniqScalar: PrimitiveType + Sealed {
    /// Key of the value in the hash set. Values are equal if and only if their keys
    /// are equal
    type Key: Debug + Copy + Default + Eq + Hash + Send + Sync + 'static;

    /// Convert the value into key
    fn to_key(self) -> Self::Key;

    /// Convert the key back to value
    fn from_key(key: Self::Key) -> Self;

    /// Total order of the values, used to sort the result
    fn cmp_value(&self, other: &Self) -> Ordering;
}

macro_rules! impl_uniq_scalar_for_int {
    ($($ty:ty),+) => {
        $(
            impl Sealed for $ty {}

            impl UniqScalar for $ty {
                type Key = $ty;

                #[inline]
                fn to_key(self) -> Self::Key {
                    self
                }

                #[inline]
                fn from_key(key: Self::Key) -> Self {
                    key
                }

                #[inline]
                fn cmp_value(&self, other: &Self) -> Ordering {
                    self.cmp(other)
                }
            }
        )+
    };
}

impl_uniq_scalar_for_int!(i8, u8, i16, u16, i32, u32, i64, u64, i128);

macro_rules! impl_uniq_scalar_for_float {
    ($({$ty:ty, $key:ty}),+) => {
        $(
            impl Sealed for $ty {}

            /// Float is keyed by its bits, `-0.0` and every `NaN` payload are kept
            /// as they are
            impl UniqScalar for $ty {
                type Key = $key;

                #[inline]
                fn to_key(self) -> Self::Key {
                    self.to_bits()
                }

                #[inline]
                fn from_key(key: Self::Key) -> Self {
                    <$ty>::from_bits(key)
                }

                #[inline]
                fn cmp_value(&self, other: &Self) -> Ordering {
                    self.total_cmp(other)
                }
            }
        )+
    };
}

impl_uniq_scalar_for_float!({f32, u32}, {f64, u64});

/// State of the [`GroupUniqArrayNumeric`]
pub type NumericState<T> = UniqHashSet<ScalarCell<<T as UniqScalar>::Key>, NUMERIC_INLINE_CELLS>;

/// `groupUniqArray` of the primitive types. Values are stored in the state directly,
/// it never allocates memory in the arena
pub struct GroupUniqArrayNumeric<T> {
    args: Vec<LogicalType>,
    max_elements: usize,
    sort_result: bool,
    _phantom: PhantomData<T>,
}

impl<T: UniqScalar> GroupUniqArrayNumeric<T> {
    /// Create a new [`GroupUniqArrayNumeric`]. Physical type of the `arg_type` should
    /// be the physical type of `T`
    pub fn new(arg_type: LogicalType, args: GroupUniqArrayArgs) -> Result<Self> {
        ensure!(
            arg_type.physical_type() == T::PHYSICAL_TYPE,
            ArgTypeMismatchSnafu {
                func: FUNC_NAME,
                expect_physical_type: T::PHYSICAL_TYPE,
                arg_type,
            }
        );

        Ok(Self {
            args: vec![arg_type],
            max_elements: args.max_elements,
            sort_result: args.sort_result,
            _phantom: PhantomData,
        })
    }

    #[inline]
    fn insert_cell(&self, state: &mut NumericState<T>, cell: ScalarCell<T::Key>) -> Result<()> {
        let len = state.len();
        state.insert_with(
            cell.hash_value(),
            |stored| *stored == cell,
            || -> Result<_> {
                ensure!(
                    len < self.max_elements,
                    TooManyElementsSnafu {
                        func: FUNC_NAME,
                        max_elements: self.max_elements
                    }
                );
                Ok(cell)
            },
        )?;
        Ok(())
    }
}

impl<T> Debug for GroupUniqArrayNumeric<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(FUNC_NAME)
            .field("args", &self.args)
            .field("max_elements", &self.max_elements)
            .field("sort_result", &self.sort_result)
            .finish()
    }
}

impl<T: UniqScalar> Stringify for GroupUniqArrayNumeric<T> {
    fn name(&self) -> &'static str {
        FUNC_NAME
    }

    fn debug(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }

    fn display(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "fn {}({:?}) -> {:?}",
            self.name(),
            self.args[0],
            self.return_type()
        )
    }
}

impl<T: UniqScalar> Function for GroupUniqArrayNumeric<T> {
    fn arguments(&self) -> &[LogicalType] {
        &self.args
    }

    fn return_type(&self) -> LogicalType {
        LogicalType::list(self.args[0].clone())
    }
}

impl<T> AggregateFunction for GroupUniqArrayNumeric<T>
where
    T: UniqScalar,
    for<'a> &'a PrimitiveArray<T>: TryFrom<&'a ArrayImpl, Error = ArrayError>,
    for<'a> &'a mut PrimitiveArray<T>: TryFrom<&'a mut ArrayImpl, Error = ArrayError>,
{
    type State<'a> = NumericState<T>;

    #[inline]
    fn create_state<'a>(&self) -> Self::State<'a> {
        NumericState::<T>::new()
    }

    fn add<'a>(
        &self,
        state: &mut Self::State<'a>,
        column: &ArrayImpl,
        row: usize,
        _arena: Option<&'a Arena>,
    ) -> Result<()> {
        let array: &PrimitiveArray<T> = column.try_into().map_err(|_| {
            ArgTypeMismatchSnafu {
                func: FUNC_NAME,
                expect_physical_type: T::PHYSICAL_TYPE,
                arg_type: column.logical_type().clone(),
            }
            .build()
        })?;

        match array.get(row) {
            Some(value) => self.insert_cell(state, ScalarCell(value.to_key())),
            None => Ok(()),
        }
    }

    fn merge<'a>(
        &self,
        state: &mut Self::State<'a>,
        rhs: &Self::State<'_>,
        _arena: Option<&'a Arena>,
    ) -> Result<()> {
        if state.len() + rhs.len() <= self.max_elements {
            state.merge(rhs);
            Ok(())
        } else {
            rhs.iter()
                .try_for_each(|&cell| self.insert_cell(state, cell))
        }
    }

    fn serialize<W: Write>(&self, state: &Self::State<'_>, writer: &mut W) -> Result<()> {
        write_var_uint(state.len() as u64, writer).context(EncodeSnafu { func: FUNC_NAME })?;
        state.iter().try_for_each(|cell| {
            write_binary(T::from_key(cell.0), writer).context(EncodeSnafu { func: FUNC_NAME })
        })
    }

    fn deserialize<'a, R: Read>(
        &self,
        state: &mut Self::State<'a>,
        reader: &mut R,
        _arena: Option<&'a Arena>,
    ) -> Result<()> {
        *state = self.create_state();
        let count = read_var_uint(reader).context(DecodeSnafu { func: FUNC_NAME })?;
        ensure!(
            count <= self.max_elements as u64,
            TooManyElementsSnafu {
                func: FUNC_NAME,
                max_elements: self.max_elements
            }
        );
        tracing::debug!(
            "Deserialize `{}` state of `{:?}` with {} elements",
            FUNC_NAME,
            self.args[0],
            count
        );

        for _ in 0..count {
            let value =
                read_binary::<T, _>(reader).context(DecodeSnafu { func: FUNC_NAME })?;
            self.insert_cell(state, ScalarCell(value.to_key()))?;
        }
        Ok(())
    }

    fn insert_result_into(&self, state: &Self::State<'_>, output: &mut ArrayImpl) -> Result<()> {
        let list: &mut ListArray = output
            .try_into()
            .context(InsertResultSnafu { func: FUNC_NAME })?;

        let mut values = state
            .iter()
            .map(|cell| T::from_key(cell.0))
            .collect::<Vec<_>>();
        if self.sort_result {
            values.sort_unstable_by(T::cmp_value);
        }

        list.push_list_with(|elements| -> std::result::Result<(), ArrayError> {
            let elements: &mut PrimitiveArray<T> = elements.try_into()?;
            elements.extend_from_slice(&values);
            Ok(())
        })
        .context(InsertResultSnafu { func: FUNC_NAME })
    }

    #[inline]
    fn allocates_memory_in_arena(&self) -> bool {
        false
    }
}
