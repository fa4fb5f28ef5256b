//! `groupUniqArray` aggregation function, collects the unique values of the rows into
//! a list
//!
//! The function picks a path based on the physical type of the argument:
//!
//! - Primitive types: [`GroupUniqArrayNumeric`], values are stored in the state
//!
//! - `String`/`Binary`: [`GroupUniqArrayGeneric`] in plain mode, the bytes of the
//!   values are copied into the arena
//!
//! - `List`: [`GroupUniqArrayGeneric`] in general mode, the values are serialized
//!   into the arena
//!
//! Order of the values in the result is unspecified unless
//! [`GroupUniqArrayArgs::sort_result`] is set

mod generic;
mod numeric;

use std::io::{Read, Write};

use data_block::arena::Arena;
use data_block::array::ArrayImpl;
use data_block::for_all_primitive_types;
use data_block::types::{LogicalType, PhysicalType};

use super::{AggregateFunction, Result, StateMismatchSnafu};
use crate::function::{Function, Stringify};
pub use generic::{GenericState, GroupUniqArrayGeneric};
pub use numeric::{GroupUniqArrayNumeric, NumericState, UniqScalar};

/// Name of the function
const FUNC_NAME: &str = "groupUniqArray";

/// Default maximum number of the elements in a state
pub const DEFAULT_MAX_ELEMENTS: usize = 0xFF_FFFF;

/// Number of the cells stored inline in the state of the numeric path
pub const NUMERIC_INLINE_CELLS: usize = 16;

/// Number of the cells stored inline in the state of the generic path
pub const GENERIC_INLINE_CELLS: usize = 4;

/// Arguments of the `groupUniqArray`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupUniqArrayArgs {
    /// Maximum number of the elements in a state. Adding a new element into a full
    /// state fails
    pub max_elements: usize,
    /// Sort the values in the result, numbers are sorted by value and others are
    /// sorted by their bytes
    pub sort_result: bool,
}

impl Default for GroupUniqArrayArgs {
    fn default() -> Self {
        Self {
            max_elements: DEFAULT_MAX_ELEMENTS,
            sort_result: false,
        }
    }
}

macro_rules! group_uniq_array_impl {
    ($({$variant:ident, $ty:ty, $alias:ident, $lt:ident}),+) => {
        /// `groupUniqArray` with the path chosen by the argument type, enum dispatch
        #[derive(Debug)]
        pub enum GroupUniqArray {
            $(
                #[doc = concat!("Collect `", stringify!($ty), "` values")]
                $variant(GroupUniqArrayNumeric<$ty>),
            )+
            /// Collect bytes of the `String`/`Binary` values
            Plain(GroupUniqArrayGeneric<true>),
            /// Collect the serialized nested values
            General(GroupUniqArrayGeneric<false>),
        }

        /// State of the [`GroupUniqArray`], it has the same variant with the function
        /// that creates it
        #[derive(Debug)]
        pub enum GroupUniqArrayState<'a> {
            $(
                #[doc = concat!("State of `", stringify!($ty), "` values")]
                $variant(NumericState<$ty>),
            )+
            /// State of the plain mode
            Plain(GenericState<'a>),
            /// State of the general mode
            General(GenericState<'a>),
        }

        impl GroupUniqArray {
            /// Create a new [`GroupUniqArray`] with the given arguments
            pub fn with_args(arg_type: LogicalType, args: GroupUniqArrayArgs) -> Result<Self> {
                let func = match arg_type.physical_type() {
                    $(
                        PhysicalType::$variant => Self::$variant(GroupUniqArrayNumeric::new(arg_type, args)?),
                    )+
                    PhysicalType::String | PhysicalType::Binary => {
                        Self::Plain(GroupUniqArrayGeneric::new(arg_type, args)?)
                    }
                    PhysicalType::List => Self::General(GroupUniqArrayGeneric::new(arg_type, args)?),
                };

                tracing::debug!(
                    "Create `{}` for `{:?}`, use the `{}` path",
                    FUNC_NAME,
                    func.arguments()[0],
                    func.ident()
                );
                Ok(func)
            }

            /// Get ident of the path
            pub fn ident(&self) -> &'static str {
                match self {
                    $(
                        Self::$variant(_) => stringify!($variant),
                    )+
                    Self::Plain(_) => "Plain",
                    Self::General(_) => "General",
                }
            }
        }

        impl GroupUniqArrayState<'_> {
            /// Number of the unique values in the state
            pub fn len(&self) -> usize {
                match self {
                    $(
                        Self::$variant(state) => state.len(),
                    )+
                    Self::Plain(state) | Self::General(state) => state.len(),
                }
            }

            /// Returns true if the state does not contain any value
            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Get ident of the state
            pub fn ident(&self) -> &'static str {
                match self {
                    $(
                        Self::$variant(_) => stringify!($variant),
                    )+
                    Self::Plain(_) => "Plain",
                    Self::General(_) => "General",
                }
            }
        }

        impl Stringify for GroupUniqArray {
            fn name(&self) -> &'static str {
                FUNC_NAME
            }

            fn debug(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:?}", self)
            }

            fn display(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        Self::$variant(func) => func.display(f),
                    )+
                    Self::Plain(func) => func.display(f),
                    Self::General(func) => func.display(f),
                }
            }
        }

        impl Function for GroupUniqArray {
            fn arguments(&self) -> &[LogicalType] {
                match self {
                    $(
                        Self::$variant(func) => func.arguments(),
                    )+
                    Self::Plain(func) => func.arguments(),
                    Self::General(func) => func.arguments(),
                }
            }

            fn return_type(&self) -> LogicalType {
                LogicalType::list(self.arguments()[0].clone())
            }
        }

        impl AggregateFunction for GroupUniqArray {
            type State<'a> = GroupUniqArrayState<'a>;

            fn create_state<'a>(&self) -> Self::State<'a> {
                match self {
                    $(
                        Self::$variant(func) => GroupUniqArrayState::$variant(func.create_state()),
                    )+
                    Self::Plain(func) => GroupUniqArrayState::Plain(func.create_state()),
                    Self::General(func) => GroupUniqArrayState::General(func.create_state()),
                }
            }

            fn add<'a>(
                &self,
                state: &mut Self::State<'a>,
                column: &ArrayImpl,
                row: usize,
                arena: Option<&'a Arena>,
            ) -> Result<()> {
                match (self, state) {
                    $(
                        (Self::$variant(func), GroupUniqArrayState::$variant(state)) => {
                            func.add(state, column, row, arena)
                        }
                    )+
                    (Self::Plain(func), GroupUniqArrayState::Plain(state)) => {
                        func.add(state, column, row, arena)
                    }
                    (Self::General(func), GroupUniqArrayState::General(state)) => {
                        func.add(state, column, row, arena)
                    }
                    (func, state) => state_mismatch(func, state),
                }
            }

            fn merge<'a>(
                &self,
                state: &mut Self::State<'a>,
                rhs: &Self::State<'_>,
                arena: Option<&'a Arena>,
            ) -> Result<()> {
                match (self, state, rhs) {
                    $(
                        (
                            Self::$variant(func),
                            GroupUniqArrayState::$variant(state),
                            GroupUniqArrayState::$variant(rhs),
                        ) => func.merge(state, rhs, arena),
                    )+
                    (Self::Plain(func), GroupUniqArrayState::Plain(state), GroupUniqArrayState::Plain(rhs)) => {
                        func.merge(state, rhs, arena)
                    }
                    (
                        Self::General(func),
                        GroupUniqArrayState::General(state),
                        GroupUniqArrayState::General(rhs),
                    ) => func.merge(state, rhs, arena),
                    (func, state, rhs) => {
                        if state.ident() == func.ident() {
                            state_mismatch(func, rhs)
                        } else {
                            state_mismatch(func, state)
                        }
                    }
                }
            }

            fn serialize<W: Write>(&self, state: &Self::State<'_>, writer: &mut W) -> Result<()> {
                match (self, state) {
                    $(
                        (Self::$variant(func), GroupUniqArrayState::$variant(state)) => {
                            func.serialize(state, writer)
                        }
                    )+
                    (Self::Plain(func), GroupUniqArrayState::Plain(state)) => func.serialize(state, writer),
                    (Self::General(func), GroupUniqArrayState::General(state)) => {
                        func.serialize(state, writer)
                    }
                    (func, state) => state_mismatch(func, state),
                }
            }

            fn deserialize<'a, R: Read>(
                &self,
                state: &mut Self::State<'a>,
                reader: &mut R,
                arena: Option<&'a Arena>,
            ) -> Result<()> {
                match (self, state) {
                    $(
                        (Self::$variant(func), GroupUniqArrayState::$variant(state)) => {
                            func.deserialize(state, reader, arena)
                        }
                    )+
                    (Self::Plain(func), GroupUniqArrayState::Plain(state)) => {
                        func.deserialize(state, reader, arena)
                    }
                    (Self::General(func), GroupUniqArrayState::General(state)) => {
                        func.deserialize(state, reader, arena)
                    }
                    (func, state) => state_mismatch(func, state),
                }
            }

            fn insert_result_into(&self, state: &Self::State<'_>, output: &mut ArrayImpl) -> Result<()> {
                match (self, state) {
                    $(
                        (Self::$variant(func), GroupUniqArrayState::$variant(state)) => {
                            func.insert_result_into(state, output)
                        }
                    )+
                    (Self::Plain(func), GroupUniqArrayState::Plain(state)) => {
                        func.insert_result_into(state, output)
                    }
                    (Self::General(func), GroupUniqArrayState::General(state)) => {
                        func.insert_result_into(state, output)
                    }
                    (func, state) => state_mismatch(func, state),
                }
            }

            fn allocates_memory_in_arena(&self) -> bool {
                matches!(self, Self::Plain(_) | Self::General(_))
            }
        }
    };
}

for_all_primitive_types!(group_uniq_array_impl);

impl GroupUniqArray {
    /// Create a new [`GroupUniqArray`] with default arguments
    pub fn try_new(arg_type: LogicalType) -> Result<Self> {
        Self::with_args(arg_type, GroupUniqArrayArgs::default())
    }
}

impl std::fmt::Display for GroupUniqArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.display(f)
    }
}

#[cold]
fn state_mismatch(func: &GroupUniqArray, state: &GroupUniqArrayState<'_>) -> Result<()> {
    StateMismatchSnafu {
        func: FUNC_NAME,
        expect: func.ident(),
        actual: state.ident(),
    }
    .fail()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregationError;
    use data_block::array::{Array, Float64Array, Int64Array, ListArray, StringArray};
    use expect_test::expect;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn add_column<'a>(
        func: &GroupUniqArray,
        state: &mut GroupUniqArrayState<'a>,
        column: &ArrayImpl,
        arena: &'a Arena,
    ) {
        (0..column.len()).for_each(|row| func.add(state, column, row, Some(arena)).unwrap());
    }

    fn sorted_result(func: &GroupUniqArray, state: &GroupUniqArrayState<'_>) -> String {
        let mut output = ArrayImpl::new(func.return_type());
        func.insert_result_into(state, &mut output).unwrap();
        let list: &ListArray = (&output).try_into().unwrap();
        let elements = list.elements();
        let mut values = (0..elements.len())
            .map(|index| {
                let mut buf = vec![0; elements.serialized_size(index)];
                elements.serialize_value(index, &mut buf);
                buf
            })
            .collect::<Vec<_>>();
        values.sort_unstable();
        format!("{:?}", values)
    }

    #[test]
    fn test_choose_path() {
        let func = GroupUniqArray::try_new(LogicalType::Timestamp(
            data_block::types::TimeUnit::Millisecond,
        ))
        .unwrap();
        assert_eq!(func.ident(), "Int64");
        assert!(!func.allocates_memory_in_arena());

        let func = GroupUniqArray::try_new(LogicalType::VarChar).unwrap();
        assert_eq!(func.ident(), "Plain");
        assert!(func.allocates_memory_in_arena());
        expect!["fn groupUniqArray(VarChar) -> List { element_type: VarChar, is_nullable: false }"]
            .assert_eq(&func.to_string());

        let func = GroupUniqArray::try_new(LogicalType::list(LogicalType::Integer)).unwrap();
        assert_eq!(func.ident(), "General");
        assert_eq!(
            func.return_type(),
            LogicalType::list(LogicalType::list(LogicalType::Integer))
        );
    }

    #[test]
    fn test_scenario_add_duplicates() {
        let func = GroupUniqArray::try_new(LogicalType::BigInt).unwrap();
        let column = ArrayImpl::from(Int64Array::from_values_iter([5, 3, 5, 1, 3]));
        let mut state = func.create_state();
        (0..column.len()).for_each(|row| func.add(&mut state, &column, row, None).unwrap());
        assert_eq!(state.len(), 3);

        let mut output = ArrayImpl::new(func.return_type());
        func.insert_result_into(&state, &mut output).unwrap();
        let list: &ListArray = (&output).try_into().unwrap();
        assert_eq!(list.len(), 1);
        let elements: &Int64Array = list.elements().try_into().unwrap();
        let mut values = elements.values().to_vec();
        values.sort_unstable();
        assert_eq!(values, [1, 3, 5]);
    }

    #[test]
    fn test_scenario_empty_state_round_trip() {
        for arg_type in [LogicalType::Integer, LogicalType::VarChar] {
            let func = GroupUniqArray::try_new(arg_type).unwrap();
            let arena = Arena::new();
            let state = func.create_state();
            let mut buf = Vec::new();
            func.serialize(&state, &mut buf).unwrap();
            assert_eq!(buf, [0]);

            let mut decoded = func.create_state();
            func.deserialize(&mut decoded, &mut buf.as_slice(), Some(&arena))
                .unwrap();
            assert_eq!(decoded.len(), 0);
        }
    }

    #[test]
    fn test_scenario_merge_strings() {
        let func = GroupUniqArray::try_new(LogicalType::VarChar).unwrap();
        let arena = Arena::new();
        let partial_arena = Arena::new();
        let mut state = func.create_state();
        let mut partial = func.create_state();
        add_column(
            &func,
            &mut state,
            &ArrayImpl::from(StringArray::from_iter([Some("a"), Some("b")])),
            &arena,
        );
        add_column(
            &func,
            &mut partial,
            &ArrayImpl::from(StringArray::from_iter([Some("b"), Some("c")])),
            &partial_arena,
        );

        func.merge(&mut state, &partial, Some(&arena)).unwrap();
        assert_eq!(state.len(), 3);
        assert_eq!(arena.used_bytes(), 3);

        let mut output = ArrayImpl::new(func.return_type());
        func.insert_result_into(&state, &mut output).unwrap();
        let list: &ListArray = (&output).try_into().unwrap();
        let elements: &StringArray = list.elements().try_into().unwrap();
        let mut values = elements.iter().flatten().collect::<Vec<_>>();
        values.sort_unstable();
        assert_eq!(values, ["a", "b", "c"]);
    }

    #[test]
    fn test_state_mismatch() {
        let int_func = GroupUniqArray::try_new(LogicalType::Integer).unwrap();
        let string_func = GroupUniqArray::try_new(LogicalType::VarChar).unwrap();
        let mut state = string_func.create_state();
        let column = ArrayImpl::from(StringArray::from_iter([Some("a")]));
        let err = int_func.add(&mut state, &column, 0, None).unwrap_err();
        expect!["`groupUniqArray` aggregation function is `Int32`, it can not accept the state `Plain`"]
            .assert_eq(&err.to_string());

        let rhs = int_func.create_state();
        let err = string_func.merge(&mut state, &rhs, None).unwrap_err();
        assert!(matches!(
            err,
            AggregationError::StateMismatch {
                actual: "Int32",
                ..
            }
        ));
    }

    fn random_strings(rng: &mut StdRng, len: usize) -> ArrayImpl {
        ArrayImpl::from(
            (0..len)
                .map(|_| {
                    if rng.gen_bool(0.1) {
                        None
                    } else {
                        Some(format!("value-{}", rng.gen_range(0..64)))
                    }
                })
                .collect::<StringArray>(),
        )
    }

    #[test]
    fn test_merge_is_commutative_and_associative() {
        let mut rng = StdRng::seed_from_u64(97);
        let func = GroupUniqArray::try_new(LogicalType::VarChar).unwrap();
        let columns = (0..3)
            .map(|_| random_strings(&mut rng, 100))
            .collect::<Vec<_>>();

        let arena = Arena::new();
        let partials = columns
            .iter()
            .map(|column| {
                let mut state = func.create_state();
                add_column(&func, &mut state, column, &arena);
                state
            })
            .collect::<Vec<_>>();

        let merge_in_order = |order: [usize; 3]| {
            let mut state = func.create_state();
            order
                .iter()
                .for_each(|&index| func.merge(&mut state, &partials[index], Some(&arena)).unwrap());
            sorted_result(&func, &state)
        };

        // (a + b) + c
        let mut ab = func.create_state();
        func.merge(&mut ab, &partials[0], Some(&arena)).unwrap();
        func.merge(&mut ab, &partials[1], Some(&arena)).unwrap();
        func.merge(&mut ab, &partials[2], Some(&arena)).unwrap();
        // a + (b + c)
        let mut bc = func.create_state();
        func.merge(&mut bc, &partials[1], Some(&arena)).unwrap();
        func.merge(&mut bc, &partials[2], Some(&arena)).unwrap();
        let mut a_bc = func.create_state();
        func.merge(&mut a_bc, &partials[0], Some(&arena)).unwrap();
        func.merge(&mut a_bc, &bc, Some(&arena)).unwrap();

        let expected = sorted_result(&func, &ab);
        assert_eq!(sorted_result(&func, &a_bc), expected);
        assert_eq!(merge_in_order([2, 1, 0]), expected);
        assert_eq!(merge_in_order([1, 0, 2]), expected);

        // Union of all of the rows
        let mut all = func.create_state();
        columns
            .iter()
            .for_each(|column| add_column(&func, &mut all, column, &arena));
        assert_eq!(sorted_result(&func, &all), expected);
    }

    fn random_numeric_column(rng: &mut StdRng, logical_type: &LogicalType, len: usize) -> ArrayImpl {
        // 40 candidates, partial states cross the inline cells and the union of them
        // still fits in the limit of the states below
        const FLOATS: [f64; 4] = [0.0, -0.0, f64::NAN, -f64::NAN];
        match logical_type {
            LogicalType::BigInt => ArrayImpl::from(Int64Array::from_values_iter(
                (0..len).map(|_| rng.gen_range(-20_i64..20)),
            )),
            _ => ArrayImpl::from(Float64Array::from_values_iter((0..len).map(|_| {
                let index = rng.gen_range(0..40_usize);
                FLOATS.get(index).copied().unwrap_or(index as f64 * 0.5)
            }))),
        }
    }

    #[test]
    fn test_numeric_merge_is_commutative_and_associative() {
        let mut rng = StdRng::seed_from_u64(42);
        for logical_type in [LogicalType::BigInt, LogicalType::Double] {
            for max_elements in [DEFAULT_MAX_ELEMENTS, 40] {
                let func = GroupUniqArray::with_args(
                    logical_type.clone(),
                    GroupUniqArrayArgs {
                        max_elements,
                        sort_result: false,
                    },
                )
                .unwrap();
                let columns = (0..3)
                    .map(|_| random_numeric_column(&mut rng, &logical_type, 64))
                    .collect::<Vec<_>>();
                let partials = columns
                    .iter()
                    .map(|column| {
                        let mut state = func.create_state();
                        (0..column.len())
                            .for_each(|row| func.add(&mut state, column, row, None).unwrap());
                        assert!(state.len() > NUMERIC_INLINE_CELLS);
                        state
                    })
                    .collect::<Vec<_>>();

                let merge_in_order = |order: [usize; 3]| {
                    let mut state = func.create_state();
                    order
                        .iter()
                        .for_each(|&index| func.merge(&mut state, &partials[index], None).unwrap());
                    state
                };

                // (a + b) + c
                let abc = merge_in_order([0, 1, 2]);
                // a + (b + c)
                let mut bc = func.create_state();
                func.merge(&mut bc, &partials[1], None).unwrap();
                func.merge(&mut bc, &partials[2], None).unwrap();
                let mut a_bc = func.create_state();
                func.merge(&mut a_bc, &partials[0], None).unwrap();
                func.merge(&mut a_bc, &bc, None).unwrap();

                let expected = sorted_result(&func, &abc);
                assert_eq!(sorted_result(&func, &a_bc), expected);
                assert_eq!(sorted_result(&func, &merge_in_order([2, 1, 0])), expected);
                assert_eq!(sorted_result(&func, &merge_in_order([1, 0, 2])), expected);

                // Uniqueness: the result equals the distinct values of all of the rows
                let mut all = func.create_state();
                columns.iter().for_each(|column| {
                    (0..column.len()).for_each(|row| func.add(&mut all, column, row, None).unwrap())
                });
                assert_eq!(all.len(), abc.len());
                assert_eq!(sorted_result(&func, &all), expected);

                let mut output = ArrayImpl::new(func.return_type());
                func.insert_result_into(&abc, &mut output).unwrap();
                let list: &ListArray = (&output).try_into().unwrap();
                let elements = list.elements();
                let mut values = (0..elements.len())
                    .map(|index| {
                        let mut buf = vec![0; elements.serialized_size(index)];
                        elements.serialize_value(index, &mut buf);
                        buf
                    })
                    .collect::<Vec<_>>();
                values.sort_unstable();
                values.dedup();
                assert_eq!(values.len(), abc.len());
            }
        }
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut rng = StdRng::seed_from_u64(7);
        let func = GroupUniqArray::try_new(LogicalType::list(LogicalType::VarChar)).unwrap();

        let mut lists = ListArray::new(func.arguments()[0].clone()).unwrap();
        for _ in 0..200 {
            let len = rng.gen_range(0..3);
            let values = (0..len)
                .map(|_| format!("{}", rng.gen_range(0..4)))
                .collect::<Vec<_>>();
            lists
                .push_list_with(|elements| -> std::result::Result<(), data_block::array::ArrayError> {
                    let elements: &mut StringArray = elements.try_into()?;
                    values.iter().for_each(|value| elements.push(value));
                    Ok(())
                })
                .unwrap();
        }
        let column = ArrayImpl::from(lists);

        let arena = Arena::new();
        let decoded_arena = Arena::new();
        let mut state = func.create_state();
        add_column(&func, &mut state, &column, &arena);

        let mut buf = Vec::new();
        func.serialize(&state, &mut buf).unwrap();
        let mut decoded = func.create_state();
        func.deserialize(&mut decoded, &mut buf.as_slice(), Some(&decoded_arena))
            .unwrap();

        assert_eq!(decoded.len(), state.len());
        assert_eq!(decoded_arena.used_bytes(), arena.used_bytes());
        assert_eq!(sorted_result(&func, &decoded), sorted_result(&func, &state));
    }
}
