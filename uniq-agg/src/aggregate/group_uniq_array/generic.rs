//! Generic path of the `groupUniqArray`, values are stored in the arena as bytes
//! and the hash set references them
//!
//! - Plain mode: the bytes of the value are viewed directly from the column and
//!   copied into the arena only when the value is new
//!
//! - General mode: the value is serialized into the arena first. If the value is a
//!   duplicate, the allocation is rolled back immediately, no other allocation can
//!   happen in between

use std::fmt::Debug;
use std::io::{Read, Write};

use data_block::arena::Arena;
use data_block::array::{ArrayError, ArrayImpl, ListArray};
use data_block::types::{LogicalType, PhysicalType};
use snafu::{OptionExt, ResultExt, ensure};

use super::{FUNC_NAME, GENERIC_INLINE_CELLS, GroupUniqArrayArgs};
use crate::aggregate::hash_set::{SavedHashCell, UniqCell, UniqHashSet};
use crate::aggregate::{
    AggregateFunction, ArenaRequiredSnafu, ArgTypeMismatchSnafu, DecodeSnafu, EncodeSnafu,
    InsertResultSnafu, OutOfMemorySnafu, Result, TooManyElementsSnafu,
};
use crate::common::types::HashValue;
use crate::common::utils::hash::hash_bytes;
use crate::function::{Function, Stringify};
use crate::io::{read_string_binary_into, read_var_uint, write_string_binary, write_var_uint};

/// State of the [`GroupUniqArrayGeneric`], cells reference the bytes in the arena
/// with lifetime `'a`
pub type GenericState<'a> = UniqHashSet<SavedHashCell<'a>, GENERIC_INLINE_CELLS>;

/// `groupUniqArray` that collects the values as bytes
///
/// # Generic
///
/// - `PLAIN`: If it is true, the column should be viewed as contiguous memory region,
///   see [`PlainArray`](data_block::array::PlainArray). Otherwise, values are serialized
///   with [`ArenaSerde`](data_block::array::ArenaSerde)
pub struct GroupUniqArrayGeneric<const PLAIN: bool> {
    args: Vec<LogicalType>,
    max_elements: usize,
    sort_result: bool,
}

impl<const PLAIN: bool> GroupUniqArrayGeneric<PLAIN> {
    /// Create a new [`GroupUniqArrayGeneric`]. Nested types can not be collected
    /// in plain mode
    pub fn new(arg_type: LogicalType, args: GroupUniqArrayArgs) -> Result<Self> {
        ensure!(
            !PLAIN || arg_type.physical_type() != PhysicalType::List,
            ArgTypeMismatchSnafu {
                func: FUNC_NAME,
                expect_physical_type: PhysicalType::Binary,
                arg_type,
            }
        );

        Ok(Self {
            args: vec![arg_type],
            max_elements: args.max_elements,
            sort_result: args.sort_result,
        })
    }

    #[inline]
    fn ensure_capacity(&self, len: usize) -> Result<()> {
        ensure!(
            len < self.max_elements,
            TooManyElementsSnafu {
                func: FUNC_NAME,
                max_elements: self.max_elements
            }
        );
        Ok(())
    }

    /// Insert the bytes that are not owned by the arena. The bytes are copied into
    /// the arena if they are absent in the state
    fn copy_and_insert<'a>(
        &self,
        state: &mut GenericState<'a>,
        bytes: &[u8],
        hash: HashValue,
        arena: &'a Arena,
    ) -> Result<()> {
        let len = state.len();
        state.insert_with(
            hash,
            |cell| cell.matches(bytes, hash),
            || -> Result<_> {
                self.ensure_capacity(len)?;
                let bytes = arena
                    .insert(bytes)
                    .context(OutOfMemorySnafu { func: FUNC_NAME })?;
                Ok(SavedHashCell::new(bytes, hash))
            },
        )?;
        Ok(())
    }

    /// Insert the bytes that are the most recent allocation of the arena. The
    /// allocation is rolled back if the bytes are not inserted
    fn insert_or_rollback<'a>(
        &self,
        state: &mut GenericState<'a>,
        bytes: &'a [u8],
        arena: &'a Arena,
    ) -> Result<()> {
        let hash = hash_bytes(bytes);
        let len = state.len();
        let inserted = state
            .insert_with(
                hash,
                |cell| cell.matches(bytes, hash),
                || -> Result<_> {
                    self.ensure_capacity(len)?;
                    Ok(SavedHashCell::new(bytes, hash))
                },
            )
            .map(|cell| cell.is_some());

        if !matches!(inserted, Ok(true)) {
            // SAFETY: bytes is the most recent allocation and the state does not
            // reference it
            unsafe { arena.rollback(bytes) };
        }
        inserted.map(|_| ())
    }

    /// Nested values are serialized with the layout of their element types, the
    /// whole logical type has to match. Otherwise, the physical type is enough
    fn check_column(&self, column: &ArrayImpl) -> Result<()> {
        let arg_type = &self.args[0];
        let column_type = column.logical_type();
        let matched = if arg_type.physical_type() == PhysicalType::List {
            column_type == arg_type
        } else {
            column_type.physical_type() == arg_type.physical_type()
        };
        ensure!(
            matched,
            ArgTypeMismatchSnafu {
                func: FUNC_NAME,
                expect_physical_type: arg_type.physical_type(),
                arg_type: column.logical_type().clone(),
            }
        );
        Ok(())
    }
}

impl<const PLAIN: bool> Debug for GroupUniqArrayGeneric<PLAIN> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(FUNC_NAME)
            .field("args", &self.args)
            .field("plain", &PLAIN)
            .field("max_elements", &self.max_elements)
            .field("sort_result", &self.sort_result)
            .finish()
    }
}

impl<const PLAIN: bool> Stringify for GroupUniqArrayGeneric<PLAIN> {
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

impl<const PLAIN: bool> Function for GroupUniqArrayGeneric<PLAIN> {
    fn arguments(&self) -> &[LogicalType] {
        &self.args
    }

    fn return_type(&self) -> LogicalType {
        LogicalType::list(self.args[0].clone())
    }
}

impl<const PLAIN: bool> AggregateFunction for GroupUniqArrayGeneric<PLAIN> {
    type State<'a> = GenericState<'a>;

    #[inline]
    fn create_state<'a>(&self) -> Self::State<'a> {
        GenericState::new()
    }

    fn add<'a>(
        &self,
        state: &mut Self::State<'a>,
        column: &ArrayImpl,
        row: usize,
        arena: Option<&'a Arena>,
    ) -> Result<()> {
        let arena = arena.context(ArenaRequiredSnafu { func: FUNC_NAME })?;
        self.check_column(column)?;
        if !column.is_valid(row) {
            return Ok(());
        }

        if PLAIN {
            let bytes = column.data_at(row).map_err(|_| {
                ArgTypeMismatchSnafu {
                    func: FUNC_NAME,
                    expect_physical_type: self.args[0].physical_type(),
                    arg_type: column.logical_type().clone(),
                }
                .build()
            })?;
            self.copy_and_insert(state, bytes, hash_bytes(bytes), arena)
        } else {
            let bytes = column
                .serialize_value_into_arena(row, arena)
                .context(OutOfMemorySnafu { func: FUNC_NAME })?;
            self.insert_or_rollback(state, bytes, arena)
        }
    }

    fn merge<'a>(
        &self,
        state: &mut Self::State<'a>,
        rhs: &Self::State<'_>,
        arena: Option<&'a Arena>,
    ) -> Result<()> {
        let arena = arena.context(ArenaRequiredSnafu { func: FUNC_NAME })?;
        rhs.iter()
            .try_for_each(|cell| self.copy_and_insert(state, cell.bytes(), cell.hash_value(), arena))
    }

    fn serialize<W: Write>(&self, state: &Self::State<'_>, writer: &mut W) -> Result<()> {
        write_var_uint(state.len() as u64, writer).context(EncodeSnafu { func: FUNC_NAME })?;
        state.iter().try_for_each(|cell| {
            write_string_binary(cell.bytes(), writer).context(EncodeSnafu { func: FUNC_NAME })
        })
    }

    fn deserialize<'a, R: Read>(
        &self,
        state: &mut Self::State<'a>,
        reader: &mut R,
        arena: Option<&'a Arena>,
    ) -> Result<()> {
        let arena = arena.context(ArenaRequiredSnafu { func: FUNC_NAME })?;
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
            let bytes =
                read_string_binary_into(reader, arena).context(DecodeSnafu { func: FUNC_NAME })?;
            self.insert_or_rollback(state, bytes, arena)?;
        }
        Ok(())
    }

    fn insert_result_into(&self, state: &Self::State<'_>, output: &mut ArrayImpl) -> Result<()> {
        let list: &mut ListArray = output
            .try_into()
            .context(InsertResultSnafu { func: FUNC_NAME })?;

        let mut values = state.iter().map(|cell| cell.bytes()).collect::<Vec<_>>();
        if self.sort_result {
            values.sort_unstable();
        }

        list.push_list_with(|elements| -> std::result::Result<(), ArrayError> {
            values.iter().try_for_each(|bytes| {
                if PLAIN {
                    elements.insert_data(bytes)
                } else {
                    let consumed = elements.deserialize_and_insert_from_arena(bytes)?;
                    debug_assert_eq!(consumed, bytes.len());
                    Ok(())
                }
            })
        })
        .context(InsertResultSnafu { func: FUNC_NAME })
    }

    #[inline]
    fn allocates_memory_in_arena(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AggregationError, DEFAULT_MAX_ELEMENTS};
    use data_block::array::{Array, BinaryArray, Int32Array, StringArray};
    use expect_test::expect;

    fn new_func<const PLAIN: bool>(arg_type: LogicalType) -> GroupUniqArrayGeneric<PLAIN> {
        GroupUniqArrayGeneric::new(
            arg_type,
            GroupUniqArrayArgs {
                max_elements: DEFAULT_MAX_ELEMENTS,
                sort_result: true,
            },
        )
        .unwrap()
    }

    fn add_all<'a, const PLAIN: bool>(
        func: &GroupUniqArrayGeneric<PLAIN>,
        state: &mut GenericState<'a>,
        column: &ArrayImpl,
        arena: &'a Arena,
    ) {
        (0..column.len()).for_each(|row| func.add(state, column, row, Some(arena)).unwrap());
    }

    fn result_debug<const PLAIN: bool>(
        func: &GroupUniqArrayGeneric<PLAIN>,
        state: &GenericState<'_>,
    ) -> String {
        let mut output = ArrayImpl::new(func.return_type());
        func.insert_result_into(state, &mut output).unwrap();
        let list: &ListArray = (&output).try_into().unwrap();
        format!("{:?}", list.get(0))
    }

    #[test]
    fn test_plain_copies_new_values_only() {
        let func = new_func::<true>(LogicalType::VarChar);
        let arena = Arena::new();
        let column = ArrayImpl::from(StringArray::from_iter([
            Some("curvature"),
            None,
            Some("uniq"),
            Some("curvature"),
        ]));

        let mut state = func.create_state();
        add_all(&func, &mut state, &column, &arena);
        assert_eq!(state.len(), 2);
        assert_eq!(arena.used_bytes(), "curvature".len() + "uniq".len());
        expect![[r#"Some([Some("curvature"), Some("uniq")])"#]]
            .assert_eq(&result_debug(&func, &state));
    }

    #[test]
    fn test_plain_primitive_column() {
        let func = new_func::<true>(LogicalType::Integer);
        let arena = Arena::new();
        let column = ArrayImpl::from(Int32Array::from_values_iter([3, -1, 3]));
        let mut state = func.create_state();
        add_all(&func, &mut state, &column, &arena);
        assert_eq!(arena.used_bytes(), 8);

        let mut output = ArrayImpl::new(func.return_type());
        func.insert_result_into(&state, &mut output).unwrap();
        let list: &ListArray = (&output).try_into().unwrap();
        let elements: &Int32Array = list.elements().try_into().unwrap();
        let mut values = elements.values().to_vec();
        values.sort_unstable();
        assert_eq!(values, [-1, 3]);
    }

    #[test]
    fn test_general_rolls_back_duplicates() {
        let element_type = LogicalType::VarChar;
        let func = new_func::<false>(LogicalType::list(element_type.clone()));
        let arena = Arena::new();

        let mut lists = ListArray::new(func.arguments()[0].clone()).unwrap();
        let inputs: [&[&str]; 5] = [&["a", "bc"], &["a", "bc"], &[], &["bc"], &[]];
        for list in inputs {
            lists
                .push_list_with(|elements| -> std::result::Result<(), ArrayError> {
                    let elements: &mut StringArray = elements.try_into()?;
                    list.iter().for_each(|value| elements.push(value));
                    Ok(())
                })
                .unwrap();
        }
        let column = ArrayImpl::from(lists);

        let mut state = func.create_state();
        add_all(&func, &mut state, &column, &arena);
        assert_eq!(state.len(), 3);
        // ["a", "bc"] + [] + ["bc"]
        assert_eq!(arena.used_bytes(), (8 + 9 + 10) + 8 + (8 + 10));

        let mut output = ArrayImpl::new(func.return_type());
        func.insert_result_into(&state, &mut output).unwrap();
        let list: &ListArray = (&output).try_into().unwrap();
        let mut results = list
            .elements()
            .try_into()
            .map(|lists: &ListArray| {
                lists
                    .iter()
                    .map(|list| format!("{:?}", list))
                    .collect::<Vec<_>>()
            })
            .unwrap();
        results.sort_unstable();
        expect![[r#"["Some([Some(\"a\"), Some(\"bc\")])", "Some([Some(\"bc\")])", "Some([])"]"#]]
            .assert_eq(&format!("{:?}", results));
    }

    #[test]
    fn test_merge_copies_into_destination_arena() {
        let func = new_func::<true>(LogicalType::VarBinary);
        let lhs_arena = Arena::new();
        let rhs_arena = Arena::new();
        let mut lhs = func.create_state();
        let mut rhs = func.create_state();
        add_all(
            &func,
            &mut lhs,
            &ArrayImpl::from(BinaryArray::from_iter([Some(b"a".as_slice()), Some(b"b".as_slice())])),
            &lhs_arena,
        );
        add_all(
            &func,
            &mut rhs,
            &ArrayImpl::from(BinaryArray::from_iter([Some(b"b".as_slice()), Some(b"c".as_slice())])),
            &rhs_arena,
        );

        func.merge(&mut lhs, &rhs, Some(&lhs_arena)).unwrap();
        drop(rhs);
        drop(rhs_arena);

        assert_eq!(lhs.len(), 3);
        assert_eq!(lhs_arena.used_bytes(), 3);
        expect!["Some([Some([97]), Some([98]), Some([99])])"]
            .assert_eq(&result_debug(&func, &lhs));
    }

    #[test]
    fn test_serialize_and_deserialize() {
        let func = new_func::<true>(LogicalType::VarChar);
        let arena = Arena::new();
        let mut state = func.create_state();
        add_all(
            &func,
            &mut state,
            &ArrayImpl::from(StringArray::from_iter([Some("ab"), Some("")])),
            &arena,
        );

        let mut buf = Vec::new();
        func.serialize(&state, &mut buf).unwrap();
        assert_eq!(buf, b"\x02\x02ab\x00");

        // Deserialize replaces the content of the state, duplicates in the input
        // are rolled back
        let other_arena = Arena::new();
        let mut other = func.create_state();
        add_all(
            &func,
            &mut other,
            &ArrayImpl::from(StringArray::from_iter([Some("cd")])),
            &other_arena,
        );
        func.deserialize(
            &mut other,
            &mut b"\x03\x02ab\x00\x02ab".as_slice(),
            Some(&other_arena),
        )
        .unwrap();
        assert_eq!(other.len(), 2);
        assert_eq!(other_arena.used_bytes(), 2 + 2);
        expect![[r#"Some([Some(""), Some("ab")])"#]].assert_eq(&result_debug(&func, &other));
    }

    #[test]
    fn test_errors() {
        let func = new_func::<true>(LogicalType::VarChar);
        let column = ArrayImpl::from(StringArray::from_iter([Some("abc")]));
        let limited_arena = Arena::with_allocation_limit(0);
        let arena = Arena::new();
        let mut state = func.create_state();

        let err = func.add(&mut state, &column, 0, None).unwrap_err();
        expect!["`groupUniqArray` aggregation function allocates memory in the arena, however the arena is not provided"]
            .assert_eq(&err.to_string());

        let err = func
            .add(&mut state, &column, 0, Some(&limited_arena))
            .unwrap_err();
        assert!(matches!(err, AggregationError::OutOfMemory { .. }));
        assert!(state.is_empty());

        let err = func
            .deserialize(&mut state, &mut b"\x02\x01a\x05ab".as_slice(), Some(&arena))
            .unwrap_err();
        assert!(matches!(err, AggregationError::Decode { .. }));
        assert_eq!(arena.used_bytes(), 1);

        let err = GroupUniqArrayGeneric::<true>::new(
            LogicalType::list(LogicalType::VarChar),
            GroupUniqArrayArgs::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AggregationError::ArgTypeMismatch { .. }));
    }

    #[test]
    fn test_list_with_different_element_type() {
        let func = new_func::<false>(LogicalType::list(LogicalType::VarChar));
        let arena = Arena::new();
        let mut lists = ListArray::new(LogicalType::list(LogicalType::Integer)).unwrap();
        lists
            .push_list_with(|elements| -> std::result::Result<(), ArrayError> {
                let elements: &mut Int32Array = elements.try_into()?;
                elements.push(42);
                Ok(())
            })
            .unwrap();
        let column = ArrayImpl::from(lists);

        let mut state = func.create_state();
        let err = func.add(&mut state, &column, 0, Some(&arena)).unwrap_err();
        assert!(matches!(err, AggregationError::ArgTypeMismatch { .. }));
        assert!(state.is_empty());
        assert_eq!(arena.used_bytes(), 0);
    }

    #[test]
    fn test_deserialize_truncated_huge_string() {
        let func = new_func::<true>(LogicalType::VarChar);
        let arena = Arena::new();
        let mut state = func.create_state();
        let mut buf = vec![1_u8];
        write_var_uint(crate::io::MAX_STRING_SIZE, &mut buf).unwrap();
        buf.extend_from_slice(b"ab");

        let err = func
            .deserialize(&mut state, &mut buf.as_slice(), Some(&arena))
            .unwrap_err();
        assert!(matches!(err, AggregationError::Decode { .. }));
        assert!(state.is_empty());
        assert!(arena.allocated_bytes() < 1024 * 1024);
    }

    #[test]
    fn test_too_many_elements_rolls_back() {
        let func = GroupUniqArrayGeneric::<false>::new(
            LogicalType::VarChar,
            GroupUniqArrayArgs {
                max_elements: 1,
                sort_result: false,
            },
        )
        .unwrap();
        let arena = Arena::new();
        let column = ArrayImpl::from(StringArray::from_iter([Some("a"), Some("b")]));
        let mut state = func.create_state();
        func.add(&mut state, &column, 0, Some(&arena)).unwrap();
        let err = func.add(&mut state, &column, 1, Some(&arena)).unwrap_err();
        assert!(matches!(err, AggregationError::TooManyElements { .. }));
        assert_eq!(arena.used_bytes(), 8 + 1);
    }
}
