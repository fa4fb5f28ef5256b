//! Aggregation functions that collect values of the rows into the states
//!
//! Each group owns a state created by [`AggregateFunction::create_state`]. The
//! driver feeds rows into the state with [`AggregateFunction::add`], combines the
//! partial states with [`AggregateFunction::merge`], transfers them with
//! [`AggregateFunction::serialize`]/[`AggregateFunction::deserialize`] and appends
//! the final result into the output array with
//! [`AggregateFunction::insert_result_into`]
//!
//! States may reference memory in the [`Arena`] passed to the functions. The
//! lifetime of the state is bounded by the arena, dropping the arena drops all of
//! the values referenced by the states

pub mod group_uniq_array;
pub mod hash_set;

use std::fmt::Debug;
use std::io::{Read, Write};

use data_block::arena::{Arena, ArenaError};
use data_block::array::{ArrayError, ArrayImpl};
use data_block::types::{LogicalType, PhysicalType};
use snafu::Snafu;

use crate::function::{Function, Stringify};
use crate::io::IoError;

pub use group_uniq_array::{
    DEFAULT_MAX_ELEMENTS, GroupUniqArray, GroupUniqArrayArgs, GroupUniqArrayState,
};

#[allow(missing_docs)]
#[derive(Debug, Snafu)]
pub enum AggregationError {
    #[snafu(display(
        "`{func}` aggregation function expect `{}`, however the arg has logical type `{:?}` with `{}`",
        expect_physical_type,
        arg_type,
        arg_type.physical_type()
    ))]
    ArgTypeMismatch {
        func: &'static str,
        expect_physical_type: PhysicalType,
        arg_type: LogicalType,
    },
    #[snafu(display("Failed to encode the state of the `{func}` aggregation function"))]
    Encode { func: &'static str, source: IoError },
    #[snafu(display("Failed to decode the state of the `{func}` aggregation function"))]
    Decode { func: &'static str, source: IoError },
    #[snafu(display("`{func}` aggregation function runs out of the memory of the arena"))]
    OutOfMemory {
        func: &'static str,
        source: ArenaError,
    },
    #[snafu(display(
        "State of the `{func}` aggregation function can not hold more than `{max_elements}` elements"
    ))]
    TooManyElements {
        func: &'static str,
        max_elements: usize,
    },
    #[snafu(display(
        "`{func}` aggregation function allocates memory in the arena, however the arena is not provided"
    ))]
    ArenaRequired { func: &'static str },
    #[snafu(display(
        "`{func}` aggregation function is `{expect}`, it can not accept the state `{actual}`"
    ))]
    StateMismatch {
        func: &'static str,
        expect: &'static str,
        actual: &'static str,
    },
    #[snafu(display("Failed to insert the result of the `{func}` into the output array"))]
    InsertResult {
        func: &'static str,
        source: ArrayError,
    },
}

/// Aggregation result
pub type Result<T> = std::result::Result<T, AggregationError>;

/// Trait for the aggregation functions
///
/// Functions whose [`allocates_memory_in_arena`](Self::allocates_memory_in_arena)
/// returns `true` require the arena in `add`, `merge` and `deserialize`. Values
/// copied into the arena are never freed individually, except the most recent
/// allocation that is rolled back when the value is a duplicate
pub trait AggregateFunction: Function + Stringify {
    /// State of the aggregation function, it may reference the memory in the arena
    /// with lifetime `'a`
    type State<'a>: Debug;

    /// Create an empty state
    fn create_state<'a>(&self) -> Self::State<'a>;

    /// Add the value at `row` of the `column` into the state. Null is ignored
    fn add<'a>(
        &self,
        state: &mut Self::State<'a>,
        column: &ArrayImpl,
        row: usize,
        arena: Option<&'a Arena>,
    ) -> Result<()>;

    /// Merge the `rhs` state into the `state`. Values referenced by the `rhs` are
    /// copied into the `arena`, the `state` never references the memory of `rhs`
    fn merge<'a>(
        &self,
        state: &mut Self::State<'a>,
        rhs: &Self::State<'_>,
        arena: Option<&'a Arena>,
    ) -> Result<()>;

    /// Serialize the state into the writer
    fn serialize<W: Write>(&self, state: &Self::State<'_>, writer: &mut W) -> Result<()>;

    /// Deserialize the state from the reader. The content of the `state` is replaced,
    /// memory it referenced in the arena is kept until the arena is dropped
    fn deserialize<'a, R: Read>(
        &self,
        state: &mut Self::State<'a>,
        reader: &mut R,
        arena: Option<&'a Arena>,
    ) -> Result<()>;

    /// Append the result of the state into the `output`
    fn insert_result_into(&self, state: &Self::State<'_>, output: &mut ArrayImpl) -> Result<()>;

    /// Returns true if the state references the memory in the arena
    fn allocates_memory_in_arena(&self) -> bool;
}
