//! Re-export types and traits
//!
//! Relationships:
//!
//! - [`AllocType`] is the superset of the [`PrimitiveType`], actually they are the same.

use std::fmt::Display;
use std::num::NonZeroU8;
use std::sync::Arc;

pub use crate::aligned_vec::AllocType;
pub use crate::array::primitive::PrimitiveType;
pub use crate::array::Array;

/// Physical type has a one-to-one mapping to each array in the [`ArrayImpl`]
///
/// [`ArrayImpl`]: crate::array::ArrayImpl
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalType {
    /// Signed 8-bit integer, also known as `TINYINT`
    Int8,
    /// Unsigned 8-bit integer
    UInt8,
    /// Signed 16-bit integer, also known as `SMALLINT`
    Int16,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 32-bit integer, also known as `INTEGER`
    Int32,
    /// Unsigned 32-bit integer
    UInt32,
    /// Signed 64-bit integer, also known as `BIGINT`
    Int64,
    /// Unsigned 64-bit integer
    UInt64,
    /// Signed 128-bit integer, also known as `HUGEINT`
    Int128,
    /// 32-bit float number, also known as `FLOAT/REAL`
    Float32,
    /// 64-bit float number, also known as `DOUBLE`
    Float64,
    /// Variable length Utf-8 String, also known as `VARCHAR`
    String,
    /// Variable length binary array, also known as `VARBINARY`
    Binary,
    // Complex types
    /// List of a physical type
    List = 64,
}

impl Display for PhysicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PhysicalType::{:?}", self)
    }
}

/// All of the supported logical types. Different logical types may have same [`PhysicalType`].
///
/// It add some semantic above the physical type. Operations between [`Array`]s
/// should have different behavior based on the associated [`LogicalType`]s
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// Signed 8-bit integer
    TinyInt,
    /// Signed 16-bit integer
    SmallInt,
    /// Signed 32-bit integer
    Integer,
    /// Signed 64-bit integer
    BigInt,
    /// Signed 128-bit integer
    HugeInt,
    /// Unsigned 8-bit integer
    UnsignedTinyInt,
    /// Unsigned 16-bit integer
    UnsignedSmallInt,
    /// Unsigned 32-bit integer
    UnsignedInteger,
    /// Unsigned 64-bit integer
    UnsignedBigInt,
    /// 32-bit float number
    Float,
    /// 64-bit float number
    Double,
    /// Fixed-point numbers with precision and scale
    ///
    /// DECIMAL types are backed by `BIGINT` and `HUGEINT` physical types, which store
    /// the unscaled value. `BIGINT` is used up to 18 precision, `HUGEINT` is used up
    /// to 38 precision
    Decimal {
        /// 1 <= precision <= 38
        precision: NonZeroU8,
        /// 0 <= scale <= 38
        scale: u8,
    },
    /// Variable length Utf-8 String
    VarChar,
    /// Variable length binary array
    VarBinary,
    /// Timestamp with given unit, stored with i64
    Timestamp(TimeUnit),
    /// Date is represented as the number of days since epoch start using i32.
    Date,
    /// Universally unique identifier
    Uuid,

    // Complex types
    /// List of LogicalType. The child type can be scalar type or complex type
    List {
        /// Type of the element in list
        ///
        /// We use Arc here to avoid repeated memory allocation, logical type is
        /// cloned frequently.
        element_type: Arc<LogicalType>,
        /// Is the element in list nullable?
        is_nullable: bool,
    },
}

/// TimeUnit
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    /// Time in seconds
    Seconds,
    /// Time in milliseconds(ms)
    Millisecond,
    /// Time in microseconds(us)
    Microsecond,
    /// Time in nanoseconds(ns)
    Nanosecond,
}

impl LogicalType {
    /// Create a list type whose elements are not nullable
    pub fn list(element_type: LogicalType) -> Self {
        Self::List {
            element_type: Arc::new(element_type),
            is_nullable: false,
        }
    }

    /// Get the underling physical type of the logical type
    pub fn physical_type(&self) -> PhysicalType {
        match self {
            Self::TinyInt => PhysicalType::Int8,
            Self::SmallInt => PhysicalType::Int16,
            Self::Integer => PhysicalType::Int32,
            Self::BigInt => PhysicalType::Int64,
            Self::HugeInt => PhysicalType::Int128,
            Self::UnsignedTinyInt => PhysicalType::UInt8,
            Self::UnsignedSmallInt => PhysicalType::UInt16,
            Self::UnsignedInteger => PhysicalType::UInt32,
            Self::UnsignedBigInt => PhysicalType::UInt64,
            Self::Float => PhysicalType::Float32,
            Self::Double => PhysicalType::Float64,
            Self::Decimal { precision, .. } => {
                if precision.get() <= 18 {
                    PhysicalType::Int64
                } else {
                    PhysicalType::Int128
                }
            }
            Self::VarChar => PhysicalType::String,
            Self::VarBinary => PhysicalType::Binary,
            Self::Timestamp(_) => PhysicalType::Int64,
            Self::Date => PhysicalType::Int32,
            Self::Uuid => PhysicalType::Int128,

            // Complex types
            Self::List { .. } => PhysicalType::List,
        }
    }

    /// Get the element type and nullability of the list type. Returns `None` if self
    /// is not a list
    pub fn list_element(&self) -> Option<(&LogicalType, bool)> {
        match self {
            Self::List {
                element_type,
                is_nullable,
            } => Some((element_type, *is_nullable)),
            _ => None,
        }
    }
}
