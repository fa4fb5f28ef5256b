//! # DataBlock
//!
//! `DataBlock` is the columnar memory format used by the aggregation core. It is a
//! small subset of [`Arrow`]: it only provides the arrays and the operations that
//! the aggregation functions need.
//!
//! - Buffers of the arrays are held through [`cow::Shared`], cloning an array is
//!   cheap and writing to an array that shares buffers with others will copy them
//!   on write.
//!
//! - Variable length values that outlive a single data block are stored in an
//!   [`arena::Arena`].
//!
//! [`Arrow`]: https://github.com/apache/arrow-rs
//!
//! # Endianness
//!
//! The zero-copy byte view of the fixed size elements is their in-memory
//! representation. `DataBlock` assumes it runs on little-endian targets, such that
//! the in-memory representation equals the little-endian wire representation

pub mod aligned_vec;
pub mod arena;
pub mod array;
pub mod bitmap;
pub mod cow;
mod macros;
pub mod types;
pub mod utils;

mod private {
    /// Sealed trait protect against downstream implementations
    pub trait Sealed {}
}
