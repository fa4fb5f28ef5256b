#![warn(clippy::todo)]
#![deny(
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    rustdoc::private_intra_doc_links,
    rust_2018_idioms,
    missing_docs,
    clippy::needless_borrow,
    clippy::redundant_clone,
    missing_debug_implementations
)]

//! # UniqAgg
//!
//! Aggregation core that collects the unique values of a column: the
//! `groupUniqArray` aggregation function, the small hash set behind it and the
//! binary format its states are transferred with.

pub mod aggregate;
pub mod common;
pub mod function;
pub mod io;

mod private {
    /// Sealed trait protect against downstream implementations
    pub trait Sealed {}
}
