//! Common types and utils shared by the aggregation core

pub mod types;
pub mod utils;
