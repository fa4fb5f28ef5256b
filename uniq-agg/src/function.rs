//! Functions

use data_block::types::LogicalType;

/// Trait describes the function signature
pub trait Function: Send + Sync + 'static {
    /// Get arguments of the function
    fn arguments(&self) -> &[LogicalType];

    /// Return type of the function
    fn return_type(&self) -> LogicalType;
}

/// Stringify the function
pub trait Stringify {
    /// Get name of the function
    fn name(&self) -> &'static str;

    /// Debug message
    fn debug(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result;

    /// Display message
    fn display(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result;
}

/// Display the function with [`Stringify::display`]
#[derive(Debug)]
pub struct DisplayFunction<'a, F: ?Sized>(pub &'a F);

impl<F: Stringify + ?Sized> std::fmt::Display for DisplayFunction<'_, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.display(f)
    }
}
