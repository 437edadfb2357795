//! Core definitions shared by all quarry-* crates: the error type, the `Result`
//! alias, argument verification macros and the scan budget threaded through
//! every iterator call.

pub mod budget;
pub mod error;
pub mod macros;
pub mod result;

pub use budget::{KeyBudget, ScanBudget};
pub use result::Result;
