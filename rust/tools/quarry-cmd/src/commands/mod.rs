//! Command implementations for quarry-cmd

pub mod expand;
pub mod query;
