//! Test utilities for the Quarry crates.
//!
//! This crate provides:
//! - Shard table and global index builders over in-memory sources
//! - JSON fixtures describing a shard, used by tests and the command line tool
//! - Randomized document generation
//! - Temporary spill directories for ivarator sets

pub mod data_gen;
pub mod dirs;
pub mod fixture;
pub mod table;

pub use fixture::{DocumentFixture, ShardFixture};
pub use table::{GlobalIndexBuilder, ShardTableBuilder};
