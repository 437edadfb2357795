//! Query execution over one shard of the sharded document index.
//!
//! A query is an [`Expression`] over document fields. For each shard row it
//! is compiled into a tree of nested iterators over the field index (see
//! [`compiler`]), whose candidates are then checked against their stored
//! attributes by the [`Evaluator`]. [`ShardQuery`] ties the two together.

pub mod compiler;
pub mod environment;
pub mod evaluate;
pub mod expand;
pub mod expression;
pub mod filters;
pub mod options;
pub mod shard;

pub use compiler::{CompiledQuery, Compiler};
pub use environment::ShardEnvironment;
pub use evaluate::Evaluator;
pub use expand::{Expansion, TermExpander};
pub use expression::{Expression, Literal};
pub use options::{FilterSpec, QueryOptions};
pub use shard::{QueryResult, ShardQuery, ShardQueryIterator};
