//! Multi-valued comparison semantics used to re-check candidate documents.
//!
//! A field may carry several values in one document. Every operator here is
//! defined on scalars and lifted to sets existentially: the result is true
//! when *any* pair of left/right elements satisfies the scalar operator.

pub mod arithmetic;
pub mod document;
pub mod normalizer;
pub mod pattern;
pub mod value;

pub use arithmetic::Arithmetic;
pub use document::Document;
pub use normalizer::Normalizer;
pub use pattern::PatternCache;
pub use value::{Value, ValueTuple};
