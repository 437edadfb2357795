//! Worker pool utilities used to run background index scans.
//!
//! # Key Components
//!
//! - [`thread_pool::ThreadPool`] - A named, fixed-size pool of worker threads
//! - [`join_handle::JoinHandle`] - Waits for a spawned task, with or without a
//!   timeout
//! - [`oneshot`] - The single-value channel behind the join handles
//!
//! A task that panics does not take its worker down: the panic is caught, logged,
//! and the corresponding handle reports [`JoinError::Canceled`].

pub mod join_handle;
pub mod oneshot;
pub mod thread_pool;

pub use join_handle::{JoinError, JoinHandle};
pub use thread_pool::ThreadPool;
