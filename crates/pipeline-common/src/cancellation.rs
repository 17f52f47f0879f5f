//! Cooperative cancellation token shared across pipeline stages.
//!
//! Thin re-export of [`tokio_util::sync::CancellationToken`] under this
//! crate's own name so callers depend on `pipeline_common::CancellationToken`
//! rather than reaching into `tokio-util` directly.

pub use tokio_util::sync::CancellationToken;
