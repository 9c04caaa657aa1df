//! Path producers feeding the dispatcher.
//!
//! - `batch`: one-shot expansion of literal paths, directories and globs
//! - `watch`: live filesystem events from a single directory

pub mod batch;
pub mod watch;

pub use batch::{BatchSource, Discovery, discover, filter_by_keywords};
pub use watch::{WatchSource, wait_until_settled};

use std::future::Future;

use crate::background::types::CandidatePath;

/// Anything that yields candidate paths until it runs dry or is dropped.
pub trait PathSource: Send {
    /// `None` means the source is exhausted.
    fn next(&mut self) -> impl Future<Output = Option<CandidatePath>> + Send;
}
