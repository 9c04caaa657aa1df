//! Collaborators that act on a job once it reaches a terminal outcome.

pub mod notification;
pub mod report;
pub mod trash;

pub use notification::DesktopNotifier;
pub use report::{LogSink, OutcomeSink, ProgressSink};
pub use trash::{Recycler, SystemTrash};
