//! Background module - everything between "a path was seen" and "a job finished"
//!
//! Structure:
//! - `types`: Core data structures (candidates, jobs, outcomes, run summary)
//! - `ledger`: In-flight claims, at most one job per path
//! - `pool`: Bounded worker pool with a FIFO backlog
//! - `sources`: Path producers (batch discovery, directory watch)
//! - `processors`: Domain-specific processing logic (classifier, video, setup)
//! - `actors`: Side-effecting collaborators (trash, outcome sinks, notifications)
//! - `flows`: The dispatcher and the per-job flow

pub mod actors;
pub mod flows;
pub mod ledger;
pub mod pool;
pub mod processors;
pub mod sources;
pub mod types;
