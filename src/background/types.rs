use chrono::{DateTime, Local};
use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

/// Where a candidate path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Event,
    Enumeration,
}

/// A path observed by a source, not yet classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePath {
    pub path: PathBuf,
    pub discovered_at: DateTime<Local>,
    pub origin: Origin,
}

impl CandidatePath {
    pub fn new(path: impl Into<PathBuf>, origin: Origin) -> Self {
        Self {
            path: path.into(),
            discovered_at: Local::now(),
            origin,
        }
    }

    pub fn from_event(path: impl Into<PathBuf>) -> Self {
        Self::new(path, Origin::Event)
    }

    pub fn from_enumeration(path: impl Into<PathBuf>) -> Self {
        Self::new(path, Origin::Enumeration)
    }
}

/// One dispatched conversion.
#[derive(Debug, Clone)]
pub struct Job {
    /// Monotonic per run, for log correlation only.
    pub seq: u64,
    pub input: PathBuf,
    pub queued_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success { output: PathBuf },
    Failure { diagnostic: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success { .. })
    }

    pub fn marker(&self) -> &'static str {
        if self.is_success() { "✅" } else { "❌" }
    }
}

/// Terminal result of a job, forwarded to every outcome sink.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub seq: u64,
    pub input: PathBuf,
    pub outcome: JobOutcome,
    pub elapsed: Duration,
}

impl JobReport {
    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> Option<&Path> {
        match &self.outcome {
            JobOutcome::Success { output } => Some(output),
            JobOutcome::Failure { .. } => None,
        }
    }
}

/// What the dispatcher did with one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Ignored,
    AlreadyInProgress,
    Queued(u64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub queued: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub ignored: usize,
    pub duplicates: usize,
}

impl RunSummary {
    pub fn finished(&self) -> usize {
        self.succeeded + self.failed
    }
}
