use dashmap::DashSet;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

// ────────────────────────────────────────────────────────────────
// JobLedger - Prevents two jobs on the same path from overlapping
// ────────────────────────────────────────────────────────────────

/// Paths that currently have a queued or running job.
#[derive(Debug, Clone, Default)]
pub struct JobLedger {
    in_progress: Arc<DashSet<PathBuf>>,
}

/// Exclusive right to run a job for one path. Dropping it releases the claim.
#[derive(Debug)]
pub struct ClaimGuard {
    path: PathBuf,
    in_progress: Arc<DashSet<PathBuf>>,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.in_progress.remove(&self.path);
    }
}

impl ClaimGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JobLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` when the path is already claimed.
    pub fn try_claim(&self, path: impl Into<PathBuf>) -> Option<ClaimGuard> {
        let path = path.into();
        if self.in_progress.insert(path.clone()) {
            Some(ClaimGuard {
                path,
                in_progress: Arc::clone(&self.in_progress),
            })
        } else {
            None
        }
    }

    pub fn is_claimed(&self, path: &Path) -> bool {
        self.in_progress.contains(path)
    }

    pub fn len(&self) -> usize {
        self.in_progress.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_progress.is_empty()
    }
}
