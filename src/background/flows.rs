use anyhow::{Context, Result};
use futures::FutureExt;
use log::{debug, error, info, warn};
use path_clean::PathClean;
use std::{
    any::Any,
    num::NonZeroUsize,
    panic::AssertUnwindSafe,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Instant,
};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    background::{
        actors::{OutcomeSink, Recycler},
        ledger::{ClaimGuard, JobLedger},
        pool::WorkerPool,
        processors::{
            classifier::{Classification, PathClassifier},
            video::{Transcoder, discard_output, reserve_output_path},
        },
        sources::PathSource,
        types::{CandidatePath, Dispatch, Job, JobOutcome, JobReport, RunSummary},
    },
    common::errors::flatten_error,
    config::OutputLayout,
};

/// Where a job writes its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Resolved once up front (batch runs).
    Fixed(PathBuf),
    /// Resolved when each job starts (long-running watches cross midnight).
    PerJob(OutputLayout),
}

impl OutputTarget {
    pub fn dir(&self) -> PathBuf {
        match self {
            OutputTarget::Fixed(dir) => dir.clone(),
            OutputTarget::PerJob(layout) => layout.resolve_now(),
        }
    }
}

/// Collaborators shared by every job of a run.
pub struct JobContext {
    pub transcoder: Arc<dyn Transcoder>,
    pub recycler: Arc<dyn Recycler>,
    pub sinks: Vec<Arc<dyn OutcomeSink>>,
    pub output: OutputTarget,
    /// Recycle the source after a successful conversion.
    pub trash: bool,
}

impl JobContext {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        recycler: Arc<dyn Recycler>,
        output: OutputTarget,
    ) -> Self {
        Self {
            transcoder,
            recycler,
            sinks: Vec::new(),
            output,
            trash: true,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_trash(mut self, trash: bool) -> Self {
        self.trash = trash;
        self
    }
}

#[derive(Debug, Default)]
struct RunCounters {
    queued: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    ignored: AtomicUsize,
    duplicates: AtomicUsize,
}

impl RunCounters {
    fn snapshot(&self) -> RunSummary {
        RunSummary {
            queued: self.queued.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            ignored: self.ignored.load(Ordering::SeqCst),
            duplicates: self.duplicates.load(Ordering::SeqCst),
        }
    }
}

// ────────────────────────────────────────────────────────────────
// Dispatcher
// ────────────────────────────────────────────────────────────────

/// Turns candidate paths into at most one in-flight conversion per path and
/// hands them to a bounded pool.
pub struct Dispatcher {
    context: Arc<JobContext>,
    classifier: PathClassifier,
    ledger: JobLedger,
    pool: WorkerPool,
    counters: Arc<RunCounters>,
    next_seq: AtomicU64,
}

impl Dispatcher {
    /// Must be called from inside a Tokio runtime.
    pub fn new(context: JobContext, classifier: PathClassifier, concurrency: NonZeroUsize) -> Self {
        Self::with_ledger(context, classifier, concurrency, JobLedger::new())
    }

    pub fn with_ledger(
        context: JobContext,
        classifier: PathClassifier,
        concurrency: NonZeroUsize,
        ledger: JobLedger,
    ) -> Self {
        Self {
            context: Arc::new(context),
            classifier,
            ledger,
            pool: WorkerPool::new(concurrency),
            counters: Arc::new(RunCounters::default()),
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    pub fn summary(&self) -> RunSummary {
        self.counters.snapshot()
    }

    /// Classify, claim and enqueue one candidate. Never waits for a worker.
    pub fn dispatch(&self, candidate: CandidatePath) -> Result<Dispatch> {
        let path = candidate.path.clean();

        if let Classification::Ignored(reason) = self.classifier.classify(&path) {
            debug!("Ignoring {:?} ({:?})", path, reason);
            self.counters.ignored.fetch_add(1, Ordering::SeqCst);
            return Ok(Dispatch::Ignored);
        }

        let Some(guard) = self.ledger.try_claim(path.clone()) else {
            info!("Conversion already in progress for {:?}", path);
            self.counters.duplicates.fetch_add(1, Ordering::SeqCst);
            return Ok(Dispatch::AlreadyInProgress);
        };

        let job = Job {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            input: path,
            queued_at: Instant::now(),
        };
        let seq = job.seq;
        info!("[#{}] Queued {:?} ({:?})", seq, job.input, candidate.origin);

        let context = Arc::clone(&self.context);
        let counters = Arc::clone(&self.counters);
        self.pool
            .submit(run_job(job, guard, context, Arc::clone(&counters)))
            .with_context(|| format!("failed to enqueue job #{}", seq))?;
        counters.queued.fetch_add(1, Ordering::SeqCst);
        Ok(Dispatch::Queued(seq))
    }

    /// Pull from `source` until it is exhausted or `stop` fires, then wait for
    /// every accepted job to reach an outcome.
    ///
    /// A stop channel whose senders are all gone can no longer fire; the run
    /// then continues until the source is exhausted.
    pub async fn run<S: PathSource>(
        self,
        mut source: S,
        mut stop: broadcast::Receiver<()>,
    ) -> RunSummary {
        let mut stop_open = true;
        loop {
            tokio::select! {
                biased;
                signal = stop.recv(), if stop_open => match signal {
                    Ok(()) | Err(RecvError::Lagged(_)) => {
                        info!("Stop requested, no longer accepting new paths");
                        break;
                    }
                    Err(RecvError::Closed) => {
                        debug!("Stop channel closed, running until the source is exhausted");
                        stop_open = false;
                    }
                },
                next = source.next() => match next {
                    Some(candidate) => {
                        if let Err(err) = self.dispatch(candidate) {
                            error!("{:#}", err);
                        }
                    }
                    None => {
                        debug!("Path source exhausted");
                        break;
                    }
                },
            }
        }
        drop(source);
        self.drain().await
    }

    /// Stop accepting work and wait for queued and running jobs.
    pub async fn drain(self) -> RunSummary {
        let pending = self.pool.queued() + self.pool.active();
        if pending > 0 {
            info!("Waiting for {} job(s) to finish", pending);
        }
        self.pool.shutdown().await;
        self.counters.snapshot()
    }
}

// ────────────────────────────────────────────────────────────────
// Job body
// ────────────────────────────────────────────────────────────────

async fn run_job(
    job: Job,
    guard: ClaimGuard,
    context: Arc<JobContext>,
    counters: Arc<RunCounters>,
) {
    let start_time = Instant::now();
    debug!(
        duration = &*format!("{:?}", job.queued_at.elapsed());
        "[#{}] Started {:?}", job.seq, job.input
    );

    let outcome = match AssertUnwindSafe(convert(&context, &job.input))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(panic) => JobOutcome::Failure {
            diagnostic: format!("conversion panicked: {}", panic_message(panic.as_ref())),
        },
    };
    drop(guard);

    if outcome.is_success() {
        counters.succeeded.fetch_add(1, Ordering::SeqCst);
    } else {
        counters.failed.fetch_add(1, Ordering::SeqCst);
    }

    let report = JobReport {
        seq: job.seq,
        input: job.input,
        outcome,
        elapsed: start_time.elapsed(),
    };
    for sink in &context.sinks {
        sink.report(&report).await;
    }
}

async fn convert(context: &JobContext, input: &Path) -> JobOutcome {
    let output = match transcode_into_place(context, input).await {
        Ok(output) => output,
        Err(err) => {
            return JobOutcome::Failure {
                diagnostic: flatten_error(&err),
            };
        }
    };

    if context.trash {
        match context.recycler.recycle(input).await {
            Ok(()) => debug!("Moved {:?} to the trash", input),
            Err(err) => warn!("Converted but could not trash {:?}: {:#}", input, err),
        }
    }
    JobOutcome::Success { output }
}

async fn transcode_into_place(context: &JobContext, input: &Path) -> Result<PathBuf> {
    let dir = context.output.dir();
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("failed to create output directory {:?}", dir))?;
    let output = reserve_output_path(input, &dir).await?;

    if let Err(err) = context.transcoder.transcode(input, &output).await {
        discard_output(&output).await;
        return Err(err);
    }
    Ok(output)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
