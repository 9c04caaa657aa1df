use futures::future::BoxFuture;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};

use crate::{
    background::types::{JobOutcome, JobReport},
    utils::PathExt,
};

/// Receives the terminal outcome of every job.
pub trait OutcomeSink: Send + Sync + 'static {
    fn report<'a>(&'a self, report: &'a JobReport) -> BoxFuture<'a, ()>;
}

/// Prints every outcome with a success or failure marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl OutcomeSink for LogSink {
    fn report<'a>(&'a self, report: &'a JobReport) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            match &report.outcome {
                JobOutcome::Success { output } => {
                    info!(
                        duration = &*format!("{:?}", report.elapsed);
                        "{} [#{}] Converted {:?} -> {:?}",
                        report.outcome.marker(),
                        report.seq,
                        report.input,
                        output
                    );
                }
                JobOutcome::Failure { diagnostic } => {
                    error!(
                        duration = &*format!("{:?}", report.elapsed);
                        "{} [#{}] Conversion failed for {:?}\n{}",
                        report.outcome.marker(),
                        report.seq,
                        report.input,
                        diagnostic
                    );
                }
            }
        })
    }
}

/// Terminal progress bar for batch runs; hidden when stderr is not a TTY.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    bar: ProgressBar,
}

impl ProgressSink {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
        {
            bar.set_style(style);
        }
        Self { bar }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl OutcomeSink for ProgressSink {
    fn report<'a>(&'a self, report: &'a JobReport) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.bar.set_message(report.input.file_name_lossy());
            self.bar.inc(1);
        })
    }
}
