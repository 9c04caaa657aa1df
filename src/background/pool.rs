//! Bounded worker pool.
//!
//! Submission never waits for a free slot: jobs go onto an unbounded FIFO
//! queue and a single runner task starts them as `tokio::sync::Semaphore`
//! permits become available. `shutdown` closes the queue and waits until
//! every queued and running job has finished.

use anyhow::{Result, anyhow};
use futures::future::BoxFuture;
use log::{debug, error};
use std::{
    future::Future,
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore, mpsc},
    task::{JoinHandle, JoinSet},
};

type Job = BoxFuture<'static, ()>;

#[derive(Debug, Default)]
struct PoolCounters {
    queued: AtomicUsize,
    active: AtomicUsize,
}

/// Held for the whole life of a running job, including unwinding.
struct Slot {
    counters: Arc<PoolCounters>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct WorkerPool {
    slots: NonZeroUsize,
    tx: Option<mpsc::UnboundedSender<Job>>,
    runner: JoinHandle<()>,
    counters: Arc<PoolCounters>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("slots", &self.slots)
            .field("queued", &self.queued())
            .field("active", &self.active())
            .finish()
    }
}

impl WorkerPool {
    /// Must be called from inside a Tokio runtime.
    pub fn new(slots: NonZeroUsize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(PoolCounters::default());
        let runner = tokio::spawn(run_queue(slots, rx, Arc::clone(&counters)));
        Self {
            slots,
            tx: Some(tx),
            runner,
            counters,
        }
    }

    /// Jobs waiting for a slot.
    pub fn queued(&self) -> usize {
        self.counters.queued.load(Ordering::SeqCst)
    }

    /// Jobs currently holding a slot.
    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| anyhow!("worker pool is shutting down"))?;
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        tx.send(Box::pin(job)).map_err(|_| {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
            anyhow!("worker pool runner has stopped")
        })
    }

    /// Stop accepting jobs and wait for every queued and running job.
    pub async fn shutdown(mut self) {
        self.tx.take();
        if let Err(err) = (&mut self.runner).await {
            error!("Worker pool runner failed: {}", err);
        }
    }
}

async fn run_queue(
    slots: NonZeroUsize,
    mut rx: mpsc::UnboundedReceiver<Job>,
    counters: Arc<PoolCounters>,
) {
    let semaphore = Arc::new(Semaphore::new(slots.get()));
    let mut running = JoinSet::new();

    while let Some(job) = rx.recv().await {
        // Waiting here keeps FIFO order: later jobs stay in the channel.
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        counters.queued.fetch_sub(1, Ordering::SeqCst);
        counters.active.fetch_add(1, Ordering::SeqCst);

        let slot = Slot {
            counters: Arc::clone(&counters),
            _permit: permit,
        };
        running.spawn(async move {
            let _slot = slot;
            job.await;
        });

        while let Some(joined) = running.try_join_next() {
            log_join_result(joined);
        }
    }

    debug!("Worker pool queue closed, draining {} job(s)", running.len());
    while let Some(joined) = running.join_next().await {
        log_join_result(joined);
    }
}

fn log_join_result(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        error!("Worker pool job terminated abnormally: {}", err);
    }
}
