#![allow(dead_code)]

use anyhow::{Result, anyhow};
use futures::future::BoxFuture;
use std::{
    collections::VecDeque,
    future::Future,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::time::{sleep, timeout};

use rec_watch::{
    background::{
        actors::{OutcomeSink, Recycler},
        flows::{JobContext, OutputTarget},
        processors::{classifier::PathClassifier, video::Transcoder},
        sources::PathSource,
        types::{CandidatePath, JobReport},
    },
    config::default_extensions,
};

/// Writes a small file instead of running ffmpeg and records what it saw.
#[derive(Default)]
pub struct FakeTranscoder {
    pub delay: Duration,
    pub fail_names: Vec<String>,
    pub panic_names: Vec<String>,
    pub calls: Mutex<Vec<PathBuf>>,
    current: AtomicUsize,
    pub peak: AtomicUsize,
}

impl FakeTranscoder {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn failing(mut self, name: &str) -> Self {
        self.fail_names.push(name.to_string());
        self
    }

    pub fn panicking(mut self, name: &str) -> Self {
        self.panic_names.push(name.to_string());
        self
    }

    pub fn calls_for(&self, path: &Path) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.as_path() == path)
            .count()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Transcoder for FakeTranscoder {
    fn transcode<'a>(&'a self, input: &'a Path, output: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(input.to_path_buf());
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            let name = input.file_name().unwrap().to_string_lossy().into_owned();
            if self.panic_names.contains(&name) {
                panic!("decoder exploded on {}", name);
            }
            if self.fail_names.contains(&name) {
                tokio::fs::write(output, b"partial").await?;
                return Err(anyhow!("ffmpeg exited with status code 1"));
            }
            tokio::fs::write(output, b"converted").await?;
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct FakeRecycler {
    pub recycled: Mutex<Vec<PathBuf>>,
    pub fail: bool,
}

impl FakeRecycler {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn recycled(&self) -> Vec<PathBuf> {
        self.recycled.lock().unwrap().clone()
    }
}

impl Recycler for FakeRecycler {
    fn recycle<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.fail {
                return Err(anyhow!("trash command exited with status code 1"));
            }
            self.recycled.lock().unwrap().push(path.to_path_buf());
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct CollectingSink {
    pub reports: Mutex<Vec<JobReport>>,
}

impl CollectingSink {
    pub fn reports(&self) -> Vec<JobReport> {
        self.reports.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().unwrap().len()
    }

    /// Poll until `count` reports arrived or panic after a generous timeout.
    pub async fn wait_for(&self, count: usize) {
        timeout(Duration::from_secs(10), async {
            while self.len() < count {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for job reports");
    }
}

impl OutcomeSink for CollectingSink {
    fn report<'a>(&'a self, report: &'a JobReport) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.reports.lock().unwrap().push(report.clone());
        })
    }
}

pub struct Harness {
    pub transcoder: Arc<FakeTranscoder>,
    pub recycler: Arc<FakeRecycler>,
    pub sink: Arc<CollectingSink>,
}

impl Harness {
    pub fn new(transcoder: FakeTranscoder) -> Self {
        Self::with_recycler(transcoder, FakeRecycler::default())
    }

    pub fn with_recycler(transcoder: FakeTranscoder, recycler: FakeRecycler) -> Self {
        Self {
            transcoder: Arc::new(transcoder),
            recycler: Arc::new(recycler),
            sink: Arc::new(CollectingSink::default()),
        }
    }

    pub fn context(&self, output: OutputTarget) -> JobContext {
        JobContext::new(self.transcoder.clone(), self.recycler.clone(), output)
            .with_sink(self.sink.clone())
    }
}

pub fn classifier() -> PathClassifier {
    PathClassifier::new(default_extensions())
}

pub fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, b"frames").unwrap();
}

pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

/// Yields its paths as watch events, then never finishes.
pub struct EndlessSource {
    paths: VecDeque<PathBuf>,
}

impl EndlessSource {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }
}

impl PathSource for EndlessSource {
    fn next(&mut self) -> impl Future<Output = Option<CandidatePath>> + Send {
        let next = self.paths.pop_front();
        async move {
            match next {
                Some(path) => Some(CandidatePath::from_event(path)),
                None => std::future::pending().await,
            }
        }
    }
}
