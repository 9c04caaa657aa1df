use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use notify::{
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, event::ModifyKind,
};
use path_clean::PathClean;
use std::{
    future::Future,
    path::{Path, PathBuf},
};
use tokio::{runtime::Handle, sync::mpsc, time::sleep};

use super::PathSource;
use crate::{
    background::{processors::classifier::PathClassifier, types::CandidatePath},
    config::SettleOptions,
    utils::absolute_clean,
};

/// Unbounded source of paths created in, or moved into, one directory.
///
/// Each eligible event is held back until the file stops growing; paths that
/// vanish before that are dropped. Subdirectories are not observed.
pub struct WatchSource {
    target: PathBuf,
    ready_rx: mpsc::UnboundedReceiver<CandidatePath>,
    _watcher: RecommendedWatcher,
}

impl WatchSource {
    /// Attach to `target`. Must be called inside a tokio runtime.
    pub fn start(target: &Path, classifier: PathClassifier, settle: SettleOptions) -> Result<Self> {
        let target = absolute_clean(target)
            .with_context(|| format!("failed to resolve watch target {:?}", target))?;
        let meta = std::fs::metadata(&target)
            .with_context(|| format!("cannot access watch target {:?}", target))?;
        if !meta.is_dir() {
            bail!("watch target {:?} is not a directory", target);
        }
        std::fs::read_dir(&target)
            .with_context(|| format!("watch target {:?} is not readable", target))?;

        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let runtime = Handle::current();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    for path in arrived_paths(event) {
                        if !classifier.classify(&path).is_eligible() {
                            debug!("Ignoring event for {:?}", path);
                            continue;
                        }
                        info!("Detected {:?}", path);
                        runtime.spawn(settle_then_emit(path, settle, ready_tx.clone()));
                    }
                }
                Err(err) => warn!("Watch error: {}", err),
            }
        })
        .context("failed to create filesystem watcher")?;

        watcher
            .watch(&target, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {:?}", target))?;
        info!("Watching {:?}", target);

        Ok(Self {
            target,
            ready_rx,
            _watcher: watcher,
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl PathSource for WatchSource {
    fn next(&mut self) -> impl Future<Output = Option<CandidatePath>> + Send {
        self.ready_rx.recv()
    }
}

/// Paths that newly exist in the directory: creations and rename targets.
fn arrived_paths(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_)) => {
            event.paths.into_iter().map(|p| p.clean()).collect()
        }
        _ => Vec::new(),
    }
}

async fn settle_then_emit(
    path: PathBuf,
    settle: SettleOptions,
    ready_tx: mpsc::UnboundedSender<CandidatePath>,
) {
    if !wait_until_settled(&path, settle).await {
        debug!("{:?} disappeared before it settled", path);
        return;
    }
    if ready_tx.send(CandidatePath::from_event(path)).is_err() {
        debug!("Watch source closed, dropping settled path");
    }
}

async fn regular_file_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

/// Wait out the initial delay, then poll until two reads of the size agree.
///
/// Returns `false` when the path is gone (or no longer a regular file).
/// A file still growing after `max_polls` is treated as settled.
pub async fn wait_until_settled(path: &Path, settle: SettleOptions) -> bool {
    sleep(settle.delay).await;
    let Some(mut last) = regular_file_size(path).await else {
        return false;
    };
    for _ in 0..settle.max_polls {
        sleep(settle.poll).await;
        let Some(size) = regular_file_size(path).await else {
            return false;
        };
        if size == last {
            return true;
        }
        last = size;
    }
    if settle.max_polls > 0 {
        debug!("{:?} is still growing, releasing it anyway", path);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_extensions;
    use std::{fs, time::Duration};
    use tempfile::tempdir;
    use tokio::time::timeout;

    fn quick() -> SettleOptions {
        SettleOptions {
            delay: Duration::from_millis(50),
            poll: Duration::from_millis(20),
            max_polls: 5,
        }
    }

    #[tokio::test]
    async fn settled_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mov");
        fs::write(&path, b"frames").unwrap();
        assert!(wait_until_settled(&path, quick()).await);
    }

    #[tokio::test]
    async fn missing_file_never_settles() {
        let dir = tempdir().unwrap();
        assert!(!wait_until_settled(&dir.path().join("gone.mov"), quick()).await);
    }

    #[tokio::test]
    async fn directories_never_settle() {
        let dir = tempdir().unwrap();
        assert!(!wait_until_settled(dir.path(), quick()).await);
    }

    #[tokio::test]
    async fn start_rejects_missing_or_file_targets() {
        let dir = tempdir().unwrap();
        let classifier = PathClassifier::new(default_extensions());
        assert!(
            WatchSource::start(&dir.path().join("nope"), classifier.clone(), quick()).is_err()
        );

        let file = dir.path().join("file.mov");
        fs::write(&file, b"x").unwrap();
        assert!(WatchSource::start(&file, classifier, quick()).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn new_media_files_are_emitted_after_settling() {
        let dir = tempdir().unwrap();
        let mut source =
            WatchSource::start(dir.path(), PathClassifier::new(default_extensions()), quick())
                .unwrap();

        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        fs::write(dir.path().join("clip.mov"), b"frames").unwrap();

        let candidate = timeout(Duration::from_secs(10), source.next())
            .await
            .expect("no event within timeout")
            .expect("source closed");
        assert_eq!(candidate.path.file_name().unwrap(), "clip.mov");
        assert_eq!(candidate.origin, crate::background::types::Origin::Event);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn files_removed_before_settling_are_dropped() {
        let dir = tempdir().unwrap();
        let settle = SettleOptions {
            delay: Duration::from_millis(300),
            ..quick()
        };
        let mut source =
            WatchSource::start(dir.path(), PathClassifier::new(default_extensions()), settle)
                .unwrap();

        let path = dir.path().join("temp.mov");
        fs::write(&path, b"frames").unwrap();
        fs::remove_file(&path).unwrap();

        assert!(timeout(Duration::from_secs(1), source.next()).await.is_err());
    }
}
