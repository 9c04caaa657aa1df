use anyhow::{Context, Result, bail};
use globset::GlobBuilder;
use log::{debug, warn};
use std::{
    collections::{HashSet, VecDeque},
    future::Future,
    path::{Component, Path, PathBuf},
};
use walkdir::WalkDir;

use super::PathSource;
use crate::{
    background::{processors::classifier::PathClassifier, types::CandidatePath},
    utils::{absolute_clean, expand_tilde},
};

/// Result of expanding the batch inputs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// Absolute, deduplicated, in first-seen order.
    pub paths: Vec<PathBuf>,
    /// Patterns that could not be resolved and were skipped.
    pub skipped: Vec<String>,
}

/// Expand literal files, directories (every recognised media file below them)
/// and glob expressions. Unresolvable patterns are logged and skipped.
pub fn discover(
    patterns: &[String],
    classifier: &PathClassifier,
    home: Option<&Path>,
) -> Discovery {
    let mut discovery = Discovery::default();
    let mut seen = HashSet::new();

    for pattern in patterns {
        match expand_pattern(pattern, classifier, home) {
            Ok(paths) => {
                debug!("Pattern {:?} matched {} file(s)", pattern, paths.len());
                for path in paths {
                    if seen.insert(path.clone()) {
                        discovery.paths.push(path);
                    }
                }
            }
            Err(err) => {
                warn!("Skipping pattern {:?}: {:#}", pattern, err);
                discovery.skipped.push(pattern.clone());
            }
        }
    }
    discovery
}

/// Keep paths containing any keyword, ignoring case. No keywords keeps everything.
pub fn filter_by_keywords(paths: Vec<PathBuf>, keywords: &[String]) -> Vec<PathBuf> {
    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return paths;
    }
    paths
        .into_iter()
        .filter(|path| {
            let lower = path.to_string_lossy().to_lowercase();
            keywords.iter().any(|k| lower.contains(k.as_str()))
        })
        .collect()
}

fn expand_pattern(
    pattern: &str,
    classifier: &PathClassifier,
    home: Option<&Path>,
) -> Result<Vec<PathBuf>> {
    let expanded = expand_tilde(pattern, home);
    let absolute = absolute_clean(&expanded)
        .with_context(|| format!("failed to resolve {:?}", expanded))?;

    match std::fs::metadata(&absolute) {
        Ok(meta) if meta.is_dir() => Ok(walk_media(&absolute, classifier)),
        Ok(_) => Ok(vec![absolute]),
        Err(_) if has_glob_meta(&absolute) => glob_files(&absolute),
        Err(err) => Err(err).with_context(|| format!("cannot access {:?}", absolute)),
    }
}

fn walk_media(dir: &Path, classifier: &PathClassifier) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Failed to read entry under {:?}: {}", dir, err);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| classifier.is_recognized_extension(path))
        .collect()
}

fn is_glob_component(component: &str) -> bool {
    component.contains(['*', '?', '[', '{'])
}

fn has_glob_meta(path: &Path) -> bool {
    path.components()
        .any(|c| is_glob_component(&c.as_os_str().to_string_lossy()))
}

/// Longest leading run of components without glob syntax.
fn glob_base(pattern: &Path) -> (PathBuf, Vec<String>) {
    let mut base = PathBuf::new();
    let mut rest = Vec::new();
    for component in pattern.components() {
        let text = component.as_os_str().to_string_lossy().into_owned();
        if rest.is_empty() && !is_glob_component(&text) {
            base.push(component);
        } else if !matches!(component, Component::RootDir) {
            rest.push(text);
        }
    }
    (base, rest)
}

fn glob_files(pattern: &Path) -> Result<Vec<PathBuf>> {
    let pattern_text = pattern.to_string_lossy();
    let matcher = GlobBuilder::new(&pattern_text)
        .literal_separator(true)
        .backslash_escape(!cfg!(windows))
        .build()
        .with_context(|| format!("invalid glob {:?}", pattern_text))?
        .compile_matcher();

    let (base, rest) = glob_base(pattern);
    if !base.is_dir() {
        bail!("glob base directory {:?} does not exist", base);
    }

    let mut walker = WalkDir::new(&base).min_depth(1);
    if !rest.iter().any(|c| c.contains("**")) {
        walker = walker.max_depth(rest.len());
    }

    Ok(walker
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| matcher.is_match(path))
        .collect())
}

// ────────────────────────────────────────────────────────────────
// BatchSource
// ────────────────────────────────────────────────────────────────

/// Finite source over a precomputed list of paths.
#[derive(Debug, Default)]
pub struct BatchSource {
    paths: VecDeque<PathBuf>,
}

impl BatchSource {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl PathSource for BatchSource {
    fn next(&mut self) -> impl Future<Output = Option<CandidatePath>> + Send {
        let next = self.paths.pop_front().map(CandidatePath::from_enumeration);
        async move { next }
    }
}
