use std::{collections::HashSet, path::Path};

use crate::utils::PathExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Hidden,
    UnrecognizedExtension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Eligible,
    Ignored(IgnoreReason),
}

impl Classification {
    pub fn is_eligible(self) -> bool {
        matches!(self, Classification::Eligible)
    }
}

/// Decides whether a path looks like a media file worth converting.
#[derive(Debug, Clone)]
pub struct PathClassifier {
    extensions: HashSet<String>,
}

impl PathClassifier {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    pub fn classify(&self, path: &Path) -> Classification {
        if path.is_hidden() {
            return Classification::Ignored(IgnoreReason::Hidden);
        }
        if !self.is_recognized_extension(path) {
            return Classification::Ignored(IgnoreReason::UnrecognizedExtension);
        }
        Classification::Eligible
    }

    pub fn is_recognized_extension(&self, path: &Path) -> bool {
        let ext = path.ext_lower();
        !ext.is_empty() && self.extensions.contains(&ext)
    }
}
