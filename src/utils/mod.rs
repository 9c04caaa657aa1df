use path_clean::PathClean;
use std::path::{Path, PathBuf};

pub trait PathExt {
    fn ext_lower(&self) -> String;
    fn is_hidden(&self) -> bool;
    fn file_name_lossy(&self) -> String;
}

impl PathExt for Path {
    fn ext_lower(&self) -> String {
        self.extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default()
    }

    fn is_hidden(&self) -> bool {
        self.file_name()
            .map(|name| name.to_string_lossy().starts_with('.'))
            .unwrap_or(false)
    }

    fn file_name_lossy(&self) -> String {
        self.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.to_string_lossy().into_owned())
    }
}

/// Expand a leading `~` or `~/` against `home`. Other inputs pass through.
pub fn expand_tilde(input: &str, home: Option<&Path>) -> PathBuf {
    match (input, home) {
        ("~", Some(home)) => home.to_path_buf(),
        (s, Some(home)) if s.starts_with("~/") => home.join(&s[2..]),
        (s, _) => PathBuf::from(s),
    }
}

/// Absolute, lexically normalised form of `path` (no filesystem access).
pub fn absolute_clean(path: impl AsRef<Path>) -> std::io::Result<PathBuf> {
    Ok(std::path::absolute(path.as_ref())?.clean())
}
