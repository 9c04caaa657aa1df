use anyhow::{Result, bail};
use chrono::{DateTime, Local};
use dotenv::dotenv;
use log::debug;
use serde::Deserialize;
use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::common::{
    BATCH_STAMP_FORMAT, DEFAULT_CRF, DEFAULT_FFMPEG_BIN, DEFAULT_FPS, DEFAULT_PRESET,
    DEFAULT_SETTLE_DELAY, DEFAULT_SETTLE_MAX_POLLS, DEFAULT_SETTLE_POLL, ENV_PREFIX,
    VALID_VIDEO_EXTENSIONS, default_concurrency,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Convert every match of the given patterns once, then exit.
    Batch { patterns: Vec<String> },
    /// Watch one directory until stopped.
    Watch { target: PathBuf },
}

/// Everything one run needs, built once and shared by reference.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub output: OutputLayout,
    pub concurrency: NonZeroUsize,
    pub transcode: TranscodeOptions,
    pub keywords: Vec<String>,
    pub extensions: Vec<String>,
    pub settle: SettleOptions,
    /// Move sources to the trash after a successful conversion.
    pub trash: bool,
    /// Desktop notifications for watch-mode outcomes.
    pub notify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOptions {
    pub ffmpeg_bin: PathBuf,
    pub crf: u8,
    pub preset: String,
    /// `None` leaves the source frame rate untouched.
    pub fps: Option<u32>,
    pub mute: bool,
    /// Letterbox to the full target resolution instead of only scaling down.
    pub pad: bool,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            ffmpeg_bin: PathBuf::from(DEFAULT_FFMPEG_BIN),
            crf: DEFAULT_CRF,
            preset: DEFAULT_PRESET.to_string(),
            fps: Some(DEFAULT_FPS),
            mute: false,
            pad: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleOptions {
    pub delay: Duration,
    pub poll: Duration,
    pub max_polls: u32,
}

impl Default for SettleOptions {
    fn default() -> Self {
        Self {
            delay: DEFAULT_SETTLE_DELAY,
            poll: DEFAULT_SETTLE_POLL,
            max_polls: DEFAULT_SETTLE_MAX_POLLS,
        }
    }
}

/// Where converted files go: an absolute base, optionally with a dated run folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub base: PathBuf,
    pub stamp: bool,
}

impl OutputLayout {
    pub fn new(base: impl Into<PathBuf>, stamp: bool) -> Self {
        Self {
            base: base.into(),
            stamp,
        }
    }

    /// Directory for jobs started at `now`.
    pub fn resolve(&self, now: DateTime<Local>) -> PathBuf {
        if self.stamp {
            self.base.join(now.format(BATCH_STAMP_FORMAT).to_string())
        } else {
            self.base.clone()
        }
    }

    pub fn resolve_now(&self) -> PathBuf {
        self.resolve(Local::now())
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.transcode.crf > 51 {
            bail!("crf must be between 0 and 51, got {}", self.transcode.crf);
        }
        if self.transcode.preset.trim().is_empty() {
            bail!("encoder preset must not be empty");
        }
        if self.extensions.is_empty() {
            bail!("at least one recognised media extension is required");
        }
        if self.settle.poll.is_zero() {
            bail!("settle poll interval must be greater than zero");
        }
        if let Mode::Batch { patterns } = &self.mode {
            if patterns.is_empty() {
                bail!("batch mode needs at least one input pattern");
            }
        }
        Ok(())
    }
}

pub fn default_extensions() -> Vec<String> {
    VALID_VIDEO_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

pub fn default_concurrency_non_zero() -> NonZeroUsize {
    NonZeroUsize::new(default_concurrency()).unwrap_or(NonZeroUsize::MIN)
}

// ────────────────────────────────────────────────────────────────
// Environment overrides
// ────────────────────────────────────────────────────────────────

/// Knobs read from `REC_WATCH_*` variables (a `.env` file is honoured).
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnvOverrides {
    pub ffmpeg_bin: Option<PathBuf>,
    pub settle_delay_ms: Option<u64>,
    pub settle_poll_ms: Option<u64>,
    pub settle_max_polls: Option<u32>,
    pub extensions: Option<Vec<String>>,
}

impl EnvOverrides {
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_iter(std::env::vars())
    }

    pub fn from_iter<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let overrides: Self = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        debug!("Environment overrides: {:?}", overrides);
        Ok(overrides)
    }

    pub fn settle(&self) -> SettleOptions {
        let defaults = SettleOptions::default();
        SettleOptions {
            delay: self
                .settle_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay),
            poll: self
                .settle_poll_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll),
            max_polls: self.settle_max_polls.unwrap_or(defaults.max_polls),
        }
    }

    pub fn extensions(&self) -> Vec<String> {
        match &self.extensions {
            Some(list) => list
                .iter()
                .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
            None => default_extensions(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn sample_config() -> Config {
        Config {
            mode: Mode::Batch {
                patterns: vec![".".to_string()],
            },
            output: OutputLayout::new("/tmp/out", true),
            concurrency: NonZeroUsize::MIN,
            transcode: TranscodeOptions::default(),
            keywords: Vec::new(),
            extensions: default_extensions(),
            settle: SettleOptions::default(),
            trash: true,
            notify: true,
        }
    }

    #[test]
    fn stamped_layout_appends_run_date() {
        let layout = OutputLayout::new("/tmp/out", true);
        let now = Local.with_ymd_and_hms(2024, 3, 9, 23, 59, 1).unwrap();
        assert_eq!(layout.resolve(now), PathBuf::from("/tmp/out/20240309"));

        let flat = OutputLayout::new("/tmp/out", false);
        assert_eq!(flat.resolve(now), PathBuf::from("/tmp/out"));
    }

    #[test]
    fn env_overrides_are_prefixed() {
        let overrides = EnvOverrides::from_iter(vars(&[
            ("REC_WATCH_FFMPEG_BIN", "/opt/ffmpeg/bin/ffmpeg"),
            ("REC_WATCH_SETTLE_DELAY_MS", "250"),
            ("REC_WATCH_EXTENSIONS", ".MOV,webm"),
            ("FFMPEG_BIN", "ignored"),
        ]))
        .unwrap();

        assert_eq!(
            overrides.ffmpeg_bin,
            Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg"))
        );
        assert_eq!(overrides.settle().delay, Duration::from_millis(250));
        assert_eq!(overrides.settle().poll, DEFAULT_SETTLE_POLL);
        assert_eq!(overrides.extensions(), vec!["mov", "webm"]);
    }

    #[test]
    fn missing_env_falls_back_to_defaults() {
        let overrides = EnvOverrides::from_iter(Vec::new()).unwrap();
        assert_eq!(overrides, EnvOverrides::default());
        assert_eq!(overrides.settle(), SettleOptions::default());
        assert_eq!(overrides.extensions(), default_extensions());
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(sample_config().validate().is_ok());

        let mut config = sample_config();
        config.transcode.crf = 60;
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.transcode.preset = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.extensions.clear();
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.mode = Mode::Batch {
            patterns: Vec::new(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_concurrency_is_at_least_one() {
        assert!(default_concurrency_non_zero().get() >= 1);
    }
}
