pub mod errors;

use std::time::Duration;

pub const VALID_VIDEO_EXTENSIONS: &'static [&'static str] = &["mov", "mp4", "m4v", "avi", "mkv"];

/// Extension of every file the transcoder produces.
pub const OUTPUT_EXTENSION: &str = "mp4";

/// `chrono` format used for output file names.
pub const OUTPUT_STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// `chrono` format used for the per-run output directory.
pub const BATCH_STAMP_FORMAT: &str = "%Y%m%d";

pub const TARGET_WIDTH: u32 = 1920;

pub const TARGET_HEIGHT: u32 = 1080;

pub const DEFAULT_CRF: u8 = 22;

pub const DEFAULT_PRESET: &str = "faster";

pub const DEFAULT_FPS: u32 = 30;

pub const DEFAULT_FFMPEG_BIN: &str = "ffmpeg";

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

pub const DEFAULT_SETTLE_POLL: Duration = Duration::from_millis(500);

pub const DEFAULT_SETTLE_MAX_POLLS: u32 = 20;

/// Upper bound on `_N` suffixes tried when an output name is taken.
pub const MAX_OUTPUT_NAME_ATTEMPTS: u32 = 1000;

pub const ENV_PREFIX: &str = "REC_WATCH_";

/// One core is left for the watcher and the rest of the desktop.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}
