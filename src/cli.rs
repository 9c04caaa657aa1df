use anyhow::Result;
use clap::Parser;
use path_clean::PathClean;
use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use crate::{
    common::{DEFAULT_CRF, DEFAULT_FFMPEG_BIN, DEFAULT_FPS, DEFAULT_PRESET},
    config::{
        Config, EnvOverrides, Mode, OutputLayout, TranscodeOptions, default_concurrency_non_zero,
    },
    utils::expand_tilde,
};

/// Convert screen recordings to compact 1080p H.264, once or as they appear.
#[derive(Parser, Debug)]
#[command(name = "rec-watch", author, version, about, long_about = None)]
pub struct Cli {
    /// Files, directories or glob patterns to convert; with --watch, the directory to watch
    pub paths: Vec<String>,

    /// Watch a directory and convert new recordings as they arrive
    #[arg(short, long)]
    pub watch: bool,

    /// Output directory [default: ./out]
    #[arg(short, long)]
    pub dest: Option<PathBuf>,

    /// Constant rate factor, lower is better quality
    #[arg(long, default_value_t = DEFAULT_CRF, value_parser = clap::value_parser!(u8).range(0..=51))]
    pub crf: u8,

    /// x264 encoder preset
    #[arg(long, default_value = DEFAULT_PRESET)]
    pub preset: String,

    /// Frame rate cap, 0 keeps the source rate
    #[arg(long, default_value_t = DEFAULT_FPS)]
    pub fps: u32,

    /// Drop the audio track
    #[arg(long)]
    pub mute: bool,

    /// Only convert paths containing one of these words (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    pub keywords: Vec<String>,

    /// Scale down without letterboxing to the full 1920x1080 frame
    #[arg(long)]
    pub no_pad: bool,

    /// Keep sources instead of moving them to the trash
    #[arg(long)]
    pub no_trash: bool,

    /// Write straight into --dest instead of a dated subdirectory
    #[arg(long)]
    pub no_batch_stamp: bool,

    /// Path to the ffmpeg binary
    #[arg(long)]
    pub ffmpeg_bin: Option<PathBuf>,

    /// Maximum simultaneous conversions [default: CPU count - 1]
    #[arg(short = 'j', long)]
    pub concurrent: Option<NonZeroUsize>,

    /// Disable desktop notifications in watch mode
    #[arg(long)]
    pub no_notify: bool,
}

impl Cli {
    /// Merge flags over environment overrides over defaults, relative to `cwd`.
    pub fn into_config(
        self,
        env: &EnvOverrides,
        cwd: &Path,
        home: Option<&Path>,
    ) -> Result<Config> {
        let mode = if self.watch {
            let target = self.paths.first().map(String::as_str).unwrap_or(".");
            Mode::Watch {
                target: absolute_from(cwd, expand_tilde(target, home)),
            }
        } else if self.paths.is_empty() {
            Mode::Batch {
                patterns: vec![".".to_string()],
            }
        } else {
            Mode::Batch {
                patterns: self.paths,
            }
        };

        let dest = self.dest.unwrap_or_else(|| PathBuf::from("out"));
        let ffmpeg_bin = self
            .ffmpeg_bin
            .or_else(|| env.ffmpeg_bin.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FFMPEG_BIN));

        let config = Config {
            mode,
            output: OutputLayout::new(absolute_from(cwd, dest), !self.no_batch_stamp),
            concurrency: self.concurrent.unwrap_or_else(default_concurrency_non_zero),
            transcode: TranscodeOptions {
                ffmpeg_bin,
                crf: self.crf,
                preset: self.preset,
                fps: (self.fps > 0).then_some(self.fps),
                mute: self.mute,
                pad: !self.no_pad,
            },
            keywords: self
                .keywords
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            extensions: env.extensions(),
            settle: env.settle(),
            trash: !self.no_trash,
            notify: !self.no_notify,
        };
        config.validate()?;
        Ok(config)
    }
}

fn absolute_from(cwd: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path.clean()
    } else {
        cwd.join(path).clean()
    }
}
