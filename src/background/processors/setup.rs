//! Setup/initialization module - handles application startup tasks
//!
//! Includes:
//! - Logger initialization
//! - FFmpeg availability check
//! - Output folder creation

use anstyle::{AnsiColor, Style};
use anyhow::{Context, Result};
use env_logger::{Builder, Env};
use log::{error, info, kv::Key};
use std::{
    io::Write,
    path::{Path, PathBuf},
    process::Command,
};

// ────────────────────────────────────────────────────────────────
// Logger Initialization
// ────────────────────────────────────────────────────────────────

const DIM: Style = Style::new().fg_color(Some(anstyle::Color::Ansi(AnsiColor::BrightBlack)));
const DURATION: Style = Style::new().fg_color(Some(anstyle::Color::Ansi(AnsiColor::Cyan)));

/// Format a `duration` key-value (e.g. `1.234567s`) as `1.23 s`.
pub fn format_duration_field(raw: &str) -> String {
    if let Some(idx) = raw.find(|c: char| c.is_alphabetic()) {
        let (num, unit) = (&raw[..idx], &raw[idx..]);
        if let Ok(val) = num.parse::<f32>() {
            return format!("{:.2} {}", val, unit);
        }
    }
    raw.to_string()
}

/// Install the global logger. `RUST_LOG` overrides the default `info` level.
pub fn initialize_logger() {
    let result = Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = buf.timestamp();
            let level_style = buf.default_level_style(record.level());

            let dur_raw = record
                .key_values()
                .get(Key::from("duration"))
                .map(|v| format_duration_field(&v.to_string()))
                .unwrap_or_default();

            let dur = if dur_raw.is_empty() {
                " ".repeat(10)
            } else {
                format!("{DURATION}{:>10}{DURATION:#}", dur_raw)
            };

            writeln!(
                buf,
                "{DIM}{}{DIM:#} {level_style}{:<5}{level_style:#} {DIM}{}{DIM:#}",
                ts,
                record.level(),
                record.target()
            )?;

            let message = format!("{}", record.args());
            let subsequent_indent = " ".repeat(11);
            let mut lines = message.lines();

            if let Some(first_line) = lines.next() {
                writeln!(buf, "{} {}", dur, first_line)?;
            }
            for line in lines {
                writeln!(buf, "{}{}", subsequent_indent, line)?;
            }
            Ok(())
        })
        .filter(Some("notify"), log::LevelFilter::Warn)
        .try_init();

    if let Err(err) = result {
        eprintln!("Logger already initialized: {}", err);
    }
}

// ────────────────────────────────────────────────────────────────
// FFmpeg Check
// ────────────────────────────────────────────────────────────────

/// Probe the configured ffmpeg binary. Returns whether it answered `-version`.
pub fn check_ffmpeg(bin: &Path) -> bool {
    match Command::new(bin).arg("-version").output() {
        Ok(output) if output.status.success() => {
            let version_info = String::from_utf8_lossy(&output.stdout);
            let version_number = version_info
                .lines()
                .next()
                .unwrap_or("Unknown version")
                .split_whitespace()
                .nth(2)
                .unwrap_or("Unknown");
            info!("{} version: {}", bin.display(), version_number);
            true
        }
        Ok(_) => {
            error!(
                "`{}` was found, but it returned an error. Please ensure it's correctly installed.",
                bin.display()
            );
            false
        }
        Err(_) => {
            error!(
                "`{}` is not installed or not available in PATH. Every conversion will fail until it is.",
                bin.display()
            );
            false
        }
    }
}

// ────────────────────────────────────────────────────────────────
// Folder Initialization
// ────────────────────────────────────────────────────────────────

pub fn initialize_output_folder(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {:?}", dir))?;
    Ok(dir.to_path_buf())
}
