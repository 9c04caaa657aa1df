//! Video conversion - everything that touches the ffmpeg binary
//!
//! Includes:
//! - The argument template for a 1080p H.264 conversion
//! - Output naming from the source modification time
//! - Running ffmpeg and turning its exit status into a `Result`

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Local};
use futures::future::BoxFuture;
use log::debug;
use std::{
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::{fs, process::Command};

use crate::{
    common::{
        MAX_OUTPUT_NAME_ATTEMPTS, OUTPUT_EXTENSION, OUTPUT_STAMP_FORMAT, TARGET_HEIGHT,
        TARGET_WIDTH,
    },
    config::TranscodeOptions,
};

/// Runs one conversion from `input` to `output`.
pub trait Transcoder: Send + Sync + 'static {
    fn transcode<'a>(&'a self, input: &'a Path, output: &'a Path) -> BoxFuture<'a, Result<()>>;
}

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    options: TranscodeOptions,
}

impl FfmpegTranscoder {
    pub fn new(options: TranscodeOptions) -> Self {
        Self { options }
    }
}

impl Transcoder for FfmpegTranscoder {
    fn transcode<'a>(&'a self, input: &'a Path, output: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let bin = &self.options.ffmpeg_bin;
            let result = Command::new(bin)
                .args(self.options.args(input, output))
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await
                .with_context(|| format!("failed to launch {:?}", bin))?;

            if result.status.success() {
                return Ok(());
            }

            let mut diagnostic = String::from_utf8_lossy(&result.stdout).into_owned();
            diagnostic.push_str(&String::from_utf8_lossy(&result.stderr));
            Err(anyhow!(
                "ffmpeg exited with status code {:?} for {:?}:\n{}",
                result.status.code().unwrap_or(-1),
                input,
                diagnostic.trim_end()
            ))
        })
    }
}

// ────────────────────────────────────────────────────────────────
// Argument template
// ────────────────────────────────────────────────────────────────

impl TranscodeOptions {
    /// `scale` (and optionally `pad`) chain fitting the 1080p frame.
    pub fn video_filter(&self) -> String {
        let mut vf = format!(
            "scale={}:{}:force_original_aspect_ratio=decrease",
            TARGET_WIDTH, TARGET_HEIGHT
        );
        if self.pad {
            vf.push_str(&format!(
                ",pad={}:{}:(ow-iw)/2:(oh-ih)/2",
                TARGET_WIDTH, TARGET_HEIGHT
            ));
        }
        vf
    }

    pub fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::with_capacity(32);

        // Global options must come before the input.
        push_args(&mut args, &["-nostdin", "-hide_banner", "-nostats"]);
        push_args(&mut args, &["-loglevel", "error", "-y", "-i"]);
        args.push(input.as_os_str().to_owned());

        push_args(&mut args, &["-vcodec", "libx264"]);
        push_args(&mut args, &["-preset", &self.preset]);
        push_args(&mut args, &["-crf", &self.crf.to_string()]);
        push_args(&mut args, &["-vf", &self.video_filter()]);
        push_args(&mut args, &["-movflags", "+faststart"]);

        if let Some(fps) = self.fps {
            push_args(&mut args, &["-r", &fps.to_string()]);
        }

        if self.mute {
            push_args(&mut args, &["-an"]);
        } else {
            push_args(&mut args, &["-acodec", "aac", "-b:a", "128k", "-ac", "2"]);
        }

        args.push(output.as_os_str().to_owned());
        args
    }
}

fn push_args(args: &mut Vec<OsString>, values: &[&str]) {
    args.extend(values.iter().map(OsString::from));
}

// ────────────────────────────────────────────────────────────────
// Output naming
// ────────────────────────────────────────────────────────────────

/// Date-time stem for `input`: its modification time, or now when unavailable.
pub async fn output_stamp(input: &Path) -> String {
    let when: DateTime<Local> = match fs::metadata(input).await.and_then(|m| m.modified()) {
        Ok(modified) => modified.into(),
        Err(err) => {
            debug!("No modification time for {:?} ({}), using now", input, err);
            Local::now()
        }
    };
    when.format(OUTPUT_STAMP_FORMAT).to_string()
}

pub fn output_file_name(stamp: &str, attempt: u32) -> String {
    if attempt == 0 {
        format!("{}.{}", stamp, OUTPUT_EXTENSION)
    } else {
        format!("{}_{}.{}", stamp, attempt, OUTPUT_EXTENSION)
    }
}

/// Pick the first free output name for `input` inside `dir` and create it
/// empty so concurrent jobs with the same stamp cannot pick it too.
pub async fn reserve_output_path(input: &Path, dir: &Path) -> Result<PathBuf> {
    let stamp = output_stamp(input).await;
    for attempt in 0..MAX_OUTPUT_NAME_ATTEMPTS {
        let candidate = dir.join(output_file_name(&stamp, attempt));
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to reserve output file {:?}", candidate));
            }
        }
    }
    bail!(
        "no free output name for {:?} in {:?} after {} attempts",
        input,
        dir,
        MAX_OUTPUT_NAME_ATTEMPTS
    )
}

/// Remove a reserved or half-written output after a failed conversion.
pub async fn discard_output(output: &Path) {
    match fs::remove_file(output).await {
        Ok(()) => debug!("Removed incomplete output {:?}", output),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => log::warn!("Failed to remove incomplete output {:?}: {}", output, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{FileTime, set_file_mtime};
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    fn value_after(args: &[String], flag: &str) -> Option<String> {
        args.iter()
            .position(|arg| arg == flag)
            .and_then(|i| args.get(i + 1).cloned())
    }

    #[test]
    fn default_template_matches_the_conversion_contract() {
        let options = TranscodeOptions::default();
        let args = strings(&options.args(Path::new("/in/a.mov"), Path::new("/out/b.mp4")));

        assert_eq!(value_after(&args, "-i").as_deref(), Some("/in/a.mov"));
        assert_eq!(value_after(&args, "-vcodec").as_deref(), Some("libx264"));
        assert_eq!(value_after(&args, "-preset").as_deref(), Some("faster"));
        assert_eq!(value_after(&args, "-crf").as_deref(), Some("22"));
        assert_eq!(
            value_after(&args, "-vf").as_deref(),
            Some("scale=1920:1080:force_original_aspect_ratio=decrease,pad=1920:1080:(ow-iw)/2:(oh-ih)/2")
        );
        assert_eq!(value_after(&args, "-movflags").as_deref(), Some("+faststart"));
        assert_eq!(value_after(&args, "-r").as_deref(), Some("30"));
        assert_eq!(value_after(&args, "-acodec").as_deref(), Some("aac"));
        assert_eq!(value_after(&args, "-b:a").as_deref(), Some("128k"));
        assert_eq!(value_after(&args, "-ac").as_deref(), Some("2"));
        assert_eq!(args.last().map(String::as_str), Some("/out/b.mp4"));

        let input_at = args.iter().position(|a| a == "-i").unwrap();
        let yes_at = args.iter().position(|a| a == "-y").unwrap();
        assert!(yes_at < input_at);
    }

    #[test]
    fn muted_unpadded_uncapped_template() {
        let options = TranscodeOptions {
            crf: 28,
            preset: "slow".to_string(),
            fps: None,
            mute: true,
            pad: false,
            ..TranscodeOptions::default()
        };
        let args = strings(&options.args(Path::new("in.mov"), Path::new("out.mp4")));

        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"-acodec".to_string()));
        assert!(!args.contains(&"-r".to_string()));
        assert_eq!(value_after(&args, "-crf").as_deref(), Some("28"));
        assert_eq!(
            value_after(&args, "-vf").as_deref(),
            Some("scale=1920:1080:force_original_aspect_ratio=decrease")
        );
    }

    #[test]
    fn numbered_names_only_after_the_first_attempt() {
        assert_eq!(output_file_name("2024-05-01_09-03-07", 0), "2024-05-01_09-03-07.mp4");
        assert_eq!(output_file_name("2024-05-01_09-03-07", 2), "2024-05-01_09-03-07_2.mp4");
    }

    #[tokio::test]
    async fn output_name_comes_from_modification_time() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("Screen Recording.mov");
        std::fs::write(&input, b"frames").unwrap();
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        set_file_mtime(&input, FileTime::from_system_time(mtime)).unwrap();

        let expected: DateTime<Local> = mtime.into();
        let expected = format!("{}.mp4", expected.format("%Y-%m-%d_%H-%M-%S"));

        let out_dir = tempdir().unwrap();
        let reserved = reserve_output_path(&input, out_dir.path()).await.unwrap();
        assert_eq!(reserved, out_dir.path().join(&expected));
        assert!(reserved.exists());
    }

    #[tokio::test]
    async fn taken_names_get_a_numeric_suffix() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clip.mov");
        std::fs::write(&input, b"frames").unwrap();

        let first = reserve_output_path(&input, dir.path()).await.unwrap();
        let second = reserve_output_path(&input, dir.path()).await.unwrap();
        assert_ne!(first, second);
        let stem = first.file_stem().unwrap().to_string_lossy().into_owned();
        assert_eq!(
            second.file_name().unwrap().to_string_lossy(),
            format!("{}_1.mp4", stem)
        );
    }

    #[tokio::test]
    async fn missing_input_falls_back_to_wall_clock() {
        let before = Local::now().format(OUTPUT_STAMP_FORMAT).to_string();
        let stamp = output_stamp(Path::new("/definitely/not/here.mov")).await;
        let after = Local::now().format(OUTPUT_STAMP_FORMAT).to_string();
        assert!(before <= stamp && stamp <= after);
    }

    #[tokio::test]
    async fn launch_failure_is_an_error() {
        let dir = tempdir().unwrap();
        let transcoder = FfmpegTranscoder::new(TranscodeOptions {
            ffmpeg_bin: dir.path().join("no-such-ffmpeg"),
            ..TranscodeOptions::default()
        });
        let err = transcoder
            .transcode(&dir.path().join("a.mov"), &dir.path().join("a.mp4"))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("failed to launch"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_the_tool_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let fake = dir.path().join("fake-ffmpeg");
        std::fs::write(&fake, "#!/bin/sh\necho 'Invalid data found' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let transcoder = FfmpegTranscoder::new(TranscodeOptions {
            ffmpeg_bin: fake,
            ..TranscodeOptions::default()
        });
        let err = transcoder
            .transcode(&dir.path().join("a.mov"), &dir.path().join("a.mp4"))
            .await
            .unwrap_err();
        let text = format!("{:#}", err);
        assert!(text.contains("status code 1"), "{text}");
        assert!(text.contains("Invalid data found"), "{text}");
    }
}
