use anyhow::{Context, Result, anyhow, bail};
use futures::future::BoxFuture;
use std::path::Path;
use tokio::process::Command;

use crate::utils::absolute_clean;

/// Moves a converted source somewhere the user can still restore it from.
pub trait Recycler: Send + Sync + 'static {
    fn recycle<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>>;
}

/// The desktop trash of the current platform, driven through its own tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTrash;

impl Recycler for SystemTrash {
    fn recycle<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let abs_path = absolute_clean(path)
                .with_context(|| format!("failed to resolve {:?}", path))?;
            let mut cmd = trash_command(&abs_path)?;
            let output = cmd
                .output()
                .await
                .with_context(|| format!("failed to launch trash command for {:?}", abs_path))?;
            if !output.status.success() {
                return Err(anyhow!(
                    "trash command exited with status code {:?}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ));
            }
            Ok(())
        })
    }
}

/// Escape a value for an AppleScript double-quoted string literal.
pub fn applescript_quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Escape a value for a PowerShell single-quoted string literal.
pub fn powershell_quote(value: &str) -> String {
    value.replace('\'', "''")
}

fn trash_command(abs_path: &Path) -> Result<Command> {
    let path = abs_path.to_string_lossy();
    match std::env::consts::OS {
        "macos" => {
            let mut cmd = Command::new("osascript");
            cmd.arg("-e").arg(format!(
                "tell application \"Finder\" to move POSIX file \"{}\" to trash",
                applescript_quote(&path)
            ));
            Ok(cmd)
        }
        "linux" => {
            let gio = which::which("gio").context("gio command not found")?;
            let mut cmd = Command::new(gio);
            cmd.arg("trash").arg(abs_path);
            Ok(cmd)
        }
        "windows" => {
            let mut cmd = Command::new("powershell");
            cmd.arg("-NoProfile").arg("-Command").arg(format!(
                "Add-Type -AssemblyName Microsoft.VisualBasic; \
                 [Microsoft.VisualBasic.FileIO.FileSystem]::DeleteFile('{}', \
                 [Microsoft.VisualBasic.FileIO.UIOption]::OnlyErrorDialogs, \
                 [Microsoft.VisualBasic.FileIO.RecycleOption]::SendToRecycleBin)",
                powershell_quote(&path)
            ));
            Ok(cmd)
        }
        other => bail!("moving files to the trash is not supported on {}", other),
    }
}
