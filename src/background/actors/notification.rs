use anyhow::{Context, Result, anyhow, bail};
use futures::future::BoxFuture;
use log::{debug, warn};
use std::path::Path;
use tokio::process::Command;
use url::Url;

use super::{report::OutcomeSink, trash::applescript_quote};
use crate::{
    background::types::{JobOutcome, JobReport},
    utils::PathExt,
};

/// Title, body and an optional file to open when the notification is clicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub open: Option<String>,
}

impl Notification {
    pub fn for_report(report: &JobReport) -> Self {
        let name = report.input.file_name_lossy();
        match &report.outcome {
            JobOutcome::Success { output } => Self {
                title: "Conversion finished".to_string(),
                message: format!("{} was converted.", name),
                open: file_url(output),
            },
            JobOutcome::Failure { .. } => Self {
                title: "Conversion failed".to_string(),
                message: format!("{} could not be converted.", name),
                open: None,
            },
        }
    }
}

fn file_url(path: &Path) -> Option<String> {
    Url::from_file_path(path).ok().map(String::from)
}

/// Desktop notifications through `terminal-notifier`, falling back to the
/// platform's own scripting tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    pub async fn send(&self, notification: &Notification) -> Result<()> {
        let mut cmd = notification_command(notification)?;
        let status = cmd
            .status()
            .await
            .context("failed to launch notification command")?;
        if !status.success() {
            return Err(anyhow!(
                "notification command exited with status code {:?}",
                status.code().unwrap_or(-1)
            ));
        }
        Ok(())
    }
}

impl OutcomeSink for DesktopNotifier {
    fn report<'a>(&'a self, report: &'a JobReport) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let notification = Notification::for_report(report);
            match self.send(&notification).await {
                Ok(()) => debug!("Sent notification: {}", notification.title),
                Err(err) => warn!("Failed to send notification: {:#}", err),
            }
        })
    }
}

fn notification_command(notification: &Notification) -> Result<Command> {
    if let Ok(notifier) = which::which("terminal-notifier") {
        let mut cmd = Command::new(notifier);
        cmd.args(["-title", notification.title.as_str()])
            .args(["-message", notification.message.as_str()])
            .args(["-sound", "default"]);
        if let Some(open) = &notification.open {
            cmd.args(["-open", open.as_str()]);
        }
        return Ok(cmd);
    }

    match std::env::consts::OS {
        "macos" => {
            let mut cmd = Command::new("osascript");
            cmd.arg("-e").arg(format!(
                "display notification \"{}\" with title \"{}\" sound name \"default\"",
                applescript_quote(&notification.message),
                applescript_quote(&notification.title)
            ));
            Ok(cmd)
        }
        "linux" => {
            let notify_send = which::which("notify-send").context("notify-send not found")?;
            let mut cmd = Command::new(notify_send);
            cmd.arg(&notification.title).arg(&notification.message);
            Ok(cmd)
        }
        other => bail!("desktop notifications are not supported on {}", other),
    }
}
