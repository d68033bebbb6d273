//! Desktop notification backends.

use super::Alert;
use std::process::Stdio;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Desktop notification failed: {0}")]
pub struct NotifyError(pub String);

/// Shows an alert to the local user.
pub trait LocalNotifier: Send + Sync {
    fn notify(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Writes alerts to the log only. Used headless and as a fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl LocalNotifier for LogNotifier {
    fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        tracing::warn!(
            name = "alerts.local.notify",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            kind = %alert.kind,
            server_name = %alert.target_name,
            message = %alert.message(),
        );
        Ok(())
    }
}

/// Raises a desktop notification through the platform's notification tool
/// (`notify-send` on Linux and BSD, `osascript` on macOS) and logs it as well.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl LocalNotifier for DesktopNotifier {
    fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        LogNotifier.notify(alert)?;

        let title = alert.title();
        let body = alert.message();
        let mut cmd = if cfg!(target_os = "macos") {
            let script = format!(
                "display notification {} with title {}",
                applescript_quote(&body),
                applescript_quote(&title)
            );
            let mut cmd = tokio::process::Command::new("osascript");
            cmd.args(["-e", script.as_str()]);
            cmd
        } else {
            let mut cmd = tokio::process::Command::new("notify-send");
            cmd.args([title.as_str(), body.as_str()]);
            cmd
        };

        // The child is reaped by the runtime; we do not wait for the popup.
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|e| NotifyError(e.to_string()))
    }
}

fn applescript_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
