//! Alerting for status changes and persistent failures.
//!
//! This module handles:
//! - Failure-streak policy deciding which alert a result deserves
//! - Cooldown throttling per target and alert kind
//! - Delivery through the local notifier and the mail relay
//!
//! ## Submodules
//!
//! - `policy` - transition and streak rules
//! - `throttle` - cooldowns and the global switch
//! - `local` - desktop notification backends
//! - `dispatch` - routes permitted alerts to their channels

pub mod dispatch;
pub mod local;
pub mod policy;
pub mod throttle;

pub use dispatch::AlertDispatcher;
pub use local::{DesktopNotifier, LocalNotifier, LogNotifier};
pub use policy::{ESCALATION_THRESHOLD, FailurePolicy, STILL_DOWN_REMINDER_EVERY, Verdict};
pub use throttle::{DEFAULT_COOLDOWN_MINUTES, NotificationThrottler};

use crate::targets::{Status, Target};
use serde::Serialize;
use std::fmt;

/// Throttling key next to the target id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertKind {
    Up,
    Down,
    Critical,
    Summary,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlertKind::Up => "UP",
            AlertKind::Down => "DOWN",
            AlertKind::Critical => "CRITICAL",
            AlertKind::Summary => "SUMMARY",
        })
    }
}

/// Key used for alerts that are not about a single target.
pub const GLOBAL_ALERT_KEY: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub target_id: String,
    pub target_name: String,
    /// Address of the target; empty for summaries.
    pub target_url: String,
    pub kind: AlertKind,
    /// Status label, e.g. `DOWN` or `STILL DOWN (failures: 10)`.
    pub label: String,
    pub detail: Option<String>,
}

impl Alert {
    pub fn from_verdict(target: &Target, verdict: Verdict, status: &Status) -> Self {
        Self {
            target_id: target.id.clone(),
            target_name: target.name.clone(),
            target_url: target.url.clone(),
            kind: verdict.kind(),
            label: verdict.label(),
            detail: status.last_error.clone(),
        }
    }

    /// Digest of every target currently down.
    pub fn summary(down: &[String]) -> Self {
        Self {
            target_id: GLOBAL_ALERT_KEY.to_string(),
            target_name: down.join(", "),
            target_url: String::new(),
            kind: AlertKind::Summary,
            label: format!("{} server(s) down", down.len()),
            detail: None,
        }
    }

    pub fn title(&self) -> String {
        match self.kind {
            AlertKind::Up | AlertKind::Down => "Server status".to_string(),
            AlertKind::Critical => "CRITICAL - server status".to_string(),
            AlertKind::Summary => "Servers down".to_string(),
        }
    }

    pub fn message(&self) -> String {
        let mut text = match self.kind {
            AlertKind::Summary => format!("{}: {}", self.label, self.target_name),
            _ => format!("Server {} is now {}", self.target_name, self.label),
        };
        if let Some(detail) = &self.detail {
            text.push_str(" (");
            text.push_str(detail);
            text.push(')');
        }
        text
    }
}
