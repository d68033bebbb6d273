//! Plain-text email bodies for alerts sent through the mail relay.

use crate::alerts::{Alert, AlertKind};

/// Email for a single target's status change or failure streak.
pub struct AlertEmailTemplate {
    pub server_name: String,
    pub server_url: String,
    pub kind: AlertKind,
    /// Status label, e.g. `DOWN` or `STILL DOWN (failures: 10)`.
    pub label: String,
    pub failure_reason: Option<String>,
}

impl AlertEmailTemplate {
    pub fn from_alert(alert: &Alert) -> Self {
        Self {
            server_name: alert.target_name.clone(),
            server_url: alert.target_url.clone(),
            kind: alert.kind,
            label: alert.label.clone(),
            failure_reason: alert.detail.clone(),
        }
    }

    pub fn subject(&self) -> String {
        format!("ALERT: {} is {}", self.server_name, self.label)
    }

    #[tracing::instrument(skip(self))]
    pub fn render_text(&self) -> String {
        let reason = match &self.failure_reason {
            Some(reason) => format!("\nLast error: {reason}\n"),
            None => String::new(),
        };

        let footer = match self.kind {
            AlertKind::Up => "Monitoring continues as usual.",
            AlertKind::Critical => {
                "The server keeps failing its checks and needs attention."
            }
            _ => "You will be notified again if the problem persists.",
        };

        format!(
            r#"Hello,

The server '{}' ({}) is now {}.
{}
{}

--
Uptime Monitor"#,
            self.server_name, self.server_url, self.label, reason, footer
        )
    }
}

/// Digest listing every target currently down.
pub struct SummaryEmailTemplate {
    pub down: Vec<String>,
}

impl SummaryEmailTemplate {
    pub fn subject(&self) -> String {
        format!("ALERT: {} server(s) down", self.down.len())
    }

    #[tracing::instrument(skip(self))]
    pub fn render_text(&self) -> String {
        let list: String = self
            .down
            .iter()
            .map(|name| format!("  - {name}\n"))
            .collect();

        format!(
            r#"Hello,

The following servers are currently down:

{}
--
Uptime Monitor"#,
            list
        )
    }
}

/// Sent on request to check the relay settings end to end.
pub struct TestEmailTemplate {
    pub relay_host: String,
    pub relay_port: u16,
    pub username: String,
    pub tls: bool,
}

impl TestEmailTemplate {
    pub fn subject(&self) -> String {
        "Uptime Monitor test email".to_string()
    }

    #[tracing::instrument(skip(self))]
    pub fn render_text(&self) -> String {
        format!(
            r#"Hello,

This is a test message from your uptime monitor.

Settings used:
  - Server: {}:{}
  - User: {}
  - STARTTLS: {}

If you can read it, email alerts are configured correctly.

--
Uptime Monitor"#,
            self.relay_host, self.relay_port, self.username, self.tls
        )
    }
}
