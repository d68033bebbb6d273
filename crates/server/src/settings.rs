//! User preferences persisted next to the target list.

use crate::alerts::DEFAULT_COOLDOWN_MINUTES;
use crate::error::PersistenceError;
use crate::mail::RelayConfig;
use crate::targets::persistence::{read_json, write_json_atomically};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where alerts are delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationMode {
    /// Desktop notifications only.
    #[default]
    InApp,
    /// Desktop notifications plus an email through the relay.
    Email,
    None,
}

impl NotificationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationMode::InApp => "inapp",
            NotificationMode::Email => "email",
            NotificationMode::None => "none",
        }
    }

    /// Whether alerts are raised at all in this mode.
    pub fn notifies(&self) -> bool {
        !matches!(self, NotificationMode::None)
    }
}

impl From<String> for NotificationMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "email" => NotificationMode::Email,
            "none" => NotificationMode::None,
            _ => NotificationMode::InApp,
        }
    }
}

impl From<NotificationMode> for String {
    fn from(value: NotificationMode) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// `auto`, `light` or `dark`; only stored for the front-end.
    pub theme: String,
    pub notification_mode: NotificationMode,
    /// Minutes between two alerts of the same kind for one target.
    pub notification_cooldown: u64,
    /// Seconds between front-end refreshes.
    pub refresh_interval: u64,
    /// Recipient of email alerts.
    pub user_email: String,
    #[serde(rename = "smtpConfig")]
    pub smtp: RelayConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: "auto".to_string(),
            notification_mode: NotificationMode::InApp,
            notification_cooldown: DEFAULT_COOLDOWN_MINUTES,
            refresh_interval: 30,
            user_email: String::new(),
            smtp: RelayConfig::default(),
        }
    }
}

/// Loads settings; a missing file yields [`Settings::default`].
#[tracing::instrument]
pub async fn load_settings(path: &Path) -> Result<Settings, PersistenceError> {
    Ok(read_json::<Settings>(path).await?.unwrap_or_default())
}

#[tracing::instrument(skip(settings))]
pub async fn save_settings(path: &Path, settings: &Settings) -> Result<(), PersistenceError> {
    write_json_atomically(path, settings).await
}
