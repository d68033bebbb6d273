//! Monitored targets and their last known status.
//!
//! - `store` - the lock-guarded set of targets shared by every check loop
//! - `persistence` - JSON load/save of the target list

pub mod persistence;
pub mod store;

pub use persistence::{load_targets, save_targets};
pub use store::TargetStore;

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// How a target is checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Protocol {
    Http,
    Tcp,
    Ping,
    /// A kind this build cannot probe, kept verbatim so it round-trips.
    Unsupported(String),
}

impl Protocol {
    pub fn as_str(&self) -> &str {
        match self {
            Protocol::Http => "http",
            Protocol::Tcp => "tcp",
            Protocol::Ping => "ping",
            Protocol::Unsupported(kind) => kind,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Protocol::Unsupported(_))
    }
}

impl From<String> for Protocol {
    fn from(value: String) -> Self {
        match value.as_str() {
            "http" => Protocol::Http,
            "tcp" => Protocol::Tcp,
            "ping" => Protocol::Ping,
            _ => Protocol::Unsupported(value),
        }
    }
}

impl From<&str> for Protocol {
    fn from(value: &str) -> Self {
        Protocol::from(value.to_string())
    }
}

impl From<Protocol> for String {
    fn from(value: Protocol) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the most recent check. Replaced wholesale after every probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub is_up: bool,
    #[serde(default)]
    pub response_time_ms: u64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_check: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Status {
    pub fn up(response_time_ms: u64) -> Self {
        Self {
            is_up: true,
            response_time_ms,
            last_check: Some(OffsetDateTime::now_utc()),
            last_error: None,
        }
    }

    pub fn down(response_time_ms: u64, error: impl Into<String>) -> Self {
        Self {
            is_up: false,
            response_time_ms,
            last_check: Some(OffsetDateTime::now_utc()),
            last_error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// URL for http, `host:port` for tcp, host or URL for ping.
    pub url: String,
    #[serde(rename = "type")]
    pub protocol: Protocol,
    #[serde(default)]
    pub interval: String,
    #[serde(default)]
    pub timeout: String,
    #[serde(default)]
    pub status: Status,
}

impl Target {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        protocol: impl Into<Protocol>,
    ) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            url: url.into(),
            protocol: protocol.into(),
            interval: String::new(),
            timeout: String::new(),
            status: Status::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = interval.into();
        self
    }

    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = timeout.into();
        self
    }
}

/// Checks the user-editable fields of a target.
pub fn validate(target: &Target) -> Result<(), ValidationError> {
    if target.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if target.url.trim().is_empty() {
        return Err(ValidationError::EmptyAddress);
    }
    if let Protocol::Unsupported(kind) = &target.protocol {
        return Err(ValidationError::UnsupportedProtocol(kind.clone()));
    }
    Ok(())
}
