use serde::Deserialize;
use std::net::IpAddr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: IpAddr,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// JSON file holding the monitored targets.
    #[serde(default = "default_targets_file")]
    pub targets_file: PathBuf,
    /// JSON file holding the user's settings.
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,
    /// Envelope sender of alert emails.
    #[serde(default = "default_alert_sender")]
    pub alert_sender: String,
    /// Name the mail listener announces and submits with.
    #[serde(default = "default_mail_domain")]
    pub mail_domain: String,
    #[serde(default)]
    pub api: ApiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            targets_file: default_targets_file(),
            settings_file: default_settings_file(),
            alert_sender: default_alert_sender(),
            mail_domain: default_mail_domain(),
            api: ApiConfig::default(),
        }
    }
}

fn default_targets_file() -> PathBuf {
    PathBuf::from("servers.json")
}

fn default_settings_file() -> PathBuf {
    PathBuf::from("settings.json")
}

fn default_alert_sender() -> String {
    "alert@monitoring-app.local".to_string()
}

fn default_mail_domain() -> String {
    "localhost".to_string()
}

fn default_api_host() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_api_port() -> u16 {
    8080
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets_file.as_os_str().is_empty() {
            return Err(ConfigError::Validation("targets_file must not be empty".into()));
        }
        if self.settings_file.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "settings_file must not be empty".into(),
            ));
        }
        if self.targets_file == self.settings_file {
            return Err(ConfigError::Validation(
                "targets_file and settings_file must differ".into(),
            ));
        }
        if !self.alert_sender.contains('@') {
            return Err(ConfigError::Validation(
                "alert_sender must be an email address".into(),
            ));
        }
        if self.mail_domain.trim().is_empty() {
            return Err(ConfigError::Validation("mail_domain must not be empty".into()));
        }
        if self.api.port == 0 {
            return Err(ConfigError::Validation("api.port must be > 0".into()));
        }
        Ok(())
    }
}

/// Load application configuration from an optional `config.yaml` + environment overrides.
///
/// Environment variables use the `UPTIME` prefix and double underscores between
/// key path segments, e.g. `UPTIME__API__PORT=9000`.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(
            Environment::with_prefix("UPTIME")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.api.host, IpAddr::from([127, 0, 0, 1]));
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.targets_file, PathBuf::from("servers.json"));
    }

    #[test]
    fn rejects_port_zero() {
        let mut config = AppConfig::default();
        config.api.port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_shared_files() {
        let config = AppConfig {
            settings_file: PathBuf::from("servers.json"),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_sources_fill_in_defaults() {
        let cfg = config::Config::builder()
            .set_override("api.port", 9000)
            .unwrap()
            .build()
            .unwrap();
        let app: AppConfig = cfg.try_deserialize().unwrap();
        assert_eq!(app.api.port, 9000);
        assert_eq!(app.mail_domain, "localhost");
    }
}
