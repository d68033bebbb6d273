//! Configuration loading from YAML sources.

use config::{Config, File, FileFormat};
use rust_uptime_monitor::config::{AppConfig, ConfigError};
use std::net::IpAddr;
use std::path::PathBuf;

fn from_yaml(yaml: &str) -> Result<AppConfig, ConfigError> {
    let cfg = Config::builder()
        .add_source(File::from_str(yaml, FileFormat::Yaml))
        .build()?;
    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

#[test]
fn test_full_yaml() {
    let yaml = r#"
targets_file: /var/lib/uptime/servers.json
settings_file: /var/lib/uptime/settings.json
alert_sender: monitor@example.org
mail_domain: monitor.example.org
api:
  host: 0.0.0.0
  port: 9090
"#;
    let config = from_yaml(yaml).unwrap();
    assert_eq!(config.targets_file, PathBuf::from("/var/lib/uptime/servers.json"));
    assert_eq!(config.alert_sender, "monitor@example.org");
    assert_eq!(config.mail_domain, "monitor.example.org");
    assert_eq!(config.api.host, IpAddr::from([0, 0, 0, 0]));
    assert_eq!(config.api.port, 9090);
}

#[test]
fn test_empty_yaml_uses_defaults() {
    let config = from_yaml("{}").unwrap();
    assert_eq!(config.targets_file, PathBuf::from("servers.json"));
    assert_eq!(config.settings_file, PathBuf::from("settings.json"));
    assert_eq!(config.alert_sender, "alert@monitoring-app.local");
    assert_eq!(config.api.port, 8080);
}

#[test]
fn test_invalid_values_are_rejected() {
    let err = from_yaml("alert_sender: nobody").unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));

    let err = from_yaml("api:\n  port: 0").unwrap_err();
    assert!(err.to_string().contains("api.port"));

    let err = from_yaml("targets_file: same.json\nsettings_file: same.json").unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn test_malformed_types_fail_to_build() {
    let err = from_yaml("api:\n  port: not-a-number").unwrap_err();
    assert!(matches!(err, ConfigError::Build(_)));
}
