use anyhow::Context;
use replayvault_session::RecorderConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub recorder: RecorderConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents).with_context(|| format!("Invalid TOML in {:?}", path))?
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents).with_context(|| format!("Invalid YAML in {:?}", path))?
        };

        Ok(config)
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("REPLAYVAULT_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Ok(val) = std::env::var("REPLAYVAULT_RECORD_PATH") {
            self.recorder.record_path_template = val;
        }

        if let Ok(val) = std::env::var("REPLAYVAULT_INSTANT_REPLAY_PATH") {
            self.recorder.instant_replay.path_template = val;
        }

        if let Ok(val) = std::env::var("REPLAYVAULT_INSTANT_REPLAY_ENABLED")
            && let Ok(enabled) = val.parse::<bool>()
        {
            self.recorder.instant_replay.enabled = enabled;
        }

        if let Ok(val) = std::env::var("REPLAYVAULT_RETENTION_ENABLED")
            && let Ok(enabled) = val.parse::<bool>()
        {
            self.recorder.retention.enabled = enabled;
        }

        if let Ok(val) = std::env::var("REPLAYVAULT_RETENTION_MAX_AGE_DAYS") {
            match val.parse::<u32>() {
                Ok(days) => self.recorder.retention.max_age_days = days,
                Err(_) => eprintln!(
                    "Warning: Invalid REPLAYVAULT_RETENTION_MAX_AGE_DAYS '{}', keeping {}",
                    val, self.recorder.retention.max_age_days
                ),
            }
        }

        if let Ok(val) = std::env::var("REPLAYVAULT_ASYNC_CLOSE")
            && let Ok(enabled) = val.parse::<bool>()
        {
            self.recorder.async_close = enabled;
        }
    }

    /// Expand `~` in the path templates
    pub fn expand_paths(&mut self) {
        self.recorder.record_path_template =
            shellexpand::tilde(&self.recorder.record_path_template).into_owned();
        self.recorder.instant_replay.path_template =
            shellexpand::tilde(&self.recorder.instant_replay.path_template).into_owned();
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use replayvault_session::{CheckBy, RecordMode};
    use std::io::Write;

    fn write_config(extension: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(extension)
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.recorder.record_path_template, "replay/player/{name}@{id}");
    }

    #[test]
    fn test_from_yaml_file() {
        let file = write_config(
            ".yaml",
            r#"
recorder:
  filter:
    checkBy: id
    recordMode: whitelist
    list: ["8667ba71-b85a-4004-af54-457a9734eed7"]
  pauseInsteadOfStopOnQuit: true
  retention:
    enabled: true
    maxAgeDays: 14
logging:
  level: debug
"#,
        );

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.recorder.filter.check_by, CheckBy::Id);
        assert_eq!(config.recorder.filter.record_mode, RecordMode::Whitelist);
        assert!(config.recorder.pause_instead_of_stop_on_quit);
        assert_eq!(config.recorder.retention.max_age_days, 14);
        assert_eq!(config.recorder.retention.interval_hours, 24);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_from_toml_file() {
        let file = write_config(
            ".toml",
            r#"
[recorder]
recordPathTemplate = "/srv/replays/{name}"

[recorder.instantReplay]
enabled = true
windowMinutes = 2
"#,
        );

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.recorder.record_path_template, "/srv/replays/{name}");
        assert!(config.recorder.instant_replay.enabled);
        assert_eq!(config.recorder.instant_replay.window_minutes, 2);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_record_mode_rejected() {
        let file = write_config(".yaml", "recorder:\n  filter:\n    recordMode: graylist\n");
        assert!(ServerConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = ServerConfig::from_file("/nonexistent/replayvault.yaml");
        assert!(result.unwrap_err().to_string().contains("Failed to read config file"));
    }

    #[test]
    #[serial_test::serial]
    fn test_merge_env_overrides() {
        unsafe {
            std::env::set_var("REPLAYVAULT_LOG_LEVEL", "warn");
            std::env::set_var("REPLAYVAULT_RETENTION_ENABLED", "true");
            std::env::set_var("REPLAYVAULT_RETENTION_MAX_AGE_DAYS", "30");
            std::env::set_var("REPLAYVAULT_RECORD_PATH", "/data/{id}");
        }

        let mut config = ServerConfig::default();
        config.merge_env();

        assert_eq!(config.logging.level, "warn");
        assert!(config.recorder.retention.enabled);
        assert_eq!(config.recorder.retention.max_age_days, 30);
        assert_eq!(config.recorder.record_path_template, "/data/{id}");

        unsafe {
            std::env::remove_var("REPLAYVAULT_LOG_LEVEL");
            std::env::remove_var("REPLAYVAULT_RETENTION_ENABLED");
            std::env::remove_var("REPLAYVAULT_RETENTION_MAX_AGE_DAYS");
            std::env::remove_var("REPLAYVAULT_RECORD_PATH");
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_merge_env_ignores_unparseable_values() {
        unsafe {
            std::env::set_var("REPLAYVAULT_RETENTION_MAX_AGE_DAYS", "a week");
            std::env::set_var("REPLAYVAULT_ASYNC_CLOSE", "maybe");
        }

        let mut config = ServerConfig::default();
        config.merge_env();

        assert_eq!(config.recorder.retention.max_age_days, 7);
        assert!(!config.recorder.async_close);

        unsafe {
            std::env::remove_var("REPLAYVAULT_RETENTION_MAX_AGE_DAYS");
            std::env::remove_var("REPLAYVAULT_ASYNC_CLOSE");
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_expand_paths() {
        let mut config = ServerConfig::default();
        config.recorder.record_path_template = "~/replays/{name}".to_string();
        config.expand_paths();
        assert!(!config.recorder.record_path_template.starts_with('~'));
        assert!(config.recorder.record_path_template.ends_with("replays/{name}"));
    }
}
