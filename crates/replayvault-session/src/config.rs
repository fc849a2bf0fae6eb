//! Recording engine configuration
//!
//! The configuration is format agnostic: it deserializes from TOML, YAML or
//! JSON. Unknown filter enumerants are rejected while loading, so an invalid
//! configuration never reaches the engine.

use crate::template;
use replayvault_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderConfig {
    /// Who gets recorded
    #[serde(default)]
    pub filter: FilterPolicy,

    /// Directory template for session artifacts, with `{name}`/`{id}` placeholders
    #[serde(default = "default_record_path_template")]
    pub record_path_template: String,

    /// Pause (instead of stop) a participant's session when they leave
    #[serde(default)]
    pub pause_instead_of_stop_on_quit: bool,

    /// Remove orphaned partial artifacts on startup
    #[serde(default = "default_true")]
    pub delete_tmp_artifacts_on_startup: bool,

    /// Age based retention sweep
    #[serde(default)]
    pub retention: RetentionPolicy,

    /// Instant replay buffer
    #[serde(default)]
    pub instant_replay: InstantReplayConfig,

    /// Allow capture close to be deferred to a background task
    #[serde(default)]
    pub async_close: bool,

    /// File extension of artifacts (without the dot)
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            filter: FilterPolicy::default(),
            record_path_template: default_record_path_template(),
            pause_instead_of_stop_on_quit: false,
            delete_tmp_artifacts_on_startup: true,
            retention: RetentionPolicy::default(),
            instant_replay: InstantReplayConfig::default(),
            async_close: false,
            artifact_extension: default_artifact_extension(),
        }
    }
}

/// Whether the filter list names participants to skip or to record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordMode {
    Blacklist,
    Whitelist,
}

/// Which participant attribute is compared against the filter list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckBy {
    Name,
    #[serde(alias = "uuid")]
    Id,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterPolicy {
    #[serde(default = "default_record_mode")]
    pub record_mode: RecordMode,

    #[serde(default = "default_check_by")]
    pub check_by: CheckBy,

    #[serde(default)]
    pub list: HashSet<String>,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            record_mode: default_record_mode(),
            check_by: default_check_by(),
            list: HashSet::new(),
        }
    }
}

/// Retention policy for the periodic artifact sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    #[serde(default)]
    pub enabled: bool,

    /// Run the sweep every N hours
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u32,

    /// Delete artifacts older than this many whole days; 0 keeps only today's
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,

    /// Upper bound for a single file deletion
    #[serde(default = "default_delete_timeout_ms")]
    pub delete_timeout_ms: u64,

    /// Deletions allowed in flight at once
    #[serde(default = "default_max_concurrent_deletes")]
    pub max_concurrent_deletes: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_interval_hours(),
            max_age_days: default_max_age_days(),
            delete_timeout_ms: default_delete_timeout_ms(),
            max_concurrent_deletes: default_max_concurrent_deletes(),
        }
    }
}

impl RetentionPolicy {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_hours) * 60 * 60)
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_millis(self.delete_timeout_ms)
    }

    /// Validate the retention policy configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.interval_hours == 0 {
            return Err("retention.intervalHours must be at least 1".to_string());
        }
        if self.delete_timeout_ms == 0 {
            return Err("retention.deleteTimeoutMs must be at least 1".to_string());
        }
        if self.max_concurrent_deletes == 0 {
            return Err("retention.maxConcurrentDeletes must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstantReplayConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Length of the exported window, also the TTL of the exported file
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,

    /// Directory template for instant replay artifacts
    #[serde(default = "default_instant_path_template")]
    pub path_template: String,
}

impl Default for InstantReplayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_minutes: default_window_minutes(),
            path_template: default_instant_path_template(),
        }
    }
}

impl InstantReplayConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(u64::from(self.window_minutes) * 60)
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_record_path_template() -> String {
    "replay/player/{name}@{id}".to_string()
}

fn default_instant_path_template() -> String {
    "replay/instant/{name}@{id}".to_string()
}

fn default_artifact_extension() -> String {
    replayvault_core::artifact::DEFAULT_EXTENSION.to_string()
}

fn default_record_mode() -> RecordMode {
    RecordMode::Blacklist
}

fn default_check_by() -> CheckBy {
    CheckBy::Name
}

fn default_interval_hours() -> u32 {
    24
}

fn default_max_age_days() -> u32 {
    7
}

fn default_delete_timeout_ms() -> u64 {
    2000
}

fn default_max_concurrent_deletes() -> usize {
    4
}

fn default_window_minutes() -> u32 {
    5
}

impl RecorderConfig {
    /// Parse a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Parse a YAML document
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from a file, choosing the format by extension (YAML unless `.toml` or `.json`)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => Self::from_toml_str(&contents),
            Some("json") => {
                serde_json::from_str(&contents).map_err(|e| Error::Config(e.to_string()))
            }
            _ => Self::from_yaml_str(&contents),
        }
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if !template::has_placeholder(&self.record_path_template) {
            return Err(Error::ConfigValidation(
                "recordPathTemplate must contain a {name} or {id} placeholder".to_string(),
            ));
        }

        if self.artifact_extension.is_empty()
            || !self
                .artifact_extension
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(Error::ConfigValidation(format!(
                "artifactExtension must be alphanumeric, got {:?}",
                self.artifact_extension
            )));
        }

        let record_root = template::store_root(&self.record_path_template);
        if !template::is_dedicated_root(&record_root) {
            return Err(Error::ConfigValidation(format!(
                "recordPathTemplate needs a fixed directory before the first placeholder, got root {:?}",
                record_root
            )));
        }

        if self.retention.enabled {
            self.retention.validate().map_err(Error::ConfigValidation)?;
        }

        if self.instant_replay.enabled {
            if self.instant_replay.window_minutes == 0 {
                return Err(Error::ConfigValidation(
                    "instantReplay.windowMinutes must be at least 1".to_string(),
                ));
            }
            if !template::has_placeholder(&self.instant_replay.path_template) {
                return Err(Error::ConfigValidation(
                    "instantReplay.pathTemplate must contain a {name} or {id} placeholder"
                        .to_string(),
                ));
            }

            let instant_root = template::store_root(&self.instant_replay.path_template);
            if !template::is_dedicated_root(&instant_root) {
                return Err(Error::ConfigValidation(format!(
                    "instantReplay.pathTemplate needs a fixed directory before the first placeholder, got root {:?}",
                    instant_root
                )));
            }

            // The sweep and the replay buffer must never manage the same files
            if template::roots_overlap(&record_root, &instant_root) {
                return Err(Error::ConfigValidation(format!(
                    "instant replay store {:?} overlaps the recording store {:?}",
                    instant_root, record_root
                )));
            }
        }

        Ok(())
    }

    /// Parse and validate in one step
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }
}
