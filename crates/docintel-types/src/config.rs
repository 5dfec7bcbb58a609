//! Configuration loading for the DocIntel indexer.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/docintel/indexer.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::DocIntelError;
use crate::staleness::MAX_SETTING_MINUTES;

/// Message bus connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsSettings {
    /// Broker URL
    #[serde(default = "default_nats_url")]
    pub url: String,

    /// Subject (wildcards allowed) carrying change events
    #[serde(default = "default_nats_subject")]
    pub subject: String,

    /// Optional queue group so several indexers share the load
    #[serde(default)]
    pub queue_group: Option<String>,
}

fn default_nats_url() -> String {
    "nats://127.0.0.1:4222".to_string()
}

fn default_nats_subject() -> String {
    "docintel.index.>".to_string()
}

impl Default for NatsSettings {
    fn default() -> Self {
        Self {
            url: default_nats_url(),
            subject: default_nats_subject(),
            queue_group: None,
        }
    }
}

/// Main indexer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the RocksDB entity store
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Root directory of the search index (one subdirectory per collection)
    #[serde(default = "default_search_index_path")]
    pub search_index_path: String,

    /// Username of the service account every indexing operation runs as
    #[serde(default = "default_automation_user")]
    pub automation_user: String,

    /// Minutes between two reconciliation sweeps
    #[serde(default = "default_indexing_frequency_check")]
    pub indexing_frequency_check: u64,

    /// Minutes a tag may lag behind its changes before the sweep re-indexes it
    #[serde(default = "default_max_indexing_delay")]
    pub max_indexing_delay: u64,

    /// Deadline in seconds for each entity store or search index call
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Deadline in seconds for calls that walk every tag or facet
    /// (stale-tag scan, rebuild listings)
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_secs: u64,

    /// Seconds shutdown waits for an in-flight sweep
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Number of change events handled concurrently
    #[serde(default = "default_max_concurrent_messages")]
    pub max_concurrent_messages: usize,

    /// Tags re-indexed between two commits during a sweep
    #[serde(default = "default_sweep_commit_interval")]
    pub sweep_commit_interval: usize,

    /// Message bus settings
    #[serde(default)]
    pub nats: NatsSettings,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn data_dir(name: &str) -> String {
    ProjectDirs::from("", "", "docintel")
        .map(|p| p.data_local_dir().join(name))
        .unwrap_or_else(|| PathBuf::from(format!("./{}", name)))
        .to_string_lossy()
        .to_string()
}

fn default_db_path() -> String {
    data_dir("db")
}

fn default_search_index_path() -> String {
    data_dir("search-index")
}

fn default_automation_user() -> String {
    "automation".to_string()
}

fn default_indexing_frequency_check() -> u64 {
    5
}

fn default_max_indexing_delay() -> u64 {
    10
}

fn default_operation_timeout() -> u64 {
    30
}

fn default_scan_timeout() -> u64 {
    600
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_concurrent_messages() -> usize {
    4
}

fn default_sweep_commit_interval() -> usize {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            search_index_path: default_search_index_path(),
            automation_user: default_automation_user(),
            indexing_frequency_check: default_indexing_frequency_check(),
            max_indexing_delay: default_max_indexing_delay(),
            operation_timeout_secs: default_operation_timeout(),
            scan_timeout_secs: default_scan_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_concurrent_messages: default_max_concurrent_messages(),
            sweep_commit_interval: default_sweep_commit_interval(),
            nats: NatsSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/docintel/indexer.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (DOCINTEL_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, DocIntelError> {
        let config_dir = ProjectDirs::from("", "", "docintel")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("indexer");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| DocIntelError::Config(e.to_string()))?
            .set_default("search_index_path", default_search_index_path())
            .map_err(|e| DocIntelError::Config(e.to_string()))?
            .set_default("automation_user", default_automation_user())
            .map_err(|e| DocIntelError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| DocIntelError::Config(e.to_string()))?
            .set_default("nats.url", default_nats_url())
            .map_err(|e| DocIntelError::Config(e.to_string()))?
            .set_default("nats.subject", default_nats_subject())
            .map_err(|e| DocIntelError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: DOCINTEL_DB_PATH, DOCINTEL_NATS__URL, ...
        builder = builder.add_source(
            Environment::with_prefix("DOCINTEL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| DocIntelError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| DocIntelError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would stall or disable the indexer.
    pub fn validate(&self) -> Result<(), DocIntelError> {
        if self.automation_user.trim().is_empty() {
            return Err(DocIntelError::Config(
                "automation_user must not be empty".to_string(),
            ));
        }
        if self.indexing_frequency_check == 0 {
            return Err(DocIntelError::Config(
                "indexing_frequency_check must be > 0".to_string(),
            ));
        }
        if self.indexing_frequency_check > MAX_SETTING_MINUTES {
            return Err(DocIntelError::Config(format!(
                "indexing_frequency_check must be <= {} minutes",
                MAX_SETTING_MINUTES
            )));
        }
        if self.max_indexing_delay > MAX_SETTING_MINUTES {
            return Err(DocIntelError::Config(format!(
                "max_indexing_delay must be <= {} minutes",
                MAX_SETTING_MINUTES
            )));
        }
        if self.operation_timeout_secs == 0 {
            return Err(DocIntelError::Config(
                "operation_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.scan_timeout_secs < self.operation_timeout_secs {
            return Err(DocIntelError::Config(
                "scan_timeout_secs must be >= operation_timeout_secs".to_string(),
            ));
        }
        if self.max_concurrent_messages == 0 {
            return Err(DocIntelError::Config(
                "max_concurrent_messages must be > 0".to_string(),
            ));
        }
        if self.sweep_commit_interval == 0 {
            return Err(DocIntelError::Config(
                "sweep_commit_interval must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Interval between sweeps.
    pub fn sweep_interval(&self) -> std::time::Duration {
        let minutes = self.indexing_frequency_check.min(MAX_SETTING_MINUTES);
        std::time::Duration::from_secs(minutes.saturating_mul(60))
    }

    /// Deadline applied to each store or index call.
    pub fn operation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.operation_timeout_secs)
    }

    /// Deadline applied to full-store scans.
    pub fn scan_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.scan_timeout_secs)
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }

    /// Expand ~ in search_index_path to the home directory
    pub fn expanded_search_index_path(&self) -> PathBuf {
        expand_home(&self.search_index_path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = directories::BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.automation_user, "automation");
        assert_eq!(settings.indexing_frequency_check, 5);
        assert_eq!(settings.max_indexing_delay, 10);
        assert_eq!(settings.max_concurrent_messages, 4);
        assert_eq!(settings.nats.subject, "docintel.index.>");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_sweep_interval_in_minutes() {
        let settings = Settings {
            indexing_frequency_check: 3,
            ..Default::default()
        };
        assert_eq!(settings.sweep_interval(), std::time::Duration::from_secs(180));
    }

    #[test]
    fn test_validate_rejects_zero_frequency() {
        let settings = Settings {
            indexing_frequency_check: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_minutes() {
        let settings = Settings {
            max_indexing_delay: 1 << 60,
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("max_indexing_delay"));

        let settings = Settings {
            indexing_frequency_check: u64::MAX / 2,
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("indexing_frequency_check"));

        let settings = Settings {
            indexing_frequency_check: MAX_SETTING_MINUTES,
            max_indexing_delay: MAX_SETTING_MINUTES,
            ..Default::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_scan_timeout_below_call_timeout() {
        let settings = Settings {
            operation_timeout_secs: 30,
            scan_timeout_secs: 10,
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("scan_timeout_secs"));
        assert_eq!(Settings::default().scan_timeout(), std::time::Duration::from_secs(600));
    }

    #[test]
    fn test_sweep_interval_does_not_overflow() {
        let settings = Settings {
            indexing_frequency_check: u64::MAX / 2,
            ..Default::default()
        };
        assert_eq!(
            settings.sweep_interval(),
            std::time::Duration::from_secs(MAX_SETTING_MINUTES * 60)
        );
    }

    #[test]
    fn test_validate_rejects_blank_automation_user() {
        let settings = Settings {
            automation_user: "   ".to_string(),
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("automation_user"));
    }

    #[test]
    fn test_load_from_cli_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "automation_user = \"svc-indexer\"\nmax_indexing_delay = 42\n[nats]\nsubject = \"intel.>\""
        )
        .unwrap();

        let settings = Settings::load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(settings.automation_user, "svc-indexer");
        assert_eq!(settings.max_indexing_delay, 42);
        assert_eq!(settings.nats.subject, "intel.>");
        assert_eq!(settings.nats.url, "nats://127.0.0.1:4222");
    }

    #[test]
    fn test_expand_home() {
        let settings = Settings {
            db_path: "/var/lib/docintel/db".to_string(),
            ..Default::default()
        };
        assert_eq!(
            settings.expanded_db_path(),
            PathBuf::from("/var/lib/docintel/db")
        );
    }
}
