use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "https://api.turbopuffer.com";
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_FILE_PATTERN: &str = "*.parquet";
pub const DEFAULT_VECTOR_COLUMN: &str = "emb";
pub const DEFAULT_ID_COLUMN: &str = "id";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub columns: ColumnConfig,
}

impl Config {
    pub fn config_path() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|p| p.join("vecload").join("config.toml"))
    }

    pub fn load() -> Result<Self, ConfigError> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            return Self::load_from(&path);
        }
        Ok(Self::default())
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.workers == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.workers must be at least 1".to_string(),
            ));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.queue_capacity must be at least 1".to_string(),
            ));
        }
        if !(1..=DEFAULT_POLL_INTERVAL_MS).contains(&self.pipeline.poll_interval_ms) {
            return Err(ConfigError::ValidationError(format!(
                "pipeline.poll_interval_ms must be between 1 and {}",
                DEFAULT_POLL_INTERVAL_MS
            )));
        }
        if self.columns.vector.is_empty() {
            return Err(ConfigError::ValidationError(
                "columns.vector must not be empty".to_string(),
            ));
        }
        if self.store.driver == StoreDriver::Turbopuffer && self.store.api_key.is_none() {
            return Err(ConfigError::ValidationError(
                "no API key configured; set TURBOPUFFER_API_KEY or store.api_key".to_string(),
            ));
        }
        Ok(())
    }
}

/// Remote store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreDriver {
    #[default]
    Turbopuffer,
    /// In-process namespace; nothing leaves the machine.
    Memory,
}

impl std::str::FromStr for StoreDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "turbopuffer" | "tpuf" => Ok(StoreDriver::Turbopuffer),
            "memory" => Ok(StoreDriver::Memory),
            _ => Err(format!("unknown store driver: {}", s)),
        }
    }
}

impl std::fmt::Display for StoreDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreDriver::Turbopuffer => write!(f, "turbopuffer"),
            StoreDriver::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub driver: StoreDriver,

    #[serde(default = "default_api_url")]
    pub base_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_timeout() -> u64 {
    60
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            driver: StoreDriver::default(),
            base_url: default_api_url(),
            api_key: None,
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Files whose rows all lie below this offset are not upserted.
    #[serde(default)]
    pub start_offset: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_file_pattern() -> String {
    DEFAULT_FILE_PATTERN.to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            start_offset: 0,
            poll_interval_ms: default_poll_interval_ms(),
            file_pattern: default_file_pattern(),
        }
    }
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    #[serde(default = "default_vector_column")]
    pub vector: String,

    /// Optional: files without this column get sequential ids.
    #[serde(default = "default_id_column")]
    pub id: String,

    #[serde(default)]
    pub attributes: Vec<String>,
}

fn default_vector_column() -> String {
    DEFAULT_VECTOR_COLUMN.to_string()
}

fn default_id_column() -> String {
    DEFAULT_ID_COLUMN.to_string()
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            vector: default_vector_column(),
            id: default_id_column(),
            attributes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.store.base_url, DEFAULT_API_URL);
        assert_eq!(config.store.driver, StoreDriver::Turbopuffer);
        assert_eq!(config.pipeline.workers, 4);
        assert_eq!(config.pipeline.queue_capacity, 4);
        assert_eq!(config.pipeline.start_offset, 0);
        assert_eq!(config.columns.vector, "emb");
        assert_eq!(config.columns.id, "id");
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(path.is_some());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[pipeline]\nworkers = 8\nstart_offset = 1000\n\n[columns]\nattributes = [\"title\"]\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.pipeline.workers, 8);
        assert_eq!(config.pipeline.start_offset, 1000);
        assert_eq!(config.pipeline.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.columns.attributes, vec!["title".to_string()]);
        assert_eq!(config.columns.vector, DEFAULT_VECTOR_COLUMN);
    }

    #[test]
    fn test_validate_rejects_bad_pipeline_settings() {
        let mut config = Config::default();
        config.store.driver = StoreDriver::Memory;
        assert!(config.validate().is_ok());

        config.pipeline.workers = 0;
        assert!(config.validate().is_err());

        config.pipeline.workers = 1;
        config.pipeline.poll_interval_ms = 5000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_api_key_for_remote_driver() {
        let mut config = Config::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        config.store.api_key = Some("secret".to_string());
        assert!(config.validate().is_ok());
    }
}
