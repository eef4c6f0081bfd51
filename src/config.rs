use std::path::PathBuf;
use std::time::Duration;

use crate::application::DatasetError;
use crate::domain::MANIFEST_FILE_NAME;

pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "gemma:2b";
pub const DEFAULT_OLLAMA_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_EXTRACT_DIR: &str = "extracted_dataset";

/// Working directories for uploads and their extracted contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub extract_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(upload_dir: impl Into<PathBuf>, extract_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            extract_dir: extract_dir.into(),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.extract_dir.join(MANIFEST_FILE_NAME)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(DEFAULT_UPLOAD_DIR, DEFAULT_EXTRACT_DIR)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub host: String,
    pub model: String,
    pub timeout: Duration,
}

impl LlmConfig {
    pub fn generate_url(&self) -> String {
        format!("{}/api/generate", self.host.trim_end_matches('/'))
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_OLLAMA_HOST.to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_OLLAMA_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub llm: LlmConfig,
}

impl AppConfig {
    /// Reads `OLLAMA_HOST`, `OLLAMA_MODEL`, `OLLAMA_TIMEOUT`, `DATASET_UPLOAD_DIR`
    /// and `DATASET_EXTRACT_DIR`, falling back to defaults for unset values.
    pub fn from_env() -> Result<Self, DatasetError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DatasetError> {
        let mut config = Self::default();
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(host) = value("OLLAMA_HOST") {
            config.llm.host = host;
        }
        if let Some(model) = value("OLLAMA_MODEL") {
            config.llm.model = model;
        }
        if let Some(timeout) = value("OLLAMA_TIMEOUT") {
            config.llm.timeout = parse_timeout(&timeout)?;
        }
        if let Some(dir) = value("DATASET_UPLOAD_DIR") {
            config.storage.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = value("DATASET_EXTRACT_DIR") {
            config.storage.extract_dir = PathBuf::from(dir);
        }

        Ok(config)
    }
}

pub fn parse_timeout(value: &str) -> Result<Duration, DatasetError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|err| DatasetError::Config(format!("invalid OLLAMA_TIMEOUT {value:?}: {err}")))
}
