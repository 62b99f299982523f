use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{CALLABLE_LABELS, NodeLabel};

/// Top-level relink configuration, matching `.relink/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelinkConfig {
    #[serde(default)]
    pub ingest: IngestSection,
    #[serde(default)]
    pub resolution: ResolutionSection,
    #[serde(default)]
    pub store: StoreSection,
}

impl RelinkConfig {
    /// Parse a config file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::NotFound(path.display().to_string()))?;
        let config: Self = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution.root_segments == 0 {
            return Err(ConfigError::Invalid(
                "resolution.root_segments must be at least 1".to_string(),
            ));
        }
        if self.resolution.callable_labels.is_empty() {
            return Err(ConfigError::Invalid(
                "resolution.callable_labels must not be empty".to_string(),
            ));
        }
        if let Some(label) = self
            .resolution
            .callable_labels
            .iter()
            .find(|l| !l.is_callable())
        {
            return Err(ConfigError::Invalid(format!(
                "resolution.callable_labels contains non-callable label {label}"
            )));
        }
        if self.ingest.include_patterns.is_empty() {
            return Err(ConfigError::Invalid(
                "ingest.include_patterns must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Files larger than this are skipped and reported as errors.
    pub max_file_size: u64,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            include_patterns: vec!["**/*.java".into(), "**/*.py".into()],
            exclude_patterns: vec![
                "**/.git/**".into(),
                "**/target/**".into(),
                "**/build/**".into(),
                "**/node_modules/**".into(),
                "**/__pycache__/**".into(),
                "**/.venv/**".into(),
                "**/.relink/**".into(),
            ],
            max_file_size: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionSection {
    /// Leading candidate segments that must belong to a tracked namespace.
    pub root_segments: usize,
    pub callable_labels: Vec<NodeLabel>,
}

impl Default for ResolutionSection {
    fn default() -> Self {
        Self {
            root_segments: 2,
            callable_labels: CALLABLE_LABELS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Database path, relative to the working directory.
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".relink/relink.db"),
        }
    }
}
