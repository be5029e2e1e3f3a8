use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::node::NodeError;
use crate::prefix::{CidPrefix, HashFunction};
use crate::traversal::{FetchOptions, DEFAULT_FETCH_CONCURRENCY};

pub const CONFIG_FILE_NAME: &str = "merkledag.toml";

/// How new nodes are identified and how graphs are fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagConfig {
    /// CID version for newly built nodes (0 or 1)
    #[serde(default)]
    pub cid_version: u64,
    #[serde(default = "default_hash_function")]
    pub hash_function: HashFunction,
    /// Truncated digest length, if not the hash function's natural length
    #[serde(default)]
    pub hash_length: Option<usize>,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

fn default_hash_function() -> HashFunction {
    HashFunction::Sha2_256
}

fn default_fetch_concurrency() -> usize {
    DEFAULT_FETCH_CONCURRENCY
}

impl Default for DagConfig {
    fn default() -> Self {
        Self {
            cid_version: 0,
            hash_function: default_hash_function(),
            hash_length: None,
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

impl DagConfig {
    /// Parse and validate a config
    pub fn from_toml_str(config_toml: &str) -> Result<Self, ConfigError> {
        let config: DagConfig = toml::from_str(config_toml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        tracing::debug!("DagConfig::load: reading {:?}", path);
        let config_toml = fs::read_to_string(path)?;
        Self::from_toml_str(&config_toml)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let config_toml = toml::to_string_pretty(self)?;
        fs::write(path, config_toml)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "fetch_concurrency must be at least 1".to_string(),
            ));
        }
        self.cid_prefix()?;
        Ok(())
    }

    /// Prefix new proto nodes should be hashed with
    pub fn cid_prefix(&self) -> Result<CidPrefix, NodeError> {
        CidPrefix::new(self.cid_version, self.hash_function.code(), self.hash_length)
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::default().with_concurrency(self.fetch_concurrency)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("node error: {0}")]
    Node(#[from] NodeError),
}
