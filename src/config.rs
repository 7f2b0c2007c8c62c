use crate::error::{Result, SyncError};
use crate::remote::{RemotePreferenceStore, S3Backend, SqliteBackend};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file at ~/.config/confmark/config.toml
///
/// Every field is optional; command-line flags take precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Where device preferences are kept (JSON file)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Which remote document store to sync with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RemoteConfig {
    #[default]
    None,
    Sqlite {
        path: String,
    },
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
    },
}

impl RemoteConfig {
    /// Parse a command-line remote spec
    ///
    /// Accepted forms: `none`, `sqlite:<path>`, `s3://bucket[/prefix]`
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();

        if spec.is_empty() || spec == "none" {
            return Ok(RemoteConfig::None);
        }

        if let Some(path) = spec.strip_prefix("sqlite:") {
            if path.is_empty() {
                return Err(SyncError::Config("sqlite remote needs a path".to_string()));
            }
            return Ok(RemoteConfig::Sqlite {
                path: path.to_string(),
            });
        }

        if let Some(rest) = spec.strip_prefix("s3://") {
            let (bucket, prefix) = match rest.split_once('/') {
                Some((bucket, prefix)) => (bucket, prefix.trim_end_matches('/')),
                None => (rest, ""),
            };
            if bucket.is_empty() {
                return Err(SyncError::Config("s3 remote needs a bucket".to_string()));
            }
            return Ok(RemoteConfig::S3 {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                region: None,
                endpoint: None,
            });
        }

        Err(SyncError::Config(format!(
            "Unknown remote '{}'. Use none, sqlite:<path> or s3://bucket[/prefix]",
            spec
        )))
    }

    pub fn kind(&self) -> Option<&'static str> {
        match self {
            RemoteConfig::None => None,
            RemoteConfig::Sqlite { .. } => Some("sqlite"),
            RemoteConfig::S3 { .. } => Some("s3"),
        }
    }

    /// Connect to the configured backend
    pub async fn open(&self) -> Result<Option<RemotePreferenceStore>> {
        let store = match self {
            RemoteConfig::None => return Ok(None),
            RemoteConfig::Sqlite { path } => {
                let backend = SqliteBackend::open(&expand_home(path))?;
                RemotePreferenceStore::new(Box::new(backend))
            }
            RemoteConfig::S3 {
                bucket,
                prefix,
                region,
                endpoint,
            } => {
                let backend =
                    S3Backend::new(bucket.clone(), prefix.clone(), region.clone(), endpoint.clone())
                        .await?;
                RemotePreferenceStore::new(Box::new(backend))
            }
        };

        Ok(Some(store))
    }
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SyncError::Config("Could not determine config directory".to_string()))?;
        Ok(config_dir.join("confmark").join("config.toml"))
    }

    /// Load the default config file; a missing file yields defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        toml::from_str(&content)
            .map_err(|e| SyncError::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Device preference file, from config or the platform data directory
    pub fn local_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.local_path {
            return Ok(expand_home(path));
        }

        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| SyncError::Config("Could not determine data directory".to_string()))?;
        Ok(data_dir.join("confmark").join("preferences.json"))
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
