//! Configuration loaded from `.knit/config.yaml`.
//!
//! Every field has a default, so an absent file or an empty one is a valid
//! configuration. Unknown keys are rejected to catch typos.
//!
//! ```yaml
//! project: shop
//! identity:
//!   gid_width: 16          # hex characters kept; omit for the full digest
//! resolver:
//!   parallel_threshold: 1024
//!   case_insensitive_sql: true
//! storage:
//!   database: .knit/graph.db
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identity::GidHasher;

/// Name of the knit directory
pub const KNIT_DIR_NAME: &str = ".knit";

/// Name of the configuration file
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Name of the default graph database
pub const DATABASE_FILE_NAME: &str = "graph.db";

/// Candidate count at which resolution goes parallel by default.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 1024;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Project id used when IR or CLI arguments do not name one
    pub project: Option<String>,
    /// Identity settings
    pub identity: IdentityConfig,
    /// Resolver settings
    pub resolver: ResolverConfig,
    /// Graph store settings
    pub storage: StorageConfig,
}

/// Identity settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    /// Hex characters kept in GIDs; `None` keeps the full SHA-256 digest
    pub gid_width: Option<usize>,
}

impl IdentityConfig {
    /// The GID hasher these settings describe.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the width is out of range.
    pub fn hasher(&self) -> Result<GidHasher> {
        GidHasher::with_width(self.gid_width)
    }
}

/// Resolver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Proposal count at which resolution runs on the rayon pool; 0 never
    pub parallel_threshold: usize,
    /// Compare SQL table and column names ignoring ASCII case
    pub case_insensitive_sql: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            case_insensitive_sql: true,
        }
    }
}

/// Graph store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// SQLite database path
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: Path::new(KNIT_DIR_NAME).join(DATABASE_FILE_NAME),
        }
    }
}

impl Config {
    /// Default location of the configuration file under `root`.
    #[must_use]
    pub fn default_path(root: &Path) -> PathBuf {
        root.join(KNIT_DIR_NAME).join(CONFIG_FILE_NAME)
    }

    /// Parse and validate YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed YAML, unknown keys or
    /// out-of-range values.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, otherwise as
    /// [`from_yaml`](Self::from_yaml).
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a file, or use defaults if it does not
    /// exist.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load), except that a missing file is not an error.
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        match fs::read_to_string(path).await {
            Ok(content) => Self::from_yaml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Save configuration to a file, creating its directory.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }
        fs::write(path, content).await?;
        Ok(())
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.identity.hasher()?;
        if let Some(project) = &self.project {
            let trimmed = project.trim();
            if trimmed.is_empty() || trimmed.contains(['/', ':']) {
                return Err(Error::Config(format!(
                    "project id {project:?} must be non-empty and contain no '/' or ':'"
                )));
            }
        }
        Ok(())
    }
}
