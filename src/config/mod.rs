//! Configuration management for permadex
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

/// Environment variable overriding the host content database path
pub const CONTENT_DB_ENV: &str = "PERMADEX_CONTENT_DB";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Index table configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Full rebuild configuration
    #[serde(default)]
    pub rebuild: RebuildConfig,

    /// Host content source configuration
    #[serde(default)]
    pub content: ContentConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Index table configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Name of the active index table. The shadow and retired tables
    /// are derived from it.
    #[serde(default = "default_index_table")]
    pub table: String,

    /// Maximum locator length in bytes
    #[serde(default = "default_max_locator_len")]
    pub max_locator_len: usize,
}

/// Full rebuild configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildConfig {
    /// Number of content ids per chunk
    #[serde(default = "default_rebuild_chunk_size")]
    pub chunk_size: usize,

    /// Delay before a scheduled continuation runs (milliseconds)
    #[serde(default = "default_continuation_delay_ms")]
    pub continuation_delay_ms: u64,
}

/// Host content source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// SQLite database holding the host content table.
    /// Defaults to `content.db` next to the config file.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Name of the host content table
    #[serde(default = "default_content_table")]
    pub table: String,

    /// Content types eligible for indexing
    #[serde(default = "default_indexable_types")]
    pub indexable_types: Vec<String>,

    /// Statuses that never resolve to a locator
    #[serde(default = "default_excluded_statuses")]
    pub excluded_statuses: Vec<String>,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for permadex data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to the index SQLite database
    pub db_file: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            table: default_index_table(),
            max_locator_len: default_max_locator_len(),
        }
    }
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_rebuild_chunk_size(),
            continuation_delay_ms: default_continuation_delay_ms(),
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            table: default_content_table(),
            indexable_types: default_indexable_types(),
            excluded_statuses: default_excluded_statuses(),
        }
    }
}

impl Config {
    /// Get the default base directory for permadex (~/.permadex)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".permadex")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("index.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("index.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Resolve the host content database path.
    ///
    /// `PERMADEX_CONTENT_DB` wins over the config file; relative paths are
    /// taken relative to the base directory.
    pub fn content_db_path(&self) -> PathBuf {
        self.resolve_content_db_path(std::env::var_os(CONTENT_DB_ENV).map(PathBuf::from))
    }

    fn resolve_content_db_path(&self, env_override: Option<PathBuf>) -> PathBuf {
        let configured = env_override
            .or_else(|| self.content.db_path.clone())
            .unwrap_or_else(|| PathBuf::from("content.db"));

        if configured.is_absolute() {
            configured
        } else {
            self.paths.base_dir.join(configured)
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !is_sql_identifier(&self.index.table) {
            return Err(Error::Config(format!(
                "index.table '{}' is not a valid table name",
                self.index.table
            )));
        }

        if !is_sql_identifier(&self.content.table) {
            return Err(Error::Config(format!(
                "content.table '{}' is not a valid table name",
                self.content.table
            )));
        }

        if self.index.max_locator_len == 0 {
            return Err(Error::Config(
                "index.max_locator_len must be positive".to_string(),
            ));
        }

        if self.rebuild.chunk_size == 0 {
            return Err(Error::Config(
                "rebuild.chunk_size must be positive".to_string(),
            ));
        }

        if self.content.indexable_types.is_empty() {
            return Err(Error::Config(
                "content.indexable_types must name at least one type".to_string(),
            ));
        }

        Ok(())
    }
}

/// Whether `name` can be interpolated into SQL as a bare table name
pub fn is_sql_identifier(name: &str) -> bool {
    static IDENT: OnceLock<Option<Regex>> = OnceLock::new();
    IDENT
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,47}$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.index.table, "resolver_index");
        assert_eq!(config.rebuild.chunk_size, 250);
        assert_eq!(config.index.max_locator_len, 2048);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.rebuild.chunk_size = 17;
        config.content.indexable_types = vec!["article".to_string()];

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load(&config.paths.config_file).unwrap();
        assert_eq!(loaded.rebuild.chunk_size, 17);
        assert_eq!(loaded.content.indexable_types, vec!["article".to_string()]);
        assert_eq!(loaded.paths.db_file, tmp.path().join("index.db"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[rebuild]\nchunk_size = 5\n").unwrap();
        assert_eq!(config.rebuild.chunk_size, 5);
        assert_eq!(config.rebuild.continuation_delay_ms, 0);
        assert_eq!(config.index.table, "resolver_index");
        assert_eq!(config.content.excluded_statuses.len(), 4);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.rebuild.chunk_size = 0;
        assert!(config.validate().is_err());
        config.rebuild.chunk_size = 10;
        assert!(config.validate().is_ok());

        config.index.table = "links; DROP TABLE x".to_string();
        assert!(config.validate().is_err());
        config.index.table = "site2_resolver".to_string();
        assert!(config.validate().is_ok());

        config.content.indexable_types.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sql_identifier() {
        assert!(is_sql_identifier("resolver_index"));
        assert!(is_sql_identifier("_t1"));
        assert!(!is_sql_identifier("1table"));
        assert!(!is_sql_identifier("a-b"));
        assert!(!is_sql_identifier(""));
    }

    #[test]
    fn test_content_db_path_resolution() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));

        assert_eq!(
            config.resolve_content_db_path(None),
            tmp.path().join("content.db")
        );

        config.content.db_path = Some(PathBuf::from("/srv/site/content.db"));
        assert_eq!(
            config.resolve_content_db_path(None),
            PathBuf::from("/srv/site/content.db")
        );

        config.content.db_path = Some(PathBuf::from("host.db"));
        assert_eq!(
            config.resolve_content_db_path(None),
            tmp.path().join("host.db")
        );

        // The environment wins over the file, and is also base-relative
        assert_eq!(
            config.resolve_content_db_path(Some(PathBuf::from("/mnt/live.db"))),
            PathBuf::from("/mnt/live.db")
        );
        assert_eq!(
            config.resolve_content_db_path(Some(PathBuf::from("env.db"))),
            tmp.path().join("env.db")
        );
    }
}
