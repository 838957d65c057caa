use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::storage::schema::DEFAULT_TABLE;
use crate::storage::{FlushPolicy, RetryPolicy};

/// Store settings, read from `scrapestore.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database: PathBuf,
    pub default_table: String,
    /// SQLite's own busy wait; 0 leaves contention to the retry policy
    pub busy_timeout_ms: u64,
    pub retry: RetryPolicy,
    pub flush: FlushPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            default_table: DEFAULT_TABLE.to_string(),
            busy_timeout_ms: 0,
            retry: RetryPolicy::default(),
            flush: FlushPolicy::default(),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("scrapestore.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from("scraperwiki.sqlite")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<StoreConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: StoreConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &StoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scrapestore.toml");
        std::fs::write(&path, "database = \"data/out.sqlite\"\n\n[retry]\nmax_attempts = 8\n").unwrap();

        let config = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(config.database, PathBuf::from("data/out.sqlite"));
        assert_eq!(config.default_table, "swdata");
        assert_eq!(config.retry.max_attempts, 8);
        assert_eq!(config.retry.initial_backoff_ms, 25);
        assert_eq!(config.flush, FlushPolicy::default());
    }

    #[test]
    fn test_write_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scrapestore.toml");
        let config = StoreConfig {
            default_table: "listings".to_string(),
            busy_timeout_ms: 100,
            ..StoreConfig::default()
        };

        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), Some(config));
    }

    #[test]
    fn test_ensure_db_dir() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("nested").join("deeper").join("store.sqlite");
        ensure_db_dir(&db).unwrap();
        assert!(db.parent().unwrap().is_dir());
        ensure_db_dir(Path::new("bare.sqlite")).unwrap();
    }
}
