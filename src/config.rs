//! Environment-driven configuration.

use std::collections::HashSet;
use std::env;
use std::path::PathBuf;

const DEFAULT_FILE_COLUMNS: &str = "file,receipt";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// `sqlite:...` or `postgres:...`; the scheme selects the backend.
    pub database_url: String,
    /// Root directory of the content-addressed file store.
    pub storage_path: PathBuf,
    /// Optional persistent schema cache file.
    pub catalog_cache: Option<PathBuf>,
    /// Column names treated as content-hash references.
    pub file_columns: HashSet<String>,
    pub bind_addr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

impl AppConfig {
    pub fn from_env() -> Result<AppConfig, ConfigError> {
        Ok(AppConfig {
            database_url: require("DATABASE_URL")?,
            storage_path: PathBuf::from(require("STORAGE_PATH")?),
            catalog_cache: env::var("CATALOG_CACHE").ok().map(PathBuf::from),
            file_columns: parse_file_columns(
                &env::var("FILE_COLUMNS").unwrap_or_else(|_| DEFAULT_FILE_COLUMNS.to_string()),
            ),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

pub fn parse_file_columns(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_columns_parse_trimmed() {
        let cols = parse_file_columns("file, receipt ,,attachment");
        assert_eq!(cols.len(), 3);
        assert!(cols.contains("receipt"));
        assert!(cols.contains("attachment"));
    }

    #[test]
    fn default_file_columns() {
        let cols = parse_file_columns(DEFAULT_FILE_COLUMNS);
        assert!(cols.contains("file"));
        assert!(cols.contains("receipt"));
    }
}
