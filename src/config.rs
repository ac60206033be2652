use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{IndexError, Result};

const DEFAULT_SOURCE_PATH: &str = "assets/AllPrintings.sql";
const DEFAULT_INDEX_PATH: &str = "assets/allprintings_index.sqlite";
const DEFAULT_TABLE_HINT: &str = "card";
const DEFAULT_LOOKUP_LIMIT: usize = 10;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexConfig {
  pub source_path: PathBuf,
  pub index_path: PathBuf,
  pub table_hint: String,
  pub default_lookup_limit: usize,
  pub busy_timeout_ms: u64,
}

impl Default for IndexConfig {
  fn default() -> Self {
    Self {
      source_path: PathBuf::from(DEFAULT_SOURCE_PATH),
      index_path: PathBuf::from(DEFAULT_INDEX_PATH),
      table_hint: DEFAULT_TABLE_HINT.to_string(),
      default_lookup_limit: DEFAULT_LOOKUP_LIMIT,
      busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
    }
  }
}

impl IndexConfig {
  pub fn new(source_path: impl Into<PathBuf>, index_path: impl Into<PathBuf>) -> Self {
    Self {
      source_path: source_path.into(),
      index_path: index_path.into(),
      ..Self::default()
    }
  }

  pub fn load(path: &Path) -> Result<Self> {
    let body = fs::read_to_string(path)?;
    let config: IndexConfig = serde_json::from_str(&body)?;
    config.validate()?;
    Ok(config)
  }

  pub fn with_table_hint(mut self, hint: impl Into<String>) -> Self {
    self.table_hint = hint.into();
    self
  }

  pub fn with_default_lookup_limit(mut self, limit: usize) -> Self {
    self.default_lookup_limit = limit;
    self
  }

  pub fn with_busy_timeout_ms(mut self, timeout_ms: u64) -> Self {
    self.busy_timeout_ms = timeout_ms;
    self
  }

  pub fn validate(&self) -> Result<()> {
    if self.table_hint.trim().is_empty() {
      return Err(IndexError::Config("tableHint must not be empty".to_string()));
    }
    if self.default_lookup_limit == 0 {
      return Err(IndexError::Config(
        "defaultLookupLimit must be greater than zero".to_string(),
      ));
    }
    Ok(())
  }

  pub fn normalized_table_hint(&self) -> String {
    self.table_hint.trim().to_lowercase()
  }

  pub fn busy_timeout(&self) -> Duration {
    Duration::from_millis(self.busy_timeout_ms)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn load_fills_missing_keys_with_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"sourcePath": "dump.sql", "tableHint": "Cards"}}"#).unwrap();

    let config = IndexConfig::load(file.path()).unwrap();
    assert_eq!(config.source_path, PathBuf::from("dump.sql"));
    assert_eq!(config.index_path, PathBuf::from(DEFAULT_INDEX_PATH));
    assert_eq!(config.normalized_table_hint(), "cards");
    assert_eq!(config.default_lookup_limit, 10);
  }

  #[test]
  fn load_rejects_blank_hint() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"tableHint": "  "}}"#).unwrap();

    let err = IndexConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, IndexError::Config(_)));
  }

  #[test]
  fn load_reports_bad_json_as_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "not json").unwrap();

    assert!(matches!(
      IndexConfig::load(file.path()),
      Err(IndexError::Config(_))
    ));
  }
}
