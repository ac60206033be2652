use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("index store error: {0}")]
  Store(#[from] rusqlite::Error),

  #[error("invalid index config: {0}")]
  Config(String),

  #[error("an index build is already running")]
  BuildInProgress,

  #[error("could not start index build worker: {0}")]
  Worker(String),
}

impl From<serde_json::Error> for IndexError {
  fn from(error: serde_json::Error) -> Self {
    IndexError::Config(error.to_string())
  }
}
