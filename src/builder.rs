use chrono::Utc;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use uuid::Uuid;

use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::record::CardRecord;
use crate::scanner::{DumpScanner, ScanOutcome, StopReason};
use crate::store::{BuildRecord, IndexStore};

const WORKER_THREAD_NAME: &str = "card-index-build";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BuildPhase {
  Idle,
  Running,
  Completed,
  Cancelled,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildProgress {
  pub phase: BuildPhase,
  pub running: bool,
  pub inserted: u64,
  pub cancel_requested: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BuildStart {
  Started,
  AlreadyRunning,
}

struct BuildState {
  phase: BuildPhase,
  inserted: u64,
  cancel_requested: bool,
}

type SharedState = Arc<Mutex<BuildState>>;
type ProgressListener = Arc<dyn Fn(u64) + Send + Sync>;

fn lock(state: &Mutex<BuildState>) -> MutexGuard<'_, BuildState> {
  // A panicked build must not wedge pollers.
  state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn now_iso() -> String {
  Utc::now().to_rfc3339()
}

#[derive(Clone)]
pub struct CancelHandle {
  state: SharedState,
}

impl CancelHandle {
  pub fn request(&self) {
    lock(&self.state).cancel_requested = true;
  }
}

pub struct IndexBuilder {
  config: IndexConfig,
  state: SharedState,
  listener: Option<ProgressListener>,
  worker: Mutex<Option<JoinHandle<()>>>,
}

impl IndexBuilder {
  pub fn new(config: IndexConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self {
      config,
      state: Arc::new(Mutex::new(BuildState {
        phase: BuildPhase::Idle,
        inserted: 0,
        cancel_requested: false,
      })),
      listener: None,
      worker: Mutex::new(None),
    })
  }

  pub fn with_progress_listener<F>(mut self, listener: F) -> Self
  where
    F: Fn(u64) + Send + Sync + 'static,
  {
    self.listener = Some(Arc::new(listener));
    self
  }

  pub fn config(&self) -> &IndexConfig {
    &self.config
  }

  pub fn cancel_handle(&self) -> CancelHandle {
    CancelHandle {
      state: Arc::clone(&self.state),
    }
  }

  pub fn progress(&self) -> BuildProgress {
    let state = lock(&self.state);
    BuildProgress {
      phase: state.phase,
      running: state.phase == BuildPhase::Running,
      inserted: state.inserted,
      cancel_requested: state.cancel_requested,
    }
  }

  pub fn request_cancel(&self) {
    lock(&self.state).cancel_requested = true;
  }

  /// Builds only when the index is missing or empty. Returns the inserted
  /// count when a build ran. No-op while another build is in flight.
  pub fn ensure_built(&self) -> Result<Option<u64>> {
    if self.progress().running || self.is_populated()? {
      return Ok(None);
    }
    match self.build_sync(None) {
      Ok(inserted) => Ok(Some(inserted)),
      Err(IndexError::BuildInProgress) => Ok(None),
      Err(error) => Err(error),
    }
  }

  pub fn build_sync(&self, max_rows: Option<u64>) -> Result<u64> {
    if !begin(&self.state) {
      return Err(IndexError::BuildInProgress);
    }
    let result = run_build(&self.config, &self.state, self.listener.as_ref(), max_rows);
    finish(&self.state, result.as_ref().ok());
    result.map(|outcome| outcome.inserted)
  }

  pub fn build_async(&self, max_rows: Option<u64>) -> Result<BuildStart> {
    if !begin(&self.state) {
      return Ok(BuildStart::AlreadyRunning);
    }

    let config = self.config.clone();
    let state = Arc::clone(&self.state);
    let listener = self.listener.clone();
    let spawned = thread::Builder::new()
      .name(WORKER_THREAD_NAME.to_string())
      .spawn(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
          run_build(&config, &state, listener.as_ref(), max_rows)
        }));
        match result {
          Ok(Ok(outcome)) => finish(&state, Some(&outcome)),
          Ok(Err(build_error)) => {
            error!("card index build failed: {}", build_error);
            finish(&state, None);
          }
          Err(_) => {
            error!("card index build panicked");
            finish(&state, None);
          }
        }
      });

    match spawned {
      Ok(handle) => {
        *self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
        Ok(BuildStart::Started)
      }
      Err(spawn_error) => {
        finish(&self.state, None);
        Err(IndexError::Worker(spawn_error.to_string()))
      }
    }
  }

  pub fn wait(&self) {
    let handle = self
      .worker
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .take();
    if let Some(handle) = handle {
      if handle.join().is_err() {
        warn!("card index build thread exited abnormally");
      }
    }
  }

  pub fn open_store(&self) -> Result<IndexStore> {
    IndexStore::open_with_timeout(&self.config.index_path, self.config.busy_timeout())
  }

  pub fn search(&self, name: &str, limit: Option<usize>) -> Result<Vec<CardRecord>> {
    self.ensure_built()?;
    let limit = limit.unwrap_or(self.config.default_lookup_limit);
    self.open_store()?.lookup_by_name(name, limit)
  }

  pub fn find_by_name(&self, name: &str) -> Result<Option<CardRecord>> {
    Ok(self.search(name, Some(1))?.into_iter().next())
  }

  pub fn last_build(&self) -> Result<Option<BuildRecord>> {
    if !self.config.index_path.exists() {
      return Ok(None);
    }
    self.open_store()?.last_build()
  }

  fn is_populated(&self) -> Result<bool> {
    if !self.config.index_path.exists() {
      return Ok(false);
    }
    Ok(self.open_store()?.count()? > 0)
  }
}

fn begin(state: &Mutex<BuildState>) -> bool {
  let mut state = lock(state);
  if state.phase == BuildPhase::Running {
    return false;
  }
  state.phase = BuildPhase::Running;
  state.inserted = 0;
  state.cancel_requested = false;
  true
}

/// `None` means the build failed; the phase drops back to Idle and the
/// inserted count keeps whatever had committed.
fn finish(state: &Mutex<BuildState>, outcome: Option<&ScanOutcome>) {
  let mut state = lock(state);
  state.phase = match outcome {
    Some(outcome) if outcome.stop == StopReason::Cancelled => BuildPhase::Cancelled,
    Some(_) => BuildPhase::Completed,
    None => BuildPhase::Idle,
  };
}

fn outcome_label(stop: StopReason) -> &'static str {
  match stop {
    StopReason::Exhausted => "completed",
    StopReason::RowCap => "capped",
    StopReason::Cancelled => "cancelled",
    StopReason::MissingSource => "missing_source",
  }
}

fn run_build(
  config: &IndexConfig,
  state: &Mutex<BuildState>,
  listener: Option<&ProgressListener>,
  max_rows: Option<u64>,
) -> Result<ScanOutcome> {
  let started_at = now_iso();
  info!(
    "building card index {} from {}",
    config.index_path.display(),
    config.source_path.display()
  );

  let mut store = IndexStore::open_with_timeout(&config.index_path, config.busy_timeout())?;
  // Without a dump there is nothing to repopulate with, so keep what we have.
  if config.source_path.exists() {
    store.clear()?;
  }

  let scanner = DumpScanner::new(&config.normalized_table_hint()).with_max_rows(max_rows);
  let result = scanner.scan_file(
    &config.source_path,
    &mut store,
    |inserted| {
      lock(state).inserted = inserted;
      if let Some(listener) = listener {
        listener(inserted);
      }
    },
    || lock(state).cancel_requested,
  );

  let (outcome, inserted) = match &result {
    Ok(scan) => (outcome_label(scan.stop), scan.inserted),
    Err(_) => ("failed", lock(state).inserted),
  };
  let build = BuildRecord {
    id: Uuid::new_v4().to_string(),
    source_path: config.source_path.display().to_string(),
    table_hint: config.normalized_table_hint(),
    max_rows: max_rows.map(|cap| cap as i64),
    started_at,
    finished_at: now_iso(),
    inserted: inserted as i64,
    outcome: outcome.to_string(),
  };
  if let Err(history_error) = store.record_build(&build) {
    warn!("could not record card index build history: {}", history_error);
  }

  info!("card index build {}: {} rows", outcome, inserted);
  result
}
