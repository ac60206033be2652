pub mod builder;
pub mod columns;
pub mod config;
pub mod error;
pub mod literal;
pub mod record;
pub mod scanner;
pub mod splitter;
pub mod store;

pub use builder::{BuildPhase, BuildProgress, BuildStart, CancelHandle, IndexBuilder};
pub use columns::{ColumnMap, LogicalField, ALIASES};
pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use record::{CardRecord, SqlValue};
pub use scanner::{DumpScanner, RecordSink, ScanOutcome, StopReason};
pub use store::{BuildRecord, IndexStore};
