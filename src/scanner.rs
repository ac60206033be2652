use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use crate::columns::ColumnMap;
use crate::error::Result;
use crate::record::CardRecord;
use crate::splitter::{split_rows, split_values};
use crate::store::IndexStore;

pub trait RecordSink {
  fn insert_batch(&mut self, records: &[CardRecord]) -> Result<()>;
}

impl RecordSink for IndexStore {
  fn insert_batch(&mut self, records: &[CardRecord]) -> Result<()> {
    IndexStore::insert_batch(self, records)
  }
}

impl RecordSink for Vec<CardRecord> {
  fn insert_batch(&mut self, records: &[CardRecord]) -> Result<()> {
    self.extend_from_slice(records);
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
  Exhausted,
  RowCap,
  Cancelled,
  MissingSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
  pub inserted: u64,
  pub statements: u64,
  pub skipped_statements: u64,
  pub stop: StopReason,
}

impl ScanOutcome {
  fn new() -> Self {
    Self {
      inserted: 0,
      statements: 0,
      skipped_statements: 0,
      stop: StopReason::Exhausted,
    }
  }
}

#[derive(Debug, PartialEq)]
struct StatementHeader {
  table: String,
  columns: Vec<String>,
  payload: String,
  complete: bool,
}

#[derive(Debug, PartialEq)]
enum Header {
  NotInsert,
  OtherTable,
  Malformed(&'static str),
  Indexed(StatementHeader),
}

fn parse_header(line: &str, table_hint: &str) -> Header {
  const PREFIX: &str = "insert into";

  let lower = line.to_ascii_lowercase();
  if !lower.starts_with(PREFIX) {
    return Header::NotInsert;
  }

  // ASCII lower-casing keeps byte offsets, so indexes into `lower` are valid for `line`.
  let rest = &line[PREFIX.len()..];
  let Some(open) = rest.find('(') else {
    return Header::Malformed("no column list");
  };

  let table_part = rest[..open].trim();
  if table_part
    .split_whitespace()
    .any(|word| word.eq_ignore_ascii_case("values"))
  {
    return Header::Malformed("no column list");
  }
  let table = table_part.replace(['`', '"'], "").to_lowercase();
  if table.is_empty() {
    return Header::Malformed("no table name");
  }
  if !table.contains(table_hint) {
    return Header::OtherTable;
  }

  let Some(close) = rest[open..].find(')').map(|offset| open + offset) else {
    return Header::Malformed("unterminated column list");
  };
  let columns: Vec<String> = rest[open + 1..close]
    .split(',')
    .map(|column| column.trim().to_string())
    .collect();
  if columns.iter().all(|column| column.is_empty()) {
    return Header::Malformed("empty column list");
  }

  let after = &rest[close + 1..];
  let payload = match after.to_ascii_lowercase().find("values") {
    Some(index) => after[index + "values".len()..].trim(),
    None => after.trim(),
  };

  Header::Indexed(StatementHeader {
    table,
    columns,
    complete: payload.ends_with(';'),
    payload: payload.to_string(),
  })
}

fn decode_lossy(bytes: &[u8]) -> String {
  let mut text = String::with_capacity(bytes.len());
  for chunk in bytes.utf8_chunks() {
    text.push_str(chunk.valid());
  }
  text
}

enum ScanState {
  Scanning,
  Buffering {
    table: String,
    columns: ColumnMap,
    payload: String,
  },
}

pub struct DumpScanner {
  table_hint: String,
  max_rows: Option<u64>,
}

impl DumpScanner {
  pub fn new(table_hint: &str) -> Self {
    Self {
      table_hint: table_hint.trim().to_lowercase(),
      max_rows: None,
    }
  }

  /// Stops the scan once this many rows are inserted. `Some(0)` means no cap.
  pub fn with_max_rows(mut self, max_rows: Option<u64>) -> Self {
    self.max_rows = max_rows.filter(|cap| *cap > 0);
    self
  }

  pub fn scan_file<S, P, C>(
    &self,
    path: &Path,
    sink: &mut S,
    on_progress: P,
    is_cancelled: C,
  ) -> Result<ScanOutcome>
  where
    S: RecordSink + ?Sized,
    P: FnMut(u64),
    C: Fn() -> bool,
  {
    let file = match File::open(path) {
      Ok(file) => file,
      Err(error) if error.kind() == ErrorKind::NotFound => {
        info!("card dump {} not found, nothing to index", path.display());
        let mut outcome = ScanOutcome::new();
        outcome.stop = StopReason::MissingSource;
        return Ok(outcome);
      }
      Err(error) => return Err(error.into()),
    };

    info!("scanning card dump {}", path.display());
    self.scan_reader(BufReader::new(file), sink, on_progress, is_cancelled)
  }

  pub fn scan_reader<R, S, P, C>(
    &self,
    mut reader: R,
    sink: &mut S,
    mut on_progress: P,
    is_cancelled: C,
  ) -> Result<ScanOutcome>
  where
    R: BufRead,
    S: RecordSink + ?Sized,
    P: FnMut(u64),
    C: Fn() -> bool,
  {
    let mut outcome = ScanOutcome::new();
    let mut state = ScanState::Scanning;
    let mut raw_line = Vec::new();

    loop {
      raw_line.clear();
      if reader.read_until(b'\n', &mut raw_line)? == 0 {
        break;
      }
      let line = decode_lossy(&raw_line);
      let line = line.trim();

      // A statement still being buffered is dropped along with `state`.
      if is_cancelled() {
        outcome.stop = StopReason::Cancelled;
        break;
      }

      let (next, completed) = match state {
        ScanState::Scanning => {
          match parse_header(line, &self.table_hint) {
            Header::Indexed(header) => {
              let columns = ColumnMap::resolve(&header.columns);
              if header.complete {
                (ScanState::Scanning, Some((header.table, columns, header.payload)))
              } else {
                let buffering = ScanState::Buffering {
                  table: header.table,
                  columns,
                  payload: header.payload,
                };
                (buffering, None)
              }
            }
            Header::Malformed(reason) => {
              warn!("skipping insert statement: {}", reason);
              outcome.skipped_statements += 1;
              (ScanState::Scanning, None)
            }
            Header::NotInsert | Header::OtherTable => (ScanState::Scanning, None),
          }
        }
        ScanState::Buffering {
          table,
          columns,
          mut payload,
        } => {
          if !line.is_empty() {
            if !payload.is_empty() {
              payload.push(' ');
            }
            payload.push_str(line);
          }
          if line.ends_with(';') {
            (ScanState::Scanning, Some((table, columns, payload)))
          } else {
            let buffering = ScanState::Buffering {
              table,
              columns,
              payload,
            };
            (buffering, None)
          }
        }
      };
      state = next;

      if let Some((table, columns, payload)) = completed {
        let values = payload.strip_suffix(';').unwrap_or(&payload);
        let stop = self.flush_statement(values, &columns, sink, &mut outcome, &is_cancelled)?;
        debug!(
          "indexed statement for table {} ({} rows so far)",
          table, outcome.inserted
        );
        on_progress(outcome.inserted);
        if let Some(reason) = stop {
          outcome.stop = reason;
          break;
        }
      }
    }

    if matches!(state, ScanState::Buffering { .. }) && outcome.stop == StopReason::Exhausted {
      warn!("card dump ended inside an unterminated insert statement; dropping it");
      outcome.skipped_statements += 1;
    }

    info!(
      "card dump scan finished: {} rows from {} statements ({:?})",
      outcome.inserted, outcome.statements, outcome.stop
    );
    Ok(outcome)
  }

  fn flush_statement<S, C>(
    &self,
    values: &str,
    columns: &ColumnMap,
    sink: &mut S,
    outcome: &mut ScanOutcome,
    is_cancelled: &C,
  ) -> Result<Option<StopReason>>
  where
    S: RecordSink + ?Sized,
    C: Fn() -> bool,
  {
    let mut batch = Vec::new();
    let mut stop = None;

    for row in split_rows(values) {
      if is_cancelled() {
        stop = Some(StopReason::Cancelled);
        break;
      }
      batch.push(columns.extract(&split_values(row)));
      if let Some(cap) = self.max_rows {
        if outcome.inserted + batch.len() as u64 >= cap {
          stop = Some(StopReason::RowCap);
          break;
        }
      }
    }

    sink.insert_batch(&batch)?;
    outcome.inserted += batch.len() as u64;
    outcome.statements += 1;
    Ok(stop)
  }
}
