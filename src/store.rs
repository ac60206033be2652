use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::record::CardRecord;

const MIGRATION_SQL_0001: &str = include_str!("../migrations/0001_card_index.sql");
const MIGRATION_SQL_0002: &str = include_str!("../migrations/0002_build_history.sql");
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
  pub id: String,
  pub source_path: String,
  pub table_hint: String,
  pub max_rows: Option<i64>,
  pub started_at: String,
  pub finished_at: String,
  pub inserted: i64,
  pub outcome: String,
}

pub struct IndexStore {
  connection: Connection,
  path: PathBuf,
}

impl IndexStore {
  pub fn open(path: &Path) -> Result<Self> {
    Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
  }

  pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)?;
      }
    }

    let connection = Connection::open(path)?;
    connection.busy_timeout(busy_timeout)?;
    let _mode: String = connection.query_row("PRAGMA journal_mode=WAL;", [], |row| row.get(0))?;
    connection.pragma_update(None, "synchronous", "NORMAL")?;
    connection.execute_batch(MIGRATION_SQL_0001)?;
    connection.execute_batch(MIGRATION_SQL_0002)?;

    Ok(Self {
      connection,
      path: path.to_path_buf(),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn insert_batch(&mut self, records: &[CardRecord]) -> Result<()> {
    if records.is_empty() {
      return Ok(());
    }

    let tx = self.connection.transaction()?;
    {
      let mut statement = tx.prepare_cached(
        "INSERT INTO cards (name, \"set\", number, colors, types, cmc, power, toughness, text)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
      )?;
      for record in records {
        statement.execute(params![
          record.name,
          record.set,
          record.number,
          encode_list(&record.colors),
          encode_list(&record.types),
          record.cmc,
          record.power,
          record.toughness,
          record.text
        ])?;
      }
    }
    tx.commit()?;
    Ok(())
  }

  pub fn lookup_by_name(&self, query: &str, limit: usize) -> Result<Vec<CardRecord>> {
    let pattern = format!("%{}%", escape_like(query));
    let mut statement = self.connection.prepare_cached(
      "SELECT name, \"set\", number, colors, types, cmc, power, toughness, text
       FROM cards
       WHERE name LIKE ?1 ESCAPE '\\'
       ORDER BY id
       LIMIT ?2",
    )?;
    let rows = statement.query_map(params![pattern, limit as i64], row_to_record)?;

    let mut records = Vec::new();
    for row in rows {
      records.push(row?);
    }
    Ok(records)
  }

  pub fn count(&self) -> Result<i64> {
    Ok(
      self
        .connection
        .query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))?,
    )
  }

  pub fn clear(&mut self) -> Result<()> {
    self.connection.execute("DELETE FROM cards", [])?;
    Ok(())
  }

  pub fn record_build(&self, build: &BuildRecord) -> Result<()> {
    self.connection.execute(
      "INSERT INTO index_builds (
         id, source_path, table_hint, max_rows, started_at, finished_at, inserted, outcome
       )
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
      params![
        build.id,
        build.source_path,
        build.table_hint,
        build.max_rows,
        build.started_at,
        build.finished_at,
        build.inserted,
        build.outcome
      ],
    )?;
    Ok(())
  }

  pub fn last_build(&self) -> Result<Option<BuildRecord>> {
    let build = self
      .connection
      .query_row(
        "SELECT id, source_path, table_hint, max_rows, started_at, finished_at, inserted, outcome
         FROM index_builds
         ORDER BY finished_at DESC, rowid DESC
         LIMIT 1",
        [],
        |row| {
          Ok(BuildRecord {
            id: row.get(0)?,
            source_path: row.get(1)?,
            table_hint: row.get(2)?,
            max_rows: row.get(3)?,
            started_at: row.get(4)?,
            finished_at: row.get(5)?,
            inserted: row.get(6)?,
            outcome: row.get(7)?,
          })
        },
      )
      .optional()?;
    Ok(build)
  }

  pub fn close(self) -> Result<()> {
    self.connection.close().map_err(|(_, error)| error)?;
    Ok(())
  }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<CardRecord> {
  let colors: Option<String> = row.get(3)?;
  let types: Option<String> = row.get(4)?;
  Ok(CardRecord {
    name: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
    set: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
    number: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
    colors: decode_list(colors.as_deref()),
    types: decode_list(types.as_deref()),
    cmc: row.get(5)?,
    power: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
    toughness: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
    text: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
  })
}

fn encode_list(values: &[String]) -> String {
  serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

// Older indexes stored lists comma-joined.
fn decode_list(raw: Option<&str>) -> Vec<String> {
  let raw = match raw.map(str::trim) {
    Some(raw) if !raw.is_empty() => raw,
    _ => return Vec::new(),
  };
  if let Ok(values) = serde_json::from_str::<Vec<String>>(raw) {
    return values;
  }
  raw
    .split(',')
    .filter(|part| !part.is_empty())
    .map(str::to_string)
    .collect()
}

fn escape_like(query: &str) -> String {
  let mut escaped = String::with_capacity(query.len());
  for ch in query.chars() {
    if matches!(ch, '%' | '_' | '\\') {
      escaped.push('\\');
    }
    escaped.push(ch);
  }
  escaped
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn card(name: &str) -> CardRecord {
    CardRecord {
      name: name.to_string(),
      ..CardRecord::default()
    }
  }

  #[test]
  fn open_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("index.sqlite");

    let first = IndexStore::open(&path).unwrap();
    let second = IndexStore::open(&path).unwrap();
    assert_eq!(first.count().unwrap(), 0);
    assert_eq!(second.count().unwrap(), 0);
  }

  #[test]
  fn lists_survive_close_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.sqlite");

    let record = CardRecord {
      name: "Azorius Signet".to_string(),
      set: "c21".to_string(),
      number: "236".to_string(),
      colors: vec!["W".to_string(), "U".to_string()],
      types: vec!["Artifact".to_string()],
      cmc: Some(2.0),
      power: String::new(),
      toughness: String::new(),
      text: "{T}: Add {W}{U}.".to_string(),
    };

    let mut store = IndexStore::open(&path).unwrap();
    store.insert_batch(std::slice::from_ref(&record)).unwrap();
    store.close().unwrap();

    let store = IndexStore::open(&path).unwrap();
    let found = store.lookup_by_name("Azorius Signet", 10).unwrap();
    assert_eq!(found, vec![record]);
  }

  #[test]
  fn lookup_is_substring_case_insensitive_and_capped() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = IndexStore::open(&dir.path().join("index.sqlite")).unwrap();
    store
      .insert_batch(&[
        card("Llanowar Elves"),
        card("Elvish Mystic"),
        card("Elves of Deep Shadow"),
        card("Forest"),
      ])
      .unwrap();

    let names: Vec<String> = store
      .lookup_by_name("ELVES", 10)
      .unwrap()
      .into_iter()
      .map(|record| record.name)
      .collect();
    assert_eq!(names, vec!["Llanowar Elves", "Elves of Deep Shadow"]);

    assert_eq!(store.lookup_by_name("e", 2).unwrap().len(), 2);
  }

  #[test]
  fn lookup_keeps_surrounding_whitespace_in_the_query() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = IndexStore::open(&dir.path().join("index.sqlite")).unwrap();
    store
      .insert_batch(&[card("Llanowar Elves"), card("Elvish Mystic"), card("Elv Scout")])
      .unwrap();

    let found = store.lookup_by_name("Elv ", 10).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Elv Scout");
    assert!(store.lookup_by_name(" Mystic ", 10).unwrap().is_empty());
  }

  #[test]
  fn like_wildcards_in_queries_match_literally() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = IndexStore::open(&dir.path().join("index.sqlite")).unwrap();
    store.insert_batch(&[card("100% Pure"), card("1000 Cuts")]).unwrap();

    let found = store.lookup_by_name("0%", 10).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "100% Pure");
  }

  #[test]
  fn clear_empties_the_cards_table() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = IndexStore::open(&dir.path().join("index.sqlite")).unwrap();
    store.insert_batch(&[card("Opt"), card("Ponder")]).unwrap();
    assert_eq!(store.count().unwrap(), 2);

    store.clear().unwrap();
    assert_eq!(store.count().unwrap(), 0);
  }

  #[test]
  fn legacy_comma_lists_still_decode() {
    assert_eq!(decode_list(Some("W,U")), vec!["W", "U"]);
    assert_eq!(decode_list(Some("[\"B\"]")), vec!["B"]);
    assert!(decode_list(Some("")).is_empty());
    assert!(decode_list(None).is_empty());
  }

  #[test]
  fn last_build_returns_newest_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = IndexStore::open(&dir.path().join("index.sqlite")).unwrap();
    assert_eq!(store.last_build().unwrap(), None);

    let mut build = BuildRecord {
      id: "a".to_string(),
      source_path: "dump.sql".to_string(),
      table_hint: "card".to_string(),
      max_rows: None,
      started_at: "2026-01-01T00:00:00+00:00".to_string(),
      finished_at: "2026-01-01T00:01:00+00:00".to_string(),
      inserted: 10,
      outcome: "completed".to_string(),
    };
    store.record_build(&build).unwrap();
    build.id = "b".to_string();
    build.finished_at = "2026-01-02T00:01:00+00:00".to_string();
    build.outcome = "cancelled".to_string();
    store.record_build(&build).unwrap();

    assert_eq!(store.last_build().unwrap(), Some(build));
  }
}
