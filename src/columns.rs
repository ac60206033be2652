use crate::record::{split_list_field, CardRecord, SqlValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalField {
  Name,
  Set,
  Number,
  Colors,
  Types,
  Cmc,
  Power,
  Toughness,
  Text,
}

/// Accepted source spellings per field, most specific first. The first alias
/// present in a statement's column list wins, so order here matters.
pub const ALIASES: [(LogicalField, &[&str]); 9] = [
  (LogicalField::Name, &["name", "card_name", "printed_name"]),
  (LogicalField::Set, &["set", "set_code", "expansion_code", "code"]),
  (LogicalField::Number, &["collector_number", "number", "collectornumber"]),
  (
    LogicalField::Colors,
    &["colors", "color_identity", "printed_colors", "mana_colors"],
  ),
  (LogicalField::Types, &["types", "type_line", "type", "type_line_text"]),
  (LogicalField::Cmc, &["cmc", "mana_value", "converted_mana_cost"]),
  (LogicalField::Power, &["power"]),
  (LogicalField::Toughness, &["toughness"]),
  (
    LogicalField::Text,
    &["oracle_text", "text", "rules_text", "printed_text"],
  ),
];

fn normalize_column(column: &str) -> String {
  column
    .trim()
    .trim_matches(|c: char| c == '`' || c == '"' || c == '\'')
    .to_lowercase()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
  positions: [Option<usize>; 9],
}

impl ColumnMap {
  pub fn resolve<S: AsRef<str>>(columns: &[S]) -> Self {
    let normalized: Vec<String> = columns
      .iter()
      .map(|column| normalize_column(column.as_ref()))
      .collect();

    let mut positions = [None; 9];
    for (slot, (_, aliases)) in positions.iter_mut().zip(ALIASES.iter()) {
      *slot = aliases
        .iter()
        .find_map(|alias| normalized.iter().position(|column| column.as_str() == *alias));
    }
    Self { positions }
  }

  pub fn position(&self, field: LogicalField) -> Option<usize> {
    self.positions[field as usize]
  }

  fn value<'v>(&self, field: LogicalField, values: &'v [SqlValue]) -> Option<&'v SqlValue> {
    self
      .position(field)
      .and_then(|index| values.get(index))
      .filter(|value| !value.is_null())
  }

  fn text(&self, field: LogicalField, values: &[SqlValue]) -> String {
    self
      .value(field, values)
      .and_then(SqlValue::as_text)
      .unwrap_or_default()
  }

  fn list(&self, field: LogicalField, values: &[SqlValue]) -> Vec<String> {
    self
      .value(field, values)
      .and_then(SqlValue::as_text)
      .map(|raw| split_list_field(&raw))
      .unwrap_or_default()
  }

  pub fn extract(&self, values: &[SqlValue]) -> CardRecord {
    CardRecord {
      name: self.text(LogicalField::Name, values),
      set: self.text(LogicalField::Set, values),
      number: self.text(LogicalField::Number, values),
      colors: self.list(LogicalField::Colors, values),
      types: self.list(LogicalField::Types, values),
      cmc: self.value(LogicalField::Cmc, values).and_then(SqlValue::as_f64),
      power: self.text(LogicalField::Power, values),
      toughness: self.text(LogicalField::Toughness, values),
      text: self.text(LogicalField::Text, values),
    }
  }
}
