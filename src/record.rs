use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
  Null,
  Integer(i64),
  Float(f64),
  Text(String),
}

impl SqlValue {
  pub fn is_null(&self) -> bool {
    matches!(self, SqlValue::Null)
  }

  pub fn as_text(&self) -> Option<String> {
    match self {
      SqlValue::Null => None,
      SqlValue::Integer(value) => Some(value.to_string()),
      SqlValue::Float(value) => Some(format!("{:?}", value)),
      SqlValue::Text(value) => Some(value.clone()),
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      SqlValue::Null => None,
      SqlValue::Integer(value) => Some(*value as f64),
      SqlValue::Float(value) => Some(*value),
      SqlValue::Text(value) => value.trim().parse::<f64>().ok(),
    }
  }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
  pub name: String,
  pub set: String,
  pub number: String,
  pub colors: Vec<String>,
  pub types: Vec<String>,
  pub cmc: Option<f64>,
  pub power: String,
  pub toughness: String,
  pub text: String,
}

pub fn split_list_field(raw: &str) -> Vec<String> {
  raw
    .split(['|', ';', '/', ','])
    .map(str::trim)
    .filter(|part| !part.is_empty())
    .map(str::to_string)
    .collect()
}
