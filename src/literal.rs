use crate::record::SqlValue;

/// Turns one comma-delimited literal into a [`SqlValue`].
///
/// Quoted strings are normally unwrapped by the tuple scanner before they get
/// here, so the quote-stripping branch only catches tokens that arrive still
/// wrapped. Anything that is not `NULL` or a number comes back as text.
pub fn convert_literal(token: &str) -> SqlValue {
  let token = token.trim();

  if token.eq_ignore_ascii_case("NULL") {
    return SqlValue::Null;
  }

  if token.contains('.') {
    if let Ok(value) = token.parse::<f64>() {
      return SqlValue::Float(value);
    }
  } else if let Ok(value) = token.parse::<i64>() {
    return SqlValue::Integer(value);
  }

  if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
    return SqlValue::Text(unescape_quotes(&token[1..token.len() - 1]));
  }

  SqlValue::Text(token.to_string())
}

pub fn unescape_quotes(raw: &str) -> String {
  raw.replace("''", "'")
}
