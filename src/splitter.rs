use crate::literal::convert_literal;
use crate::record::SqlValue;

/// Lazily yields each top-level `( ... )` body, so a caller can stop between tuples.
pub struct RowBodies<'a> {
  payload: &'a str,
  pos: usize,
}

impl<'a> Iterator for RowBodies<'a> {
  type Item = &'a str;

  fn next(&mut self) -> Option<&'a str> {
    let bytes = self.payload.as_bytes();
    let mut in_string = false;
    let mut depth = 0usize;
    let mut start = None;
    let mut i = self.pos;

    while i < bytes.len() {
      let byte = bytes[i];
      if in_string {
        if byte == b'\'' {
          if bytes.get(i + 1) == Some(&b'\'') {
            i += 2;
            continue;
          }
          in_string = false;
        }
        i += 1;
        continue;
      }

      match byte {
        b'\'' => in_string = true,
        b'(' => {
          if depth == 0 {
            start = Some(i + 1);
          }
          depth += 1;
        }
        b')' => {
          // A stray close paren at depth zero is ignored.
          if depth > 0 {
            depth -= 1;
            if depth == 0 {
              if let Some(begin) = start.take() {
                self.pos = i + 1;
                return Some(&self.payload[begin..i]);
              }
            }
          }
        }
        _ => {}
      }
      i += 1;
    }

    self.pos = bytes.len();
    None
  }
}

pub fn split_rows(payload: &str) -> RowBodies<'_> {
  RowBodies { payload, pos: 0 }
}

pub fn split_values(row: &str) -> Vec<SqlValue> {
  let mut values = Vec::new();
  let mut buffer = String::new();
  let mut in_string = false;
  let mut chars = row.chars().peekable();

  while let Some(ch) = chars.next() {
    if in_string {
      if ch == '\'' {
        if chars.peek() == Some(&'\'') {
          chars.next();
          buffer.push('\'');
        } else {
          in_string = false;
        }
      } else {
        buffer.push(ch);
      }
      continue;
    }

    match ch {
      '\'' => in_string = true,
      ',' => {
        values.push(convert_literal(&buffer));
        buffer.clear();
      }
      _ => buffer.push(ch),
    }
  }

  values.push(convert_literal(&buffer));
  values
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn quoted_commas_and_escaped_quotes_stay_inside_rows() {
    let rows: Vec<&str> = split_rows("(1,'a,b'),(2,'c''d')").collect();
    assert_eq!(rows, vec!["1,'a,b'", "2,'c''d'"]);

    assert_eq!(
      split_values(rows[1]),
      vec![SqlValue::Integer(2), SqlValue::Text("c'd".to_string())]
    );
    assert_eq!(
      split_values(rows[0]),
      vec![SqlValue::Integer(1), SqlValue::Text("a,b".to_string())]
    );
  }

  #[test]
  fn parens_inside_strings_do_not_nest() {
    let rows: Vec<&str> = split_rows("('Fire // Ice (split)', 2) , ('x)', NULL)").collect();
    assert_eq!(rows, vec!["'Fire // Ice (split)', 2", "'x)', NULL"]);
  }

  #[test]
  fn nested_parens_are_kept_in_the_body() {
    let rows: Vec<&str> = split_rows("(1, (2)), (3)").collect();
    assert_eq!(rows, vec!["1, (2)", "3"]);
  }

  #[test]
  fn stray_close_paren_is_ignored() {
    let rows: Vec<&str> = split_rows(") (1,'a')").collect();
    assert_eq!(rows, vec!["1,'a'"]);
  }

  #[test]
  fn unterminated_tuple_yields_nothing() {
    assert_eq!(split_rows("(1,'a'),(2,'b").count(), 1);
  }

  #[test]
  fn values_are_trimmed_and_typed() {
    assert_eq!(
      split_values(" 'Llanowar Elves' , 1.0 ,NULL, '*', bare"),
      vec![
        SqlValue::Text("Llanowar Elves".to_string()),
        SqlValue::Float(1.0),
        SqlValue::Null,
        SqlValue::Text("*".to_string()),
        SqlValue::Text("bare".to_string()),
      ]
    );
  }

  #[test]
  fn trailing_value_is_always_flushed() {
    assert_eq!(split_values("1,"), vec![SqlValue::Integer(1), SqlValue::Text(String::new())]);
    assert_eq!(split_values(""), vec![SqlValue::Text(String::new())]);
  }

  #[test]
  fn multibyte_text_survives_splitting() {
    let rows: Vec<&str> = split_rows("('Æther Vial', 'Jötun Grunt')").collect();
    assert_eq!(
      split_values(rows[0]),
      vec![
        SqlValue::Text("Æther Vial".to_string()),
        SqlValue::Text("Jötun Grunt".to_string()),
      ]
    );
  }
}
