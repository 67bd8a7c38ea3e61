use std::collections::HashMap;
use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tera::{Filter, Function, Value};

use super::arg;

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

type Args = HashMap<String, Value>;

pub(super) fn is_valid_format(format: &str) -> bool {
  !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

fn parse(value: &Value) -> Option<NaiveDateTime> {
  match value {
    Value::String(s) => DateTime::parse_from_rfc3339(s)
      .map(|dt| dt.naive_local())
      .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
      .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
      .ok()
      .or_else(|| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
          .ok()
          .and_then(|d| d.and_hms_opt(0, 0, 0))
      }),
    Value::Number(n) => n
      .as_i64()
      .and_then(|secs| DateTime::from_timestamp(secs, 0))
      .map(|dt| dt.naive_utc()),
    _ => None,
  }
}

/// `date` and `datetime`: the same helper with a different default format.
pub(super) struct DateHelper {
  format: String,
}

impl DateHelper {
  pub(super) fn new(format: &str) -> Self {
    Self {
      format: format.to_string(),
    }
  }

  fn format(&self, value: &Value, args: &Args) -> tera::Result<Value> {
    let format = match args.get("format") {
      Some(Value::String(format)) => {
        if !is_valid_format(format) {
          return Err(tera::Error::msg(format!("'{}' is not a valid date format", format)));
        }
        format.as_str()
      }
      _ => self.format.as_str(),
    };
    let date = parse(value).ok_or_else(|| tera::Error::msg(format!("cannot format {} as a date", value)))?;

    // Formats needing a time zone fail here instead of panicking in `to_string`.
    let mut out = String::new();
    write!(out, "{}", date.format(format))
      .map_err(|_| tera::Error::msg(format!("'{}' cannot format a date without a time zone", format)))?;
    Ok(Value::String(out))
  }
}

impl Function for DateHelper {
  fn call(&self, args: &Args) -> tera::Result<Value> {
    self.format(arg(args, "date", "value")?, args)
  }
}

impl Filter for DateHelper {
  fn filter(&self, value: &Value, args: &Args) -> tera::Result<Value> {
    self.format(value, args)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn no_args() -> Args {
    Args::new()
  }

  #[test]
  fn test_format_validation() {
    assert!(is_valid_format(DEFAULT_DATE_FORMAT));
    assert!(is_valid_format(DEFAULT_DATETIME_FORMAT));
    assert!(!is_valid_format("%Y-%Q"));
  }

  #[test]
  fn test_accepted_inputs() {
    let date = DateHelper::new(DEFAULT_DATE_FORMAT);
    assert_eq!(date.filter(&json!("2024-03-05"), &no_args()).unwrap(), json!("2024-03-05"));
    assert_eq!(date.filter(&json!("2024-03-05T10:30:00+02:00"), &no_args()).unwrap(), json!("2024-03-05"));
    assert_eq!(date.filter(&json!(0), &no_args()).unwrap(), json!("1970-01-01"));

    let datetime = DateHelper::new(DEFAULT_DATETIME_FORMAT);
    assert_eq!(datetime.filter(&json!("2024-03-05T10:30:00"), &no_args()).unwrap(), json!("2024-03-05 10:30"));
  }

  #[test]
  fn test_format_override_and_errors() {
    let date = DateHelper::new(DEFAULT_DATE_FORMAT);
    let mut args = Args::new();
    args.insert("format".into(), json!("%d/%m/%Y"));
    assert_eq!(date.filter(&json!("2024-03-05"), &args).unwrap(), json!("05/03/2024"));

    assert!(date.filter(&json!("not a date"), &no_args()).is_err());
    assert!(date.filter(&json!(true), &no_args()).is_err());

    args.insert("format".into(), json!("%z"));
    assert!(date.filter(&json!("2024-03-05"), &args).is_err());
  }
}
