use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tera::Value;

use super::{arg, as_text};

static NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9 _-]").expect("valid slug regex"));
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

type Args = HashMap<String, Value>;

/// Turns `text` into a URL fragment: lower-case, characters outside
/// `[a-z0-9 _-]` dropped, whitespace runs collapsed to `-`, and leading or
/// trailing `-` trimmed.
///
/// ```
/// assert_eq!(viewcraft::helpers::slug("Hello, World!  Foo_Bar"), "hello-world-foo_bar");
/// ```
pub fn slug(text: &str) -> String {
  let lower = text.to_lowercase();
  let kept = NON_SLUG.replace_all(&lower, "");
  let dashed = SPACES.replace_all(&kept, "-");
  dashed.trim_matches('-').to_string()
}

pub(super) fn slug_function(args: &Args) -> tera::Result<Value> {
  Ok(Value::String(slug(&as_text(arg(args, "slug", "text")?))))
}

pub(super) fn slug_filter(value: &Value, _args: &Args) -> tera::Result<Value> {
  Ok(Value::String(slug(&as_text(value))))
}

pub(super) fn eq(args: &Args) -> tera::Result<Value> {
  let a = arg(args, "eq", "a")?;
  let b = arg(args, "eq", "b")?;
  let equal = match (a.as_f64(), b.as_f64()) {
    (Some(x), Some(y)) => x == y,
    _ => a == b,
  };
  Ok(Value::Bool(equal))
}

fn padded(text: &str, width: usize) -> String {
  let mut out = tera::escape_html(text);
  let missing = width.saturating_sub(text.chars().count());
  for _ in 0..missing {
    out.push_str("&nbsp;");
  }
  out
}

fn width_of(args: &Args, helper: &str) -> tera::Result<usize> {
  let width = arg(args, helper, "width")?;
  width
    .as_u64()
    .map(|w| w as usize)
    .ok_or_else(|| tera::Error::msg(format!("`{}`: `width` must be a non-negative integer, got {}", helper, width)))
}

pub(super) fn pad(args: &Args) -> tera::Result<Value> {
  let text = as_text(arg(args, "pad", "text")?);
  Ok(Value::String(padded(&text, width_of(args, "pad")?)))
}

pub(super) fn pad_filter(value: &Value, args: &Args) -> tera::Result<Value> {
  Ok(Value::String(padded(&as_text(value), width_of(args, "pad")?)))
}

fn breaks(text: &str) -> String {
  tera::escape_html(text).replace('\n', "<br>")
}

pub(super) fn nl2br(args: &Args) -> tera::Result<Value> {
  Ok(Value::String(breaks(&as_text(arg(args, "nl2br", "text")?))))
}

pub(super) fn nl2br_filter(value: &Value, _args: &Args) -> tera::Result<Value> {
  Ok(Value::String(breaks(&as_text(value))))
}

pub(super) fn raw(args: &Args) -> tera::Result<Value> {
  Ok(Value::String(as_text(arg(args, "raw", "text")?)))
}

pub(super) fn raw_filter(value: &Value, _args: &Args) -> tera::Result<Value> {
  Ok(Value::String(as_text(value)))
}

fn suffix(items: &Value, args: &Args) -> String {
  let singular = args.get("singular").map(as_text).unwrap_or_default();
  let plural = args.get("plural").map(as_text).unwrap_or_else(|| "s".to_string());

  let is_plural = match items {
    Value::Number(n) if n.is_i64() || n.is_u64() => n.as_i64() != Some(1),
    Value::Number(n) => n.as_f64() != Some(1.0),
    Value::Array(list) => list.len() != 1,
    other => {
      log::error!("pluralize: unsupported value {}", other);
      false
    }
  };
  if is_plural { plural } else { singular }
}

pub(super) fn pluralize(args: &Args) -> tera::Result<Value> {
  Ok(Value::String(suffix(arg(args, "pluralize", "items")?, args)))
}

pub(super) fn pluralize_filter(value: &Value, args: &Args) -> tera::Result<Value> {
  Ok(Value::String(suffix(value, args)))
}
