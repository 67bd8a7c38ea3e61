use std::collections::HashMap;
use std::sync::Arc;

use tera::{Function, Map, Value};

use super::scope;
use super::{arg, as_text, MessageSource, UrlReverser};

/// CSS class reported for fields that failed validation.
pub const ERROR_CLASS: &str = "hasError";

type Args = HashMap<String, Value>;

fn outside_render(helper: &str) -> tera::Error {
  tera::Error::msg(format!("`{}` can only be used while a template is rendering", helper))
}

fn key_arg(args: &Args, helper: &str) -> tera::Result<String> {
  match arg(args, helper, "key")? {
    Value::String(key) if !key.is_empty() => Ok(key.clone()),
    other => Err(tera::Error::msg(format!("`{}`: `key` must be a non-empty string, got {}", helper, other))),
  }
}

pub(super) fn set(args: &Args) -> tera::Result<Value> {
  let key = key_arg(args, "set")?;
  let value = arg(args, "set", "value")?.clone();
  if !scope::set(&key, value) {
    return Err(outside_render("set"));
  }
  Ok(Value::String(String::new()))
}

pub(super) fn append(args: &Args) -> tera::Result<Value> {
  let key = key_arg(args, "append")?;
  let value = arg(args, "append", "value")?.clone();
  if !scope::append(&key, value) {
    return Err(outside_render("append"));
  }
  Ok(Value::String(String::new()))
}

/// Follows `a.b.c` through nested objects.
fn lookup<'a>(args: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
  let mut parts = path.split('.');
  let mut current = args.get(parts.next()?)?;
  for part in parts {
    current = current.get(part)?;
  }
  Some(current)
}

fn field_state(args: &Map<String, Value>, name: &str) -> Map<String, Value> {
  let flash = args
    .get("flash")
    .and_then(|flash| flash.get(name))
    .map(as_text)
    .unwrap_or_default();
  let error = args
    .get("errors")
    .and_then(|errors| errors.get(name))
    .cloned()
    .unwrap_or(Value::Null);
  let error_class = if error.is_null() { "" } else { ERROR_CLASS };

  let mut field = Map::new();
  field.insert("name".into(), Value::String(name.to_string()));
  field.insert("id".into(), Value::String(name.replace(['.', '[', ']'], "_")));
  field.insert("value".into(), lookup(args, name).cloned().unwrap_or(Value::Null));
  field.insert("flash".into(), Value::String(flash));
  field.insert("error".into(), error);
  field.insert("error_class".into(), Value::String(error_class.to_string()));
  field
}

pub(super) fn field(args: &Args) -> tera::Result<Value> {
  let name = as_text(arg(args, "field", "name")?);
  let field = scope::with_args(|render_args| field_state(render_args, &name))
    .ok_or_else(|| outside_render("field"))?;
  Ok(Value::Object(field))
}

/// Resolves the `field` argument, accepting either the object returned by
/// `field()` or a bare field name.
fn field_arg(args: &Args, helper: &str) -> tera::Result<Map<String, Value>> {
  match arg(args, helper, "field")? {
    Value::Object(field) => Ok(field.clone()),
    Value::String(name) => {
      scope::with_args(|render_args| field_state(render_args, name)).ok_or_else(|| outside_render(helper))
    }
    other => Err(tera::Error::msg(format!("`{}`: `field` must be a field, got {}", helper, other))),
  }
}

fn is_selected(field: &Map<String, Value>, value: &str) -> bool {
  field.get("flash").map(as_text).as_deref() == Some(value)
}

pub(super) fn option(args: &Args) -> tera::Result<Value> {
  let field = field_arg(args, "option")?;
  let value = as_text(arg(args, "option", "value")?);
  let label = as_text(arg(args, "option", "label")?);
  let selected = if is_selected(&field, &value) { " selected" } else { "" };
  Ok(Value::String(format!(
    "<option value=\"{}\"{}>{}</option>",
    tera::escape_html(&value),
    selected,
    tera::escape_html(&label)
  )))
}

fn input(args: &Args, kind: &str) -> tera::Result<Value> {
  let field = field_arg(args, kind)?;
  let value = as_text(arg(args, kind, "value")?);
  let name = field.get("name").map(as_text).unwrap_or_default();
  let checked = if is_selected(&field, &value) { " checked" } else { "" };
  Ok(Value::String(format!(
    "<input type=\"{}\" name=\"{}\" value=\"{}\"{}>",
    kind,
    tera::escape_html(&name),
    tera::escape_html(&value),
    checked
  )))
}

pub(super) fn radio(args: &Args) -> tera::Result<Value> {
  input(args, "radio")
}

pub(super) fn checkbox(args: &Args) -> tera::Result<Value> {
  input(args, "checkbox")
}

pub(super) fn error_class(args: &Args) -> tera::Result<Value> {
  let name = as_text(arg(args, "errorClass", "name")?);
  let class = scope::with_args(|render_args| match render_args.get("errors") {
    Some(errors) => errors.get(&name).map_or("", |_| ERROR_CLASS),
    None => {
      log::warn!("errorClass: no `errors` in the render arguments");
      ""
    }
  })
  .ok_or_else(|| outside_render("errorClass"))?;
  Ok(Value::String(class.to_string()))
}

fn list_arg(args: &Args, key: &str) -> Vec<Value> {
  match args.get(key) {
    Some(Value::Array(items)) => items.clone(),
    Some(Value::Null) | None => Vec::new(),
    Some(other) => vec![other.clone()],
  }
}

pub(super) struct MessageHelper(pub(super) Arc<dyn MessageSource>);

impl Function for MessageHelper {
  fn call(&self, args: &Args) -> tera::Result<Value> {
    let key = as_text(arg(args, "msg", "key")?);
    let locale = scope::with_args(|render_args| render_args.get("currentLocale").map(as_text))
      .flatten()
      .unwrap_or_default();
    Ok(Value::String(self.0.message(&locale, &key, &list_arg(args, "args"))))
  }

  fn is_safe(&self) -> bool {
    true
  }
}

pub(super) struct UrlHelper(pub(super) Arc<dyn UrlReverser>);

impl Function for UrlHelper {
  fn call(&self, args: &Args) -> tera::Result<Value> {
    let action = as_text(arg(args, "url", "action")?);
    let parts: Vec<&str> = action.split('.').collect();
    if parts.len() != 2 || parts.iter().any(|part| part.is_empty()) {
      return Err(tera::Error::msg(format!(
        "reversing '{}', expected 'Controller.Action'",
        action
      )));
    }
    self
      .0
      .reverse(&action, &list_arg(args, "args"))
      .map(Value::String)
      .map_err(tera::Error::msg)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tera::Context;

  fn args(pairs: &[(&str, Value)]) -> Args {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
  }

  fn form_context() -> Context {
    let mut context = Context::new();
    context.insert("user", &json!({ "name": "Ada", "role": "admin" }));
    context.insert("flash", &json!({ "user.role": "admin" }));
    context.insert("errors", &json!({ "user.name": { "message": "Required" } }));
    context
  }

  #[test]
  fn test_field_reads_render_args() {
    let context = form_context();
    let _scope = scope::enter(&context);

    let role = field(&args(&[("name", json!("user.role"))])).unwrap();
    assert_eq!(role["id"], json!("user_role"));
    assert_eq!(role["value"], json!("admin"));
    assert_eq!(role["flash"], json!("admin"));
    assert_eq!(role["error_class"], json!(""));

    let name = field(&args(&[("name", json!("user.name"))])).unwrap();
    assert_eq!(name["error"]["message"], json!("Required"));
    assert_eq!(name["error_class"], json!(ERROR_CLASS));
  }

  #[test]
  fn test_field_outside_render_is_an_error() {
    assert!(field(&args(&[("name", json!("user"))])).is_err());
  }

  #[test]
  fn test_option_and_inputs_mark_flashed_value() {
    let context = form_context();
    let _scope = scope::enter(&context);

    let selected = option(&args(&[
      ("field", json!("user.role")),
      ("value", json!("admin")),
      ("label", json!("Admin <all>")),
    ]))
    .unwrap();
    assert_eq!(selected, json!("<option value=\"admin\" selected>Admin &lt;all&gt;</option>"));

    let unchecked = radio(&args(&[("field", json!("user.role")), ("value", json!("guest"))])).unwrap();
    assert_eq!(unchecked, json!("<input type=\"radio\" name=\"user.role\" value=\"guest\">"));

    let checked = checkbox(&args(&[("field", json!("user.role")), ("value", json!("admin"))])).unwrap();
    assert_eq!(checked, json!("<input type=\"checkbox\" name=\"user.role\" value=\"admin\" checked>"));
  }

  #[test]
  fn test_error_class() {
    let context = form_context();
    let scope = scope::enter(&context);
    assert_eq!(error_class(&args(&[("name", json!("user.name"))])).unwrap(), json!(ERROR_CLASS));
    assert_eq!(error_class(&args(&[("name", json!("user.role"))])).unwrap(), json!(""));
    drop(scope);

    let _empty = scope::enter(&Context::new());
    assert_eq!(error_class(&args(&[("name", json!("user.name"))])).unwrap(), json!(""));
  }

  struct Routes;

  impl UrlReverser for Routes {
    fn reverse(&self, action: &str, args: &[Value]) -> Result<String, String> {
      let mut url = format!("/{}", action.replace('.', "/").to_lowercase());
      for arg in args {
        url.push('/');
        url.push_str(&as_text(arg));
      }
      Ok(url)
    }
  }

  #[test]
  fn test_url_requires_controller_action() {
    let helper = UrlHelper(Arc::new(Routes));
    let url = helper.call(&args(&[("action", json!("Users.Show")), ("args", json!([42]))])).unwrap();
    assert_eq!(url, json!("/users/show/42"));

    let err = helper.call(&args(&[("action", json!("Users"))])).unwrap_err();
    assert!(err.to_string().contains("Controller.Action"));
  }

  struct Greetings;

  impl MessageSource for Greetings {
    fn message(&self, locale: &str, key: &str, args: &[Value]) -> String {
      format!("{}:{}:{}", locale, key, args.len())
    }
  }

  #[test]
  fn test_msg_uses_current_locale() {
    let mut context = Context::new();
    context.insert("currentLocale", "fr");
    let _scope = scope::enter(&context);

    let helper = MessageHelper(Arc::new(Greetings));
    let out = helper.call(&args(&[("key", json!("greeting")), ("args", json!(["Ada"]))])).unwrap();
    assert_eq!(out, json!("fr:greeting:1"));
  }
}
