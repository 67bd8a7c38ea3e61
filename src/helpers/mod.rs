//! Helper functions available to every template compiled by the default engine.
//!
//! The table is built once and shared by all templates. Tera only supports
//! named arguments, so helpers are called like `{{ slug(text=title) }}`; the
//! single-value helpers are registered as filters too (`{{ title | slug }}`).
//!
//! | Name         | Kind              | Output                                    |
//! |--------------|-------------------|-------------------------------------------|
//! | `url`        | function          | reverse route for `Controller.Action`     |
//! | `eq`         | function          | boolean equality                          |
//! | `set`        | function          | writes a render argument (see below)      |
//! | `append`     | function          | appends to a render argument list         |
//! | `field`      | function          | form field state                          |
//! | `option`     | function          | `<option>` tag (safe)                     |
//! | `radio`      | function          | radio `<input>` (safe)                    |
//! | `checkbox`   | function          | checkbox `<input>` (safe)                 |
//! | `pad`        | function + filter | text padded with `&nbsp;` (safe)          |
//! | `errorClass` | function          | `hasError` for fields with errors         |
//! | `msg`        | function          | localized message (safe)                  |
//! | `nl2br`      | function + filter | newlines as `<br>` (safe)                 |
//! | `raw`        | function + filter | unescaped text (safe)                     |
//! | `pluralize`  | function + filter | plural suffix                             |
//! | `date`       | function + filter | date in the configured format             |
//! | `datetime`   | function + filter | date and time in the configured format    |
//! | `slug`       | function + filter | URL slug                                  |
//!
//! `set` and `append` write to a scope that `field`, `errorClass` and `msg`
//! read immediately, but Tera's own variables are fixed for the whole render.
//! `{{ title }}` in the same template, or in a template it includes, still
//! sees the old value. The writes reach the caller's `Context` once the render
//! returns.

mod dates;
mod form;
pub(crate) mod scope;
mod text;

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tera::{Filter, Function, Tera, Value};

use crate::error::TemplateError;

pub use self::dates::{DEFAULT_DATETIME_FORMAT, DEFAULT_DATE_FORMAT};
pub use self::form::ERROR_CLASS;
pub use self::text::slug;

static HELPER_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid helper name regex"));

type Args = HashMap<String, Value>;

/// Resolves `Controller.Action` plus arguments into a URL.
pub trait UrlReverser: Send + Sync {
  fn reverse(&self, action: &str, args: &[Value]) -> Result<String, String>;
}

/// Resolves a message key into localized text.
pub trait MessageSource: Send + Sync {
  fn message(&self, locale: &str, key: &str, args: &[Value]) -> String;
}

/// Used until the application plugs in its router.
#[derive(Debug, Default)]
pub struct NoRoutes;

impl UrlReverser for NoRoutes {
  fn reverse(&self, action: &str, _args: &[Value]) -> Result<String, String> {
    Err(format!("no router configured to reverse '{}'", action))
  }
}

/// Echoes the key back. Used until the application plugs in its catalog.
#[derive(Debug, Default)]
pub struct KeyMessages;

impl MessageSource for KeyMessages {
  fn message(&self, _locale: &str, key: &str, _args: &[Value]) -> String {
    key.to_string()
  }
}

/// The set of helpers injected into every Tera template.
pub struct HelperTable {
  date_format: String,
  datetime_format: String,
  urls: Arc<dyn UrlReverser>,
  messages: Arc<dyn MessageSource>,
  functions: Vec<(String, Arc<dyn Function>)>,
  filters: Vec<(String, Arc<dyn Filter>)>,
}

impl Default for HelperTable {
  fn default() -> Self {
    Self {
      date_format: DEFAULT_DATE_FORMAT.to_string(),
      datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
      urls: Arc::new(NoRoutes),
      messages: Arc::new(KeyMessages),
      functions: Vec::new(),
      filters: Vec::new(),
    }
  }
}

impl HelperTable {
  pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
    self.date_format = format.into();
    self
  }

  pub fn with_datetime_format(mut self, format: impl Into<String>) -> Self {
    self.datetime_format = format.into();
    self
  }

  pub fn with_url_reverser<R: UrlReverser + 'static>(mut self, urls: R) -> Self {
    self.urls = Arc::new(urls);
    self
  }

  pub fn with_message_source<M: MessageSource + 'static>(mut self, messages: M) -> Self {
    self.messages = Arc::new(messages);
    self
  }

  /// Adds an application helper. Installed after the built-ins, so it can
  /// replace one.
  pub fn register_function<F: Function + 'static>(mut self, name: &str, function: F) -> Self {
    self.functions.push((name.to_string(), Arc::new(function)));
    self
  }

  pub fn register_filter<F: Filter + 'static>(mut self, name: &str, filter: F) -> Self {
    self.filters.push((name.to_string(), Arc::new(filter)));
    self
  }

  /// Checks that the table can be installed at all. A failure here makes
  /// every template unusable, so it is reported as fatal.
  pub fn validate(&self) -> Result<(), TemplateError> {
    let names = self.functions.iter().map(|(name, _)| name).chain(self.filters.iter().map(|(name, _)| name));
    for name in names {
      if !HELPER_NAME.is_match(name) {
        return Err(function_error(format!("'{}' is not a valid helper name", name)));
      }
    }
    for format in [&self.date_format, &self.datetime_format] {
      if !dates::is_valid_format(format) {
        return Err(function_error(format!("'{}' is not a valid date format", format)));
      }
    }
    Ok(())
  }

  /// Registers every helper on `tera`.
  pub(crate) fn install(&self, tera: &mut Tera) -> Result<(), TemplateError> {
    self.validate()?;

    tera.register_function("url", form::UrlHelper(self.urls.clone()));
    tera.register_function("eq", text::eq);
    tera.register_function("set", Safe(form::set));
    tera.register_function("append", Safe(form::append));
    tera.register_function("field", form::field);
    tera.register_function("option", Safe(form::option));
    tera.register_function("radio", Safe(form::radio));
    tera.register_function("checkbox", Safe(form::checkbox));
    tera.register_function("errorClass", form::error_class);
    tera.register_function("msg", form::MessageHelper(self.messages.clone()));

    tera.register_function("pad", Safe(text::pad));
    tera.register_filter("pad", SafeFilter(text::pad_filter));
    tera.register_function("nl2br", Safe(text::nl2br));
    tera.register_filter("nl2br", SafeFilter(text::nl2br_filter));
    tera.register_function("raw", Safe(text::raw));
    tera.register_filter("raw", SafeFilter(text::raw_filter));
    tera.register_function("pluralize", text::pluralize);
    tera.register_filter("pluralize", text::pluralize_filter);
    tera.register_function("slug", text::slug_function);
    tera.register_filter("slug", text::slug_filter);

    tera.register_function("date", dates::DateHelper::new(&self.date_format));
    tera.register_filter("date", dates::DateHelper::new(&self.date_format));
    tera.register_function("datetime", dates::DateHelper::new(&self.datetime_format));
    tera.register_filter("datetime", dates::DateHelper::new(&self.datetime_format));

    for (name, function) in &self.functions {
      tera.register_function(name, SharedFunction(function.clone()));
    }
    for (name, filter) in &self.filters {
      tera.register_filter(name, SharedFilter(filter.clone()));
    }
    Ok(())
  }
}

fn function_error(description: String) -> TemplateError {
  TemplateError::new("Template Function Error", description).fatal()
}

/// Marks a helper's output as HTML that must not be escaped again.
struct Safe<F>(F);

impl<F> Function for Safe<F>
where
  F: Fn(&Args) -> tera::Result<Value> + Send + Sync,
{
  fn call(&self, args: &Args) -> tera::Result<Value> {
    (self.0)(args)
  }

  fn is_safe(&self) -> bool {
    true
  }
}

struct SafeFilter<F>(F);

impl<F> Filter for SafeFilter<F>
where
  F: Fn(&Value, &Args) -> tera::Result<Value> + Send + Sync,
{
  fn filter(&self, value: &Value, args: &Args) -> tera::Result<Value> {
    (self.0)(value, args)
  }

  fn is_safe(&self) -> bool {
    true
  }
}

struct SharedFunction(Arc<dyn Function>);

impl Function for SharedFunction {
  fn call(&self, args: &Args) -> tera::Result<Value> {
    self.0.call(args)
  }

  fn is_safe(&self) -> bool {
    self.0.is_safe()
  }
}

struct SharedFilter(Arc<dyn Filter>);

impl Filter for SharedFilter {
  fn filter(&self, value: &Value, args: &Args) -> tera::Result<Value> {
    self.0.filter(value, args)
  }

  fn is_safe(&self) -> bool {
    self.0.is_safe()
  }
}

/// A required named argument.
fn arg<'a>(args: &'a Args, helper: &str, key: &str) -> tera::Result<&'a Value> {
  args
    .get(key)
    .ok_or_else(|| tera::Error::msg(format!("`{}` requires a `{}` argument", helper, key)))
}

/// Strings as-is, everything else through its JSON form.
fn as_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_table_is_valid() {
    assert!(HelperTable::default().validate().is_ok());
  }

  #[test]
  fn test_invalid_helper_name_is_fatal() {
    fn noop(_: &Args) -> tera::Result<Value> {
      Ok(Value::Null)
    }

    let err = HelperTable::default().register_function("not valid", noop).validate().unwrap_err();
    assert_eq!(err.title, "Template Function Error");
    assert!(err.description.contains("not valid"));
    assert!(err.fatal);
  }

  #[test]
  fn test_install_registers_helpers() {
    let mut tera = Tera::default();
    HelperTable::default().install(&mut tera).unwrap();
    tera
      .add_raw_template("t", "{{ 'Hello World' | slug }}|{{ pluralize(items=2) }}|{{ eq(a=1, b=1.0) }}")
      .unwrap();
    assert_eq!(tera.render("t", &tera::Context::new()).unwrap(), "hello-world|s|true");
  }

  #[test]
  fn test_custom_function_overrides_builtin() {
    fn shout(args: &Args) -> tera::Result<Value> {
      Ok(Value::String(as_text(arg(args, "slug", "text")?).to_uppercase()))
    }

    let mut tera = Tera::default();
    HelperTable::default().register_function("slug", shout).install(&mut tera).unwrap();
    tera.add_raw_template("t", "{{ slug(text='quiet') }}").unwrap();
    assert_eq!(tera.render("t", &tera::Context::new()).unwrap(), "QUIET");
  }
}
