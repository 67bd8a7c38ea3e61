use std::path::PathBuf;

use thiserror::Error;

/// A specialized `Result` type for `viewcraft` operations.
pub type Result<T, E = ViewcraftError> = std::result::Result<T, E>;

/// The primary error type for all `viewcraft` operations.
#[derive(Debug, Error)]
pub enum ViewcraftError {
  /// A template failed to load, compile, merge or link during a refresh.
  #[error(transparent)]
  Template(#[from] TemplateError),

  /// No template is registered under the requested name.
  #[error("Template {0} not found.")]
  NotFound(String),

  /// An error originating from the `tera` templating engine while rendering.
  #[error("Tera rendering error: {0}")]
  Tera(#[from] tera::Error),

  /// An I/O error, typically from writing rendered output.
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  /// Malformed configuration. Raised while building, so startup fails.
  #[error("Configuration error: {0}")]
  Config(String),

  /// A custom engine failed to render.
  #[error("Render error: {0}")]
  Render(String),

  /// An error from the file watcher, only available with the `dev-reload` feature.
  #[cfg(feature = "dev-reload")]
  #[error("File watcher error: {0}")]
  Watcher(#[from] notify::Error),
}

/// A structured, positional template diagnostic.
///
/// Produced by engines and by the registry. The loader keeps the first one
/// seen during a refresh so a developer error page can show the offending
/// source around `line`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{title}: {description}")]
pub struct TemplateError {
  pub title: String,
  /// Logical name of the template, when known.
  pub name: String,
  /// Source file of the template, when known.
  pub path: PathBuf,
  pub description: String,
  /// 1-based line of the failure, `None` when no position is known.
  pub line: Option<usize>,
  pub source_lines: Vec<String>,
  /// Set for faults that make the whole loader unusable. A fatal error
  /// aborts the refresh in progress.
  pub fatal: bool,
}

impl TemplateError {
  pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      description: description.into(),
      ..Default::default()
    }
  }

  /// Builds a compilation error from a parser message that may embed a
  /// `name:line:` fragment.
  pub fn from_message(name: &str, message: &str) -> Self {
    let (parsed_name, line, description) = crate::core::diagnostics::parse_template_error(message);
    let name = if parsed_name.is_empty() { name.to_string() } else { parsed_name };
    Self {
      title: "Template Compilation Error".to_string(),
      name,
      description,
      line,
      ..Default::default()
    }
  }

  /// A fault caught at the compiler boundary.
  pub fn panic(description: impl Into<String>) -> Self {
    Self {
      title: "Panic (Template Loader)".to_string(),
      description: description.into(),
      fatal: true,
      ..Default::default()
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.path = path.into();
    self
  }

  pub fn with_line(mut self, line: usize) -> Self {
    self.line = Some(line);
    self
  }

  pub fn with_source(mut self, source: &str) -> Self {
    self.source_lines = source.split('\n').map(str::to_string).collect();
    self
  }

  pub fn fatal(mut self) -> Self {
    self.fatal = true;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display_joins_title_and_description() {
    let err = TemplateError::new("Template Load Error", "No known handler for extension 'xyz'");
    assert_eq!(err.to_string(), "Template Load Error: No known handler for extension 'xyz'");
  }

  #[test]
  fn test_from_message_extracts_line() {
    let err = TemplateError::from_message("fallback.html", "html/template:Application/Register.html:36: no such template \"footer.html\"");
    assert_eq!(err.title, "Template Compilation Error");
    assert_eq!(err.name, "Application/Register.html");
    assert_eq!(err.line, Some(36));
    assert_eq!(err.description, "no such template \"footer.html\"");
  }

  #[test]
  fn test_from_message_without_position_keeps_fallback_name() {
    let err = TemplateError::from_message("index.html", "something broke");
    assert_eq!(err.name, "index.html");
    assert_eq!(err.line, None);
    assert_eq!(err.description, "something broke");
  }

  #[test]
  fn test_template_error_converts_into_crate_error() {
    let err: ViewcraftError = TemplateError::panic("boom").into();
    assert!(matches!(err, ViewcraftError::Template(ref e) if e.fatal));
    assert_eq!(err.to_string(), "Panic (Template Loader): boom");
  }
}
