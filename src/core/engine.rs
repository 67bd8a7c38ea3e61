//! Extension-dispatched template compilation.
//!
//! The [`EngineRegistry`] maps file extensions to [`Compiler`]s and merges
//! every successfully compiled template into one [`CompiledSet`]. It is owned
//! by a [`TemplateLoader`](crate::TemplateLoader), never shared globally, so
//! independent loaders (and tests) do not interfere with each other.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tera::Context;

use crate::core::set::CompiledSet;
use crate::engines::tera::{TeraArtifact, TeraCompiler};
use crate::error::{Result, TemplateError, ViewcraftError};

/// Identifies one discoverable template file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateInfo {
  /// Logical, loader-relative name, always using `/` separators.
  pub name: String,
  /// Location of the file on disk.
  pub path: PathBuf,
}

impl TemplateInfo {
  pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
    Self {
      name: name.into(),
      path: path.into(),
    }
  }
}

/// A custom pair of action delimiters, e.g. `<%` and `%>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
  pub left: String,
  pub right: String,
}

impl Delimiters {
  pub fn new(left: impl Into<String>, right: impl Into<String>) -> Result<Self> {
    let (left, right) = (left.into(), right.into());
    if left.is_empty() || right.is_empty() {
      return Err(ViewcraftError::Config(
        "template delimiters must both be non-empty".to_string(),
      ));
    }
    Ok(Self { left, right })
  }

  /// Parses a configuration value such as `"<% %>"`: exactly two
  /// whitespace-separated tokens.
  pub fn parse(spec: &str) -> Result<Self> {
    let tokens: Vec<&str> = spec.split_whitespace().collect();
    match tokens.as_slice() {
      [left, right] => Self::new(*left, *right),
      _ => Err(ViewcraftError::Config(format!(
        "incorrect format for template delimiters: expected two space-separated tokens, got '{}'",
        spec
      ))),
    }
  }
}

/// Something a compiled template can be rendered through. External engines
/// return one wrapped in [`Artifact::Custom`].
pub trait Renderable: Send + Sync {
  fn render(&self, out: &mut dyn Write, args: &Context) -> Result<()>;
}

/// The engine-specific result of compiling one template.
pub enum Artifact {
  /// Parsed by the default Tera engine. Rendered through the set's shared
  /// `Tera` instance so inheritance and includes resolve across files.
  Tera(TeraArtifact),
  /// Served verbatim.
  Text(String),
  /// Produced by an external engine.
  Custom(Arc<dyn Renderable>),
}

/// Compiles template source for one or more file extensions.
///
/// Implementations must report failures as [`TemplateError`]s. The registry
/// additionally catches panics at this boundary, so a broken engine degrades
/// to a reported error instead of taking the process down.
pub trait Compiler: Send + Sync {
  fn compile(&self, name: &str, source: &str, delims: Option<&Delimiters>) -> Result<Artifact, TemplateError>;
}

impl<F> Compiler for F
where
  F: Fn(&str, &str, Option<&Delimiters>) -> Result<Artifact, TemplateError> + Send + Sync,
{
  fn compile(&self, name: &str, source: &str, delims: Option<&Delimiters>) -> Result<Artifact, TemplateError> {
    self(name, source, delims)
  }
}

/// Maps extensions to compilers and owns the merged template set of the
/// current build.
pub struct EngineRegistry {
  /// Template names already attempted in this build, and where they came from.
  seen_paths: HashMap<String, PathBuf>,
  handlers: HashMap<String, Arc<dyn Compiler>>,
  compiled: Option<Arc<CompiledSet>>,
  delims: Option<Delimiters>,
}

impl Default for EngineRegistry {
  fn default() -> Self {
    Self::new()
  }
}

impl EngineRegistry {
  /// A registry with the default Tera engine bound to extensionless and
  /// `.html` files.
  pub fn new() -> Self {
    let mut registry = Self::empty();
    registry.register_templater("", TeraCompiler::default());
    registry
  }

  /// A registry without any compiler.
  pub fn empty() -> Self {
    Self {
      seen_paths: HashMap::new(),
      handlers: HashMap::new(),
      compiled: None,
      delims: None,
    }
  }

  /// Binds `compiler` to `extension`. The last registration for an extension
  /// wins. `""` and `"html"` both name the default slot.
  pub fn register_templater<C: Compiler + 'static>(&mut self, extension: &str, compiler: C) {
    self.register_shared(extension, Arc::new(compiler));
  }

  pub fn register_shared(&mut self, extension: &str, compiler: Arc<dyn Compiler>) {
    let extension = normalize_extension(extension);
    log::trace!("Registering template compiler for extension '{}'", extension);
    self.handlers.insert(extension, compiler);
  }

  /// Whether a compiler is bound to `extension`.
  pub fn handles(&self, extension: &str) -> bool {
    self.handlers.contains_key(&normalize_extension(extension))
  }

  /// Sets the delimiter override passed to every compiler. `None` restores
  /// each engine's defaults.
  pub fn set_delims(&mut self, delims: Option<Delimiters>) {
    self.delims = delims;
  }

  pub fn delims(&self) -> Option<&Delimiters> {
    self.delims.as_ref()
  }

  /// The merged set, `None` until a template compiles successfully.
  pub fn compiled_templates(&self) -> Option<Arc<CompiledSet>> {
    self.compiled.clone()
  }

  /// Starts a new build generation. Compilers and delimiters are kept.
  pub fn clear(&mut self) {
    self.seen_paths.clear();
    self.compiled = None;
  }

  /// Compiles the template described by `info` and merges it into the set.
  ///
  /// Adding a name twice in one build is a no-op, whatever the path. An
  /// unreadable file is logged and skipped.
  pub fn add_template(&mut self, info: &TemplateInfo) -> Result<(), TemplateError> {
    if self.seen_paths.contains_key(&info.name) {
      return Ok(());
    }
    self.seen_paths.insert(info.name.clone(), info.path.clone());

    let source = match fs::read_to_string(&info.path) {
      Ok(source) => source,
      Err(e) => {
        log::warn!("Failed reading file {}: {}", info.path.display(), e);
        return Ok(());
      }
    };

    let extension = extension_of(&info.path);
    let Some(compiler) = self.handlers.get(&extension).cloned() else {
      return Err(
        TemplateError::new(
          "Template Load Error",
          format!("No known handler for extension '{}'", extension),
        )
        .with_name(&info.name)
        .with_path(&info.path)
        .with_source(&source),
      );
    };

    let delims = self.delims.clone();
    let artifact = guard(|| compiler.compile(&info.name, &source, delims.as_ref()))
      .map_err(|e| enrich(e, info, &source))?;

    guard(|| self.merge(&info.name, artifact)).map_err(|e| enrich(e, info, &source))?;
    log::trace!("Compiled {} from {}", info.name, info.path.display());
    Ok(())
  }

  /// Resolves cross-template references that could not be linked while
  /// templates were still arriving.
  pub fn link(&mut self) -> Result<(), TemplateError> {
    match self.compiled.as_mut() {
      Some(set) if set.needs_link() => guard(|| Arc::make_mut(set).link()),
      _ => Ok(()),
    }
  }

  fn merge(&mut self, name: &str, artifact: Artifact) -> Result<(), TemplateError> {
    match self.compiled.as_mut() {
      // Copy-on-write: readers holding a snapshot keep the old set.
      Some(set) => Arc::make_mut(set).insert(name, artifact),
      None => {
        let mut set = CompiledSet::default();
        set.insert(name, artifact)?;
        self.compiled = Some(Arc::new(set));
        Ok(())
      }
    }
  }
}

/// Runs `f`, converting a panic into a fatal [`TemplateError`].
fn guard<T>(f: impl FnOnce() -> Result<T, TemplateError>) -> Result<T, TemplateError> {
  match panic::catch_unwind(AssertUnwindSafe(f)) {
    Ok(result) => result,
    Err(payload) => {
      let description = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
      log::error!("Template compiler panicked: {}", description);
      Err(TemplateError::panic(description))
    }
  }
}

/// Fills in whatever the engine could not know about the failing file.
fn enrich(mut err: TemplateError, info: &TemplateInfo, source: &str) -> TemplateError {
  if err.name.is_empty() {
    err.name = info.name.clone();
  }
  if err.path.as_os_str().is_empty() {
    err.path = info.path.clone();
  }
  if err.source_lines.is_empty() {
    err = err.with_source(source);
  }
  err
}

fn normalize_extension(extension: &str) -> String {
  let extension = extension.trim_start_matches('.').to_ascii_lowercase();
  // html is equivalent to no extension - the default
  if extension == "html" { String::new() } else { extension }
}

fn extension_of(path: &Path) -> String {
  normalize_extension(path.extension().and_then(OsStr::to_str).unwrap_or(""))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engines::text::TextCompiler;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use tempfile::tempdir;

  fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
  }

  #[test]
  fn test_delimiters_parse() {
    let delims = Delimiters::parse("<% %>").unwrap();
    assert_eq!(delims.left, "<%");
    assert_eq!(delims.right, "%>");

    assert!(matches!(Delimiters::parse("<%"), Err(ViewcraftError::Config(_))));
    assert!(matches!(Delimiters::parse("<% %> extra"), Err(ViewcraftError::Config(_))));
    assert!(matches!(Delimiters::new("", "%>"), Err(ViewcraftError::Config(_))));
  }

  #[test]
  fn test_html_is_the_default_extension() {
    let mut registry = EngineRegistry::empty();
    assert!(!registry.handles(""));
    registry.register_templater("", TextCompiler);
    assert!(registry.handles("html"));
    assert!(registry.handles(".HTML"));
    assert!(!registry.handles("txt"));
  }

  #[test]
  fn test_add_template_is_idempotent_per_name() {
    let dir = tempdir().unwrap();
    let first = write(dir.path(), "a.html", "first");
    let second = write(dir.path(), "b.html", "second");

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut registry = EngineRegistry::empty();
    registry.register_templater("", move |_: &str, source: &str, _: Option<&Delimiters>| -> Result<Artifact, TemplateError> {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok(Artifact::Text(source.to_string()))
    });

    registry.add_template(&TemplateInfo::new("page", &first)).unwrap();
    registry.add_template(&TemplateInfo::new("page", &second)).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let set = registry.compiled_templates().unwrap();
    let mut out = Vec::new();
    set.render("page", &mut out, &Context::new()).unwrap();
    assert_eq!(out, b"first");
  }

  #[test]
  fn test_failed_compile_is_not_retried_in_same_build() {
    let dir = tempdir().unwrap();
    let path = write(dir.path(), "broken.html", "x");
    let mut registry = EngineRegistry::empty();
    registry.register_templater("", |_: &str, _: &str, _: Option<&Delimiters>| -> Result<Artifact, TemplateError> {
      Err(TemplateError::new("Template Compilation Error", "nope"))
    });

    let info = TemplateInfo::new("broken.html", &path);
    assert!(registry.add_template(&info).is_err());
    assert!(registry.add_template(&info).is_ok());
    assert!(registry.compiled_templates().is_none());
  }

  #[test]
  fn test_unreadable_file_is_skipped() {
    let dir = tempdir().unwrap();
    let mut registry = EngineRegistry::new();
    let info = TemplateInfo::new("missing.html", dir.path().join("missing.html"));
    assert!(registry.add_template(&info).is_ok());
    assert!(registry.compiled_templates().is_none());
  }

  #[test]
  fn test_missing_handler_names_extension() {
    let dir = tempdir().unwrap();
    let path = write(dir.path(), "data.xyz", "line one\nline two");
    let mut registry = EngineRegistry::new();

    let err = registry.add_template(&TemplateInfo::new("data.xyz", &path)).unwrap_err();
    assert_eq!(err.title, "Template Load Error");
    assert!(err.description.contains("'xyz'"));
    assert_eq!(err.path, path);
    assert_eq!(err.line, None);
    assert_eq!(err.source_lines, vec!["line one", "line two"]);
    assert!(!err.fatal);
  }

  #[test]
  fn test_compiler_panic_becomes_structured_error() {
    let dir = tempdir().unwrap();
    let path = write(dir.path(), "index.html", "hello");
    let mut registry = EngineRegistry::empty();
    registry.register_templater("", |_: &str, _: &str, _: Option<&Delimiters>| -> Result<Artifact, TemplateError> {
      panic!("helper `bad` has an unsupported signature")
    });

    let err = registry.add_template(&TemplateInfo::new("index.html", &path)).unwrap_err();
    assert_eq!(err.title, "Panic (Template Loader)");
    assert!(err.description.contains("unsupported signature"));
    assert!(err.fatal);
    assert_eq!(err.name, "index.html");
  }

  #[test]
  fn test_clear_keeps_handlers_and_delims() {
    let dir = tempdir().unwrap();
    let path = write(dir.path(), "index.html", "hello");
    let mut registry = EngineRegistry::empty();
    registry.register_templater("", TextCompiler);
    registry.set_delims(Some(Delimiters::parse("[[ ]]").unwrap()));

    let info = TemplateInfo::new("index.html", &path);
    registry.add_template(&info).unwrap();
    assert!(registry.compiled_templates().is_some());

    registry.clear();
    assert!(registry.compiled_templates().is_none());
    assert!(registry.handles(""));
    assert_eq!(registry.delims().map(|d| d.left.as_str()), Some("[["));

    // A new generation compiles the same name again.
    registry.add_template(&info).unwrap();
    assert!(registry.compiled_templates().unwrap().contains("index.html"));
  }

  #[test]
  fn test_merge_after_snapshot_does_not_touch_snapshot() {
    let dir = tempdir().unwrap();
    let a = write(dir.path(), "a.txt", "a");
    let b = write(dir.path(), "b.txt", "b");
    let mut registry = EngineRegistry::empty();
    registry.register_templater("txt", TextCompiler);

    registry.add_template(&TemplateInfo::new("a.txt", &a)).unwrap();
    let snapshot = registry.compiled_templates().unwrap();
    registry.add_template(&TemplateInfo::new("b.txt", &b)).unwrap();

    assert!(!snapshot.contains("b.txt"));
    assert!(registry.compiled_templates().unwrap().contains("b.txt"));
  }
}
