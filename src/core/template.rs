use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tera::Context;

use crate::core::set::{CompiledSet, EngineKind};
use crate::error::{Result, TemplateError, ViewcraftError};
use crate::helpers::scope;

/// A compiled template, as returned by
/// [`TemplateLoader::template`](crate::TemplateLoader::template).
///
/// The handle holds a snapshot of the set it was looked up in. It keeps
/// rendering the old version after a refresh; look it up again to pick up
/// changes.
#[derive(Clone)]
pub struct TemplateHandle {
  pub(crate) name: String,
  pub(crate) set: Arc<CompiledSet>,
  pub(crate) paths: Arc<HashMap<String, PathBuf>>,
  pub(crate) build_error: Option<TemplateError>,
}

impl TemplateHandle {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn engine(&self) -> Option<EngineKind> {
    self.set.engine(&self.name)
  }

  /// The source file, line by line. Empty when it cannot be read.
  pub fn content(&self) -> Vec<String> {
    self.paths.get(&self.name).map(|path| read_lines(path)).unwrap_or_default()
  }

  /// An error from the build this template belongs to. The template itself
  /// compiled fine, but the application may want to report the failure.
  pub fn build_error(&self) -> Option<&TemplateError> {
    self.build_error.as_ref()
  }

  /// Renders into `out`. Values written by the `set` and `append` helpers are
  /// stored back into `args`.
  pub fn render<W: Write>(&self, mut out: W, args: &mut Context) -> Result<()> {
    let guard = scope::enter(args);
    self.set.render(&self.name, &mut out, args)?;
    guard.apply_to(args);
    Ok(())
  }

  pub fn render_to_string(&self, args: &mut Context) -> Result<String> {
    let mut out = Vec::new();
    self.render(&mut out, args)?;
    String::from_utf8(out).map_err(|e| ViewcraftError::Render(e.to_string()))
  }
}

impl std::fmt::Debug for TemplateHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TemplateHandle")
      .field("name", &self.name)
      .field("engine", &self.engine())
      .field("build_error", &self.build_error)
      .finish()
  }
}

pub(crate) fn read_lines(path: &Path) -> Vec<String> {
  match fs::read_to_string(path) {
    Ok(content) => content.split('\n').map(str::to_string).collect(),
    Err(e) => {
      log::debug!("Cannot read template source {}: {}", path.display(), e);
      Vec::new()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::engine::{Artifact, Compiler};
  use crate::engines::tera::TeraCompiler;
  use tempfile::tempdir;

  fn handle(name: &str, source: &str, path: PathBuf) -> TemplateHandle {
    let mut set = CompiledSet::default();
    let artifact = TeraCompiler::default().compile(name, source, None).unwrap();
    set.insert(name, artifact).unwrap();
    set.insert("plain.txt", Artifact::Text("plain".into())).unwrap();
    TemplateHandle {
      name: name.to_string(),
      set: Arc::new(set),
      paths: Arc::new(HashMap::from([(name.to_string(), path)])),
      build_error: None,
    }
  }

  #[test]
  fn test_render_applies_helper_writes() {
    let dir = tempdir().unwrap();
    let source = "{{ set(key=\"title\", value=\"Home\") }}{{ append(key=\"scripts\", value=\"app.js\") }}body";
    let handle = handle("page", source, dir.path().join("page"));

    let mut args = Context::new();
    assert_eq!(handle.render_to_string(&mut args).unwrap(), "body");
    assert_eq!(args.get("title"), Some(&serde_json::json!("Home")));
    assert_eq!(args.get("scripts"), Some(&serde_json::json!(["app.js"])));
  }

  #[test]
  fn test_helper_writes_are_not_visible_to_the_same_render() {
    let dir = tempdir().unwrap();
    let source = "{{ set(key=\"title\", value=\"New\") }}[{{ title }}]";
    let handle = handle("page", source, dir.path().join("page"));

    let mut args = Context::new();
    args.insert("title", "Old");
    assert_eq!(handle.render_to_string(&mut args).unwrap(), "[Old]");
    assert_eq!(args.get("title"), Some(&serde_json::json!("New")));
  }

  #[test]
  fn test_content_reads_source_lines() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("page");
    fs::write(&path, "one\ntwo").unwrap();
    let handle = handle("page", "one\ntwo", path);
    assert_eq!(handle.content(), vec!["one", "two"]);
    assert_eq!(handle.engine(), Some(EngineKind::Tera));

    fs::remove_file(dir.path().join("page")).unwrap();
    assert!(handle.content().is_empty());
  }

  #[test]
  fn test_render_failure_leaves_no_scope_behind() {
    let dir = tempdir().unwrap();
    let handle = handle("page", "{{ missing.value }}", dir.path().join("page"));
    assert!(handle.render_to_string(&mut Context::new()).is_err());
    assert!(scope::with_args(|_| ()).is_none());
  }
}
