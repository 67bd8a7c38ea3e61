//! Discovery of template files and lookup of the compiled result.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::{DirEntry, WalkDir};

use crate::core::engine::{Delimiters, EngineRegistry, TemplateInfo};
use crate::core::set::CompiledSet;
use crate::core::template::{read_lines, TemplateHandle};
use crate::error::{Result, TemplateError, ViewcraftError};

/// Walks the template roots, compiles every file through its
/// [`EngineRegistry`] and serves lookups against the last build.
///
/// Roots are searched in order: when two roots hold the same relative name,
/// the first one wins.
pub struct TemplateLoader {
  paths: Vec<PathBuf>,
  registry: EngineRegistry,
  delims: Option<Delimiters>,
  templates: Option<Arc<CompiledSet>>,
  template_paths: Arc<HashMap<String, PathBuf>>,
  compile_error: Option<TemplateError>,
}

impl TemplateLoader {
  pub fn new<I, P>(paths: I, registry: EngineRegistry) -> Self
  where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
  {
    Self {
      paths: paths.into_iter().map(Into::into).collect(),
      registry,
      delims: None,
      templates: None,
      template_paths: Arc::new(HashMap::new()),
      compile_error: None,
    }
  }

  /// Uses custom action delimiters, given as two space-separated tokens such
  /// as `"<% %>"`. A malformed value is a configuration error.
  pub fn with_delimiters(mut self, spec: &str) -> Result<Self> {
    self.delims = Some(Delimiters::parse(spec)?);
    Ok(self)
  }

  pub fn registry(&self) -> &EngineRegistry {
    &self.registry
  }

  /// Register extra engines here, then call [`refresh`](Self::refresh).
  pub fn registry_mut(&mut self) -> &mut EngineRegistry {
    &mut self.registry
  }

  pub fn paths(&self) -> &[PathBuf] {
    &self.paths
  }

  /// Rebuilds the template set from disk.
  ///
  /// Every file under every root is compiled, once under its relative name and
  /// once more under the lower-cased name. Files and directories starting with
  /// `.` are skipped. A template that fails to compile is left out of the set
  /// and the first such failure is returned, but every other template stays
  /// available. Only a fatal error stops the walk.
  pub fn refresh(&mut self) -> Result<(), TemplateError> {
    log::trace!("Refreshing templates from {:?}", self.paths);

    self.compile_error = None;
    self.template_paths = Arc::new(HashMap::new());
    self.registry.clear();
    self.registry.set_delims(self.delims.clone());

    let mut template_paths = HashMap::new();
    let mut first_error = None;

    for root in &self.paths {
      let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || is_watched(e));

      for entry in walker {
        let entry = match entry {
          Ok(entry) => entry,
          Err(e) => {
            log::error!("Error walking templates in {}: {}", root.display(), e);
            continue;
          }
        };
        // Symlinked files are read through the link.
        if !(entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())) {
          continue;
        }

        let name = logical_name(root, entry.path());
        let lower = name.to_lowercase();
        log::trace!("Found template {}. Attempting to compile.", name);

        for candidate in [name, lower] {
          template_paths
            .entry(candidate.clone())
            .or_insert_with(|| entry.path().to_path_buf());

          let Err(err) = self.registry.add_template(&TemplateInfo::new(candidate, entry.path())) else {
            continue;
          };
          if err.fatal {
            log::error!("Template loader is unusable: {}", err);
            self.templates = None;
            self.template_paths = Arc::new(template_paths);
            self.compile_error = Some(err.clone());
            return Err(err);
          }
          record_error(&mut first_error, err);
        }
      }
    }

    if let Err(err) = self.registry.link() {
      record_error(&mut first_error, err);
    }

    self.templates = self.registry.compiled_templates();
    self.template_paths = Arc::new(template_paths);
    log::trace!(
      "Found templates: {:?}",
      self.templates.as_ref().map(|set| set.names()).unwrap_or_default()
    );

    self.compile_error = first_error.clone();
    match first_error {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }

  /// Looks `name` up case-insensitively.
  ///
  /// A template that compiled is returned even when the build reported an
  /// error elsewhere; the handle carries that error. A missing template is
  /// reported as the build error if there is one, as it is the likely cause.
  pub fn template(&self, name: &str) -> Result<TemplateHandle> {
    let key = name.to_lowercase();
    match &self.templates {
      Some(set) if set.contains(&key) => Ok(TemplateHandle {
        name: key,
        set: set.clone(),
        paths: self.template_paths.clone(),
        build_error: self.compile_error.clone(),
      }),
      _ => match &self.compile_error {
        Some(err) => Err(ViewcraftError::Template(err.clone())),
        None => Err(ViewcraftError::NotFound(name.to_string())),
      },
    }
  }

  /// Source lines of the file behind `name`. Empty when unknown or unreadable.
  pub fn content(&self, name: &str) -> Vec<String> {
    self
      .template_paths
      .get(name)
      .or_else(|| self.template_paths.get(&name.to_lowercase()))
      .map(|path| read_lines(path))
      .unwrap_or_default()
  }

  /// The error kept by the last refresh.
  pub fn compile_error(&self) -> Option<&TemplateError> {
    self.compile_error.as_ref()
  }

  /// Names available for lookup, sorted.
  pub fn template_names(&self) -> Vec<String> {
    self.templates.as_ref().map(|set| set.names()).unwrap_or_default()
  }

  pub fn compiled(&self) -> Option<Arc<CompiledSet>> {
    self.templates.clone()
  }
}

/// Hidden files and directories are neither compiled nor watched.
pub(crate) fn is_watched_name(name: &str) -> bool {
  !name.starts_with('.')
}

fn is_watched(entry: &DirEntry) -> bool {
  entry.file_name().to_str().map_or(true, is_watched_name)
}

/// `root/admin/Index.html` → `admin/Index.html`
fn logical_name(root: &Path, path: &Path) -> String {
  let relative = path.strip_prefix(root).unwrap_or(path);
  relative
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}

fn record_error(slot: &mut Option<TemplateError>, err: TemplateError) {
  match err.line {
    Some(line) => log::error!("{} (In {} around line {}): {}", err.title, err.name, line, err.description),
    None => log::error!("{} (In {}): {}", err.title, err.name, err.description),
  }
  slot.get_or_insert(err);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_logical_name_uses_forward_slashes() {
    let root = Path::new("views");
    let path = root.join("Admin").join("Index.html");
    assert_eq!(logical_name(root, &path), "Admin/Index.html");
  }

  #[test]
  fn test_first_error_wins() {
    let mut slot = None;
    record_error(&mut slot, TemplateError::new("Template Compilation Error", "first"));
    record_error(&mut slot, TemplateError::new("Template Compilation Error", "second"));
    assert_eq!(slot.map(|e| e.description), Some("first".to_string()));
  }

  #[test]
  fn test_hidden_names_are_not_watched() {
    assert!(is_watched_name("index.html"));
    assert!(!is_watched_name(".git"));
    assert!(!is_watched_name(".index.html.swp"));
  }

  #[test]
  fn test_lookup_before_refresh_is_not_found() {
    let loader = TemplateLoader::new(["views"], EngineRegistry::new());
    assert!(matches!(loader.template("index.html"), Err(ViewcraftError::NotFound(_))));
    assert!(loader.template_names().is_empty());
    assert!(loader.content("index.html").is_empty());
  }

  #[test]
  fn test_malformed_delimiters_are_a_config_error() {
    let result = TemplateLoader::new(["views"], EngineRegistry::new()).with_delimiters("<%");
    assert!(matches!(result, Err(ViewcraftError::Config(_))));
  }
}
