use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tera::{Context, ErrorKind, Tera};

use crate::core::diagnostics::error_chain;
use crate::core::engine::{Artifact, Renderable};
use crate::engines::tera::TeraEnv;
use crate::error::{Result, TemplateError, ViewcraftError};

/// `Template `x` loads macros from `y` which isn't present in Tera`
static MACRO_CULPRIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"Template `([^`]+)`").expect("valid macro culprit regex"));

/// The engine that compiled a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
  Tera,
  Text,
  Custom,
}

#[derive(Clone)]
enum Entry {
  /// Rendered through the `Tera` of group `group`; the source is kept for
  /// relinking.
  Tera { source: Arc<str>, group: usize },
  Text(Arc<str>),
  Custom(Arc<dyn Renderable>),
}

/// One `Tera` per distinct engine environment. Every group holds every Tera
/// source, so parents and macros resolve across engines, but each template
/// renders with the helpers and hooks of the engine that compiled it.
#[derive(Clone)]
struct TeraGroup {
  env: Arc<TeraEnv>,
  tera: Tera,
}

/// Every template compiled during one build, addressable by logical name.
///
/// Templates from different engines share this one namespace; rendering is
/// dispatched on the engine that produced each entry.
#[derive(Clone, Default)]
pub struct CompiledSet {
  entries: HashMap<String, Entry>,
  groups: Vec<TeraGroup>,
  unlinked: bool,
}

impl CompiledSet {
  pub fn contains(&self, name: &str) -> bool {
    self.entries.contains_key(name)
  }

  pub fn engine(&self, name: &str) -> Option<EngineKind> {
    self.entries.get(name).map(|entry| match entry {
      Entry::Tera { .. } => EngineKind::Tera,
      Entry::Text(_) => EngineKind::Text,
      Entry::Custom(_) => EngineKind::Custom,
    })
  }

  /// Sorted logical names of every template in the set.
  pub fn names(&self) -> Vec<String> {
    let mut names: Vec<String> = self.entries.keys().cloned().collect();
    names.sort();
    names
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Merges one compiled artifact under `name`.
  pub(crate) fn insert(&mut self, name: &str, artifact: Artifact) -> Result<(), TemplateError> {
    if self.entries.contains_key(name) {
      return Err(TemplateError::new(
        "Template Merge Error",
        format!("a template named '{}' is already defined", name),
      ));
    }

    let entry = match artifact {
      Artifact::Tera(artifact) => {
        let source: Arc<str> = Arc::from(artifact.source);
        let group = self.group_for(&artifact.env)?;
        // Parents and macro files may arrive later in the walk. The template
        // is registered either way; `link` settles it once the build is done.
        for TeraGroup { tera, .. } in &mut self.groups {
          if let Err(e) = tera.add_raw_template(name, &source) {
            log::debug!("Deferring link of {}: {}", name, e);
            self.unlinked = true;
          }
        }
        Entry::Tera { source, group }
      }
      Artifact::Text(source) => Entry::Text(Arc::from(source)),
      Artifact::Custom(renderable) => Entry::Custom(renderable),
    };

    self.entries.insert(name.to_string(), entry);
    Ok(())
  }

  /// Index of the group for `env`, creating it with every Tera source seen
  /// so far.
  fn group_for(&mut self, env: &Arc<TeraEnv>) -> Result<usize, TemplateError> {
    if let Some(index) = self.groups.iter().position(|group| Arc::ptr_eq(&group.env, env)) {
      return Ok(index);
    }

    let mut tera = env.instantiate()?;
    let sources = self.tera_sources();
    if !sources.is_empty() {
      let templates = sources.iter().map(|(name, source)| (name.as_str(), &**source));
      if tera.add_raw_templates(templates).is_err() {
        self.unlinked = true;
      }
    }
    self.groups.push(TeraGroup { env: env.clone(), tera });
    Ok(self.groups.len() - 1)
  }

  fn tera_sources(&self) -> Vec<(String, Arc<str>)> {
    self
      .entries
      .iter()
      .filter_map(|(name, entry)| match entry {
        Entry::Tera { source, .. } => Some((name.clone(), source.clone())),
        _ => None,
      })
      .collect()
  }

  pub(crate) fn needs_link(&self) -> bool {
    self.unlinked
  }

  /// Rebuilds every `Tera` from the Tera entries, dropping templates whose
  /// parents or macro files never showed up. Reports the first of them.
  pub(crate) fn link(&mut self) -> Result<(), TemplateError> {
    let mut first_error = None;
    'relink: loop {
      let sources = self.tera_sources();
      let mut rebuilt = Vec::with_capacity(self.groups.len());

      for group in &self.groups {
        let mut tera = group.env.instantiate()?;
        if let Err(e) = tera.add_raw_templates(sources.iter().map(|(name, source)| (name.as_str(), &**source))) {
          let culprit = culprit_of(&e).filter(|name| self.entries.contains_key(name));
          let err = TemplateError::new("Template Link Error", error_chain(&e));
          let Some(culprit) = culprit else {
            // Nothing to drop; keep the incrementally built instances.
            first_error.get_or_insert(err);
            break 'relink;
          };

          log::error!("Dropping template {} that cannot be linked: {}", culprit, e);
          first_error.get_or_insert(err.with_name(culprit.as_str()));
          self.entries.remove(&culprit);
          continue 'relink;
        }
        rebuilt.push(tera);
      }

      for (group, tera) in self.groups.iter_mut().zip(rebuilt) {
        group.tera = tera;
      }
      break;
    }

    self.unlinked = false;
    match first_error {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }

  /// Renders `name` into `out`, dispatching on the engine that compiled it.
  pub fn render(&self, name: &str, out: &mut dyn Write, args: &Context) -> Result<()> {
    match self.entries.get(name) {
      Some(Entry::Tera { group, .. }) => {
        let group = self.groups.get(*group).ok_or_else(|| ViewcraftError::NotFound(name.to_string()))?;
        group.tera.render_to(name, args, out)?;
      }
      Some(Entry::Text(source)) => out.write_all(source.as_bytes())?,
      Some(Entry::Custom(renderable)) => renderable.render(out, args)?,
      None => return Err(ViewcraftError::NotFound(name.to_string())),
    }
    Ok(())
  }
}

/// The template a link failure is attributable to.
fn culprit_of(err: &tera::Error) -> Option<String> {
  match &err.kind {
    ErrorKind::MissingParent { current, .. } => Some(current.clone()),
    ErrorKind::CircularExtend { tpl, .. } => Some(tpl.clone()),
    _ => MACRO_CULPRIT
      .captures(&err.to_string())
      .and_then(|caps| caps.get(1))
      .map(|m| m.as_str().to_string()),
  }
}
