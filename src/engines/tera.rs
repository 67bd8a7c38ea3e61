//! The default engine, backed by [Tera](https://keats.github.io/tera/).

use std::sync::Arc;

use tera::Tera;

use crate::core::diagnostics::{error_chain, pest_location, pest_summary};
use crate::core::engine::{Artifact, Compiler, Delimiters};
use crate::error::TemplateError;
use crate::helpers::HelperTable;

/// Leading words that turn a custom-delimited action into a Tera statement
/// tag rather than an expression.
const STATEMENT_KEYWORDS: &[&str] = &[
  "if",
  "elif",
  "else",
  "endif",
  "for",
  "endfor",
  "set",
  "set_global",
  "block",
  "endblock",
  "extends",
  "include",
  "import",
  "macro",
  "endmacro",
  "filter",
  "endfilter",
  "raw",
  "endraw",
  "break",
  "continue",
];

type Configurator = dyn Fn(&mut Tera) + Send + Sync;

/// Everything needed to build the `Tera` instance a compiled set renders
/// through: the shared helper table and an optional user hook.
pub struct TeraEnv {
  helpers: Arc<HelperTable>,
  configurator: Option<Arc<Configurator>>,
}

impl TeraEnv {
  /// Creates a `Tera` with the helper table installed, then runs the user
  /// hook. Called once per build.
  pub(crate) fn instantiate(&self) -> Result<Tera, TemplateError> {
    let mut tera = Tera::default();
    self.helpers.install(&mut tera)?;
    if let Some(configurator) = &self.configurator {
      configurator(&mut tera);
    }
    Ok(tera)
  }
}

/// A template that parsed successfully, ready to be merged into a set.
pub struct TeraArtifact {
  /// Source in Tera's own syntax, after delimiter rewriting.
  pub(crate) source: String,
  pub(crate) env: Arc<TeraEnv>,
}

/// Compiles templates with Tera, injecting the [`HelperTable`].
#[derive(Clone)]
pub struct TeraCompiler {
  env: Arc<TeraEnv>,
}

impl Default for TeraCompiler {
  fn default() -> Self {
    Self::new(HelperTable::default())
  }
}

impl TeraCompiler {
  pub fn new(helpers: HelperTable) -> Self {
    Self::with_shared_helpers(Arc::new(helpers))
  }

  pub fn with_shared_helpers(helpers: Arc<HelperTable>) -> Self {
    Self {
      env: Arc::new(TeraEnv {
        helpers,
        configurator: None,
      }),
    }
  }

  /// Registers a hook that runs on every `Tera` instance this engine
  /// creates, for custom filters, testers or settings.
  pub fn configure<F>(self, configurator: F) -> Self
  where
    F: Fn(&mut Tera) + Send + Sync + 'static,
  {
    Self {
      env: Arc::new(TeraEnv {
        helpers: self.env.helpers.clone(),
        configurator: Some(Arc::new(configurator)),
      }),
    }
  }
}

impl Compiler for TeraCompiler {
  fn compile(&self, name: &str, source: &str, delims: Option<&Delimiters>) -> Result<Artifact, TemplateError> {
    self.env.helpers.validate()?;

    let source = match delims {
      Some(delims) => rewrite_delimiters(source, delims).map_err(|e| e.with_name(name))?,
      None => source.to_string(),
    };

    if let Err(e) = tera::Template::new(name, None, &source) {
      return Err(compilation_error(name, &e));
    }

    Ok(Artifact::Tera(TeraArtifact {
      source,
      env: self.env.clone(),
    }))
  }
}

fn compilation_error(name: &str, err: &tera::Error) -> TemplateError {
  let message = error_chain(err);
  match pest_location(&message) {
    Some((line, _)) => {
      let description = pest_summary(&message).unwrap_or(message);
      TemplateError::new("Template Compilation Error", description)
        .with_name(name)
        .with_line(line)
    }
    None => TemplateError::from_message(name, &message),
  }
}

/// Rewrites `left … right` actions into Tera tags.
///
/// Statement keywords become `{% … %}`, `/* … */` becomes a comment and
/// everything else an expression. Text that happens to contain Tera markers is
/// wrapped in a raw block. Newlines are preserved so reported lines still
/// match the file on disk.
fn rewrite_delimiters(source: &str, delims: &Delimiters) -> Result<String, TemplateError> {
  let (left, right) = (delims.left.as_str(), delims.right.as_str());
  let mut out = String::with_capacity(source.len() + 16);
  let mut rest = source;
  let mut line = 1;

  while let Some(start) = rest.find(left) {
    let text = &rest[..start];
    push_text(&mut out, text);
    line += text.matches('\n').count();

    let after = &rest[start + left.len()..];
    let Some(end) = after.find(right) else {
      return Err(
        TemplateError::new(
          "Template Compilation Error",
          format!("unclosed action: missing '{}'", right),
        )
        .with_line(line),
      );
    };

    let action = &after[..end];
    push_action(&mut out, action);
    line += action.matches('\n').count();
    rest = &after[end + right.len()..];
  }

  push_text(&mut out, rest);
  Ok(out)
}

const END_RAW: &str = "{% endraw %}";

fn push_text(out: &mut String, text: &str) {
  // A literal end marker would close the raw block early, so it is emitted as
  // a string expression instead.
  let mut pieces = text.split(END_RAW);
  if let Some(first) = pieces.next() {
    push_raw(out, first);
  }
  for piece in pieces {
    out.push_str("{{ \"");
    out.push_str(END_RAW);
    out.push_str("\" }}");
    push_raw(out, piece);
  }
}

fn push_raw(out: &mut String, text: &str) {
  if text.contains("{{") || text.contains("{%") || text.contains("{#") {
    out.push_str("{% raw %}");
    out.push_str(text);
    out.push_str(END_RAW);
  } else {
    out.push_str(text);
  }
}

fn push_action(out: &mut String, action: &str) {
  let trimmed = action.trim();
  let (open, close) = if trimmed.starts_with("/*") && trimmed.ends_with("*/") {
    ("{#", "#}")
  } else if is_statement(trimmed) {
    ("{%", "%}")
  } else {
    ("{{", "}}")
  };
  out.push_str(open);
  out.push_str(action);
  out.push_str(close);
}

fn is_statement(action: &str) -> bool {
  // Whitespace control markers (`-`) sit before the keyword.
  let action = action.trim_start_matches('-').trim_start();
  let keyword = action
    .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
    .next()
    .unwrap_or("");
  STATEMENT_KEYWORDS.contains(&keyword)
}
