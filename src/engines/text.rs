use crate::core::engine::{Artifact, Compiler, Delimiters};
use crate::error::TemplateError;

/// Serves files verbatim. Useful for extensions that must never be
/// interpreted, e.g. `txt` or `svg`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCompiler;

impl Compiler for TextCompiler {
  fn compile(&self, _name: &str, source: &str, _delims: Option<&Delimiters>) -> Result<Artifact, TemplateError> {
    Ok(Artifact::Text(source.to_string()))
  }
}
