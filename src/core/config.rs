use std::path::PathBuf;

use serde::Deserialize;

use crate::core::app::ViewsBuilder;
use crate::helpers::HelperTable;

/// View settings as they appear in an application's configuration file.
///
/// ```toml
/// [views]
/// paths = ["app/views", "shared/views"]
/// delimiters = "<% %>"
/// date_format = "%d/%m/%Y"
/// live_reload = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
  /// Template roots, searched in order.
  pub paths: Vec<PathBuf>,
  /// Two space-separated tokens, e.g. `"<% %>"`.
  pub delimiters: Option<String>,
  pub date_format: Option<String>,
  pub datetime_format: Option<String>,
  /// Watch the roots and refresh on change. Needs the `dev-reload` feature.
  pub live_reload: bool,
}

impl Default for ViewConfig {
  fn default() -> Self {
    Self {
      paths: vec![PathBuf::from("views")],
      delimiters: None,
      date_format: None,
      datetime_format: None,
      live_reload: true,
    }
  }
}

impl ViewConfig {
  /// A builder preloaded with these settings, for adding globals or engines
  /// before building.
  pub fn builder(&self) -> ViewsBuilder {
    let mut helpers = HelperTable::default();
    if let Some(format) = &self.date_format {
      helpers = helpers.with_date_format(format.as_str());
    }
    if let Some(format) = &self.datetime_format {
      helpers = helpers.with_datetime_format(format.as_str());
    }

    let mut builder = ViewsBuilder::new(self.paths.clone()).helpers(helpers);
    if let Some(delimiters) = &self.delimiters {
      builder = builder.delimiters(delimiters);
    }
    builder.live_reload(self.live_reload)
  }
}
