use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tera::{Context, Tera};

use crate::core::config::ViewConfig;
use crate::core::engine::{Compiler, EngineRegistry};
use crate::core::loader::TemplateLoader;
use crate::core::template::TemplateHandle;
use crate::engines::tera::TeraCompiler;
use crate::error::{Result, TemplateError, ViewcraftError};
use crate::helpers::HelperTable;

#[cfg(feature = "dev-reload")]
use crate::core::reload::{DevReloader, ReloadMessage};

type TeraConfigurator = Arc<dyn Fn(&mut Tera) + Send + Sync>;

/// A pending render, created by [`Views::render`].
///
/// Web framework integration layers implement their native response traits
/// for it; see the [`actix`](crate::actix) module.
pub struct View {
  pub(crate) views: Views,
  pub(crate) template_name: String,
  pub(crate) context: Context,
}

impl View {
  pub fn template_name(&self) -> &str {
    &self.template_name
  }
}

/// The view layer of an application, designed to be shared across threads.
///
/// Holds the template loader behind a lock so live reload can rebuild it, plus
/// the globals merged into every render. Created with [`Views::builder`].
#[derive(Clone)]
pub struct Views {
  pub(crate) loader: Arc<RwLock<TemplateLoader>>,
  /// The pre-built global context, shared across all requests.
  pub(crate) global_context: Arc<Context>,
  #[cfg(feature = "dev-reload")]
  pub(crate) reloader: Option<Arc<DevReloader>>,
}

impl Views {
  /// Starts configuring views loaded from `paths`, searched in order.
  pub fn builder<I, P>(paths: I) -> ViewsBuilder
  where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
  {
    ViewsBuilder::new(paths.into_iter().map(Into::into).collect())
  }

  pub fn from_config(config: &ViewConfig) -> Result<Self> {
    config.builder().build()
  }

  /// Renders `tpl` with the globals overlaid by `user_context`.
  pub fn render_with_context(&self, tpl: &str, user_context: Context) -> Result<String> {
    // The handle pins the current set, so the lock is not held while rendering.
    let handle = self.loader.read().template(tpl)?;

    let mut final_context = (*self.global_context).clone();
    final_context.extend(user_context);
    handle.render_to_string(&mut final_context)
  }

  pub fn render(&self, tpl: &str, context: Context) -> View {
    View {
      views: self.clone(),
      template_name: tpl.to_string(),
      context,
    }
  }

  pub fn template(&self, name: &str) -> Result<TemplateHandle> {
    self.loader.read().template(name)
  }

  /// Rebuilds every template from disk.
  pub fn refresh(&self) -> Result<(), TemplateError> {
    let result = self.loader.write().refresh();
    #[cfg(feature = "dev-reload")]
    if let Some(reloader) = &self.reloader {
      reloader.publish(&result);
    }
    result
  }

  /// The error kept by the last refresh.
  pub fn compile_error(&self) -> Option<TemplateError> {
    self.loader.read().compile_error().cloned()
  }

  pub fn template_names(&self) -> Vec<String> {
    self.loader.read().template_names()
  }

  /// Notifications for every refresh, including those triggered by file
  /// changes. `None` when live reload is off.
  #[cfg(feature = "dev-reload")]
  pub fn subscribe(&self) -> Option<tokio::sync::broadcast::Receiver<ReloadMessage>> {
    self.reloader.as_ref().map(|reloader| reloader.broadcaster.subscribe())
  }
}

/// A builder for creating a configured [`Views`] instance.
pub struct ViewsBuilder {
  paths: Vec<PathBuf>,
  globals: Context,
  delimiters: Option<String>,
  helpers: HelperTable,
  tera_configurator: Option<TeraConfigurator>,
  engines: Vec<(String, Arc<dyn Compiler>)>,
  live_reload: bool,
}

impl ViewsBuilder {
  pub(crate) fn new(paths: Vec<PathBuf>) -> Self {
    Self {
      paths,
      globals: Context::new(),
      delimiters: None,
      helpers: HelperTable::default(),
      tera_configurator: None,
      engines: Vec::new(),
      live_reload: cfg!(feature = "dev-reload"),
    }
  }

  /// Adds a global variable that will be available to all templates.
  ///
  /// This can be called multiple times to add multiple globals.
  ///
  /// # Arguments
  ///
  /// * `key` - The name of the variable in the template (e.g., "site_name").
  /// * `value` - Any value that can be serialized (e.g., a string, a number, a struct).
  pub fn add_global<S: Into<String>, T: Serialize>(mut self, key: S, value: T) -> Self {
    let key: String = key.into();
    self.globals.insert(key, &value);
    self
  }

  /// Custom action delimiters, e.g. `"<% %>"`. Checked by [`build`](Self::build).
  pub fn delimiters(mut self, spec: &str) -> Self {
    self.delimiters = Some(spec.to_string());
    self
  }

  /// Replaces the helper table installed into every Tera template.
  pub fn helpers(mut self, helpers: HelperTable) -> Self {
    self.helpers = helpers;
    self
  }

  /// Provides a closure to run for advanced configuration of the `Tera`
  /// instance.
  ///
  /// The closure runs each time the templates are rebuilt, so it may be
  /// called more than once.
  pub fn configure_tera<F>(mut self, configurator: F) -> Self
  where
    F: Fn(&mut Tera) + Send + Sync + 'static,
  {
    self.tera_configurator = Some(Arc::new(configurator));
    self
  }

  /// Compiles files with `extension` through `compiler`. Registering `""` or
  /// `"html"` replaces the default Tera engine.
  pub fn register_engine<C: Compiler + 'static>(mut self, extension: &str, compiler: C) -> Self {
    self.engines.push((extension.to_string(), Arc::new(compiler)));
    self
  }

  /// Watches the template roots and refreshes on change. On by default when
  /// the `dev-reload` feature is enabled, ignored otherwise.
  pub fn live_reload(mut self, enabled: bool) -> Self {
    self.live_reload = enabled;
    self
  }

  /// Compiles every template and, if enabled, starts the file watcher.
  ///
  /// Malformed delimiters and an unusable helper table fail the build.
  /// Templates that merely fail to compile are logged and reported through
  /// [`Views::compile_error`]; the rest are served.
  pub fn build(self) -> Result<Views> {
    let mut tera = TeraCompiler::new(self.helpers);
    if let Some(configurator) = self.tera_configurator {
      tera = tera.configure(move |t: &mut Tera| configurator(t));
    }

    let mut registry = EngineRegistry::empty();
    registry.register_templater("", tera);
    for (extension, compiler) in self.engines {
      registry.register_shared(&extension, compiler);
    }

    let mut loader = TemplateLoader::new(self.paths, registry);
    if let Some(spec) = &self.delimiters {
      loader = loader.with_delimiters(spec)?;
    }

    match loader.refresh() {
      Err(err) if err.fatal => return Err(ViewcraftError::Template(err)),
      Err(err) => log::error!("Some templates failed to build: {}", err),
      Ok(()) => {}
    }

    let loader = Arc::new(RwLock::new(loader));

    #[cfg(not(feature = "dev-reload"))]
    if self.live_reload {
      log::warn!("Live reload requested but the `dev-reload` feature is disabled");
    }

    Ok(Views {
      #[cfg(feature = "dev-reload")]
      reloader: if self.live_reload {
        Some(Arc::new(DevReloader::start(Arc::clone(&loader))?))
      } else {
        None
      },
      loader,
      global_context: Arc::new(self.globals),
    })
  }
}
