use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::core::loader::{is_watched_name, TemplateLoader};
use crate::error::{Result, TemplateError};

/// Sent to subscribers after every refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum ReloadMessage {
  /// All templates compiled.
  Refreshed,
  /// The refresh kept an error. Templates that compiled are still served.
  Failed(TemplateError),
}

/// Watches the template roots and rebuilds the loader when a file changes.
///
/// The watcher lives as long as this struct; dropping it stops watching.
pub(crate) struct DevReloader {
  pub(crate) broadcaster: broadcast::Sender<ReloadMessage>,
  _watcher: RecommendedWatcher,
}

impl DevReloader {
  pub(crate) fn start(loader: Arc<RwLock<TemplateLoader>>) -> Result<Self> {
    let (tx, _rx) = broadcast::channel(16);
    let broadcaster = tx.clone();
    let roots: Vec<PathBuf> = loader.read().paths().to_vec();

    let watched_roots = roots.clone();
    let watched_loader = loader.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
      let event = match res {
        Ok(event) => event,
        Err(e) => {
          log::error!("File watch error: {:?}", e);
          return;
        }
      };

      if !(event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove()) {
        return;
      }
      let Some(path) = event.paths.iter().find(|path| is_template_path(&watched_roots, path)) else {
        return;
      };

      log::info!("Template change detected: {:?}", path);
      let result = watched_loader.write().refresh();
      notify_subscribers(&tx, &result);
    })?;

    for root in &roots {
      if root.exists() {
        watcher.watch(root, RecursiveMode::Recursive)?;
      } else {
        log::warn!("Template path to watch does not exist, skipping: {}", root.display());
      }
    }

    Ok(Self {
      broadcaster,
      _watcher: watcher,
    })
  }

  pub(crate) fn publish(&self, result: &Result<(), TemplateError>) {
    notify_subscribers(&self.broadcaster, result);
  }
}

fn notify_subscribers(tx: &broadcast::Sender<ReloadMessage>, result: &Result<(), TemplateError>) {
  let message = match result {
    Ok(()) => ReloadMessage::Refreshed,
    Err(err) => {
      log::error!("Failed to reload templates: {}", err);
      ReloadMessage::Failed(err.clone())
    }
  };
  // No subscribers is fine.
  let _ = tx.send(message);
}

/// Whether a change to `path` can affect the loaded templates: it must not be
/// hidden or inside a hidden directory below its root.
fn is_template_path(roots: &[PathBuf], path: &Path) -> bool {
  let relative = roots
    .iter()
    .find_map(|root| path.strip_prefix(root).ok())
    .unwrap_or_else(|| path.file_name().map_or(path, Path::new));

  relative
    .components()
    .all(|c| c.as_os_str().to_str().map_or(true, is_watched_name))
}
