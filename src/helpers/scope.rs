//! The render-argument bag of the render in progress on this thread.
//!
//! Tera hands helpers their named arguments only, so helpers that read or
//! write the surrounding render arguments (`field`, `errorClass`, `msg`, `set`,
//! `append`) go through this stack. Renders nest when a handle is rendered from
//! inside a helper, hence a stack rather than a single slot.

use std::cell::RefCell;

use tera::{Context, Map, Value};

struct Scope {
  args: Map<String, Value>,
  touched: Vec<String>,
}

thread_local! {
  static SCOPES: RefCell<Vec<Scope>> = const { RefCell::new(Vec::new()) };
}

/// Guard for one render. Dropping it without [`RenderScope::apply_to`]
/// discards the writes made by `set` and `append`.
pub(crate) struct RenderScope {
  active: bool,
}

pub(crate) fn enter(context: &Context) -> RenderScope {
  let args = match context.clone().into_json() {
    Value::Object(map) => map,
    _ => Map::new(),
  };
  SCOPES.with(|scopes| scopes.borrow_mut().push(Scope { args, touched: Vec::new() }));
  RenderScope { active: true }
}

impl RenderScope {
  /// Ends the render and copies every key written by a helper into `context`.
  pub(crate) fn apply_to(mut self, context: &mut Context) {
    self.active = false;
    let Some(scope) = pop() else {
      return;
    };
    for key in scope.touched {
      if let Some(value) = scope.args.get(&key) {
        context.insert(key.as_str(), value);
      }
    }
  }
}

impl Drop for RenderScope {
  fn drop(&mut self) {
    if self.active {
      pop();
    }
  }
}

fn pop() -> Option<Scope> {
  SCOPES.with(|scopes| scopes.borrow_mut().pop())
}

/// Runs `f` against the innermost render arguments, or returns `None` when no
/// render is in progress on this thread.
pub(crate) fn with_args<R>(f: impl FnOnce(&Map<String, Value>) -> R) -> Option<R> {
  SCOPES.with(|scopes| scopes.borrow().last().map(|scope| f(&scope.args)))
}

fn with_args_mut<R>(key: &str, f: impl FnOnce(&mut Map<String, Value>) -> R) -> Option<R> {
  SCOPES.with(|scopes| {
    let mut scopes = scopes.borrow_mut();
    let scope = scopes.last_mut()?;
    if !scope.touched.iter().any(|k| k == key) {
      scope.touched.push(key.to_string());
    }
    Some(f(&mut scope.args))
  })
}

/// Stores `value` under `key`. Returns false outside a render.
pub(crate) fn set(key: &str, value: Value) -> bool {
  with_args_mut(key, |args| {
    args.insert(key.to_string(), value);
  })
  .is_some()
}

/// Appends `value` to the list under `key`, creating the list if needed. An
/// existing non-list value becomes the list's first element.
pub(crate) fn append(key: &str, value: Value) -> bool {
  with_args_mut(key, |args| {
    let list = match args.remove(key) {
      Some(Value::Array(mut items)) => {
        items.push(value);
        items
      }
      Some(existing) => vec![existing, value],
      None => vec![value],
    };
    args.insert(key.to_string(), Value::Array(list));
  })
  .is_some()
}
