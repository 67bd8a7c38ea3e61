pub mod app;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod loader;
#[cfg(feature = "dev-reload")]
pub mod reload;
pub mod set;
pub mod template;
