//! # Viewcraft
//!
//! Template discovery, compilation and lookup for server-side web
//! applications, with first-class support for Actix Web.
//!
//! ## Features
//!
//! - **Directory discovery:** every file under the template roots is compiled
//!   under its relative path, and lookups are case-insensitive.
//! - **Multiple engines:** Tera by default, any other [`Compiler`] per file
//!   extension, all addressable from one namespace.
//! - **Partial failure:** one broken template is reported with its name and
//!   line while the rest keep rendering.
//! - **Custom delimiters:** author Tera templates with e.g. `<% … %>`.
//! - **Helpers:** URL reversal, form fields, pluralization, dates, slugs and
//!   more in every Tera template.
//! - **Live reload (dev mode):** templates are rebuilt when files change.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use actix_web::{web, App, HttpServer, Responder};
//! use tera::Context;
//! use viewcraft::Views;
//!
//! async fn index(views: web::Data<Views>) -> impl Responder {
//!   let mut context = Context::new();
//!   context.insert("page_title", "Welcome");
//!   // `render` returns a `View`, which is a Responder.
//!   views.render("Application/Index.html", context)
//! }
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!   let views = Views::builder(["app/views"])
//!     .add_global("site_name", "My Awesome Site")
//!     .build()
//!     .expect("Failed to build views");
//!
//!   HttpServer::new(move || {
//!     App::new()
//!       .app_data(web::Data::new(views.clone()))
//!       .route("/", web::get().to(index))
//!   })
//!   .bind(("127.0.0.1", 3000))?
//!   .run()
//!   .await
//! }
//! ```
//!
//! ## Without a web framework
//!
//! ```rust,no_run
//! use tera::Context;
//! use viewcraft::{EngineRegistry, TemplateLoader, TextCompiler};
//!
//! let mut registry = EngineRegistry::new();
//! registry.register_templater("txt", TextCompiler);
//!
//! let mut loader = TemplateLoader::new(["views"], registry).with_delimiters("<% %>")?;
//! if let Err(err) = loader.refresh() {
//!   eprintln!("{}", err);
//! }
//!
//! let mut args = Context::new();
//! args.insert("name", "World");
//! let page = loader.template("hello.html")?.render_to_string(&mut args)?;
//! # Ok::<(), viewcraft::ViewcraftError>(())
//! ```
//!
//! ### Production Builds
//!
//! Live reload is behind the default `dev-reload` feature. Disable it for
//! production:
//!
//! ```sh
//! cargo build --release --no-default-features
//! ```

pub mod actix;
pub mod core;
pub mod engines;
pub mod error;
pub mod helpers;

pub use crate::core::app::{View, Views, ViewsBuilder};
pub use crate::core::config::ViewConfig;
pub use crate::core::engine::{Artifact, Compiler, Delimiters, EngineRegistry, Renderable, TemplateInfo};
pub use crate::core::loader::TemplateLoader;
#[cfg(feature = "dev-reload")]
pub use crate::core::reload::ReloadMessage;
pub use crate::core::set::{CompiledSet, EngineKind};
pub use crate::core::template::TemplateHandle;
pub use crate::engines::{TeraCompiler, TextCompiler};
pub use crate::error::{Result, TemplateError, ViewcraftError};
pub use crate::helpers::HelperTable;
