//! Concrete [`Compiler`](crate::Compiler) implementations.

pub mod tera;
pub mod text;

pub use self::tera::{TeraArtifact, TeraCompiler};
pub use self::text::TextCompiler;
