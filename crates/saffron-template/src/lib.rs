//! Saffron Template
//!
//! Resolves template identifiers to files, splits frontmatter from body,
//! renders both through the injected engine, and interprets the
//! file-disposition directives (`to`, `skip_if`, `unless_exists`,
//! `inject`, `force`). Composition via `includes` is best-effort; the base
//! template is not.
//!
//! File emission happens at exactly one place in [`pipeline`], and that
//! place is short-circuited during the collect pass and dry runs — the
//! same render produces the same planned file lists either way.

mod engine;
mod error;
mod frontmatter;
mod inject;
mod pipeline;
mod resolver;

pub use engine::MiniJinjaEngine;
pub use error::TemplateError;
pub use frontmatter::split_frontmatter;
pub use inject::{InjectSpec, inject_content};
pub use pipeline::{
  FileDisposition, RenderOutcome, RenderRequest, RenderedTemplateFile, TemplatePipeline,
};
pub use resolver::{TemplateResolution, TemplateResolver};
