use std::path::PathBuf;

use saffron_tool::RenderError;
use thiserror::Error;

/// Errors from template resolution and rendering.
#[derive(Debug, Error)]
pub enum TemplateError {
  #[error("template not found: '{template}'")]
  NotFound { template: String },

  #[error("failed to read '{path}'")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid frontmatter in '{path}': {message}")]
  Frontmatter { path: PathBuf, message: String },

  #[error(transparent)]
  Render(#[from] RenderError),

  #[error("template '{template}' rendered no 'to' target")]
  MissingTarget { template: String },

  #[error("inject target does not exist: '{path}'")]
  InjectTargetMissing { path: PathBuf },

  #[error("invalid inject pattern '{pattern}': {message}")]
  BadInjectPattern { pattern: String, message: String },
}

impl TemplateError {
  pub fn code(&self) -> &'static str {
    match self {
      TemplateError::NotFound { .. } => "template_not_found",
      TemplateError::Io { .. } => "template_io",
      TemplateError::Frontmatter { .. } => "template_frontmatter",
      TemplateError::Render(_) => "template_render",
      TemplateError::MissingTarget { .. } => "template_missing_target",
      TemplateError::InjectTargetMissing { .. } => "inject_target_missing",
      TemplateError::BadInjectPattern { .. } => "inject_bad_pattern",
    }
  }
}
