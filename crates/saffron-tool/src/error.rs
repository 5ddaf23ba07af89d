use thiserror::Error;

use crate::engine::RenderError;

/// Errors a tool can raise while validating or executing a step.
#[derive(Debug, Error)]
pub enum ToolError {
  /// The step payload failed the tool's structural/semantic checks.
  #[error("{message}")]
  Validation { message: String },

  /// The step is well-formed but its configuration cannot be satisfied
  /// (missing required variable, malformed patch target, ...).
  #[error("{message}")]
  Configuration { message: String },

  /// Execution failed. `retryable` is the tool's own judgement — the
  /// executor never second-guesses it.
  #[error("{message}")]
  Execution {
    message: String,
    retryable: bool,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
  },

  #[error("template rendering failed")]
  Render(#[from] RenderError),
}

impl ToolError {
  pub fn validation(message: impl Into<String>) -> Self {
    ToolError::Validation {
      message: message.into(),
    }
  }

  pub fn configuration(message: impl Into<String>) -> Self {
    ToolError::Configuration {
      message: message.into(),
    }
  }

  pub fn execution(message: impl Into<String>) -> Self {
    ToolError::Execution {
      message: message.into(),
      retryable: false,
      source: None,
    }
  }

  pub fn execution_retryable(message: impl Into<String>) -> Self {
    ToolError::Execution {
      message: message.into(),
      retryable: true,
      source: None,
    }
  }

  pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
    ToolError::Execution {
      message: message.into(),
      retryable: false,
      source: Some(Box::new(source)),
    }
  }

  /// Machine-readable error code for the calling layer.
  pub fn code(&self) -> &'static str {
    match self {
      ToolError::Validation { .. } => "tool_validation",
      ToolError::Configuration { .. } => "configuration",
      ToolError::Execution { .. } => "execution",
      ToolError::Render(_) => "template_render",
    }
  }

  /// Whether the executor may retry the step.
  pub fn is_retryable(&self) -> bool {
    matches!(self, ToolError::Execution { retryable: true, .. })
  }
}
