use saffron_recipe::RecipeError;
use thiserror::Error;

/// Errors that abort an executor invocation outright. Per-step failures
/// are not errors at this level — they land in the step's result.
#[derive(Debug, Error)]
pub enum ExecutionError {
  /// The step list failed graph validation.
  #[error(transparent)]
  Recipe(#[from] RecipeError),

  /// A spawned step task panicked or was aborted.
  #[error("step task failed to join: {message}")]
  Join { message: String },
}

impl ExecutionError {
  pub fn code(&self) -> &'static str {
    match self {
      ExecutionError::Recipe(e) => e.code(),
      ExecutionError::Join { .. } => "task_join",
    }
  }
}
