use saffron_executor::ExecutionError;
use saffron_recipe::{RecipeError, ValidationReport};
use thiserror::Error;

/// Errors that prevent a run from starting or abort it outright.
/// Individual step failures are reported through the run report instead.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Recipe(#[from] RecipeError),

  /// The recipe failed validation; nothing was executed.
  #[error("recipe failed validation")]
  Validation { report: ValidationReport },

  #[error(transparent)]
  Execution(#[from] ExecutionError),

  #[error("required variable '{name}' was not provided")]
  MissingVariable { name: String },

  #[error("value for variable '{name}' does not match its declared type")]
  VariableType { name: String },
}

impl EngineError {
  pub fn code(&self) -> &'static str {
    match self {
      EngineError::Recipe(e) => e.code(),
      EngineError::Validation { .. } => "recipe_invalid",
      EngineError::Execution(e) => e.code(),
      EngineError::MissingVariable { .. } => "missing_variable",
      EngineError::VariableType { .. } => "variable_type",
    }
  }
}
