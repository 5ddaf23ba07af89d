use thiserror::Error;

/// Errors raised while loading or structurally validating a recipe.
#[derive(Debug, Error)]
pub enum RecipeError {
  #[error("failed to parse recipe: {message}")]
  Parse { message: String },

  #[error("failed to read recipe file '{path}'")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("duplicate step name '{name}'")]
  DuplicateStep { name: String },

  #[error("step '{step}' depends on unknown step '{dependency}'")]
  UnknownDependency { step: String, dependency: String },

  #[error("dependency cycle through step '{step}'")]
  DependencyCycle { step: String },

  #[error("invalid variable '{name}': {message}")]
  InvalidVariable { name: String, message: String },
}

impl RecipeError {
  /// Machine-readable error code for the calling layer.
  pub fn code(&self) -> &'static str {
    match self {
      RecipeError::Parse { .. } => "recipe_parse",
      RecipeError::Read { .. } => "recipe_read",
      RecipeError::DuplicateStep { .. } => "duplicate_step",
      RecipeError::UnknownDependency { .. } => "unknown_dependency",
      RecipeError::DependencyCycle { .. } => "dependency_cycle",
      RecipeError::InvalidVariable { .. } => "invalid_variable",
    }
  }
}
