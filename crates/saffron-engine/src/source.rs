use std::path::PathBuf;

use saffron_recipe::{Recipe, RecipeError};

/// Where a recipe document comes from.
#[derive(Debug, Clone)]
pub enum RecipeSource {
  Path(PathBuf),
  Inline(String),
}

impl RecipeSource {
  pub fn path(path: impl Into<PathBuf>) -> Self {
    RecipeSource::Path(path.into())
  }

  pub fn inline(content: impl Into<String>) -> Self {
    RecipeSource::Inline(content.into())
  }

  pub fn load(&self) -> Result<Recipe, RecipeError> {
    match self {
      RecipeSource::Path(path) => Recipe::from_path(path),
      RecipeSource::Inline(content) => Recipe::from_str(content),
    }
  }
}

impl From<PathBuf> for RecipeSource {
  fn from(path: PathBuf) -> Self {
    RecipeSource::Path(path)
  }
}

impl From<&std::path::Path> for RecipeSource {
  fn from(path: &std::path::Path) -> Self {
    RecipeSource::Path(path.to_path_buf())
  }
}
