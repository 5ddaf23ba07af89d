use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::RecipeError;
use crate::graph::StepGraph;
use crate::step::Step;
use crate::variable::VariableSpec;

/// A declarative, versioned recipe: typed variables plus an ordered list of
/// steps. Step order is semantic — it is the tie-break when several steps
/// become ready at once, and the order results are reported in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
  pub name: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,

  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tags: Vec<String>,

  #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
  pub variables: IndexMap<String, VariableSpec>,

  #[serde(default)]
  pub steps: Vec<Step>,
}

impl Recipe {
  /// Parse a recipe from YAML (or JSON, which YAML subsumes).
  pub fn from_str(content: &str) -> Result<Self, RecipeError> {
    serde_yml::from_str(content).map_err(|e| RecipeError::Parse {
      message: e.to_string(),
    })
  }

  /// Read and parse a recipe file.
  pub fn from_path(path: &Path) -> Result<Self, RecipeError> {
    let content = std::fs::read_to_string(path).map_err(|source| RecipeError::Read {
      path: path.display().to_string(),
      source,
    })?;
    Self::from_str(&content)
  }

  /// Build the dependency graph for the top-level step list.
  pub fn graph(&self) -> Result<StepGraph, RecipeError> {
    StepGraph::build(&self.steps)
  }

  /// Find a top-level step by name.
  pub fn step(&self, name: &str) -> Option<&Step> {
    self.steps.iter().find(|s| s.name == name)
  }
}
