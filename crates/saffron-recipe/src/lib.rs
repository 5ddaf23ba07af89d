//! Saffron Recipe
//!
//! This crate provides the declarative recipe document for saffron.
//! A recipe is a named, versioned set of typed variables plus an ordered
//! list of steps, each tagged with the tool that executes it.
//!
//! Loading a recipe does not validate it; call [`Recipe::validate`] to get
//! a full report, or [`StepGraph::build`] to check the dependency graph in
//! isolation. Validation is the only place cycles and unknown references
//! are detected — execution assumes a well-formed graph.

mod error;
mod graph;
mod recipe;
mod step;
mod validate;
mod variable;

pub use error::RecipeError;
pub use graph::StepGraph;
pub use recipe::Recipe;
pub use step::{
  DependencyRef, InstallStep, ParallelStep, PatchStep, ShellStep, Step, StepKind, TemplateInclude,
  TemplateStep, ToolKind,
};
pub use validate::{ValidationIssue, ValidationReport};
pub use variable::{VariableKind, VariableSpec};
