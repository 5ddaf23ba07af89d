use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::graph::StepGraph;
use crate::recipe::Recipe;
use crate::step::{Step, StepKind};
use crate::variable::VariableKind;

/// Outcome of validating a recipe before any execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
  pub errors: Vec<ValidationIssue>,
  pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
  pub fn is_valid(&self) -> bool {
    self.errors.is_empty()
  }

  fn error(&mut self, code: &'static str, step: Option<&str>, message: impl Into<String>) {
    self.errors.push(ValidationIssue {
      code: code.to_string(),
      step: step.map(str::to_string),
      message: message.into(),
    });
  }

  fn warn(&mut self, code: &'static str, step: Option<&str>, message: impl Into<String>) {
    self.warnings.push(ValidationIssue {
      code: code.to_string(),
      step: step.map(str::to_string),
      message: message.into(),
    });
  }
}

/// A single validation finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
  pub code: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub step: Option<String>,
  pub message: String,
}

impl Recipe {
  /// Validate the recipe document: variable declarations, step payloads,
  /// and every dependency graph (top-level and nested). Detects cycles and
  /// unknown references here so execution never has to.
  pub fn validate(&self) -> ValidationReport {
    let mut report = ValidationReport::default();

    if self.name.trim().is_empty() {
      report.error("empty_recipe_name", None, "recipe name must not be empty");
    }
    if self.steps.is_empty() {
      report.warn("no_steps", None, "recipe declares no steps");
    }

    self.validate_variables(&mut report);

    let mut all_names = HashSet::new();
    validate_step_list(&self.steps, &mut all_names, &mut report);

    report
  }

  fn validate_variables(&self, report: &mut ValidationReport) {
    for (name, spec) in &self.variables {
      if spec.kind == VariableKind::Enum && spec.values.is_empty() {
        report.error(
          "enum_without_values",
          None,
          format!("enum variable '{}' declares no values", name),
        );
      }
      if let Some(default) = &spec.default
        && !spec.accepts(default)
      {
        report.error(
          "default_type_mismatch",
          None,
          format!(
            "default for variable '{}' does not match declared type '{}'",
            name,
            spec.kind.as_str()
          ),
        );
      }
      if spec.required && spec.default.is_none() {
        report.warn(
          "required_without_default",
          None,
          format!("variable '{}' is required and has no default", name),
        );
      }
    }
  }
}

/// Validate one step list: names (globally unique across nesting),
/// same-list dependency references, acyclicity, and per-tool payloads.
fn validate_step_list(
  steps: &[Step],
  all_names: &mut HashSet<String>,
  report: &mut ValidationReport,
) {
  let mut local_names = HashSet::new();
  let mut structure_ok = true;

  for step in steps {
    if step.name.trim().is_empty() {
      report.error("empty_step_name", None, "step name must not be empty");
      structure_ok = false;
      continue;
    }
    if !all_names.insert(step.name.clone()) {
      report.error(
        "duplicate_step",
        Some(&step.name),
        format!("step name '{}' is used more than once", step.name),
      );
    }
    if !local_names.insert(step.name.clone()) {
      structure_ok = false;
    }
  }

  for step in steps {
    for dep in &step.depends_on {
      // Dependencies must name a sibling: the executor schedules one list
      // at a time, so a reference out of a nested list can never be
      // satisfied.
      if !local_names.contains(dep.step()) {
        structure_ok = false;
        report.error(
          "unknown_dependency",
          Some(&step.name),
          format!(
            "step '{}' depends on '{}', which is not in the same step list",
            step.name,
            dep.step()
          ),
        );
      }
    }
    validate_step_payload(step, all_names, report);
  }

  if structure_ok
    && steps.len() >= 2
    && let Err(e) = StepGraph::build(steps)
  {
    report.error("dependency_cycle", None, e.to_string());
  }
}

fn validate_step_payload(step: &Step, all_names: &mut HashSet<String>, report: &mut ValidationReport) {
  match &step.kind {
    StepKind::Template(t) => {
      if t.template.trim().is_empty() {
        report.error(
          "empty_template_id",
          Some(&step.name),
          "template step needs a template id",
        );
      }
    }
    StepKind::Shell(s) => {
      if s.command.trim().is_empty() {
        report.error(
          "empty_command",
          Some(&step.name),
          "shell step needs a command",
        );
      }
    }
    StepKind::Install(i) => {
      if i.packages.is_empty() {
        report.error(
          "no_packages",
          Some(&step.name),
          "install step lists no packages",
        );
      }
    }
    StepKind::Patch(p) => {
      if !p.merge.is_object() {
        report.error(
          "patch_merge_not_object",
          Some(&step.name),
          "patch step merge payload must be an object",
        );
      }
      if p.file.trim().is_empty() {
        report.error(
          "empty_patch_target",
          Some(&step.name),
          "patch step needs a target file",
        );
      }
    }
    StepKind::Parallel(p) => {
      if p.steps.is_empty() {
        report.warn(
          "empty_parallel",
          Some(&step.name),
          "parallel step declares no nested steps",
        );
      }
      validate_step_list(&p.steps, all_names, report);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_valid_recipe_passes() {
    let recipe = Recipe::from_str(
      r#"
name: ok
steps:
  - name: a
    tool: shell
    command: "true"
  - name: b
    tool: shell
    command: "true"
    depends_on: [a]
"#,
    )
    .unwrap();
    let report = recipe.validate();
    assert!(report.is_valid(), "unexpected errors: {:?}", report.errors);
  }

  #[test]
  fn test_cycle_detected_at_validation() {
    let recipe = Recipe::from_str(
      r#"
name: cyclic
steps:
  - name: a
    tool: shell
    command: "true"
    depends_on: [b]
  - name: b
    tool: shell
    command: "true"
    depends_on: [a]
"#,
    )
    .unwrap();
    let report = recipe.validate();
    assert!(!report.is_valid());
    assert!(report.errors.iter().any(|e| e.code == "dependency_cycle"));
  }

  #[test]
  fn test_nested_names_must_be_globally_unique() {
    let recipe = Recipe::from_str(
      r#"
name: nested
steps:
  - name: a
    tool: shell
    command: "true"
  - name: fan
    tool: parallel
    steps:
      - name: a
        tool: shell
        command: "true"
"#,
    )
    .unwrap();
    let report = recipe.validate();
    assert!(report.errors.iter().any(|e| e.code == "duplicate_step"));
  }

  #[test]
  fn test_nested_dependency_cannot_cross_lists() {
    let recipe = Recipe::from_str(
      r#"
name: crossing
steps:
  - name: outer
    tool: shell
    command: "true"
  - name: fan
    tool: parallel
    steps:
      - name: inner
        tool: shell
        command: "true"
        depends_on: [outer]
"#,
    )
    .unwrap();
    let report = recipe.validate();
    assert!(report.errors.iter().any(|e| e.code == "unknown_dependency"));
  }

  #[test]
  fn test_enum_default_and_values_checked() {
    let recipe = Recipe::from_str(
      r#"
name: vars
variables:
  pm:
    type: enum
    values: [npm, pnpm]
    default: cargo
  flag:
    type: enum
steps: []
"#,
    )
    .unwrap();
    let report = recipe.validate();
    assert!(report.errors.iter().any(|e| e.code == "default_type_mismatch"));
    assert!(report.errors.iter().any(|e| e.code == "enum_without_values"));
  }

  #[test]
  fn test_patch_merge_must_be_object() {
    let recipe = Recipe::from_str(
      r#"
name: p
steps:
  - name: patch
    tool: patch
    file: package.json
    merge: [1, 2]
"#,
    )
    .unwrap();
    let report = recipe.validate();
    assert!(report.errors.iter().any(|e| e.code == "patch_merge_not_object"));
  }
}
