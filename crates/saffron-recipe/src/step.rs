use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One unit of work in a recipe, tagged with the tool that executes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
  pub name: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,

  /// Steps that must reach a terminal status before this one may start.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub depends_on: Vec<DependencyRef>,

  /// Boolean expression evaluated against the current variable scope just
  /// before launch; false skips the step.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub condition: Option<String>,

  /// Overrides the run-level failure policy for this step.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub continue_on_error: Option<bool>,

  /// Upper bound on retries when the tool reports a retryable failure.
  #[serde(default)]
  pub max_retries: u32,

  /// Step-local variables, layered over recipe and run variables.
  #[serde(default, skip_serializing_if = "HashMap::is_empty")]
  pub variables: HashMap<String, serde_json::Value>,

  #[serde(flatten)]
  pub kind: StepKind,
}

impl Step {
  /// Effective failure policy, falling back to the run-level default.
  pub fn continues_on_error(&self, run_default: bool) -> bool {
    self.continue_on_error.unwrap_or(run_default)
  }
}

/// A dependency on another step.
///
/// The short form is a bare step name; the long form demands a *completed*
/// predecessor, so a skipped one does not satisfy it:
///
/// ```yaml
/// depends_on:
///   - scaffold
///   - { step: install, completed: true }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyRef {
  Name(String),
  Strict {
    step: String,
    #[serde(default)]
    completed: bool,
  },
}

impl DependencyRef {
  pub fn step(&self) -> &str {
    match self {
      DependencyRef::Name(name) => name,
      DependencyRef::Strict { step, .. } => step,
    }
  }

  /// Whether the predecessor must have completed (not merely skipped).
  pub fn requires_completed(&self) -> bool {
    match self {
      DependencyRef::Name(_) => false,
      DependencyRef::Strict { completed, .. } => *completed,
    }
  }
}

/// Tool-specific step payload, dispatched by the `tool` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "lowercase")]
pub enum StepKind {
  Template(TemplateStep),
  Shell(ShellStep),
  Install(InstallStep),
  Patch(PatchStep),
  Parallel(ParallelStep),
}

impl StepKind {
  pub fn tool(&self) -> ToolKind {
    match self {
      StepKind::Template(_) => ToolKind::Template,
      StepKind::Shell(_) => ToolKind::Shell,
      StepKind::Install(_) => ToolKind::Install,
      StepKind::Patch(_) => ToolKind::Patch,
      StepKind::Parallel(_) => ToolKind::Parallel,
    }
  }
}

/// The closed set of built-in tool types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
  Template,
  Shell,
  Install,
  Patch,
  Parallel,
}

impl ToolKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ToolKind::Template => "template",
      ToolKind::Shell => "shell",
      ToolKind::Install => "install",
      ToolKind::Patch => "patch",
      ToolKind::Parallel => "parallel",
    }
  }
}

impl std::fmt::Display for ToolKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Render one or more template files into the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateStep {
  /// Template identifier, resolved against the project root and the
  /// configured template directories.
  pub template: String,

  /// Directory that relative `to` targets resolve against. Defaults to the
  /// project root. May itself contain template expressions.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output_dir: Option<String>,

  /// Secondary templates composed into this step's output set.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub includes: Vec<TemplateInclude>,
}

/// A secondary template composed into a base template's output.
///
/// The short form is a bare template id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateInclude {
  Id(String),
  Conditional {
    template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    condition: Option<String>,
  },
}

impl TemplateInclude {
  pub fn template(&self) -> &str {
    match self {
      TemplateInclude::Id(id) => id,
      TemplateInclude::Conditional { template, .. } => template,
    }
  }

  pub fn condition(&self) -> Option<&str> {
    match self {
      TemplateInclude::Id(_) => None,
      TemplateInclude::Conditional { condition, .. } => condition.as_deref(),
    }
  }
}

/// Run a command in a subprocess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellStep {
  /// Command line, rendered through the template engine before execution.
  pub command: String,

  /// Working directory relative to the project root; also rendered.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub working_dir: Option<String>,

  /// Extra environment variables for the subprocess.
  #[serde(default, skip_serializing_if = "HashMap::is_empty")]
  pub env: HashMap<String, String>,

  /// A non-zero exit fails the step unless set.
  #[serde(default)]
  pub optional: bool,
}

/// Install packages with the project's package manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallStep {
  pub packages: Vec<String>,

  /// Install as development dependencies.
  #[serde(default)]
  pub dev: bool,

  /// Overrides lockfile-based package manager detection.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub package_manager: Option<String>,

  /// A failed install is downgraded to a warning instead of failing the
  /// recipe.
  #[serde(default)]
  pub optional: bool,
}

/// Deep-merge an object into a structured-data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchStep {
  /// Target file, rendered through the template engine.
  pub file: String,

  /// Object merged into the target: object values merge recursively,
  /// arrays and scalars replace outright.
  pub merge: serde_json::Value,

  /// Overrides extension-based format detection (json, yaml, toml).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub format: Option<String>,

  /// Indent width for JSON output.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub indent: Option<usize>,

  #[serde(default)]
  pub create_if_missing: bool,
}

/// Execute a nested step list under its own concurrency bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelStep {
  pub steps: Vec<Step>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_concurrency: Option<usize>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_step_kind_from_tool_tag() {
    let yaml = r#"
name: scaffold
tool: template
template: rust/model
"#;
    let step: Step = serde_yml::from_str(yaml).unwrap();
    assert_eq!(step.name, "scaffold");
    match &step.kind {
      StepKind::Template(t) => assert_eq!(t.template, "rust/model"),
      other => panic!("unexpected kind: {:?}", other),
    }
  }

  #[test]
  fn test_dependency_ref_short_and_strict_forms() {
    let yaml = r#"
name: format
tool: shell
command: cargo fmt
depends_on:
  - scaffold
  - { step: install, completed: true }
"#;
    let step: Step = serde_yml::from_str(yaml).unwrap();
    assert_eq!(step.depends_on.len(), 2);
    assert_eq!(step.depends_on[0].step(), "scaffold");
    assert!(!step.depends_on[0].requires_completed());
    assert_eq!(step.depends_on[1].step(), "install");
    assert!(step.depends_on[1].requires_completed());
  }

  #[test]
  fn test_parallel_step_nests_steps() {
    let yaml = r#"
name: fan-out
tool: parallel
max_concurrency: 2
steps:
  - name: a
    tool: shell
    command: "true"
  - name: b
    tool: shell
    command: "true"
"#;
    let step: Step = serde_yml::from_str(yaml).unwrap();
    match &step.kind {
      StepKind::Parallel(p) => {
        assert_eq!(p.steps.len(), 2);
        assert_eq!(p.max_concurrency, Some(2));
      }
      other => panic!("unexpected kind: {:?}", other),
    }
  }

  #[test]
  fn test_unknown_tool_tag_is_rejected() {
    let yaml = r#"
name: x
tool: docker
image: alpine
"#;
    assert!(serde_yml::from_str::<Step>(yaml).is_err());
  }
}
