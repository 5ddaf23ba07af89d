use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// Terminal status of a step. A step is executed at most once per run;
/// skipping is a terminal non-execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
  Completed,
  Failed,
  Skipped,
}

/// Error attached to a failed step: machine-readable code, human message,
/// and the flattened cause chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
  pub code: String,
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cause: Option<String>,
}

impl From<&ToolError> for StepError {
  fn from(err: &ToolError) -> Self {
    let cause = std::error::Error::source(err).map(|s| s.to_string());
    Self {
      code: err.code().to_string(),
      message: err.to_string(),
      cause,
    }
  }
}

/// Result of one step execution, written exactly once per step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
  pub name: String,
  pub status: StepStatus,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub duration_ms: u64,

  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub files_created: Vec<PathBuf>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub files_modified: Vec<PathBuf>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub files_deleted: Vec<PathBuf>,

  /// Tool-specific result payload.
  #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
  pub output: serde_json::Value,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<StepError>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub skip_reason: Option<String>,

  pub retries: u32,

  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub warnings: Vec<String>,
}

impl StepResult {
  fn base(name: impl Into<String>, status: StepStatus) -> Self {
    let now = Utc::now();
    Self {
      name: name.into(),
      status,
      started_at: now,
      finished_at: now,
      duration_ms: 0,
      files_created: Vec::new(),
      files_modified: Vec::new(),
      files_deleted: Vec::new(),
      output: serde_json::Value::Null,
      error: None,
      skip_reason: None,
      retries: 0,
      warnings: Vec::new(),
    }
  }

  pub fn completed(name: impl Into<String>) -> Self {
    Self::base(name, StepStatus::Completed)
  }

  pub fn failed(name: impl Into<String>, error: StepError) -> Self {
    let mut result = Self::base(name, StepStatus::Failed);
    result.error = Some(error);
    result
  }

  pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
    let mut result = Self::base(name, StepStatus::Skipped);
    result.skip_reason = Some(reason.into());
    result
  }

  pub fn with_output(mut self, output: serde_json::Value) -> Self {
    self.output = output;
    self
  }

  pub fn is_completed(&self) -> bool {
    self.status == StepStatus::Completed
  }

  pub fn is_failed(&self) -> bool {
    self.status == StepStatus::Failed
  }

  pub fn is_skipped(&self) -> bool {
    self.status == StepStatus::Skipped
  }

  /// Fold a nested step's file changes and warnings into this result.
  /// Used by `parallel` steps to report their children as one entry.
  pub fn absorb_files(&mut self, child: &StepResult) {
    self.files_created.extend(child.files_created.iter().cloned());
    self.files_modified.extend(child.files_modified.iter().cloned());
    self.files_deleted.extend(child.files_deleted.iter().cloned());
    self.warnings.extend(child.warnings.iter().cloned());
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_skipped_records_reason() {
    let result = StepResult::skipped("fmt", "condition evaluated to false");
    assert!(result.is_skipped());
    assert_eq!(
      result.skip_reason.as_deref(),
      Some("condition evaluated to false")
    );
  }

  #[test]
  fn test_absorb_files_folds_child_changes() {
    let mut parent = StepResult::completed("fan-out");
    let mut child = StepResult::completed("a");
    child.files_created.push(PathBuf::from("src/a.rs"));
    child.warnings.push("w".to_string());
    parent.absorb_files(&child);
    assert_eq!(parent.files_created, [PathBuf::from("src/a.rs")]);
    assert_eq!(parent.warnings, ["w"]);
  }
}
