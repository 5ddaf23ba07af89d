use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use saffron_tool::StepResult;

/// Aggregated outcome of one recipe run.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunReport {
  pub success: bool,
  pub recipe: String,
  pub duration_ms: u64,
  pub files_created: Vec<PathBuf>,
  pub files_modified: Vec<PathBuf>,
  pub files_deleted: Vec<PathBuf>,
  pub warnings: Vec<String>,
  pub errors: Vec<ReportError>,
  pub metadata: RunMetadata,
  /// Per-step results in declaration order. Nested `parallel` children
  /// are folded into their parent entry.
  pub results: Vec<StepResult>,
}

/// Step counts for the run. A failed-but-optional step completes with a
/// warning and is counted as completed, not failed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunMetadata {
  pub total_steps: usize,
  pub completed_steps: usize,
  pub failed_steps: usize,
  pub skipped_steps: usize,
}

/// One error from the run, attributed to its step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportError {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub step: Option<String>,
  pub code: String,
  pub message: String,
}

/// Outcome of a collect pass: the answer keys templates asked for.
#[derive(Debug, Serialize, Deserialize)]
pub struct CollectReport {
  pub answer_requests: Vec<String>,
  pub warnings: Vec<String>,
}
