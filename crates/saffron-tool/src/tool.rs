use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use saffron_recipe::Step;

use crate::context::StepContext;
use crate::error::ToolError;
use crate::result::StepResult;

/// One pluggable execution strategy.
///
/// Lifecycle: `initialize` runs once per instance before first use;
/// `validate` checks a step without side effects; `execute` runs it;
/// `cleanup` releases whatever the instance holds and is guaranteed to run
/// when the registry evicts or shuts the instance down.
#[async_trait]
pub trait Tool: Send + Sync {
  async fn initialize(&self) -> Result<(), ToolError> {
    Ok(())
  }

  /// Structural and semantic checks plus advisory resource estimates.
  /// Estimates are diagnostics only — nothing enforces them.
  async fn validate(&self, step: &Step, ctx: &StepContext) -> Result<ToolValidation, ToolError>;

  async fn execute(&self, step: &Step, ctx: &StepContext) -> Result<StepResult, ToolError>;

  async fn cleanup(&self) -> Result<(), ToolError> {
    Ok(())
  }
}

/// Outcome of [`Tool::validate`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolValidation {
  /// Problems that would make `execute` fail.
  pub issues: Vec<String>,
  pub estimate: ResourceEstimate,
}

impl ToolValidation {
  pub fn ok() -> Self {
    Self::default()
  }

  pub fn with_estimate(estimate: ResourceEstimate) -> Self {
    Self {
      issues: Vec::new(),
      estimate,
    }
  }

  pub fn issue(mut self, message: impl Into<String>) -> Self {
    self.issues.push(message.into());
    self
  }

  pub fn is_ok(&self) -> bool {
    self.issues.is_empty()
  }
}

/// Advisory resource estimate for a step.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceEstimate {
  pub memory_bytes: u64,
  pub disk_bytes: u64,
  pub network: bool,
  pub processes: u32,
}
