use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use saffron_recipe::{ShellStep, Step, StepKind};
use saffron_tool::{
  ResourceEstimate, StepContext, StepResult, Tool, ToolError, ToolValidation,
};

/// Runs a rendered command line in a subprocess (`sh -c`).
///
/// The command and working directory render through the template engine,
/// so commands may interpolate variables and use conditional blocks. A
/// non-zero exit fails the step unless it is marked optional; optional
/// failures downgrade to a completed result with a warning.
#[derive(Debug, Default)]
pub struct ShellTool;

impl ShellTool {
  pub fn new() -> Self {
    Self
  }

  fn payload<'a>(step: &'a Step) -> Result<&'a ShellStep, ToolError> {
    match &step.kind {
      StepKind::Shell(shell) => Ok(shell),
      _ => Err(ToolError::validation("step is not a shell step")),
    }
  }
}

#[async_trait]
impl Tool for ShellTool {
  async fn validate(&self, step: &Step, _ctx: &StepContext) -> Result<ToolValidation, ToolError> {
    let shell = Self::payload(step)?;
    let mut validation = ToolValidation::with_estimate(ResourceEstimate {
      processes: 1,
      ..Default::default()
    });
    if shell.command.trim().is_empty() {
      validation = validation.issue("shell step has an empty command");
    }
    Ok(validation)
  }

  async fn execute(&self, step: &Step, ctx: &StepContext) -> Result<StepResult, ToolError> {
    let shell = Self::payload(step)?;
    let scope = ctx.template_ctx();

    let command = ctx.engine().render(&shell.command, &scope)?;
    let working_dir = match &shell.working_dir {
      Some(dir) => {
        let rendered = ctx.engine().render(dir, &scope)?;
        let path = PathBuf::from(rendered);
        if path.is_absolute() {
          path
        } else {
          ctx.project_root().join(path)
        }
      }
      None => ctx.project_root().to_path_buf(),
    };

    if !ctx.writes_enabled() {
      debug!(step = %step.name, command = %command, "skipping subprocess (no-write pass)");
      return Ok(StepResult::completed(&step.name).with_output(json!({
        "command": command,
        "working_dir": working_dir,
        "executed": false,
      })));
    }

    info!(step = %step.name, command = %command, cwd = %working_dir.display(), "running command");

    let mut cmd = tokio::process::Command::new("sh");
    cmd
      .arg("-c")
      .arg(&command)
      .current_dir(&working_dir)
      .stdout(Stdio::piped())
      .stderr(Stdio::piped());
    for (key, value) in &shell.env {
      cmd.env(key, ctx.engine().render(value, &scope)?);
    }

    let output = cmd
      .output()
      .await
      .map_err(|e| ToolError::io(format!("failed to spawn '{}'", command), e))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let exit_code = output.status.code().unwrap_or(-1);
    let payload = json!({
      "command": command.clone(),
      "working_dir": working_dir,
      "executed": true,
      "exit_code": exit_code,
      "stdout": stdout,
      "stderr": stderr.clone(),
    });

    if output.status.success() {
      return Ok(StepResult::completed(&step.name).with_output(payload));
    }

    if shell.optional {
      let mut result = StepResult::completed(&step.name).with_output(payload);
      result.warnings.push(format!(
        "optional command '{}' exited with status {}",
        command, exit_code
      ));
      return Ok(result);
    }

    let mut message = format!("command '{}' exited with status {}", command, exit_code);
    let stderr_tail = stderr.trim();
    if !stderr_tail.is_empty() {
      message.push_str(": ");
      message.push_str(stderr_tail.lines().last().unwrap_or(stderr_tail));
    }
    Err(ToolError::execution(message))
  }
}
