use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use saffron_recipe::{InstallStep, Step, StepKind};
use saffron_tool::{
  ResourceEstimate, StepContext, StepResult, Tool, ToolError, ToolValidation,
};

/// The package managers the install strategy knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
  Npm,
  Pnpm,
  Yarn,
  Bun,
}

impl PackageManager {
  /// Detect the active package manager from lockfiles. Precedence:
  /// pnpm-lock.yaml, yarn.lock, bun.lockb/bun.lock, package-lock.json,
  /// and npm as the fallback.
  pub fn detect(project_root: &Path) -> Self {
    const LOCKFILES: &[(&str, PackageManager)] = &[
      ("pnpm-lock.yaml", PackageManager::Pnpm),
      ("yarn.lock", PackageManager::Yarn),
      ("bun.lockb", PackageManager::Bun),
      ("bun.lock", PackageManager::Bun),
      ("package-lock.json", PackageManager::Npm),
    ];
    for (lockfile, manager) in LOCKFILES {
      if project_root.join(lockfile).exists() {
        return *manager;
      }
    }
    PackageManager::Npm
  }

  pub fn from_name(name: &str) -> Option<Self> {
    match name {
      "npm" => Some(PackageManager::Npm),
      "pnpm" => Some(PackageManager::Pnpm),
      "yarn" => Some(PackageManager::Yarn),
      "bun" => Some(PackageManager::Bun),
      _ => None,
    }
  }

  pub fn program(&self) -> &'static str {
    match self {
      PackageManager::Npm => "npm",
      PackageManager::Pnpm => "pnpm",
      PackageManager::Yarn => "yarn",
      PackageManager::Bun => "bun",
    }
  }

  /// Build the install invocation for the given packages.
  pub fn install_args(&self, packages: &[String], dev: bool) -> Vec<String> {
    let mut args = Vec::with_capacity(packages.len() + 2);
    match self {
      PackageManager::Npm => args.push("install".to_string()),
      PackageManager::Pnpm | PackageManager::Yarn | PackageManager::Bun => {
        args.push("add".to_string())
      }
    }
    args.extend(packages.iter().cloned());
    if dev {
      match self {
        PackageManager::Npm | PackageManager::Pnpm => args.push("--save-dev".to_string()),
        PackageManager::Yarn | PackageManager::Bun => args.push("--dev".to_string()),
      }
    }
    args
  }
}

impl std::fmt::Display for PackageManager {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.program())
  }
}

/// Installs packages with the detected (or overridden) package manager.
///
/// Install failures are reported retryable — transient registry and
/// network trouble is the common cause. An optional install instead
/// downgrades to a completed result with a warning.
#[derive(Debug, Default)]
pub struct InstallTool;

impl InstallTool {
  pub fn new() -> Self {
    Self
  }

  fn payload<'a>(step: &'a Step) -> Result<&'a InstallStep, ToolError> {
    match &step.kind {
      StepKind::Install(install) => Ok(install),
      _ => Err(ToolError::validation("step is not an install step")),
    }
  }

  fn manager(install: &InstallStep, ctx: &StepContext) -> Result<PackageManager, ToolError> {
    match &install.package_manager {
      Some(name) => PackageManager::from_name(name).ok_or_else(|| {
        ToolError::configuration(format!("unknown package manager '{}'", name))
      }),
      None => Ok(PackageManager::detect(ctx.project_root())),
    }
  }
}

#[async_trait]
impl Tool for InstallTool {
  async fn validate(&self, step: &Step, _ctx: &StepContext) -> Result<ToolValidation, ToolError> {
    let install = Self::payload(step)?;
    let mut validation = ToolValidation::with_estimate(ResourceEstimate {
      network: true,
      processes: 1,
      ..Default::default()
    });
    if install.packages.is_empty() {
      validation = validation.issue("install step lists no packages");
    }
    if let Some(name) = &install.package_manager
      && PackageManager::from_name(name).is_none()
    {
      validation = validation.issue(format!("unknown package manager '{}'", name));
    }
    Ok(validation)
  }

  async fn execute(&self, step: &Step, ctx: &StepContext) -> Result<StepResult, ToolError> {
    let install = Self::payload(step)?;
    let manager = Self::manager(install, ctx)?;
    let scope = ctx.template_ctx();

    let mut packages = Vec::with_capacity(install.packages.len());
    for package in &install.packages {
      packages.push(ctx.engine().render(package, &scope)?);
    }
    let args = manager.install_args(&packages, install.dev);

    if !ctx.writes_enabled() {
      debug!(step = %step.name, manager = %manager, "skipping install (no-write pass)");
      return Ok(StepResult::completed(&step.name).with_output(json!({
        "package_manager": manager.program(),
        "args": args,
        "packages": packages,
        "executed": false,
      })));
    }

    info!(step = %step.name, manager = %manager, packages = ?packages, "installing packages");

    let spawned = tokio::process::Command::new(manager.program())
      .args(&args)
      .current_dir(ctx.project_root())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .output()
      .await;

    let failure = match spawned {
      Ok(output) if output.status.success() => {
        return Ok(StepResult::completed(&step.name).with_output(json!({
          "package_manager": manager.program(),
          "args": args,
          "packages": packages,
          "executed": true,
          "exit_code": output.status.code().unwrap_or(0),
          "stdout": String::from_utf8_lossy(&output.stdout),
        })));
      }
      Ok(output) => {
        let stderr = String::from_utf8_lossy(&output.stderr);
        format!(
          "{} exited with status {}: {}",
          manager.program(),
          output.status.code().unwrap_or(-1),
          stderr.trim().lines().last().unwrap_or("")
        )
      }
      Err(e) => format!("failed to spawn {}: {}", manager.program(), e),
    };

    if install.optional {
      let mut result = StepResult::completed(&step.name).with_output(json!({
        "package_manager": manager.program(),
        "args": args,
        "packages": packages,
        "executed": true,
      }));
      result
        .warnings
        .push(format!("optional install failed: {}", failure));
      return Ok(result);
    }

    Err(ToolError::execution_retryable(failure))
  }
}
