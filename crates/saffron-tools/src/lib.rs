//! Saffron Tools
//!
//! The built-in execution strategies: `shell` runs a rendered command in a
//! subprocess, `install` drives the project's package manager, `patch`
//! deep-merges into structured-data files, and `template` wraps the
//! rendering pipeline. The `parallel` strategy has no tool here — it is
//! structural and handled by executor recursion.

mod install;
mod patch;
mod shell;
mod template;

use std::path::PathBuf;
use std::sync::Arc;

use saffron_recipe::ToolKind;
use saffron_registry::{ToolRegistration, ToolRegistry};

pub use install::{InstallTool, PackageManager};
pub use patch::{PatchTool, deep_merge};
pub use shell::ShellTool;
pub use template::TemplateTool;

/// Register every built-in tool under its default name.
pub fn register_builtins(registry: &ToolRegistry, template_dirs: Vec<PathBuf>) {
  registry.register(
    ToolRegistration::new(ToolKind::Template, "template", move || {
      Arc::new(TemplateTool::new(template_dirs.clone()))
    })
    .with_category("generation"),
  );
  registry.register(
    ToolRegistration::new(ToolKind::Shell, "shell", || Arc::new(ShellTool::new()))
      .with_category("process"),
  );
  registry.register(
    ToolRegistration::new(ToolKind::Install, "install", || Arc::new(InstallTool::new()))
      .with_category("dependencies"),
  );
  registry.register(
    ToolRegistration::new(ToolKind::Patch, "patch", || Arc::new(PatchTool::new()))
      .with_category("generation"),
  );
}
