use saffron_recipe::ToolKind;
use saffron_tool::ToolError;
use thiserror::Error;

/// Errors from tool resolution.
#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("no tool registered for {kind}/{name}")]
  NotRegistered { kind: ToolKind, name: String },

  #[error("tool {kind}/{name} is disabled")]
  Disabled { kind: ToolKind, name: String },

  #[error("tool {kind}/{name} failed to initialize")]
  Initialize {
    kind: ToolKind,
    name: String,
    #[source]
    source: ToolError,
  },
}

impl RegistryError {
  pub fn code(&self) -> &'static str {
    match self {
      RegistryError::NotRegistered { .. } => "tool_not_registered",
      RegistryError::Disabled { .. } => "tool_disabled",
      RegistryError::Initialize { .. } => "tool_initialize",
    }
  }
}
