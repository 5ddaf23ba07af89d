use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use saffron_recipe::{PatchStep, Step, StepKind};
use saffron_tool::{StepContext, StepResult, Tool, ToolError, ToolValidation};

/// Structured-data formats the patch strategy can read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatchFormat {
  Json,
  Yaml,
  Toml,
}

impl PatchFormat {
  fn from_name(name: &str) -> Option<Self> {
    match name {
      "json" => Some(PatchFormat::Json),
      "yaml" | "yml" => Some(PatchFormat::Yaml),
      "toml" => Some(PatchFormat::Toml),
      _ => None,
    }
  }

  fn detect(path: &Path) -> Option<Self> {
    path
      .extension()
      .and_then(|e| e.to_str())
      .and_then(Self::from_name)
  }
}

/// Deep-merge `patch` into `base`: object-valued keys merge recursively,
/// arrays and scalars replace outright.
pub fn deep_merge(base: &mut Value, patch: &Value) {
  match (base, patch) {
    (Value::Object(base_map), Value::Object(patch_map)) => {
      for (key, patch_value) in patch_map {
        match base_map.get_mut(key) {
          Some(base_value) if base_value.is_object() && patch_value.is_object() => {
            deep_merge(base_value, patch_value);
          }
          _ => {
            base_map.insert(key.clone(), patch_value.clone());
          }
        }
      }
    }
    (base, patch) => *base = patch.clone(),
  }
}

/// Deep-merges a declared object into a structured-data file.
///
/// The merge happens fully in memory and lands in a single write, so a
/// failing step never leaves a half-patched file behind.
#[derive(Debug, Default)]
pub struct PatchTool;

impl PatchTool {
  pub fn new() -> Self {
    Self
  }

  fn payload<'a>(step: &'a Step) -> Result<&'a PatchStep, ToolError> {
    match &step.kind {
      StepKind::Patch(patch) => Ok(patch),
      _ => Err(ToolError::validation("step is not a patch step")),
    }
  }

  fn format(patch: &PatchStep, target: &Path) -> Result<PatchFormat, ToolError> {
    if let Some(name) = &patch.format {
      return PatchFormat::from_name(name)
        .ok_or_else(|| ToolError::configuration(format!("unknown patch format '{}'", name)));
    }
    PatchFormat::detect(target).ok_or_else(|| {
      ToolError::configuration(format!(
        "cannot detect patch format from '{}'",
        target.display()
      ))
    })
  }

  fn parse(format: PatchFormat, content: &str, target: &Path) -> Result<Value, ToolError> {
    let malformed = |e: String| {
      ToolError::configuration(format!(
        "malformed patch target '{}': {}",
        target.display(),
        e
      ))
    };
    match format {
      PatchFormat::Json => serde_json::from_str(content).map_err(|e| malformed(e.to_string())),
      PatchFormat::Yaml => serde_yml::from_str(content).map_err(|e| malformed(e.to_string())),
      PatchFormat::Toml => {
        let value: toml::Value =
          toml::from_str(content).map_err(|e| malformed(e.to_string()))?;
        serde_json::to_value(value).map_err(|e| malformed(e.to_string()))
      }
    }
  }

  fn serialize(
    format: PatchFormat,
    value: &Value,
    indent: Option<usize>,
  ) -> Result<String, ToolError> {
    match format {
      PatchFormat::Json => {
        let indent = " ".repeat(indent.unwrap_or(2));
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        serde::Serialize::serialize(value, &mut serializer)
          .map_err(|e| ToolError::execution(format!("failed to serialize patch: {}", e)))?;
        let mut text = String::from_utf8(out)
          .map_err(|e| ToolError::execution(format!("failed to serialize patch: {}", e)))?;
        text.push('\n');
        Ok(text)
      }
      PatchFormat::Yaml => serde_yml::to_string(value)
        .map_err(|e| ToolError::execution(format!("failed to serialize patch: {}", e))),
      PatchFormat::Toml => toml::to_string_pretty(value)
        .map_err(|e| ToolError::execution(format!("failed to serialize patch: {}", e))),
    }
  }
}

#[async_trait]
impl Tool for PatchTool {
  async fn validate(&self, step: &Step, _ctx: &StepContext) -> Result<ToolValidation, ToolError> {
    let patch = Self::payload(step)?;
    let mut validation = ToolValidation::ok();
    if !patch.merge.is_object() {
      validation = validation.issue("patch merge payload must be an object");
    }
    if patch.file.trim().is_empty() {
      validation = validation.issue("patch step has no target file");
    }
    if let Some(name) = &patch.format
      && PatchFormat::from_name(name).is_none()
    {
      validation = validation.issue(format!("unknown patch format '{}'", name));
    }
    Ok(validation)
  }

  async fn execute(&self, step: &Step, ctx: &StepContext) -> Result<StepResult, ToolError> {
    let patch = Self::payload(step)?;
    let scope = ctx.template_ctx();

    let rendered = ctx.engine().render(&patch.file, &scope)?;
    let target = {
      let path = PathBuf::from(&rendered);
      if path.is_absolute() {
        path
      } else {
        ctx.project_root().join(path)
      }
    };
    let format = Self::format(patch, &target)?;

    let exists = target.is_file();
    let mut value = if exists {
      let content = std::fs::read_to_string(&target)
        .map_err(|e| ToolError::io(format!("failed to read '{}'", target.display()), e))?;
      Self::parse(format, &content, &target)?
    } else if patch.create_if_missing {
      Value::Object(Default::default())
    } else {
      return Err(ToolError::configuration(format!(
        "patch target does not exist: '{}'",
        target.display()
      )));
    };

    deep_merge(&mut value, &patch.merge);
    let serialized = Self::serialize(format, &value, patch.indent)?;

    if ctx.writes_enabled() {
      if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
          .map_err(|e| ToolError::io(format!("failed to create '{}'", parent.display()), e))?;
      }
      std::fs::write(&target, &serialized)
        .map_err(|e| ToolError::io(format!("failed to write '{}'", target.display()), e))?;
      info!(step = %step.name, target = %target.display(), "patched file");
    } else {
      debug!(step = %step.name, target = %target.display(), "skipping patch write (no-write pass)");
    }

    let mut result = StepResult::completed(&step.name).with_output(json!({
      "target": target.display().to_string(),
      "format": format!("{:?}", format).to_lowercase(),
      "created": !exists,
    }));
    if exists {
      result.files_modified.push(target);
    } else {
      result.files_created.push(target);
    }
    Ok(result)
  }
}
