use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use saffron_recipe::{Step, StepKind, TemplateStep};
use saffron_template::{FileDisposition, RenderRequest, TemplateError, TemplatePipeline};
use saffron_tool::{StepContext, StepResult, Tool, ToolError, ToolValidation};

/// Renders templates through the pipeline in `saffron-template`.
///
/// The instance owns the template resolution cache, which is why this tool
/// benefits from registry instance reuse; `cleanup` drops the cache.
pub struct TemplateTool {
  pipeline: TemplatePipeline,
}

impl TemplateTool {
  pub fn new(template_dirs: Vec<PathBuf>) -> Self {
    Self {
      pipeline: TemplatePipeline::new(template_dirs),
    }
  }

  fn payload<'a>(step: &'a Step) -> Result<&'a TemplateStep, ToolError> {
    match &step.kind {
      StepKind::Template(template) => Ok(template),
      _ => Err(ToolError::validation("step is not a template step")),
    }
  }
}

fn map_template_err(e: TemplateError) -> ToolError {
  match e {
    TemplateError::NotFound { .. } | TemplateError::MissingTarget { .. } => {
      ToolError::configuration(e.to_string())
    }
    TemplateError::Render(render) => ToolError::Render(render),
    other => ToolError::execution(other.to_string()),
  }
}

#[async_trait]
impl Tool for TemplateTool {
  async fn validate(&self, step: &Step, ctx: &StepContext) -> Result<ToolValidation, ToolError> {
    let template = Self::payload(step)?;
    let mut validation = ToolValidation::ok();
    if template.template.trim().is_empty() {
      validation = validation.issue("template step needs a template id");
    } else if self
      .pipeline
      .resolver()
      .resolve(&template.template, ctx.project_root())
      .is_err()
    {
      validation = validation.issue(format!("template not found: '{}'", template.template));
    }
    Ok(validation)
  }

  async fn execute(&self, step: &Step, ctx: &StepContext) -> Result<StepResult, ToolError> {
    let template = Self::payload(step)?;
    let request = RenderRequest {
      template: &template.template,
      output_dir: template.output_dir.as_deref(),
      includes: &template.includes,
    };

    let outcome = self.pipeline.render(&request, ctx).map_err(map_template_err)?;

    info!(
      step = %step.name,
      template = %template.template,
      created = outcome.files_created.len(),
      modified = outcome.files_modified.len(),
      "rendered templates"
    );

    let files: Vec<serde_json::Value> = outcome
      .files
      .iter()
      .map(|f| {
        json!({
          "template": f.template.display().to_string(),
          "target": f.target.as_ref().map(|t| t.display().to_string()),
          "disposition": match &f.disposition {
            FileDisposition::Write => "write".to_string(),
            FileDisposition::Overwrite => "overwrite".to_string(),
            FileDisposition::Inject => "inject".to_string(),
            FileDisposition::Skip { reason } => format!("skip: {}", reason),
          },
        })
      })
      .collect();

    let mut result = StepResult::completed(&step.name).with_output(json!({ "files": files }));
    result.files_created = outcome.files_created;
    result.files_modified = outcome.files_modified;
    result.warnings = outcome.warnings;
    Ok(result)
  }

  async fn cleanup(&self) -> Result<(), ToolError> {
    self.pipeline.clear_cache();
    Ok(())
  }
}
