use std::sync::Arc;

use thiserror::Error;

/// A template rendering failure.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RenderError {
  pub message: String,
}

impl RenderError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }
}

/// Side channels available to templates while they render.
///
/// `provide` receives values a template publishes for downstream steps;
/// `answer` resolves externally pre-computed content by key. Engines that
/// do not support helpers simply ignore the hooks.
#[derive(Clone, Default)]
pub struct RenderHooks {
  pub provide: Option<Arc<dyn Fn(&str, serde_json::Value) + Send + Sync>>,
  pub answer: Option<Arc<dyn Fn(&str) -> Option<serde_json::Value> + Send + Sync>>,
}

/// The injected templating/expression engine.
///
/// One implementation (minijinja) ships with `saffron-template`; the trait
/// keeps the engine swappable and the rest of the system free of a direct
/// dependency on it.
pub trait TemplateEngine: Send + Sync {
  /// Render `template` against a JSON context.
  fn render(&self, template: &str, ctx: &serde_json::Value) -> Result<String, RenderError>;

  /// Evaluate a boolean condition expression against a JSON context.
  fn eval_bool(&self, expr: &str, ctx: &serde_json::Value) -> Result<bool, RenderError>;

  /// Render with template helpers wired to the given hooks.
  fn render_with(
    &self,
    template: &str,
    ctx: &serde_json::Value,
    hooks: &RenderHooks,
  ) -> Result<String, RenderError> {
    let _ = hooks;
    self.render(template, ctx)
  }
}
