use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{info, instrument, warn};

use saffron_executor::{ExecutionEvent, ExecutorConfig, StepExecutor};
use saffron_recipe::{Recipe, Step, StepKind, ValidationReport};
use saffron_registry::{RegistryConfig, ToolRegistry};
use saffron_template::MiniJinjaEngine;
use saffron_tool::{Phase, StepContext, TemplateEngine};
use saffron_tools::register_builtins;

use crate::error::EngineError;
use crate::options::RunOptions;
use crate::report::{CollectReport, ReportError, RunMetadata, RunReport};
use crate::source::RecipeSource;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Directories template identifiers resolve against, relative to the
  /// project root.
  pub template_dirs: Vec<PathBuf>,
  pub registry: RegistryConfig,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      template_dirs: vec![PathBuf::from("templates")],
      registry: RegistryConfig::default(),
    }
  }
}

/// The recipe engine.
///
/// Owns the tool registry and the template engine and passes both down
/// through the execution context — no global state, so embedders and tests
/// can run isolated engines side by side.
pub struct RecipeEngine {
  registry: Arc<ToolRegistry>,
  template_engine: Arc<dyn TemplateEngine>,
}

impl RecipeEngine {
  pub fn new() -> Self {
    Self::with_config(EngineConfig::default())
  }

  pub fn with_config(config: EngineConfig) -> Self {
    let registry = Arc::new(ToolRegistry::new(config.registry));
    register_builtins(&registry, config.template_dirs);
    Self {
      registry,
      template_engine: Arc::new(MiniJinjaEngine::new()),
    }
  }

  pub fn registry(&self) -> &Arc<ToolRegistry> {
    &self.registry
  }

  /// Execute a recipe and fold the step results into a run report.
  ///
  /// Validation and variable resolution fail fast with zero side effects;
  /// from the first launched step onward, failures land in the report
  /// (`success == false`) rather than in `Err`.
  #[instrument(name = "recipe_execute", skip(self, source, options))]
  pub async fn execute(
    &self,
    source: RecipeSource,
    options: RunOptions,
  ) -> Result<RunReport, EngineError> {
    let recipe = source.load()?;
    self.check_valid(&recipe)?;

    let run_id = uuid::Uuid::new_v4().to_string();
    let timer = Instant::now();
    info!(run_id = %run_id, recipe = %recipe.name, dry_run = options.dry_run, "recipe run started");
    self.notify(
      &options,
      ExecutionEvent::RunStarted {
        recipe: recipe.name.clone(),
        total_steps: recipe.steps.len(),
      },
    );

    let ctx = self.build_context(&recipe, &options, Phase::Render)?;
    let executor = StepExecutor::new(self.registry.clone());
    let config = ExecutorConfig {
      max_concurrency: options.max_concurrency,
      continue_on_error: options.continue_on_error,
      notifier: options.notifier.clone(),
    };

    let outcome = executor.execute(&recipe.steps, &ctx, &config).await?;
    let report = self.fold_report(&recipe, &options, outcome, timer.elapsed().as_millis() as u64);

    self.notify(
      &options,
      ExecutionEvent::RunCompleted {
        recipe: recipe.name.clone(),
        success: report.success,
      },
    );
    if report.success {
      info!(run_id = %run_id, recipe = %recipe.name, "recipe run completed");
    } else {
      warn!(run_id = %run_id, recipe = %recipe.name, failed = report.metadata.failed_steps, "recipe run failed");
    }

    Ok(report)
  }

  /// Validate a recipe without executing anything: document structure,
  /// every dependency graph, and each step against its tool.
  pub async fn validate(&self, source: RecipeSource) -> Result<ValidationReport, EngineError> {
    let recipe = source.load()?;
    let mut report = recipe.validate();
    if !report.is_valid() {
      return Ok(report);
    }

    // Semantic per-step checks, delegated to the tools.
    let ctx = StepContext::new(
      std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
      self.template_engine.clone(),
    );
    let flat = flatten_steps(&recipe.steps);
    let checks = flat.iter().map(|step| {
      let ctx = ctx.clone();
      let registry = self.registry.clone();
      async move {
        let handle = match registry.resolve(step.kind.tool()).await {
          Ok(handle) => handle,
          Err(e) => return vec![(step.name.clone(), e.code().to_string(), e.to_string())],
        };
        let validation = handle.validate(step, &ctx).await;
        handle.dispose().await;
        match validation {
          Ok(validation) => validation
            .issues
            .into_iter()
            .map(|issue| (step.name.clone(), "tool_validation".to_string(), issue))
            .collect(),
          Err(e) => vec![(step.name.clone(), e.code().to_string(), e.to_string())],
        }
      }
    });

    for issues in join_all(checks).await {
      for (step, code, message) in issues {
        report.errors.push(saffron_recipe::ValidationIssue {
          code,
          step: Some(step),
          message,
        });
      }
    }
    Ok(report)
  }

  /// Run the collect pass: render every template with writes disabled and
  /// report the answer keys they requested, so an external phase can
  /// pre-compute the answers before the real run.
  pub async fn collect(
    &self,
    source: RecipeSource,
    options: RunOptions,
  ) -> Result<CollectReport, EngineError> {
    let recipe = source.load()?;
    self.check_valid(&recipe)?;

    let ctx = self.build_context(&recipe, &options, Phase::Collect)?;
    let executor = StepExecutor::new(self.registry.clone());
    let config = ExecutorConfig {
      max_concurrency: options.max_concurrency,
      continue_on_error: options.continue_on_error,
      notifier: None,
    };

    let outcome = executor.execute(&recipe.steps, &ctx, &config).await?;
    let warnings = outcome
      .results
      .iter()
      .flat_map(|r| r.warnings.iter().map(|w| format!("{}: {}", r.name, w)))
      .collect();

    Ok(CollectReport {
      answer_requests: ctx.drain_answer_requests(),
      warnings,
    })
  }

  fn check_valid(&self, recipe: &Recipe) -> Result<(), EngineError> {
    let report = recipe.validate();
    if report.is_valid() {
      Ok(())
    } else {
      Err(EngineError::Validation { report })
    }
  }

  /// Merge recipe defaults with run-level overrides, enforcing required
  /// variables and declared types.
  fn resolve_variables(
    &self,
    recipe: &Recipe,
    options: &RunOptions,
  ) -> Result<HashMap<String, serde_json::Value>, EngineError> {
    let mut resolved = HashMap::new();

    for (name, spec) in &recipe.variables {
      match options.variables.get(name) {
        Some(value) => {
          if !spec.accepts(value) {
            return Err(EngineError::VariableType { name: name.clone() });
          }
          resolved.insert(name.clone(), value.clone());
        }
        None => match &spec.default {
          Some(default) => {
            resolved.insert(name.clone(), default.clone());
          }
          None if spec.required => {
            return Err(EngineError::MissingVariable { name: name.clone() });
          }
          None => {}
        },
      }
    }

    // Undeclared run variables pass through untyped.
    for (name, value) in &options.variables {
      resolved
        .entry(name.clone())
        .or_insert_with(|| value.clone());
    }

    Ok(resolved)
  }

  fn build_context(
    &self,
    recipe: &Recipe,
    options: &RunOptions,
    phase: Phase,
  ) -> Result<StepContext, EngineError> {
    let variables = self.resolve_variables(recipe, options)?;
    let project_root = options
      .working_dir
      .clone()
      .unwrap_or_else(|| PathBuf::from("."));

    Ok(
      StepContext::new(project_root, self.template_engine.clone())
        .with_phase(phase)
        .with_dry_run(options.dry_run)
        .with_force(options.force)
        .with_answers(options.answers.clone())
        .with_variables(variables),
    )
  }

  fn fold_report(
    &self,
    recipe: &Recipe,
    options: &RunOptions,
    outcome: saffron_executor::ExecutionOutcome,
    duration_ms: u64,
  ) -> RunReport {
    let mut report = RunReport {
      success: outcome.success(),
      recipe: recipe.name.clone(),
      duration_ms,
      files_created: Vec::new(),
      files_modified: Vec::new(),
      files_deleted: Vec::new(),
      warnings: Vec::new(),
      errors: Vec::new(),
      metadata: RunMetadata {
        total_steps: outcome.results.len(),
        completed_steps: outcome.completed_count(),
        failed_steps: outcome.failed_count(),
        skipped_steps: outcome.skipped_count(),
      },
      results: Vec::new(),
    };

    for result in &outcome.results {
      extend_dedup(&mut report.files_created, &result.files_created);
      extend_dedup(&mut report.files_modified, &result.files_modified);
      extend_dedup(&mut report.files_deleted, &result.files_deleted);
      for warning in &result.warnings {
        if options.skip_prompts && warning.starts_with("no answer available") {
          continue;
        }
        report.warnings.push(format!("{}: {}", result.name, warning));
      }
      if let Some(error) = &result.error {
        report.errors.push(ReportError {
          step: Some(result.name.clone()),
          code: error.code.clone(),
          message: error.message.clone(),
        });
      }
    }

    report.results = outcome.results;
    report
  }

  fn notify(&self, options: &RunOptions, event: ExecutionEvent) {
    if let Some(notifier) = &options.notifier {
      notifier.notify(event);
    }
  }
}

impl Default for RecipeEngine {
  fn default() -> Self {
    Self::new()
  }
}

/// All steps in the recipe, including nested parallel children, minus the
/// structural `parallel` wrappers themselves (they have no tool).
fn flatten_steps(steps: &[Step]) -> Vec<&Step> {
  let mut out = Vec::new();
  let mut stack: Vec<&Step> = steps.iter().rev().collect();
  while let Some(step) = stack.pop() {
    match &step.kind {
      StepKind::Parallel(parallel) => {
        stack.extend(parallel.steps.iter().rev());
      }
      _ => out.push(step),
    }
  }
  out
}

fn extend_dedup(into: &mut Vec<PathBuf>, from: &[PathBuf]) {
  for path in from {
    if !into.contains(path) {
      into.push(path.clone());
    }
  }
}
