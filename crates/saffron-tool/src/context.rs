use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::{Map, Value, json};
use tracing::warn;

use saffron_recipe::Step;

use crate::engine::TemplateEngine;
use crate::result::StepResult;

/// Which of the two generation passes is running.
///
/// `Collect` renders everything but never touches the filesystem; its only
/// purpose is triggering the `answer(...)` helpers inside templates so an
/// external phase can pre-compute their content. `Render` performs the real
/// writes with those answers in scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
  Collect,
  #[default]
  Render,
}

impl Phase {
  pub fn is_collect(&self) -> bool {
    matches!(self, Phase::Collect)
  }
}

/// State shared by every step of one run.
#[derive(Default)]
struct Shared {
  /// Merged recipe defaults and run-level overrides. Recipe-level values
  /// lose to run-level ones; step locals layer on top per step.
  variables: RwLock<HashMap<String, Value>>,
  /// Values templates published via `provide`, namespaced by the
  /// publishing step so concurrent writers can never race on a key.
  provided: RwLock<HashMap<String, Map<String, Value>>>,
  /// Step results, written exactly once per step.
  results: RwLock<HashMap<String, StepResult>>,
  /// Answer keys templates requested during the collect pass.
  answer_requests: Mutex<Vec<String>>,
}

/// The context a step executes against.
///
/// Cloning is cheap: run-wide state sits behind `Arc`, while the step name
/// and step-local variables are per-clone. The executor derives a child
/// context per step with [`StepContext::for_step`].
#[derive(Clone)]
pub struct StepContext {
  project_root: PathBuf,
  phase: Phase,
  dry_run: bool,
  force: bool,
  answers: Arc<HashMap<String, Value>>,
  engine: Arc<dyn TemplateEngine>,
  step_name: Option<String>,
  locals: HashMap<String, Value>,
  shared: Arc<Shared>,
}

impl StepContext {
  pub fn new(project_root: impl Into<PathBuf>, engine: Arc<dyn TemplateEngine>) -> Self {
    Self {
      project_root: project_root.into(),
      phase: Phase::Render,
      dry_run: false,
      force: false,
      answers: Arc::new(HashMap::new()),
      engine,
      step_name: None,
      locals: HashMap::new(),
      shared: Arc::new(Shared::default()),
    }
  }

  pub fn with_phase(mut self, phase: Phase) -> Self {
    self.phase = phase;
    self
  }

  pub fn with_dry_run(mut self, dry_run: bool) -> Self {
    self.dry_run = dry_run;
    self
  }

  pub fn with_force(mut self, force: bool) -> Self {
    self.force = force;
    self
  }

  pub fn with_answers(mut self, answers: HashMap<String, Value>) -> Self {
    self.answers = Arc::new(answers);
    self
  }

  pub fn with_variables(self, variables: HashMap<String, Value>) -> Self {
    *self.shared.variables.write().unwrap_or_else(|e| e.into_inner()) = variables;
    self
  }

  /// Derive the context a single step runs with: the step's name attached
  /// (for `provide` namespacing) and its local variables layered on top.
  pub fn for_step(&self, step: &Step) -> StepContext {
    let mut child = self.clone();
    child.step_name = Some(step.name.clone());
    child.locals = step.variables.clone();
    child
  }

  pub fn project_root(&self) -> &Path {
    &self.project_root
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn dry_run(&self) -> bool {
    self.dry_run
  }

  pub fn force(&self) -> bool {
    self.force
  }

  pub fn engine(&self) -> &Arc<dyn TemplateEngine> {
    &self.engine
  }

  pub fn step_name(&self) -> Option<&str> {
    self.step_name.as_deref()
  }

  /// Whether this pass may write to disk.
  pub fn writes_enabled(&self) -> bool {
    !self.dry_run && !self.phase.is_collect()
  }

  /// Snapshot of the effective variable scope for this step:
  /// recipe/run variables with step locals layered on top.
  pub fn variables(&self) -> HashMap<String, Value> {
    let mut merged = self
      .shared
      .variables
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .clone();
    for (k, v) in &self.locals {
      merged.insert(k.clone(), v.clone());
    }
    merged
  }

  /// Set a run-level variable, visible to every later reader.
  pub fn set_variable(&self, key: impl Into<String>, value: Value) {
    self
      .shared
      .variables
      .write()
      .unwrap_or_else(|e| e.into_inner())
      .insert(key.into(), value);
  }

  /// Publish a value for downstream steps, under this step's namespace.
  /// Readers reach it as `steps.<name>.provided.<key>`.
  pub fn provide(&self, key: impl Into<String>, value: Value) {
    let Some(step) = self.step_name.as_deref() else {
      warn!("provide called outside a step context, value dropped");
      return;
    };
    self
      .shared
      .provided
      .write()
      .unwrap_or_else(|e| e.into_inner())
      .entry(step.to_string())
      .or_default()
      .insert(key.into(), value);
  }

  /// Record a step result. Results are append-once: a second write for the
  /// same step is dropped and reported false.
  pub fn record_result(&self, result: StepResult) -> bool {
    let mut results = self
      .shared
      .results
      .write()
      .unwrap_or_else(|e| e.into_inner());
    if results.contains_key(&result.name) {
      warn!(step = %result.name, "duplicate step result dropped");
      return false;
    }
    results.insert(result.name.clone(), result);
    true
  }

  pub fn result(&self, name: &str) -> Option<StepResult> {
    self
      .shared
      .results
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .get(name)
      .cloned()
  }

  /// Look up an externally-supplied answer.
  pub fn answer(&self, key: &str) -> Option<Value> {
    self.answers.get(key).cloned()
  }

  /// Record that a template asked for an answer key (collect pass).
  pub fn request_answer(&self, key: impl Into<String>) {
    self
      .shared
      .answer_requests
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(key.into());
  }

  /// Drain the recorded answer requests, deduplicated in request order.
  pub fn drain_answer_requests(&self) -> Vec<String> {
    let mut requests = self
      .shared
      .answer_requests
      .lock()
      .unwrap_or_else(|e| e.into_inner());
    let mut seen = std::collections::HashSet::new();
    requests
      .drain(..)
      .filter(|k| seen.insert(k.clone()))
      .collect()
  }

  /// The JSON context templates and conditions render against: variables
  /// at the top level, plus `steps` (status, output, provided values and
  /// file changes per finished step), `answers` and `project_root`.
  pub fn template_ctx(&self) -> Value {
    let mut root = Map::new();
    for (k, v) in self.variables() {
      root.insert(k, v);
    }

    let provided = self
      .shared
      .provided
      .read()
      .unwrap_or_else(|e| e.into_inner());
    let results = self
      .shared
      .results
      .read()
      .unwrap_or_else(|e| e.into_inner());

    let mut steps = Map::new();
    for (name, result) in results.iter() {
      steps.insert(
        name.clone(),
        json!({
          "status": result.status,
          "output": result.output.clone(),
          "provided": provided.get(name).cloned().unwrap_or_default(),
          "files_created": result.files_created.clone(),
          "files_modified": result.files_modified.clone(),
        }),
      );
    }
    // Steps that provided values but have not finished yet (e.g. the
    // current one mid-render) still expose their namespace.
    for (name, values) in provided.iter() {
      if !steps.contains_key(name) {
        steps.insert(name.clone(), json!({ "provided": values.clone() }));
      }
    }

    root.insert("steps".to_string(), Value::Object(steps));
    root.insert(
      "answers".to_string(),
      json!(self.answers.as_ref()),
    );
    root.insert(
      "project_root".to_string(),
      json!(self.project_root.display().to_string()),
    );
    Value::Object(root)
  }
}
