//! Step executor implementation.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use saffron_recipe::{ParallelStep, Step, StepGraph, StepKind};
use saffron_registry::ToolRegistry;
use saffron_tool::{StepContext, StepError, StepResult, StepStatus};

use crate::error::ExecutionError;
use crate::events::{ExecutionEvent, ExecutionNotifier};

/// Configuration for one executor invocation.
#[derive(Clone)]
pub struct ExecutorConfig {
  /// Upper bound on concurrently running steps for this invocation.
  /// Nested `parallel` invocations carry their own bound.
  pub max_concurrency: usize,
  /// Run-level failure policy; individual steps may override it.
  pub continue_on_error: bool,
  pub notifier: Option<Arc<dyn ExecutionNotifier>>,
}

impl Default for ExecutorConfig {
  fn default() -> Self {
    Self {
      max_concurrency: 4,
      continue_on_error: false,
      notifier: None,
    }
  }
}

/// Outcome of one executor invocation.
///
/// Results are reported in declaration order regardless of the order steps
/// actually finished in.
#[derive(Debug)]
pub struct ExecutionOutcome {
  pub results: Vec<StepResult>,
}

impl ExecutionOutcome {
  pub fn completed_count(&self) -> usize {
    self.results.iter().filter(|r| r.is_completed()).count()
  }

  pub fn failed_count(&self) -> usize {
    self.results.iter().filter(|r| r.is_failed()).count()
  }

  pub fn skipped_count(&self) -> usize {
    self.results.iter().filter(|r| r.is_skipped()).count()
  }

  pub fn success(&self) -> bool {
    self.failed_count() == 0
  }
}

/// The step executor.
///
/// Cheap to clone; the clone shares the registry. Cloning is how nested
/// `parallel` invocations and spawned step tasks get their own handle.
#[derive(Clone)]
pub struct StepExecutor {
  registry: Arc<ToolRegistry>,
}

impl StepExecutor {
  pub fn new(registry: Arc<ToolRegistry>) -> Self {
    Self { registry }
  }

  /// Execute a step list to completion.
  pub async fn execute(
    &self,
    steps: &[Step],
    ctx: &StepContext,
    config: &ExecutorConfig,
  ) -> Result<ExecutionOutcome, ExecutionError> {
    self
      .execute_boxed(steps.to_vec(), ctx.clone(), config.clone())
      .await
  }

  /// Type-erased entry point so `parallel` steps can re-enter the
  /// executor from inside a spawned step task.
  fn execute_boxed(
    &self,
    steps: Vec<Step>,
    ctx: StepContext,
    config: ExecutorConfig,
  ) -> Pin<Box<dyn Future<Output = Result<ExecutionOutcome, ExecutionError>> + Send>> {
    let executor = self.clone();
    Box::pin(async move { executor.run(steps, ctx, config).await })
  }

  async fn run(
    &self,
    steps: Vec<Step>,
    ctx: StepContext,
    config: ExecutorConfig,
  ) -> Result<ExecutionOutcome, ExecutionError> {
    let graph = StepGraph::build(&steps)?;
    let order: Vec<String> = graph.order().to_vec();
    let by_name: HashMap<String, Step> =
      steps.into_iter().map(|s| (s.name.clone(), s)).collect();

    let mut terminal: HashMap<String, StepStatus> = HashMap::new();
    let mut results: HashMap<String, StepResult> = HashMap::new();
    let mut running: HashSet<String> = HashSet::new();
    let mut tasks: JoinSet<(String, StepResult)> = JoinSet::new();

    loop {
      // Launch phase: scan in declaration order so simultaneously-ready
      // steps start deterministically. Repeat until a full scan neither
      // launches nor resolves anything, since one resolution can unblock
      // the next.
      loop {
        let mut progressed = false;
        for name in &order {
          if terminal.contains_key(name) || running.contains(name) {
            continue;
          }
          let step = &by_name[name];

          match self.readiness(step, &by_name, &terminal, &config) {
            Readiness::Waiting => continue,
            Readiness::Blocked { reason } => {
              self.finish_step(
                StepResult::skipped(name, reason),
                &ctx,
                &config,
                &mut terminal,
                &mut results,
              );
              progressed = true;
              continue;
            }
            Readiness::Ready => {}
          }

          // Condition gate, against the scope as it stands right now.
          if let Some(condition) = &step.condition {
            let step_ctx = ctx.for_step(step);
            match ctx.engine().eval_bool(condition, &step_ctx.template_ctx()) {
              Ok(true) => {}
              Ok(false) => {
                debug!(step = %name, "condition evaluated to false");
                self.finish_step(
                  StepResult::skipped(name, "condition evaluated to false"),
                  &ctx,
                  &config,
                  &mut terminal,
                  &mut results,
                );
                progressed = true;
                continue;
              }
              Err(e) => {
                let result = StepResult::failed(
                  name,
                  StepError {
                    code: "condition_eval".to_string(),
                    message: format!("condition failed to evaluate: {}", e),
                    cause: None,
                  },
                );
                self.finish_step(result, &ctx, &config, &mut terminal, &mut results);
                self.cascade_failure(name, step, &graph, &order, &running, &ctx, &config, &mut terminal, &mut results);
                progressed = true;
                continue;
              }
            }
          }

          if running.len() >= config.max_concurrency {
            continue;
          }

          running.insert(name.clone());
          self.notify(&config, ExecutionEvent::StepStarted { step: name.clone() });
          info!(step = %name, tool = %step.kind.tool(), "step started");
          self.spawn_step(step.clone(), &ctx, &config, &mut tasks);
          progressed = true;
        }
        if !progressed {
          break;
        }
      }

      if tasks.is_empty() {
        break;
      }

      // Wait for any running step; its completion re-evaluates readiness.
      let (name, result) = match tasks.join_next().await {
        Some(Ok(output)) => output,
        Some(Err(e)) => {
          return Err(ExecutionError::Join {
            message: e.to_string(),
          });
        }
        None => break,
      };
      running.remove(&name);

      let failed = result.is_failed();
      match result.status {
        StepStatus::Failed => {
          warn!(step = %name, error = ?result.error, "step failed");
        }
        _ => info!(step = %name, status = ?result.status, "step finished"),
      }
      self.finish_step(result, &ctx, &config, &mut terminal, &mut results);

      if failed {
        let step = &by_name[&name];
        self.cascade_failure(&name, step, &graph, &order, &running, &ctx, &config, &mut terminal, &mut results);
      }
    }

    // The graph is acyclic and every terminal state propagates, so by here
    // every step should have resolved; sweep defensively anyway.
    for name in &order {
      if !terminal.contains_key(name) {
        warn!(step = %name, "step never became ready");
        self.finish_step(
          StepResult::skipped(name, "dependencies never completed"),
          &ctx,
          &config,
          &mut terminal,
          &mut results,
        );
      }
    }

    let ordered = order
      .iter()
      .filter_map(|name| results.remove(name))
      .collect();
    Ok(ExecutionOutcome { results: ordered })
  }

  /// Decide whether a step may launch given the terminal states so far.
  fn readiness(
    &self,
    step: &Step,
    by_name: &HashMap<String, Step>,
    terminal: &HashMap<String, StepStatus>,
    config: &ExecutorConfig,
  ) -> Readiness {
    for dep in &step.depends_on {
      match terminal.get(dep.step()) {
        None => return Readiness::Waiting,
        Some(StepStatus::Completed) => {}
        Some(StepStatus::Skipped) => {
          // A skipped predecessor satisfies dependents unless the
          // dependency explicitly demands completion.
          if dep.requires_completed() {
            return Readiness::Blocked {
              reason: format!("dependency '{}' was skipped", dep.step()),
            };
          }
        }
        Some(StepStatus::Failed) => {
          let dep_step = &by_name[dep.step()];
          if !dep_step.continues_on_error(config.continue_on_error) {
            return Readiness::Blocked {
              reason: "upstream failure".to_string(),
            };
          }
        }
      }
    }
    Readiness::Ready
  }

  /// Record a terminal result and emit the completion event.
  fn finish_step(
    &self,
    result: StepResult,
    ctx: &StepContext,
    config: &ExecutorConfig,
    terminal: &mut HashMap<String, StepStatus>,
    results: &mut HashMap<String, StepResult>,
  ) {
    terminal.insert(result.name.clone(), result.status);
    ctx.record_result(result.clone());
    self.notify(
      config,
      ExecutionEvent::StepCompleted {
        result: result.clone(),
      },
    );
    results.insert(result.name.clone(), result);
  }

  /// Mark every not-yet-started strict descendant of a failed step as
  /// skipped. Steps already running always finish; only unstarted work is
  /// abandoned.
  #[allow(clippy::too_many_arguments)]
  fn cascade_failure(
    &self,
    failed: &str,
    failed_step: &Step,
    graph: &StepGraph,
    order: &[String],
    running: &HashSet<String>,
    ctx: &StepContext,
    config: &ExecutorConfig,
    terminal: &mut HashMap<String, StepStatus>,
    results: &mut HashMap<String, StepResult>,
  ) {
    if failed_step.continues_on_error(config.continue_on_error) {
      return;
    }
    let descendants = graph.descendants(failed);
    for name in order {
      if descendants.contains(name) && !terminal.contains_key(name) && !running.contains(name) {
        debug!(step = %name, upstream = %failed, "skipping descendant of failed step");
        self.finish_step(
          StepResult::skipped(name, "upstream failure"),
          ctx,
          config,
          terminal,
          results,
        );
      }
    }
  }

  /// Spawn the task that runs one step to a terminal result. The task
  /// never returns an error: tool failures become failed step results.
  fn spawn_step(
    &self,
    step: Step,
    ctx: &StepContext,
    config: &ExecutorConfig,
    tasks: &mut JoinSet<(String, StepResult)>,
  ) {
    let executor = self.clone();
    let ctx = ctx.clone();
    let config = config.clone();

    tasks.spawn(async move {
      let name = step.name.clone();
      let started_at = Utc::now();
      let timer = Instant::now();

      let mut result = match &step.kind {
        StepKind::Parallel(parallel) => {
          executor.run_parallel(&step, parallel, &ctx, &config).await
        }
        _ => executor.run_tool(&step, &ctx).await,
      };

      result.started_at = started_at;
      result.finished_at = Utc::now();
      result.duration_ms = timer.elapsed().as_millis() as u64;
      (name, result)
    });
  }

  /// Resolve the step's tool and execute it, retrying as long as the tool
  /// reports the failure retryable and the step's retry budget allows.
  async fn run_tool(&self, step: &Step, ctx: &StepContext) -> StepResult {
    let step_ctx = ctx.for_step(step);
    let kind = step.kind.tool();
    let mut retries = 0u32;

    let mut result = loop {
      let handle = match self.registry.resolve(kind).await {
        Ok(handle) => handle,
        Err(e) => {
          break StepResult::failed(
            &step.name,
            StepError {
              code: e.code().to_string(),
              message: e.to_string(),
              cause: None,
            },
          );
        }
      };

      let attempt = handle.execute(step, &step_ctx).await;
      handle.dispose().await;

      match attempt {
        Ok(result) => break result,
        Err(e) if e.is_retryable() && retries < step.max_retries => {
          retries += 1;
          warn!(step = %step.name, attempt = retries, error = %e, "retrying step");
        }
        Err(e) => break StepResult::failed(&step.name, StepError::from(&e)),
      }
    };

    result.retries = retries;
    result
  }

  /// Re-enter the executor on a nested step list and fold the children
  /// into a single result for the parent step.
  async fn run_parallel(
    &self,
    step: &Step,
    parallel: &ParallelStep,
    ctx: &StepContext,
    config: &ExecutorConfig,
  ) -> StepResult {
    let child_config = ExecutorConfig {
      max_concurrency: parallel.max_concurrency.unwrap_or(config.max_concurrency),
      continue_on_error: config.continue_on_error,
      notifier: config.notifier.clone(),
    };

    let outcome = self
      .execute_boxed(parallel.steps.clone(), ctx.clone(), child_config)
      .await;

    match outcome {
      Ok(outcome) => {
        let failed = outcome.failed_count();
        let mut result = if failed > 0 {
          StepResult::failed(
            &step.name,
            StepError {
              code: "parallel_failed".to_string(),
              message: format!("{} nested step(s) failed", failed),
              cause: None,
            },
          )
        } else {
          StepResult::completed(&step.name)
        };
        for child in &outcome.results {
          result.absorb_files(child);
        }
        result.output = json!({
          "total": outcome.results.len(),
          "completed": outcome.completed_count(),
          "failed": failed,
          "skipped": outcome.skipped_count(),
          "steps": outcome
            .results
            .iter()
            .map(|r| json!({ "name": r.name.clone(), "status": r.status }))
            .collect::<Vec<_>>(),
        });
        result
      }
      Err(e) => StepResult::failed(
        &step.name,
        StepError {
          code: e.code().to_string(),
          message: e.to_string(),
          cause: None,
        },
      ),
    }
  }

  fn notify(&self, config: &ExecutorConfig, event: ExecutionEvent) {
    if let Some(notifier) = &config.notifier {
      notifier.notify(event);
    }
  }
}

enum Readiness {
  /// Some predecessor is still pending or running.
  Waiting,
  /// A predecessor finished in a state this step cannot accept.
  Blocked { reason: String },
  Ready,
}
