use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use saffron_executor::ExecutionNotifier;

/// Options for one engine run.
#[derive(Clone)]
pub struct RunOptions {
  /// Run-level variable values, layered over recipe defaults.
  pub variables: HashMap<String, serde_json::Value>,

  /// Project root the run operates on. Defaults to the current directory.
  pub working_dir: Option<PathBuf>,

  /// Plan everything, write nothing. File lists in the report match a
  /// real run.
  pub dry_run: bool,

  /// Permit overwriting existing non-injected targets.
  pub force: bool,

  /// Run-level failure policy; steps may override it.
  pub continue_on_error: bool,

  /// The engine never prompts itself; this also suppresses the
  /// missing-answer warnings a prompting layer would have resolved.
  pub skip_prompts: bool,

  /// Concurrency bound for the top-level step list.
  pub max_concurrency: usize,

  /// Externally pre-computed answers for template `answer(...)` calls,
  /// usually gathered through [`crate::RecipeEngine::collect`].
  pub answers: HashMap<String, serde_json::Value>,

  /// Receives progress and step-completion events.
  pub notifier: Option<Arc<dyn ExecutionNotifier>>,
}

impl Default for RunOptions {
  fn default() -> Self {
    Self {
      variables: HashMap::new(),
      working_dir: None,
      dry_run: false,
      force: false,
      continue_on_error: false,
      skip_prompts: false,
      max_concurrency: 4,
      answers: HashMap::new(),
      notifier: None,
    }
  }
}
