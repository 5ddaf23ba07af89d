//! Execution events and notifiers for observability.
//!
//! Events are emitted as steps start and finish so consumers can observe
//! progress, stream to a UI, or persist state without the executor caring
//! which.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use saffron_tool::StepResult;

/// Events emitted during a recipe run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// The run has started.
  RunStarted { recipe: String, total_steps: usize },

  /// A step has been launched.
  StepStarted { step: String },

  /// A step reached a terminal status (completed, failed or skipped).
  StepCompleted { result: StepResult },

  /// The run has finished.
  RunCompleted { recipe: String, success: bool },
}

/// Trait for receiving execution events.
///
/// The executor calls `notify` for each event — implementations decide
/// what to do with them (log, broadcast, persist, ignore).
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {
    // Intentionally empty
  }
}

/// A notifier that sends events to an unbounded channel.
///
/// Unbounded so a slow consumer never blocks the executor; volume is one
/// event per step boundary, so growth stays small in practice.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Ignore send errors - receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
