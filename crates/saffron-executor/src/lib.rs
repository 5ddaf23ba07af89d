//! Saffron Executor
//!
//! Runs a recipe's step list against its dependency graph: ready steps
//! launch concurrently up to a configured limit, every completion
//! re-evaluates readiness, and simultaneously-ready steps always launch in
//! declaration order. Conditions are evaluated immediately before launch;
//! failures skip not-yet-started descendants unless `continue_on_error`
//! applies. Running steps are never interrupted.
//!
//! `parallel` steps re-enter the executor on their nested list with an
//! independent concurrency bound.

mod error;
mod events;
mod executor;

pub use error::ExecutionError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::{ExecutionOutcome, ExecutorConfig, StepExecutor};
