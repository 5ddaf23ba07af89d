//! Saffron Engine
//!
//! The orchestrator the CLI layer talks to: load a recipe from a path or
//! inline content, validate it, build the shared execution context, hand
//! the step list to the executor, and fold the step results into one run
//! report.
//!
//! ```text
//! RecipeEngine
//! ├── execute(source, options) -> RunReport
//! ├── validate(source)         -> ValidationReport
//! └── collect(source, options) -> CollectReport (answer keys templates ask for)
//!                │
//!                ▼
//! StepExecutor ── graph scheduling, concurrency, failure semantics
//!                │
//!                ▼
//! ToolRegistry ── shell / install / patch / template strategies
//! ```

mod engine;
mod error;
mod options;
mod report;
mod source;

pub use engine::{EngineConfig, RecipeEngine};
pub use error::EngineError;
pub use options::RunOptions;
pub use report::{CollectReport, ReportError, RunMetadata, RunReport};
pub use source::RecipeSource;

// Re-exported so CLI consumers need only this crate.
pub use saffron_executor::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use saffron_recipe::{Recipe, ValidationIssue, ValidationReport};
