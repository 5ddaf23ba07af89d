//! Saffron Registry
//!
//! Maps (tool kind, name) to a factory and hands out tool instances.
//! With instance reuse enabled, instances live in a bounded cache so
//! expensive per-tool state (a template content cache, for example)
//! amortizes across a long-lived process: least-recently-used idle entries
//! are evicted when the cache is full, an idle-timeout sweep reclaims
//! stale ones, and eviction always runs the tool's `cleanup`.
//!
//! The registry is passed through the execution context rather than held
//! in a global, so tests and embedders can build isolated registries.

mod cache;
mod error;
mod registry;

pub use error::RegistryError;
pub use registry::{
  RegistryConfig, ToolFactory, ToolHandle, ToolKey, ToolRegistration, ToolRegistry,
};
