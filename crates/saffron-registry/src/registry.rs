use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::warn;

use saffron_recipe::ToolKind;
use saffron_tool::Tool;

use crate::cache::{CacheEntry, InstanceCache};
use crate::error::RegistryError;

/// Cache and registration key: tool kind plus instance name.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ToolKey {
  pub kind: ToolKind,
  pub name: String,
}

impl ToolKey {
  pub fn new(kind: ToolKind, name: impl Into<String>) -> Self {
    Self {
      kind,
      name: name.into(),
    }
  }
}

impl std::fmt::Display for ToolKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}/{}", self.kind, self.name)
  }
}

/// Constructor for tool instances.
pub type ToolFactory = Arc<dyn Fn() -> Arc<dyn Tool> + Send + Sync>;

/// A registered tool: its key, its factory, and descriptive metadata.
#[derive(Clone)]
pub struct ToolRegistration {
  pub kind: ToolKind,
  pub name: String,
  pub category: Option<String>,
  pub tags: Vec<String>,
  pub enabled: bool,
  factory: ToolFactory,
}

impl ToolRegistration {
  pub fn new<F>(kind: ToolKind, name: impl Into<String>, factory: F) -> Self
  where
    F: Fn() -> Arc<dyn Tool> + Send + Sync + 'static,
  {
    Self {
      kind,
      name: name.into(),
      category: None,
      tags: Vec::new(),
      enabled: true,
      factory: Arc::new(factory),
    }
  }

  pub fn with_category(mut self, category: impl Into<String>) -> Self {
    self.category = Some(category.into());
    self
  }

  pub fn with_tags(mut self, tags: Vec<String>) -> Self {
    self.tags = tags;
    self
  }

  pub fn disabled(mut self) -> Self {
    self.enabled = false;
    self
  }

  fn key(&self) -> ToolKey {
    ToolKey::new(self.kind, self.name.clone())
  }
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
  /// Reuse instances through the cache instead of constructing one per
  /// resolution.
  pub reuse_instances: bool,
  /// Cache capacity before LRU eviction kicks in.
  pub max_cached: usize,
  /// Idle time after which a sweep reclaims an instance.
  pub idle_timeout: Duration,
}

impl Default for RegistryConfig {
  fn default() -> Self {
    Self {
      reuse_instances: true,
      max_cached: 16,
      idle_timeout: Duration::from_secs(300),
    }
  }
}

/// The tool registry.
///
/// All operations are safe under concurrent sibling-step calls: the
/// registration table sits behind an `RwLock` and the instance cache does
/// its own locking.
pub struct ToolRegistry {
  registrations: RwLock<HashMap<ToolKey, ToolRegistration>>,
  cache: InstanceCache,
  reuse_instances: bool,
}

impl ToolRegistry {
  pub fn new(config: RegistryConfig) -> Self {
    Self {
      registrations: RwLock::new(HashMap::new()),
      cache: InstanceCache::new(config.max_cached, config.idle_timeout),
      reuse_instances: config.reuse_instances,
    }
  }

  /// Register a tool. A second registration for the same key replaces the
  /// first; cached instances of the old registration age out via the
  /// normal eviction paths.
  pub fn register(&self, registration: ToolRegistration) {
    self
      .registrations
      .write()
      .unwrap_or_else(|e| e.into_inner())
      .insert(registration.key(), registration);
  }

  /// Remove every registration for a tool kind and purge its cached
  /// instances.
  pub async fn unregister(&self, kind: ToolKind) {
    {
      let mut registrations = self
        .registrations
        .write()
        .unwrap_or_else(|e| e.into_inner());
      registrations.retain(|k, _| k.kind != kind);
    }
    self.cache.purge_kind(kind).await;
  }

  /// Resolve the default instance for a tool kind (name == kind).
  pub async fn resolve(&self, kind: ToolKind) -> Result<ToolHandle, RegistryError> {
    self.resolve_named(kind, kind.as_str()).await
  }

  /// Resolve a named tool instance, from the cache when reuse is enabled.
  pub async fn resolve_named(
    &self,
    kind: ToolKind,
    name: &str,
  ) -> Result<ToolHandle, RegistryError> {
    let key = ToolKey::new(kind, name);
    let registration = {
      let registrations = self
        .registrations
        .read()
        .unwrap_or_else(|e| e.into_inner());
      registrations
        .get(&key)
        .cloned()
        .ok_or_else(|| RegistryError::NotRegistered {
          kind,
          name: name.to_string(),
        })?
    };
    if !registration.enabled {
      return Err(RegistryError::Disabled {
        kind,
        name: name.to_string(),
      });
    }

    if !self.reuse_instances {
      let instance = (registration.factory)();
      instance
        .initialize()
        .await
        .map_err(|source| RegistryError::Initialize {
          kind,
          name: name.to_string(),
          source,
        })?;
      return Ok(ToolHandle {
        instance,
        entry: None,
      });
    }

    let entry = match self.cache.get(&key).await {
      Some(entry) => entry,
      None => {
        let candidate = CacheEntry::new((registration.factory)());
        self.cache.insert(key.clone(), candidate).await
      }
    };
    entry
      .ensure_initialized()
      .await
      .map_err(|source| RegistryError::Initialize {
        kind,
        name: name.to_string(),
        source,
      })?;
    entry.acquire();
    Ok(ToolHandle {
      instance: entry.instance().clone(),
      entry: Some(entry),
    })
  }

  /// Evict cached instances idle longer than the configured timeout.
  /// Intended to be called periodically by the embedding process.
  pub async fn sweep_idle(&self) {
    self.cache.sweep_idle().await;
  }

  /// Clean up every cached instance. Call once at the end of a run or
  /// process.
  pub async fn shutdown(&self) {
    self.cache.clear().await;
  }
}

/// A resolved tool instance.
///
/// Cached instances are marked in-use for the lifetime of the handle so
/// eviction never takes an instance out from under a running step. Call
/// [`ToolHandle::dispose`] when done: it releases the in-use mark, or runs
/// `cleanup` directly for uncached instances.
pub struct ToolHandle {
  instance: Arc<dyn Tool>,
  entry: Option<Arc<CacheEntry>>,
}

impl std::fmt::Debug for ToolHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ToolHandle")
      .field("cached", &self.entry.is_some())
      .finish_non_exhaustive()
  }
}

impl ToolHandle {
  pub fn tool(&self) -> &Arc<dyn Tool> {
    &self.instance
  }

  /// Release the instance. Preferred over plain drop for uncached
  /// instances, whose `cleanup` can only run here.
  pub async fn dispose(mut self) {
    if let Some(entry) = self.entry.take() {
      entry.release();
    } else if let Err(e) = self.instance.cleanup().await {
      warn!(error = %e, "tool cleanup failed on dispose");
    }
  }
}

impl std::ops::Deref for ToolHandle {
  type Target = dyn Tool;

  fn deref(&self) -> &Self::Target {
    self.instance.as_ref()
  }
}

impl Drop for ToolHandle {
  fn drop(&mut self) {
    if let Some(entry) = self.entry.take() {
      entry.release();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use std::sync::atomic::{AtomicUsize, Ordering};

  use async_trait::async_trait;
  use saffron_recipe::Step;
  use saffron_tool::{StepContext, StepResult, ToolError, ToolValidation};

  #[derive(Default)]
  struct Probe {
    initialized: AtomicUsize,
    cleaned: AtomicUsize,
  }

  struct ProbeTool {
    probe: Arc<Probe>,
  }

  #[async_trait]
  impl Tool for ProbeTool {
    async fn initialize(&self) -> Result<(), ToolError> {
      self.probe.initialized.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }

    async fn validate(
      &self,
      _step: &Step,
      _ctx: &StepContext,
    ) -> Result<ToolValidation, ToolError> {
      Ok(ToolValidation::ok())
    }

    async fn execute(&self, step: &Step, _ctx: &StepContext) -> Result<StepResult, ToolError> {
      Ok(StepResult::completed(&step.name))
    }

    async fn cleanup(&self) -> Result<(), ToolError> {
      self.probe.cleaned.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }
  }

  fn register_probe(registry: &ToolRegistry, kind: ToolKind) -> Arc<Probe> {
    let probe = Arc::new(Probe::default());
    let factory_probe = probe.clone();
    registry.register(ToolRegistration::new(kind, kind.as_str(), move || {
      Arc::new(ProbeTool {
        probe: factory_probe.clone(),
      })
    }));
    probe
  }

  #[tokio::test]
  async fn test_resolve_unregistered_fails() {
    let registry = ToolRegistry::new(RegistryConfig::default());
    let err = registry.resolve(ToolKind::Shell).await.unwrap_err();
    assert_eq!(err.code(), "tool_not_registered");
  }

  #[tokio::test]
  async fn test_resolve_disabled_fails() {
    let registry = ToolRegistry::new(RegistryConfig::default());
    registry.register(
      ToolRegistration::new(ToolKind::Shell, "shell", || {
        Arc::new(ProbeTool {
          probe: Arc::new(Probe::default()),
        })
      })
      .disabled(),
    );
    let err = registry.resolve(ToolKind::Shell).await.unwrap_err();
    assert_eq!(err.code(), "tool_disabled");
  }

  #[tokio::test]
  async fn test_reuse_returns_same_instance_and_initializes_once() {
    let registry = ToolRegistry::new(RegistryConfig::default());
    let probe = register_probe(&registry, ToolKind::Shell);

    let a = registry.resolve(ToolKind::Shell).await.unwrap();
    let b = registry.resolve(ToolKind::Shell).await.unwrap();
    assert!(Arc::ptr_eq(a.tool(), b.tool()));
    assert_eq!(probe.initialized.load(Ordering::SeqCst), 1);

    a.dispose().await;
    b.dispose().await;
  }

  #[tokio::test]
  async fn test_fresh_instances_without_reuse() {
    let registry = ToolRegistry::new(RegistryConfig {
      reuse_instances: false,
      ..Default::default()
    });
    let probe = register_probe(&registry, ToolKind::Shell);

    let a = registry.resolve(ToolKind::Shell).await.unwrap();
    let b = registry.resolve(ToolKind::Shell).await.unwrap();
    assert!(!Arc::ptr_eq(a.tool(), b.tool()));
    assert_eq!(probe.initialized.load(Ordering::SeqCst), 2);

    // dispose cleans uncached instances directly
    a.dispose().await;
    b.dispose().await;
    assert_eq!(probe.cleaned.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_lru_eviction_cleans_idle_instance() {
    let registry = ToolRegistry::new(RegistryConfig {
      max_cached: 1,
      ..Default::default()
    });
    let shell_probe = register_probe(&registry, ToolKind::Shell);
    let patch_probe = register_probe(&registry, ToolKind::Patch);

    let shell = registry.resolve(ToolKind::Shell).await.unwrap();
    shell.dispose().await;

    // Cache is full with the idle shell instance; resolving patch evicts it.
    let patch = registry.resolve(ToolKind::Patch).await.unwrap();
    assert_eq!(shell_probe.cleaned.load(Ordering::SeqCst), 1);
    assert_eq!(patch_probe.cleaned.load(Ordering::SeqCst), 0);
    patch.dispose().await;
  }

  #[tokio::test]
  async fn test_in_use_instances_survive_eviction() {
    let registry = ToolRegistry::new(RegistryConfig {
      max_cached: 1,
      ..Default::default()
    });
    let shell_probe = register_probe(&registry, ToolKind::Shell);
    register_probe(&registry, ToolKind::Patch);

    let shell = registry.resolve(ToolKind::Shell).await.unwrap();
    // Shell is still in use: patch must not evict it.
    let patch = registry.resolve(ToolKind::Patch).await.unwrap();
    assert_eq!(shell_probe.cleaned.load(Ordering::SeqCst), 0);

    shell.dispose().await;
    patch.dispose().await;
  }

  #[tokio::test]
  async fn test_idle_sweep_evicts_and_cleans() {
    let registry = ToolRegistry::new(RegistryConfig {
      idle_timeout: Duration::ZERO,
      ..Default::default()
    });
    let probe = register_probe(&registry, ToolKind::Shell);

    let handle = registry.resolve(ToolKind::Shell).await.unwrap();
    handle.dispose().await;

    registry.sweep_idle().await;
    assert_eq!(probe.cleaned.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_unregister_purges_cached_instances() {
    let registry = ToolRegistry::new(RegistryConfig::default());
    let probe = register_probe(&registry, ToolKind::Shell);

    let handle = registry.resolve(ToolKind::Shell).await.unwrap();
    handle.dispose().await;

    registry.unregister(ToolKind::Shell).await;
    assert_eq!(probe.cleaned.load(Ordering::SeqCst), 1);
    assert_eq!(
      registry.resolve(ToolKind::Shell).await.unwrap_err().code(),
      "tool_not_registered"
    );
  }

  #[tokio::test]
  async fn test_shutdown_cleans_everything() {
    let registry = ToolRegistry::new(RegistryConfig::default());
    let shell_probe = register_probe(&registry, ToolKind::Shell);
    let patch_probe = register_probe(&registry, ToolKind::Patch);

    registry.resolve(ToolKind::Shell).await.unwrap().dispose().await;
    registry.resolve(ToolKind::Patch).await.unwrap().dispose().await;

    registry.shutdown().await;
    assert_eq!(shell_probe.cleaned.load(Ordering::SeqCst), 1);
    assert_eq!(patch_probe.cleaned.load(Ordering::SeqCst), 1);
  }
}
