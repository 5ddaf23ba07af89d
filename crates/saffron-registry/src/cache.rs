//! Bounded instance cache with LRU and idle-timeout eviction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, warn};

use saffron_tool::Tool;

use crate::registry::ToolKey;

/// One cached tool instance plus its bookkeeping.
pub(crate) struct CacheEntry {
  instance: Arc<dyn Tool>,
  init: OnceCell<()>,
  last_used: Mutex<Instant>,
  in_use: AtomicUsize,
}

impl CacheEntry {
  pub(crate) fn new(instance: Arc<dyn Tool>) -> Arc<Self> {
    Arc::new(Self {
      instance,
      init: OnceCell::new(),
      last_used: Mutex::new(Instant::now()),
      in_use: AtomicUsize::new(0),
    })
  }

  pub(crate) fn instance(&self) -> &Arc<dyn Tool> {
    &self.instance
  }

  /// Run the instance's `initialize` exactly once, on first use.
  pub(crate) async fn ensure_initialized(&self) -> Result<(), saffron_tool::ToolError> {
    self
      .init
      .get_or_try_init(|| async { self.instance.initialize().await })
      .await?;
    Ok(())
  }

  pub(crate) fn acquire(&self) {
    self.in_use.fetch_add(1, Ordering::SeqCst);
    self.touch();
  }

  pub(crate) fn release(&self) {
    self.in_use.fetch_sub(1, Ordering::SeqCst);
    self.touch();
  }

  fn touch(&self) {
    *self.last_used.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
  }

  fn is_idle(&self) -> bool {
    self.in_use.load(Ordering::SeqCst) == 0
  }

  fn idle_for(&self) -> Duration {
    self
      .last_used
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .elapsed()
  }

  async fn cleanup(&self, key: &ToolKey) {
    // Never initialized means nothing to release.
    if self.init.get().is_none() {
      return;
    }
    if let Err(e) = self.instance.cleanup().await {
      warn!(tool = %key, error = %e, "tool cleanup failed during eviction");
    }
  }
}

/// The cache proper. Eviction never touches entries currently in use.
pub(crate) struct InstanceCache {
  entries: RwLock<HashMap<ToolKey, Arc<CacheEntry>>>,
  max_entries: usize,
  idle_timeout: Duration,
}

impl InstanceCache {
  pub(crate) fn new(max_entries: usize, idle_timeout: Duration) -> Self {
    Self {
      entries: RwLock::new(HashMap::new()),
      max_entries,
      idle_timeout,
    }
  }

  pub(crate) async fn get(&self, key: &ToolKey) -> Option<Arc<CacheEntry>> {
    self.entries.read().await.get(key).cloned()
  }

  /// Insert an entry, evicting least-recently-used idle entries to stay
  /// within bounds. If a concurrent resolve already inserted for the same
  /// key, that entry wins and the candidate is discarded (it was never
  /// initialized, so there is nothing to clean up).
  pub(crate) async fn insert(&self, key: ToolKey, candidate: Arc<CacheEntry>) -> Arc<CacheEntry> {
    let mut evicted = Vec::new();
    let entry = {
      let mut entries = self.entries.write().await;
      if let Some(existing) = entries.get(&key) {
        existing.clone()
      } else {
        while entries.len() >= self.max_entries {
          let victim = entries
            .iter()
            .filter(|(_, e)| e.is_idle())
            .max_by_key(|(_, e)| e.idle_for())
            .map(|(k, _)| k.clone());
          match victim {
            Some(k) => {
              if let Some(e) = entries.remove(&k) {
                debug!(tool = %k, "evicting least-recently-used tool instance");
                evicted.push((k, e));
              }
            }
            // Everything is in use: tolerate the overflow rather than
            // evicting a live instance.
            None => break,
          }
        }
        entries.insert(key.clone(), candidate.clone());
        candidate
      }
    };

    for (k, e) in evicted {
      e.cleanup(&k).await;
    }
    entry
  }

  /// Evict entries idle longer than the timeout.
  pub(crate) async fn sweep_idle(&self) {
    let mut evicted = Vec::new();
    {
      let mut entries = self.entries.write().await;
      let stale: Vec<ToolKey> = entries
        .iter()
        .filter(|(_, e)| e.is_idle() && e.idle_for() >= self.idle_timeout)
        .map(|(k, _)| k.clone())
        .collect();
      for k in stale {
        if let Some(e) = entries.remove(&k) {
          debug!(tool = %k, "evicting idle tool instance");
          evicted.push((k, e));
        }
      }
    }
    for (k, e) in evicted {
      e.cleanup(&k).await;
    }
  }

  /// Drop every entry for a tool kind (after unregistration).
  pub(crate) async fn purge_kind(&self, kind: saffron_recipe::ToolKind) {
    let mut evicted = Vec::new();
    {
      let mut entries = self.entries.write().await;
      let keys: Vec<ToolKey> = entries
        .keys()
        .filter(|k| k.kind == kind)
        .cloned()
        .collect();
      for k in keys {
        if let Some(e) = entries.remove(&k) {
          evicted.push((k, e));
        }
      }
    }
    for (k, e) in evicted {
      if e.is_idle() {
        e.cleanup(&k).await;
      } else {
        warn!(tool = %k, "purged tool instance still in use, cleanup deferred to drop");
      }
    }
  }

  /// Remove and clean up every entry.
  pub(crate) async fn clear(&self) {
    let drained: Vec<(ToolKey, Arc<CacheEntry>)> = {
      let mut entries = self.entries.write().await;
      entries.drain().collect()
    };
    for (k, e) in drained {
      e.cleanup(&k).await;
    }
  }
}
