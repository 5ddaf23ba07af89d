use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use tracing::debug;

use crate::error::TemplateError;

/// Extensions tried after the identifier as written.
const TEMPLATE_EXTENSIONS: &[&str] = &["j2", "jinja", "tpl"];

/// A resolved template: where it was found and what it contains.
#[derive(Debug, Clone)]
pub struct TemplateResolution {
  pub path: PathBuf,
  pub content: String,
  /// Identifier of the engine the content targets.
  pub engine: &'static str,
  pub size: u64,
  pub extension: Option<String>,
  pub modified: Option<SystemTime>,
}

/// Resolves template identifiers to files.
///
/// Candidate order: absolute path, project-root-relative, then each
/// configured template directory, each candidate also tried with the
/// conventional extensions. The first existing file wins. Resolutions are
/// cached by (identifier, project root) for the lifetime of one owner —
/// the template tool clears the cache on cleanup.
pub struct TemplateResolver {
  template_dirs: Vec<PathBuf>,
  cache: RwLock<HashMap<(String, PathBuf), Arc<TemplateResolution>>>,
}

impl TemplateResolver {
  /// `template_dirs` entries may be absolute or project-root-relative.
  pub fn new(template_dirs: Vec<PathBuf>) -> Self {
    Self {
      template_dirs,
      cache: RwLock::new(HashMap::new()),
    }
  }

  pub fn resolve(
    &self,
    id: &str,
    project_root: &Path,
  ) -> Result<Arc<TemplateResolution>, TemplateError> {
    let cache_key = (id.to_string(), project_root.to_path_buf());
    {
      let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
      if let Some(hit) = cache.get(&cache_key) {
        return Ok(hit.clone());
      }
    }

    let path = self
      .candidates(id, project_root)
      .into_iter()
      .find(|p| p.is_file())
      .ok_or_else(|| TemplateError::NotFound {
        template: id.to_string(),
      })?;

    let content = std::fs::read_to_string(&path).map_err(|source| TemplateError::Io {
      path: path.clone(),
      source,
    })?;
    let metadata = std::fs::metadata(&path).ok();

    debug!(template = id, path = %path.display(), "resolved template");

    let resolution = Arc::new(TemplateResolution {
      size: content.len() as u64,
      extension: path
        .extension()
        .map(|e| e.to_string_lossy().into_owned()),
      modified: metadata.and_then(|m| m.modified().ok()),
      engine: "minijinja",
      path,
      content,
    });

    self
      .cache
      .write()
      .unwrap_or_else(|e| e.into_inner())
      .insert(cache_key, resolution.clone());
    Ok(resolution)
  }

  /// Drop all cached resolutions.
  pub fn clear_cache(&self) {
    self
      .cache
      .write()
      .unwrap_or_else(|e| e.into_inner())
      .clear();
  }

  fn candidates(&self, id: &str, project_root: &Path) -> Vec<PathBuf> {
    let mut bases = Vec::new();
    let id_path = Path::new(id);
    if id_path.is_absolute() {
      bases.push(id_path.to_path_buf());
    } else {
      bases.push(project_root.join(id));
      for dir in &self.template_dirs {
        let dir = if dir.is_absolute() {
          dir.clone()
        } else {
          project_root.join(dir)
        };
        bases.push(dir.join(id));
      }
    }

    let mut out = Vec::with_capacity(bases.len() * (1 + TEMPLATE_EXTENSIONS.len()));
    out.extend(bases.iter().cloned());
    for base in &bases {
      for ext in TEMPLATE_EXTENSIONS {
        let mut with_ext = base.as_os_str().to_owned();
        with_ext.push(".");
        with_ext.push(ext);
        out.push(PathBuf::from(with_ext));
      }
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_project_root_relative_resolution() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("greeting.txt"), "hi").unwrap();

    let resolver = TemplateResolver::new(Vec::new());
    let resolution = resolver.resolve("greeting.txt", dir.path()).unwrap();
    assert_eq!(resolution.content, "hi");
    assert_eq!(resolution.extension.as_deref(), Some("txt"));
  }

  #[test]
  fn test_template_dir_and_extension_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let templates = dir.path().join("templates");
    std::fs::create_dir_all(&templates).unwrap();
    std::fs::write(templates.join("model.j2"), "struct {{ name }};").unwrap();

    let resolver = TemplateResolver::new(vec![PathBuf::from("templates")]);
    let resolution = resolver.resolve("model", dir.path()).unwrap();
    assert!(resolution.path.ends_with("templates/model.j2"));
  }

  #[test]
  fn test_missing_template_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = TemplateResolver::new(Vec::new());
    let err = resolver.resolve("ghost", dir.path()).unwrap_err();
    assert_eq!(err.code(), "template_not_found");
  }

  #[test]
  fn test_resolution_is_cached_per_root() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cached.txt");
    std::fs::write(&path, "v1").unwrap();

    let resolver = TemplateResolver::new(Vec::new());
    assert_eq!(resolver.resolve("cached.txt", dir.path()).unwrap().content, "v1");

    // Content changes are invisible until the cache is cleared.
    std::fs::write(&path, "v2").unwrap();
    assert_eq!(resolver.resolve("cached.txt", dir.path()).unwrap().content, "v1");

    resolver.clear_cache();
    assert_eq!(resolver.resolve("cached.txt", dir.path()).unwrap().content, "v2");
  }
}
