use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use tracing::debug;

use saffron_recipe::TemplateInclude;
use saffron_tool::{RenderError, RenderHooks, StepContext};

use crate::error::TemplateError;
use crate::frontmatter::{parse_frontmatter, split_frontmatter};
use crate::inject::{InjectSpec, inject_content};
use crate::resolver::{TemplateResolution, TemplateResolver};

/// One template-step render: the base template, where relative targets
/// land, and the step-level includes composed into the output set.
pub struct RenderRequest<'a> {
  pub template: &'a str,
  pub output_dir: Option<&'a str>,
  pub includes: &'a [TemplateInclude],
}

/// What happened (or would happen) to one rendered file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileDisposition {
  Write,
  Overwrite,
  Inject,
  Skip { reason: String },
}

/// A fully rendered template file and its resolved disposition.
#[derive(Debug, Clone)]
pub struct RenderedTemplateFile {
  pub template: PathBuf,
  pub attributes: Map<String, Value>,
  pub body: String,
  pub target: Option<PathBuf>,
  pub disposition: FileDisposition,
}

/// Result of rendering one request.
///
/// The file lists are identical between a real run, a dry run and the
/// collect pass — only whether the writes actually happen differs.
#[derive(Debug, Default)]
pub struct RenderOutcome {
  pub files: Vec<RenderedTemplateFile>,
  pub files_created: Vec<PathBuf>,
  pub files_modified: Vec<PathBuf>,
  pub warnings: Vec<String>,
}

/// Resolves, composes and renders templates, and owns the single point
/// where rendered files reach the filesystem.
pub struct TemplatePipeline {
  resolver: TemplateResolver,
}

impl TemplatePipeline {
  pub fn new(template_dirs: Vec<PathBuf>) -> Self {
    Self {
      resolver: TemplateResolver::new(template_dirs),
    }
  }

  /// Drop cached template resolutions. Called from the template tool's
  /// `cleanup`.
  pub fn clear_cache(&self) {
    self.resolver.clear_cache();
  }

  pub fn resolver(&self) -> &TemplateResolver {
    &self.resolver
  }

  /// Render a request against the step context.
  ///
  /// The base template failing to resolve is fatal; an unresolved include
  /// degrades to a warning. No write happens unless the context allows it
  /// (render phase, not a dry run).
  pub fn render(
    &self,
    req: &RenderRequest<'_>,
    ctx: &StepContext,
  ) -> Result<RenderOutcome, TemplateError> {
    let scope = ctx.template_ctx();
    let warnings: Arc<Mutex<Vec<String>>> = Arc::default();
    let hooks = Self::hooks_for(ctx, warnings.clone());

    let base = self.resolver.resolve(req.template, ctx.project_root())?;

    let output_dir = self.resolve_output_dir(req.output_dir, ctx, &scope)?;

    let mut outcome = RenderOutcome::default();
    let sources = self.compose(req, &base, ctx, &scope, &mut outcome)?;
    for source in sources {
      self.render_file(&source, ctx, &scope, &hooks, &output_dir, &mut outcome)?;
    }

    outcome
      .warnings
      .extend(warnings.lock().unwrap_or_else(|e| e.into_inner()).drain(..));
    Ok(outcome)
  }

  /// Gather the base template plus every include that resolves and whose
  /// condition holds: step-level includes first, then includes declared in
  /// the base template's frontmatter.
  fn compose(
    &self,
    req: &RenderRequest<'_>,
    base: &Arc<TemplateResolution>,
    ctx: &StepContext,
    scope: &Value,
    outcome: &mut RenderOutcome,
  ) -> Result<Vec<Arc<TemplateResolution>>, TemplateError> {
    let mut pending: Vec<(String, Option<String>)> = req
      .includes
      .iter()
      .map(|i| (i.template().to_string(), i.condition().map(str::to_string)))
      .collect();

    let (header, _) = split_frontmatter(&base.content);
    if let Some(header) = header {
      let attrs = parse_frontmatter(header, &base.path)?;
      if let Some(declared) = attrs.get("includes") {
        match serde_json::from_value::<Vec<TemplateInclude>>(declared.clone()) {
          Ok(includes) => pending.extend(
            includes
              .iter()
              .map(|i| (i.template().to_string(), i.condition().map(str::to_string))),
          ),
          Err(e) => outcome.warnings.push(format!(
            "ignoring malformed includes in '{}': {}",
            base.path.display(),
            e
          )),
        }
      }
    }

    let mut sources = vec![base.clone()];
    for (id, condition) in pending {
      if let Some(condition) = &condition {
        match ctx.engine().eval_bool(condition, scope) {
          Ok(true) => {}
          Ok(false) => {
            debug!(include = %id, "include condition false, not composing");
            continue;
          }
          Err(e) => {
            outcome
              .warnings
              .push(format!("include '{}' condition failed: {}", id, e));
            continue;
          }
        }
      }

      // The include id may itself be templated.
      let resolved_id = match ctx.engine().render(&id, scope) {
        Ok(rendered) => rendered,
        Err(e) => {
          outcome
            .warnings
            .push(format!("include '{}' failed to render: {}", id, e));
          continue;
        }
      };

      match self.resolver.resolve(&resolved_id, ctx.project_root()) {
        Ok(resolution) => sources.push(resolution),
        // Best-effort composition: a missing or unreadable include warns.
        Err(TemplateError::NotFound { .. }) => outcome
          .warnings
          .push(format!("include '{}' not found", resolved_id)),
        Err(TemplateError::Io { path, source }) => outcome.warnings.push(format!(
          "include '{}' unreadable: {}",
          path.display(),
          source
        )),
        Err(e) => return Err(e),
      }
    }

    Ok(sources)
  }

  /// Render one resolved template file and apply its disposition.
  fn render_file(
    &self,
    source: &TemplateResolution,
    ctx: &StepContext,
    scope: &Value,
    hooks: &RenderHooks,
    output_dir: &Path,
    outcome: &mut RenderOutcome,
  ) -> Result<(), TemplateError> {
    let engine = ctx.engine();
    let (header, raw_body) = split_frontmatter(&source.content);
    let raw_attrs = match header {
      Some(header) => parse_frontmatter(header, &source.path)?,
      None => Map::new(),
    };

    // Stage 1: frontmatter attribute values render first, so a `to` path
    // can reference variables.
    let attrs = match render_string_leaves(Value::Object(raw_attrs), engine.as_ref(), scope)? {
      Value::Object(map) => map,
      _ => Map::new(),
    };

    // Stage 2: the body renders with the final attributes in scope.
    let mut body_scope = scope.clone();
    if let Value::Object(root) = &mut body_scope {
      root.insert("frontmatter".to_string(), Value::Object(attrs.clone()));
    }
    let body = engine.render_with(raw_body, &body_scope, hooks)?;

    if attrs.get("skip_if").is_some_and(flag) {
      outcome.files.push(RenderedTemplateFile {
        template: source.path.clone(),
        attributes: attrs,
        body,
        target: None,
        disposition: FileDisposition::Skip {
          reason: "skip_if directive matched".to_string(),
        },
      });
      return Ok(());
    }

    let to = attrs
      .get("to")
      .and_then(Value::as_str)
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .ok_or_else(|| TemplateError::MissingTarget {
        template: source.path.display().to_string(),
      })?;
    let target = if Path::new(to).is_absolute() {
      PathBuf::from(to)
    } else {
      output_dir.join(to)
    };

    let exists = target.exists();
    let unless_exists = attrs.get("unless_exists").is_some_and(flag);
    let inject = attrs.get("inject").is_some_and(flag);
    let force = ctx.force()
      || attrs.get("force").is_some_and(flag)
      || attrs.get("overwrite").is_some_and(flag);

    let disposition = if unless_exists && exists {
      FileDisposition::Skip {
        reason: "target exists (unless_exists)".to_string(),
      }
    } else if inject {
      if !exists {
        return Err(TemplateError::InjectTargetMissing { path: target });
      }
      let existing = std::fs::read_to_string(&target).map_err(|source| TemplateError::Io {
        path: target.clone(),
        source,
      })?;
      let spec = InjectSpec::from_attributes(&attrs);
      match inject_content(&existing, &body, &spec)? {
        Some(updated) => {
          if ctx.writes_enabled() {
            std::fs::write(&target, updated).map_err(|source| TemplateError::Io {
              path: target.clone(),
              source,
            })?;
          }
          outcome.files_modified.push(target.clone());
          FileDisposition::Inject
        }
        None => FileDisposition::Skip {
          reason: "content already present".to_string(),
        },
      }
    } else if exists && !force {
      FileDisposition::Skip {
        reason: "target exists".to_string(),
      }
    } else {
      if ctx.writes_enabled() {
        if let Some(parent) = target.parent() {
          std::fs::create_dir_all(parent).map_err(|source| TemplateError::Io {
            path: parent.to_path_buf(),
            source,
          })?;
        }
        std::fs::write(&target, &body).map_err(|source| TemplateError::Io {
          path: target.clone(),
          source,
        })?;
      }
      if exists {
        outcome.files_modified.push(target.clone());
        FileDisposition::Overwrite
      } else {
        outcome.files_created.push(target.clone());
        FileDisposition::Write
      }
    };

    debug!(
      template = %source.path.display(),
      target = %target.display(),
      disposition = ?disposition,
      "rendered template file"
    );

    outcome.files.push(RenderedTemplateFile {
      template: source.path.clone(),
      attributes: attrs,
      body,
      target: Some(target),
      disposition,
    });
    Ok(())
  }

  fn resolve_output_dir(
    &self,
    output_dir: Option<&str>,
    ctx: &StepContext,
    scope: &Value,
  ) -> Result<PathBuf, TemplateError> {
    match output_dir {
      None => Ok(ctx.project_root().to_path_buf()),
      Some(dir) => {
        let rendered = ctx.engine().render(dir, scope)?;
        let path = Path::new(&rendered);
        if path.is_absolute() {
          Ok(path.to_path_buf())
        } else {
          Ok(ctx.project_root().join(path))
        }
      }
    }
  }

  fn hooks_for(ctx: &StepContext, warnings: Arc<Mutex<Vec<String>>>) -> RenderHooks {
    let provide_ctx = ctx.clone();
    let answer_ctx = ctx.clone();
    RenderHooks {
      provide: Some(Arc::new(move |name, value| {
        provide_ctx.provide(name, value);
      })),
      answer: Some(Arc::new(move |name| {
        if answer_ctx.phase().is_collect() {
          answer_ctx.request_answer(name);
        }
        let found = answer_ctx.answer(name);
        if found.is_none() && !answer_ctx.phase().is_collect() {
          warnings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(format!("no answer available for '{}'", name));
        }
        found
      })),
    }
  }
}

/// Render every string leaf of a JSON value through the engine.
fn render_string_leaves(
  value: Value,
  engine: &dyn saffron_tool::TemplateEngine,
  scope: &Value,
) -> Result<Value, RenderError> {
  Ok(match value {
    Value::String(s) => Value::String(engine.render(&s, scope)?),
    Value::Array(items) => Value::Array(
      items
        .into_iter()
        .map(|v| render_string_leaves(v, engine, scope))
        .collect::<Result<_, _>>()?,
    ),
    Value::Object(map) => Value::Object(
      map
        .into_iter()
        .map(|(k, v)| Ok((k, render_string_leaves(v, engine, scope)?)))
        .collect::<Result<_, RenderError>>()?,
    ),
    other => other,
  })
}

/// Directive truthiness: explicit booleans and numbers as expected;
/// rendered strings are truthy unless empty, "false" or "0".
pub(crate) fn flag(v: &Value) -> bool {
  match v {
    Value::Bool(b) => *b,
    Value::String(s) => {
      let t = s.trim();
      !t.is_empty() && t != "false" && t != "0"
    }
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
    Value::Null => false,
    _ => true,
  }
}
