//! The minijinja-backed implementation of [`TemplateEngine`].

use minijinja::{Environment, ErrorKind, Value};

use saffron_tool::{RenderError, RenderHooks, TemplateEngine};

/// Renders templates and evaluates conditions with minijinja.
///
/// Environments are built per render: the `provide`/`answer` helpers close
/// over per-step hooks, so a shared environment would leak one step's
/// sinks into another's.
#[derive(Debug, Default)]
pub struct MiniJinjaEngine;

impl MiniJinjaEngine {
  pub fn new() -> Self {
    Self
  }

  fn environment(hooks: &RenderHooks) -> Environment<'static> {
    let mut env = Environment::new();

    match hooks.provide.clone() {
      Some(provide) => {
        env.add_function(
          "provide",
          move |name: String, value: Value| -> Result<Value, minijinja::Error> {
            let json = serde_json::to_value(&value).map_err(|e| {
              minijinja::Error::new(ErrorKind::InvalidOperation, e.to_string())
            })?;
            provide(&name, json);
            Ok(Value::from(""))
          },
        );
      }
      None => {
        env.add_function("provide", |_name: String, _value: Value| Value::from(""));
      }
    }

    match hooks.answer.clone() {
      Some(answer) => {
        env.add_function("answer", move |name: String| -> Value {
          match answer(&name) {
            Some(json) => Value::from_serialize(&json),
            None => Value::from(""),
          }
        });
      }
      None => {
        env.add_function("answer", |_name: String| Value::from(""));
      }
    }

    env
  }
}

impl TemplateEngine for MiniJinjaEngine {
  fn render(&self, template: &str, ctx: &serde_json::Value) -> Result<String, RenderError> {
    self.render_with(template, ctx, &RenderHooks::default())
  }

  fn eval_bool(&self, expr: &str, ctx: &serde_json::Value) -> Result<bool, RenderError> {
    let env = Environment::new();
    let compiled = env
      .compile_expression(expr)
      .map_err(|e| RenderError::new(format!("invalid condition '{}': {}", expr, e)))?;
    let value = compiled
      .eval(Value::from_serialize(ctx))
      .map_err(|e| RenderError::new(format!("condition '{}' failed: {}", expr, e)))?;
    Ok(value.is_true())
  }

  fn render_with(
    &self,
    template: &str,
    ctx: &serde_json::Value,
    hooks: &RenderHooks,
  ) -> Result<String, RenderError> {
    let env = Self::environment(hooks);
    env
      .render_str(template, Value::from_serialize(ctx))
      .map_err(|e| RenderError::new(e.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use std::sync::{Arc, Mutex};

  use serde_json::json;

  #[test]
  fn test_render_interpolates_variables() {
    let engine = MiniJinjaEngine::new();
    let out = engine
      .render("hello {{ name }}", &json!({ "name": "saffron" }))
      .unwrap();
    assert_eq!(out, "hello saffron");
  }

  #[test]
  fn test_render_supports_conditional_blocks() {
    let engine = MiniJinjaEngine::new();
    let out = engine
      .render(
        "{% if dev %}--dev{% endif %} {{ pkg }}",
        &json!({ "dev": true, "pkg": "zod" }),
      )
      .unwrap();
    assert_eq!(out, "--dev zod");
  }

  #[test]
  fn test_eval_bool_truthiness() {
    let engine = MiniJinjaEngine::new();
    let ctx = json!({ "count": 2, "empty": "", "flag": false });
    assert!(engine.eval_bool("count > 1", &ctx).unwrap());
    assert!(!engine.eval_bool("empty", &ctx).unwrap());
    assert!(!engine.eval_bool("flag", &ctx).unwrap());
    // Undefined names are falsy, not an error.
    assert!(!engine.eval_bool("missing", &ctx).unwrap());
  }

  #[test]
  fn test_eval_bool_rejects_bad_syntax() {
    let engine = MiniJinjaEngine::new();
    assert!(engine.eval_bool("count >", &json!({})).is_err());
  }

  #[test]
  fn test_provide_hook_receives_values() {
    let engine = MiniJinjaEngine::new();
    let sink: Arc<Mutex<Vec<(String, serde_json::Value)>>> = Arc::default();
    let hook_sink = sink.clone();
    let hooks = RenderHooks {
      provide: Some(Arc::new(move |name, value| {
        hook_sink.lock().unwrap().push((name.to_string(), value));
      })),
      answer: None,
    };

    let out = engine
      .render_with("{{ provide('port', 8080) }}done", &json!({}), &hooks)
      .unwrap();
    assert_eq!(out, "done");
    assert_eq!(sink.lock().unwrap()[0], ("port".to_string(), json!(8080)));
  }

  #[test]
  fn test_answer_hook_resolves_content() {
    let engine = MiniJinjaEngine::new();
    let hooks = RenderHooks {
      provide: None,
      answer: Some(Arc::new(|name| {
        (name == "body").then(|| json!("generated text"))
      })),
    };

    let out = engine
      .render_with("{{ answer('body') }}|{{ answer('missing') }}", &json!({}), &hooks)
      .unwrap();
    assert_eq!(out, "generated text|");
  }

  #[test]
  fn test_helpers_are_noops_without_hooks() {
    let engine = MiniJinjaEngine::new();
    let out = engine
      .render("{{ provide('k', 1) }}{{ answer('k') }}ok", &json!({}))
      .unwrap();
    assert_eq!(out, "ok");
  }
}
