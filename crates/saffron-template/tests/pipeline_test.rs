//! Integration tests for the template pipeline: directives, composition,
//! and the collect/render phases.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use saffron_recipe::Step;
use saffron_template::{FileDisposition, MiniJinjaEngine, RenderRequest, TemplatePipeline};
use saffron_tool::{Phase, StepContext};

fn context(root: &std::path::Path) -> StepContext {
  StepContext::new(root, Arc::new(MiniJinjaEngine::new()))
}

fn template_step(name: &str) -> Step {
  serde_yml::from_str(&format!("name: {}\ntool: template\ntemplate: t", name)).unwrap()
}

fn request(template: &str) -> RenderRequest<'_> {
  RenderRequest {
    template,
    output_dir: None,
    includes: &[],
  }
}

#[test]
fn test_render_writes_target_from_to_directive() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(
    dir.path().join("model.j2"),
    "---\nto: src/{{ name }}.rs\n---\npub struct {{ name | capitalize }};\n",
  )
  .unwrap();

  let ctx = context(dir.path())
    .with_variables(HashMap::from([("name".to_string(), json!("user"))]));
  let pipeline = TemplatePipeline::new(Vec::new());
  let outcome = pipeline.render(&request("model.j2"), &ctx).unwrap();

  let target = dir.path().join("src/user.rs");
  assert_eq!(outcome.files_created, [target.clone()]);
  assert_eq!(
    std::fs::read_to_string(target).unwrap(),
    "pub struct User;\n"
  );
}

#[test]
fn test_body_sees_rendered_frontmatter() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(
    dir.path().join("t.j2"),
    "---\nto: \"{{ name }}.txt\"\nlabel: \"{{ name }}-v1\"\n---\n{{ frontmatter.label }}\n",
  )
  .unwrap();

  let ctx =
    context(dir.path()).with_variables(HashMap::from([("name".to_string(), json!("cfg"))]));
  let pipeline = TemplatePipeline::new(Vec::new());
  pipeline.render(&request("t.j2"), &ctx).unwrap();

  assert_eq!(
    std::fs::read_to_string(dir.path().join("cfg.txt")).unwrap(),
    "cfg-v1\n"
  );
}

#[test]
fn test_missing_to_is_an_error() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(dir.path().join("t.j2"), "---\nforce: true\n---\nbody\n").unwrap();

  let pipeline = TemplatePipeline::new(Vec::new());
  let err = pipeline.render(&request("t.j2"), &context(dir.path())).unwrap_err();
  assert_eq!(err.code(), "template_missing_target");
}

#[test]
fn test_skip_if_skips_without_target() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(
    dir.path().join("t.j2"),
    "---\nto: out.txt\nskip_if: \"{{ minimal }}\"\n---\nbody\n",
  )
  .unwrap();

  let ctx =
    context(dir.path()).with_variables(HashMap::from([("minimal".to_string(), json!(true))]));
  let pipeline = TemplatePipeline::new(Vec::new());
  let outcome = pipeline.render(&request("t.j2"), &ctx).unwrap();

  assert!(outcome.files_created.is_empty());
  assert!(matches!(
    outcome.files[0].disposition,
    FileDisposition::Skip { .. }
  ));
  assert!(!dir.path().join("out.txt").exists());
}

#[test]
fn test_unless_exists_is_create_once() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(
    dir.path().join("t.j2"),
    "---\nto: once.txt\nunless_exists: true\n---\nfirst\n",
  )
  .unwrap();

  let pipeline = TemplatePipeline::new(Vec::new());
  let first = pipeline.render(&request("t.j2"), &context(dir.path())).unwrap();
  assert_eq!(first.files_created.len(), 1);

  // Second run: the target survives untouched and the file reports skipped.
  std::fs::write(dir.path().join("once.txt"), "edited by hand\n").unwrap();
  let second = pipeline.render(&request("t.j2"), &context(dir.path())).unwrap();
  assert!(second.files_created.is_empty());
  assert!(matches!(
    second.files[0].disposition,
    FileDisposition::Skip { .. }
  ));
  assert_eq!(
    std::fs::read_to_string(dir.path().join("once.txt")).unwrap(),
    "edited by hand\n"
  );
}

#[test]
fn test_existing_target_needs_force() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(dir.path().join("t.j2"), "---\nto: out.txt\n---\nnew\n").unwrap();
  std::fs::write(dir.path().join("out.txt"), "old\n").unwrap();

  let pipeline = TemplatePipeline::new(Vec::new());

  let plain = pipeline.render(&request("t.j2"), &context(dir.path())).unwrap();
  assert!(matches!(
    plain.files[0].disposition,
    FileDisposition::Skip { .. }
  ));
  assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "old\n");

  let forced = pipeline
    .render(&request("t.j2"), &context(dir.path()).with_force(true))
    .unwrap();
  assert_eq!(forced.files_modified.len(), 1);
  assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "new\n");
}

#[test]
fn test_inject_after_anchor_and_idempotence() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(dir.path().join("lib.rs"), "mod a;\nmod b;\n").unwrap();
  std::fs::write(
    dir.path().join("t.j2"),
    "---\nto: lib.rs\ninject: true\nafter: \"^mod b;\"\n---\nmod c;\n",
  )
  .unwrap();

  let pipeline = TemplatePipeline::new(Vec::new());
  let first = pipeline.render(&request("t.j2"), &context(dir.path())).unwrap();
  assert_eq!(first.files_modified.len(), 1);
  assert_eq!(
    std::fs::read_to_string(dir.path().join("lib.rs")).unwrap(),
    "mod a;\nmod b;\nmod c;\n"
  );

  let second = pipeline.render(&request("t.j2"), &context(dir.path())).unwrap();
  assert!(second.files_modified.is_empty());
  assert!(matches!(
    second.files[0].disposition,
    FileDisposition::Skip { .. }
  ));
}

#[test]
fn test_inject_requires_existing_target() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(
    dir.path().join("t.j2"),
    "---\nto: missing.rs\ninject: true\n---\nmod c;\n",
  )
  .unwrap();

  let pipeline = TemplatePipeline::new(Vec::new());
  let err = pipeline.render(&request("t.j2"), &context(dir.path())).unwrap_err();
  assert_eq!(err.code(), "inject_target_missing");
}

#[test]
fn test_includes_compose_and_missing_include_warns() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(
    dir.path().join("base.j2"),
    "---\nto: main.rs\nincludes:\n  - extra.j2\n  - ghost.j2\n  - template: tests.j2\n    condition: with_tests\n---\nfn main() {}\n",
  )
  .unwrap();
  std::fs::write(dir.path().join("extra.j2"), "---\nto: extra.rs\n---\nmod extra;\n").unwrap();
  std::fs::write(dir.path().join("tests.j2"), "---\nto: tests.rs\n---\nmod tests;\n").unwrap();

  let ctx = context(dir.path())
    .with_variables(HashMap::from([("with_tests".to_string(), json!(false))]));
  let pipeline = TemplatePipeline::new(Vec::new());
  let outcome = pipeline.render(&request("base.j2"), &ctx).unwrap();

  // Base and the unconditional include land; the false-conditioned one
  // does not; the missing one degrades to a warning.
  assert!(dir.path().join("main.rs").exists());
  assert!(dir.path().join("extra.rs").exists());
  assert!(!dir.path().join("tests.rs").exists());
  assert!(outcome.warnings.iter().any(|w| w.contains("ghost.j2")));
}

#[test]
fn test_missing_base_template_is_fatal() {
  let dir = tempfile::tempdir().unwrap();
  let pipeline = TemplatePipeline::new(Vec::new());
  let err = pipeline.render(&request("absent.j2"), &context(dir.path())).unwrap_err();
  assert_eq!(err.code(), "template_not_found");
}

#[test]
fn test_collect_phase_records_answers_and_writes_nothing() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(
    dir.path().join("t.j2"),
    "---\nto: gen.rs\n---\n{{ answer('handler_body') }}\n",
  )
  .unwrap();

  let ctx = context(dir.path()).with_phase(Phase::Collect);
  let step_ctx = ctx.for_step(&template_step("gen"));
  let pipeline = TemplatePipeline::new(Vec::new());
  let outcome = pipeline.render(&request("t.j2"), &step_ctx).unwrap();

  // Same planned file list as a real run, but nothing on disk.
  assert_eq!(outcome.files_created, [dir.path().join("gen.rs")]);
  assert!(!dir.path().join("gen.rs").exists());
  assert_eq!(ctx.drain_answer_requests(), ["handler_body"]);
}

#[test]
fn test_render_phase_uses_supplied_answers() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(
    dir.path().join("t.j2"),
    "---\nto: gen.rs\n---\n{{ answer('handler_body') }}\n",
  )
  .unwrap();

  let ctx = context(dir.path())
    .with_answers(HashMap::from([(
      "handler_body".to_string(),
      json!("fn handle() {}"),
    )]));
  let pipeline = TemplatePipeline::new(Vec::new());
  pipeline.render(&request("t.j2"), &ctx.for_step(&template_step("gen"))).unwrap();

  assert_eq!(
    std::fs::read_to_string(dir.path().join("gen.rs")).unwrap(),
    "fn handle() {}\n"
  );
}

#[test]
fn test_dry_run_plans_without_writing() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(dir.path().join("t.j2"), "---\nto: planned.rs\n---\nbody\n").unwrap();

  let pipeline = TemplatePipeline::new(Vec::new());
  let dry = pipeline
    .render(&request("t.j2"), &context(dir.path()).with_dry_run(true))
    .unwrap();
  assert_eq!(dry.files_created, [dir.path().join("planned.rs")]);
  assert!(!dir.path().join("planned.rs").exists());

  let real = pipeline.render(&request("t.j2"), &context(dir.path())).unwrap();
  assert_eq!(real.files_created, dry.files_created);
  assert!(dir.path().join("planned.rs").exists());
}

#[test]
fn test_provide_publishes_into_step_namespace() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(
    dir.path().join("t.j2"),
    "---\nto: out.txt\n---\n{{ provide('port', 8080) }}ok\n",
  )
  .unwrap();

  let ctx = context(dir.path());
  let step_ctx = ctx.for_step(&template_step("gen"));
  let pipeline = TemplatePipeline::new(Vec::new());
  pipeline.render(&request("t.j2"), &step_ctx).unwrap();

  let rendered = ctx.template_ctx();
  assert_eq!(rendered["steps"]["gen"]["provided"]["port"], json!(8080));
}

#[test]
fn test_output_dir_renders_and_anchors_targets() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(dir.path().join("t.j2"), "---\nto: mod.rs\n---\nbody\n").unwrap();

  let ctx = context(dir.path())
    .with_variables(HashMap::from([("module".to_string(), json!("auth"))]));
  let pipeline = TemplatePipeline::new(Vec::new());
  let req = RenderRequest {
    template: "t.j2",
    output_dir: Some("src/{{ module }}"),
    includes: &[],
  };
  let outcome = pipeline.render(&req, &ctx).unwrap();

  assert_eq!(outcome.files_created, [dir.path().join("src/auth/mod.rs")]);
  assert_eq!(
    outcome.files[0].target.as_deref(),
    Some(PathBuf::from(dir.path().join("src/auth/mod.rs")).as_path())
  );
}
