use regex::Regex;
use serde_json::{Map, Value};

use crate::error::TemplateError;

/// How rendered content is inserted into an existing file.
///
/// Anchors are regular expressions matched line by line. With no anchor
/// set, content is appended. Insertion is idempotent: content already
/// present in the target is not inserted again.
#[derive(Debug, Clone, Default)]
pub struct InjectSpec {
  pub after: Option<String>,
  pub before: Option<String>,
  pub prepend: bool,
  pub append: bool,
}

impl InjectSpec {
  /// Read the inject anchors from rendered frontmatter attributes.
  pub fn from_attributes(attrs: &Map<String, Value>) -> Self {
    let text = |key: &str| {
      attrs
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
    };
    Self {
      after: text("after"),
      before: text("before"),
      prepend: attrs.get("prepend").is_some_and(super::pipeline::flag),
      append: attrs.get("append").is_some_and(super::pipeline::flag),
    }
  }
}

/// Insert `addition` into `existing` per the spec.
///
/// Returns `Ok(None)` when the content is already present (nothing to do).
pub fn inject_content(
  existing: &str,
  addition: &str,
  spec: &InjectSpec,
) -> Result<Option<String>, TemplateError> {
  let needle = addition.trim_end();
  if !needle.is_empty() && existing.contains(needle) {
    return Ok(None);
  }

  let lines: Vec<&str> = existing.lines().collect();
  let block: Vec<&str> = needle.lines().collect();

  let insert_at = if let Some(pattern) = &spec.after {
    let re = compile(pattern)?;
    match lines.iter().position(|l| re.is_match(l)) {
      Some(i) => i + 1,
      None => lines.len(),
    }
  } else if let Some(pattern) = &spec.before {
    let re = compile(pattern)?;
    lines.iter().position(|l| re.is_match(l)).unwrap_or(0)
  } else if spec.prepend {
    0
  } else {
    // append, also the default
    lines.len()
  };

  let mut out: Vec<&str> = Vec::with_capacity(lines.len() + block.len());
  out.extend(&lines[..insert_at]);
  out.extend(&block);
  out.extend(&lines[insert_at..]);

  let mut joined = out.join("\n");
  if existing.ends_with('\n') || !existing.is_empty() {
    joined.push('\n');
  }
  Ok(Some(joined))
}

fn compile(pattern: &str) -> Result<Regex, TemplateError> {
  Regex::new(pattern).map_err(|e| TemplateError::BadInjectPattern {
    pattern: pattern.to_string(),
    message: e.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_inject_after_anchor() {
    let existing = "mod a;\nmod b;\n\nfn main() {}\n";
    let spec = InjectSpec {
      after: Some(r"^mod b;".to_string()),
      ..Default::default()
    };
    let out = inject_content(existing, "mod c;", &spec).unwrap().unwrap();
    assert_eq!(out, "mod a;\nmod b;\nmod c;\n\nfn main() {}\n");
  }

  #[test]
  fn test_inject_before_anchor() {
    let existing = "use std::fmt;\n\nfn main() {}\n";
    let spec = InjectSpec {
      before: Some(r"^fn main".to_string()),
      ..Default::default()
    };
    let out = inject_content(existing, "fn helper() {}", &spec).unwrap().unwrap();
    assert!(out.contains("fn helper() {}\nfn main() {}"));
  }

  #[test]
  fn test_inject_defaults_to_append() {
    let out = inject_content("line one\n", "line two", &InjectSpec::default())
      .unwrap()
      .unwrap();
    assert_eq!(out, "line one\nline two\n");
  }

  #[test]
  fn test_inject_prepend() {
    let spec = InjectSpec {
      prepend: true,
      ..Default::default()
    };
    let out = inject_content("body\n", "header", &spec).unwrap().unwrap();
    assert_eq!(out, "header\nbody\n");
  }

  #[test]
  fn test_inject_is_idempotent() {
    let existing = "mod a;\nmod c;\n";
    let spec = InjectSpec::default();
    assert!(inject_content(existing, "mod c;", &spec).unwrap().is_none());
  }

  #[test]
  fn test_bad_pattern_is_reported() {
    let spec = InjectSpec {
      after: Some("[unclosed".to_string()),
      ..Default::default()
    };
    let err = inject_content("x\n", "y", &spec).unwrap_err();
    assert_eq!(err.code(), "inject_bad_pattern");
  }
}
