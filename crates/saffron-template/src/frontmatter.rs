use std::path::Path;

use serde_json::{Map, Value};

use crate::error::TemplateError;

/// Split a template into its YAML frontmatter block and body.
///
/// Frontmatter is fenced by `---` lines starting at the first line; a file
/// without the opening fence is all body.
pub fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
  let rest = match content.strip_prefix("---") {
    Some(rest) => rest,
    None => return (None, content),
  };
  // The opening fence must be the whole first line.
  let rest = match rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")) {
    Some(rest) => rest,
    None => return (None, content),
  };

  let mut offset = 0;
  for line in rest.split_inclusive('\n') {
    if line.trim_end() == "---" {
      let header = &rest[..offset];
      let body = &rest[offset + line.len()..];
      return (Some(header), body);
    }
    offset += line.len();
  }

  // Unterminated fence: treat everything as frontmatter-less body.
  (None, content)
}

/// Parse a frontmatter block into a JSON object.
pub fn parse_frontmatter(header: &str, path: &Path) -> Result<Map<String, Value>, TemplateError> {
  if header.trim().is_empty() {
    return Ok(Map::new());
  }
  let value: Value = serde_yml::from_str(header).map_err(|e| TemplateError::Frontmatter {
    path: path.to_path_buf(),
    message: e.to_string(),
  })?;
  match value {
    Value::Object(map) => Ok(map),
    Value::Null => Ok(Map::new()),
    _ => Err(TemplateError::Frontmatter {
      path: path.to_path_buf(),
      message: "frontmatter must be a mapping".to_string(),
    }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_split_with_frontmatter() {
    let content = "---\nto: src/main.rs\n---\nfn main() {}\n";
    let (header, body) = split_frontmatter(content);
    assert_eq!(header, Some("to: src/main.rs\n"));
    assert_eq!(body, "fn main() {}\n");
  }

  #[test]
  fn test_split_without_frontmatter() {
    let content = "fn main() {}\n";
    let (header, body) = split_frontmatter(content);
    assert!(header.is_none());
    assert_eq!(body, content);
  }

  #[test]
  fn test_unterminated_fence_is_body() {
    let content = "---\nto: src/main.rs\nfn main() {}\n";
    let (header, body) = split_frontmatter(content);
    assert!(header.is_none());
    assert_eq!(body, content);
  }

  #[test]
  fn test_parse_rejects_non_mapping() {
    let err = parse_frontmatter("- a\n- b\n", Path::new("t.j2")).unwrap_err();
    assert_eq!(err.code(), "template_frontmatter");
  }

  #[test]
  fn test_parse_mapping() {
    let map = parse_frontmatter("to: out.rs\nforce: true\n", Path::new("t.j2")).unwrap();
    assert_eq!(map["to"], "out.rs");
    assert_eq!(map["force"], true);
  }
}
