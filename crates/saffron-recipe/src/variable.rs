use serde::{Deserialize, Serialize};

/// The declared type of a recipe variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
  #[default]
  String,
  Number,
  Boolean,
  Enum,
  Array,
  Object,
}

impl VariableKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      VariableKind::String => "string",
      VariableKind::Number => "number",
      VariableKind::Boolean => "boolean",
      VariableKind::Enum => "enum",
      VariableKind::Array => "array",
      VariableKind::Object => "object",
    }
  }
}

/// A typed variable declaration in a recipe.
///
/// Values supplied at run time (and declared defaults) must match the
/// declared kind; `enum` variables additionally restrict the value to the
/// listed `values`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
  #[serde(rename = "type", default)]
  pub kind: VariableKind,

  #[serde(default)]
  pub required: bool,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<serde_json::Value>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,

  /// Allowed values for `enum` variables.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub values: Vec<serde_json::Value>,
}

impl VariableSpec {
  /// Whether `value` satisfies the declared kind.
  pub fn accepts(&self, value: &serde_json::Value) -> bool {
    match self.kind {
      VariableKind::String => value.is_string(),
      VariableKind::Number => value.is_number(),
      VariableKind::Boolean => value.is_boolean(),
      VariableKind::Enum => self.values.contains(value),
      VariableKind::Array => value.is_array(),
      VariableKind::Object => value.is_object(),
    }
  }
}
