use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::input::InputValue;

/// A declared resource: a unit of desired external state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDef {
  /// Name unique within the stack.
  pub name: String,
  /// Provider kind, e.g. `docker:container`.
  pub kind: String,
  #[serde(default)]
  pub inputs: BTreeMap<String, InputValue>,
  /// Upper bound on the provider call for this resource.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
}
