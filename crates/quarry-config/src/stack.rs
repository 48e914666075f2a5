use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::input::InputValue;
use crate::resource::ResourceDef;

/// A declared stack: resources plus the outputs the stack exports.
///
/// Declaration order matters only as a tie-breaker: independent resources are
/// evaluated in the order they appear here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackDef {
  pub stack_id: String,
  pub name: String,
  pub resources: Vec<ResourceDef>,
  /// Named values exported once evaluation completes, declared with the same
  /// literal/ref/template shapes as resource inputs.
  #[serde(default)]
  pub outputs: BTreeMap<String, InputValue>,
}
