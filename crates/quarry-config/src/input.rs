//! Input value types for resource declarations.
//!
//! Every input is one of three shapes:
//! - a literal JSON value, substituted as-is;
//! - a reference to another resource's output attribute, available only once
//!   that resource has been applied;
//! - a template rendered against referenced outputs once they resolve.
//!
//! Templates use minijinja syntax and reference outputs as
//! `resource.attribute` paths:
//!
//! ```json
//! {
//!   "image": { "ref": { "resource": "redis_image", "attribute": "name" } },
//!   "restart": { "literal": "on-failure" },
//!   "env": { "template": "REDIS_HOST={{ redis.name }}" }
//! }
//! ```
//!
//! Resource names referenced from templates must be valid identifiers
//! (no hyphens); `ref` inputs have no such restriction.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A reference to another resource's output attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
  pub resource: String,
  pub attribute: String,
}

/// A declared input for a resource attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputValue {
  /// A literal value, known at declaration time.
  Literal(Value),
  /// Another resource's output attribute.
  Ref(OutputRef),
  /// A template rendered against the outputs it references.
  Template(String),
}
