use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Runtime failure attached to a resource and carried in its output cells.
///
/// Faults clone cheaply: one fault fans out to every waiter of every output
/// cell of the failed resource, and each dependent wraps it as the source of
/// its own `Dependency` fault.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeFault {
  /// The provider rejected or failed the apply call.
  #[error("provider failed for resource '{resource}': {message}")]
  Provider { resource: String, message: String },

  /// An input could not be resolved against upstream outputs.
  #[error("failed to resolve input '{input}' for '{resource}': {message}")]
  InputResolution {
    resource: String,
    input: String,
    message: String,
  },

  /// The provider returned no value for a referenced output attribute.
  #[error("resource '{resource}' resolved without attribute '{attribute}'")]
  MissingAttribute { resource: String, attribute: String },

  /// The provider call exceeded the resource's declared timeout.
  #[error("resource '{resource}' timed out after {timeout_ms}ms")]
  Timeout { resource: String, timeout_ms: u64 },

  /// An upstream dependency failed, so this resource was never applied.
  #[error("dependency '{resource}' failed: {source}")]
  Dependency {
    resource: String,
    #[source]
    source: Box<NodeFault>,
  },

  /// Evaluation was cancelled before this resource started.
  #[error("evaluation cancelled before resource '{resource}' started")]
  Cancelled { resource: String },
}

impl NodeFault {
  /// The fault at the end of the dependency chain.
  pub fn root_cause(&self) -> &NodeFault {
    match self {
      NodeFault::Dependency { source, .. } => source.root_cause(),
      other => other,
    }
  }
}
