use thiserror::Error;

/// Construction-time errors. Any of these aborts locking before a single
/// provider call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("duplicate resource name: {0}")]
  DuplicateResource(String),

  #[error("'{referrer}' references unknown output '{resource}.{attribute}'")]
  UnresolvedReference {
    referrer: String,
    resource: String,
    attribute: String,
  },

  #[error("dependency cycle detected: {}", .members.join(" -> "))]
  CycleDetected { members: Vec<String> },

  #[error("invalid template for input '{input}' of '{referrer}': {message}")]
  InvalidTemplate {
    referrer: String,
    input: String,
    message: String,
  },
}
