use thiserror::Error;

/// Errors returned by a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
  /// The provider does not handle this resource kind.
  #[error("unsupported resource kind: {0}")]
  UnsupportedKind(String),

  /// The apply operation itself failed.
  #[error("apply failed for {kind} '{name}': {message}")]
  Apply {
    kind: String,
    name: String,
    message: String,
  },
}
