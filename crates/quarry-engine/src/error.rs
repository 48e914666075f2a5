use thiserror::Error;

/// Errors from the evaluation machinery itself.
///
/// Per-resource failures never surface here; they are reported per node in
/// the evaluation result.
#[derive(Debug, Error)]
pub enum EngineError {
  /// A worker task died without reporting an outcome.
  #[error("evaluation worker failed: {message}")]
  Worker { message: String },
}
