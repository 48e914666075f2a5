//! Evaluation events and notifiers for observability.
//!
//! Events are emitted during stack evaluation to allow consumers to observe
//! progress, persist state, stream to UIs, etc.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// Events emitted during stack evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EvaluationEvent {
  /// Evaluation has started.
  EvaluationStarted {
    evaluation_id: String,
    stack_id: String,
  },

  /// A resource has been dispatched to the provider.
  ResourceStarted {
    evaluation_id: String,
    resource: String,
  },

  /// A resource was applied successfully.
  ResourceSucceeded {
    evaluation_id: String,
    resource: String,
    attributes: Map<String, Value>,
  },

  /// A resource failed, directly or through a dependency.
  ResourceFailed {
    evaluation_id: String,
    resource: String,
    error: String,
  },

  /// A resource was never started because evaluation was cancelled.
  ResourceCancelled {
    evaluation_id: String,
    resource: String,
  },

  /// Evaluation has completed; per-resource outcomes are in the result.
  EvaluationCompleted { evaluation_id: String },
}

/// Trait for receiving evaluation events.
///
/// The engine calls `notify` for each event - implementations decide what to
/// do with them (persist, broadcast, log, ignore, etc.).
pub trait EvaluationNotifier: Send + Sync {
  /// Called when an evaluation event occurs.
  fn notify(&self, event: EvaluationEvent);
}

/// A no-op notifier that discards all events.
///
/// Useful for tests or when event observation is not needed.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl EvaluationNotifier for NoopNotifier {
  fn notify(&self, _event: EvaluationEvent) {
    // Intentionally empty
  }
}

/// A notifier that sends events to an unbounded channel.
///
/// Unbounded so a slow consumer never blocks the engine; event volume is one
/// per resource transition, so growth stays small.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<EvaluationEvent>,
}

impl ChannelNotifier {
  /// Create a notifier and the receiving end of its channel.
  pub fn new() -> (Self, mpsc::UnboundedReceiver<EvaluationEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self { sender }, receiver)
  }
}

impl EvaluationNotifier for ChannelNotifier {
  fn notify(&self, event: EvaluationEvent) {
    // A dropped receiver just means nobody is listening anymore.
    let _ = self.sender.send(event);
  }
}
