//! Evaluation results.

use std::collections::BTreeMap;

use quarry_graph::NodeFault;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Final status of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
  /// Applied; resolved attributes are in the report.
  Succeeded,
  /// Failed directly or through a dependency; the fault is in the report.
  Failed,
  /// Never started because evaluation was cancelled.
  Cancelled,
  /// Never reached.
  NotStarted,
}

/// Outcome of one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceReport {
  pub status: ResourceStatus,
  /// Attributes returned by the provider, present on success.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub attributes: Option<Map<String, Value>>,
  /// The fault that stopped this resource, present on failure or
  /// cancellation.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<NodeFault>,
}

/// A declared stack output: its resolved value, or the fault that prevented
/// it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackOutput {
  Value(Value),
  Failed(NodeFault),
}

/// Result of a complete stack evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
  /// Unique evaluation ID.
  pub evaluation_id: String,
  /// Per-resource outcomes, keyed by resource name.
  pub resources: BTreeMap<String, ResourceReport>,
  /// Declared stack outputs.
  pub outputs: BTreeMap<String, StackOutput>,
}

impl EvaluationResult {
  /// Whether every resource was applied successfully.
  pub fn succeeded(&self) -> bool {
    self
      .resources
      .values()
      .all(|report| report.status == ResourceStatus::Succeeded)
  }

  /// Status of a resource by name.
  pub fn status(&self, name: &str) -> Option<ResourceStatus> {
    self.resources.get(name).map(|report| report.status)
  }
}
