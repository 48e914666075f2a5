//! Quarry Provider
//!
//! The boundary between the evaluator and whatever actually creates
//! resources. A provider receives a resource kind, its logical name, and its
//! fully resolved attributes, and returns the attributes the live resource
//! ended up with — including ones only the provider can assign, like a
//! runtime-generated name or id.
//!
//! The core assumes nothing about provider semantics beyond "returns
//! attributes or fails": calls may be slow, may fail, and are not assumed
//! idempotent.

mod echo;
mod error;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use echo::EchoProvider;
pub use error::ProviderError;

/// The external system that performs the actual apply operation for a
/// resource kind.
#[async_trait]
pub trait Provider: Send + Sync {
  /// Apply desired state for one resource, returning its resolved
  /// attributes.
  async fn apply(
    &self,
    kind: &str,
    name: &str,
    attributes: Map<String, Value>,
  ) -> Result<Map<String, Value>, ProviderError>;
}
