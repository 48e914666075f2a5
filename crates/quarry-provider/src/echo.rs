//! A provider for development and tests.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::{Provider, ProviderError};

/// Echoes the input attributes and synthesizes the runtime-assigned `name`
/// and `id` attributes a real provider would return.
///
/// The assigned name is the logical name plus a random suffix, so two stacks
/// can hold the same logical resource side by side.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoProvider;

#[async_trait]
impl Provider for EchoProvider {
  async fn apply(
    &self,
    kind: &str,
    name: &str,
    attributes: Map<String, Value>,
  ) -> Result<Map<String, Value>, ProviderError> {
    let mut resolved = attributes;
    let suffix = Uuid::new_v4().simple().to_string();

    resolved
      .entry("name")
      .or_insert_with(|| json!(format!("{name}-{}", &suffix[..8])));
    resolved.insert("id".to_string(), json!(format!("{kind}::{suffix}")));

    Ok(resolved)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_echo_assigns_name_and_id() {
    let mut attributes = Map::new();
    attributes.insert("image".to_string(), json!("redis:latest"));

    let resolved = EchoProvider
      .apply("docker:container", "redis", attributes)
      .await
      .unwrap();

    assert_eq!(resolved["image"], json!("redis:latest"));
    assert!(resolved["name"].as_str().unwrap().starts_with("redis-"));
    assert!(
      resolved["id"]
        .as_str()
        .unwrap()
        .starts_with("docker:container::")
    );
  }

  #[tokio::test]
  async fn test_echo_keeps_explicit_name() {
    let mut attributes = Map::new();
    attributes.insert("name".to_string(), json!("pinned"));

    let resolved = EchoProvider
      .apply("docker:network", "net", attributes)
      .await
      .unwrap();

    assert_eq!(resolved["name"], json!("pinned"));
  }
}
