//! Integration tests for stack evaluation against a recording provider.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use quarry_config::{InputValue, OutputRef, ResourceDef, StackDef};
use quarry_engine::{
  ChannelNotifier, Engine, EngineConfig, EvaluationEvent, ResourceStatus, StackOutput,
};
use quarry_graph::{NodeFault, Stack};
use quarry_provider::{Provider, ProviderError};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

/// Provider that assigns deterministic names and records every call.
#[derive(Default)]
struct RecordingProvider {
  calls: AtomicUsize,
  in_flight: AtomicUsize,
  max_in_flight: AtomicUsize,
  /// Resources whose apply fails.
  failing: HashSet<String>,
  /// Resources answered with no synthesized attributes.
  withholding: HashSet<String>,
  /// Sleep before answering, to keep calls in flight.
  delay: Option<Duration>,
  /// Cancel this token while applying the named resource.
  cancel_on: Option<(String, CancellationToken)>,
}

impl RecordingProvider {
  fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  fn max_in_flight(&self) -> usize {
    self.max_in_flight.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Provider for RecordingProvider {
  async fn apply(
    &self,
    kind: &str,
    name: &str,
    attributes: Map<String, Value>,
  ) -> Result<Map<String, Value>, ProviderError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_in_flight.fetch_max(now, Ordering::SeqCst);

    if let Some((target, token)) = &self.cancel_on {
      if target == name {
        token.cancel();
        // Let the scheduler observe the cancellation while this call is
        // still in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;
      }
    }

    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }

    self.in_flight.fetch_sub(1, Ordering::SeqCst);

    if self.failing.contains(name) {
      return Err(ProviderError::Apply {
        kind: kind.to_string(),
        name: name.to_string(),
        message: "simulated outage".to_string(),
      });
    }

    if self.withholding.contains(name) {
      return Ok(attributes);
    }

    let mut resolved = attributes;
    resolved
      .entry("name")
      .or_insert_with(|| json!(format!("{name}-live")));
    resolved.insert("id".to_string(), json!(format!("{kind}::{name}")));
    Ok(resolved)
  }
}

fn resource(name: &str, kind: &str, inputs: &[(&str, InputValue)]) -> ResourceDef {
  ResourceDef {
    name: name.to_string(),
    kind: kind.to_string(),
    inputs: inputs
      .iter()
      .map(|(k, v)| ((*k).to_string(), v.clone()))
      .collect(),
    timeout_ms: None,
  }
}

fn reference(resource: &str, attribute: &str) -> InputValue {
  InputValue::Ref(OutputRef {
    resource: resource.to_string(),
    attribute: attribute.to_string(),
  })
}

fn stack_def(stack_id: &str, resources: Vec<ResourceDef>) -> StackDef {
  StackDef {
    stack_id: stack_id.to_string(),
    name: stack_id.to_string(),
    resources,
    outputs: BTreeMap::new(),
  }
}

/// The canonical three-tier topology: a network, a container on it, and a
/// second container whose env is derived from the first one's assigned name.
fn three_tier() -> StackDef {
  let mut def = stack_def(
    "three-tier",
    vec![
      resource("net", "docker:network", &[]),
      resource(
        "redis",
        "docker:container",
        &[("network", reference("net", "id"))],
      ),
      resource(
        "cmdr",
        "docker:container",
        &[
          ("network", reference("net", "id")),
          (
            "env",
            InputValue::Template("REDIS_HOST={{ redis.name }}".to_string()),
          ),
        ],
      ),
    ],
  );
  def
    .outputs
    .insert("app_name".to_string(), reference("cmdr", "name"));
  def
    .outputs
    .insert(
      "host".to_string(),
      InputValue::Template("http://{{ cmdr.name }}:8081".to_string()),
    );
  def
}

fn lock(def: StackDef) -> Stack {
  Stack::lock(def).expect("stack should lock")
}

fn engine(provider: Arc<RecordingProvider>) -> Engine {
  Engine::new(EngineConfig { parallelism: 4 }, provider)
}

#[tokio::test]
async fn test_linear_chain_resolves_in_dependency_order() {
  let provider = Arc::new(RecordingProvider::default());
  let stack = lock(three_tier());

  let result = engine(provider.clone())
    .evaluate(&stack, CancellationToken::new())
    .await
    .unwrap();

  assert!(result.succeeded());
  assert_eq!(provider.calls(), 3);

  let cmdr = &result.resources["cmdr"];
  let attributes = cmdr.attributes.as_ref().unwrap();
  assert_eq!(attributes["env"], json!("REDIS_HOST=redis-live"));
  assert_eq!(attributes["network"], json!("docker:network::net"));

  match &result.outputs["app_name"] {
    StackOutput::Value(value) => assert_eq!(value, &json!("cmdr-live")),
    other => panic!("expected resolved output, got {other:?}"),
  }
  match &result.outputs["host"] {
    StackOutput::Value(value) => assert_eq!(value, &json!("http://cmdr-live:8081")),
    other => panic!("expected resolved output, got {other:?}"),
  }
}

#[tokio::test]
async fn test_failure_short_circuits_dependents() {
  let provider = Arc::new(RecordingProvider {
    failing: ["redis".to_string()].into_iter().collect(),
    ..Default::default()
  });
  let stack = lock(three_tier());

  let result = engine(provider.clone())
    .evaluate(&stack, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(result.status("net"), Some(ResourceStatus::Succeeded));
  assert_eq!(result.status("redis"), Some(ResourceStatus::Failed));
  assert_eq!(result.status("cmdr"), Some(ResourceStatus::Failed));
  // cmdr's provider is never invoked.
  assert_eq!(provider.calls(), 2);

  let redis_error = result.resources["redis"].error.as_ref().unwrap();
  assert!(matches!(redis_error, NodeFault::Provider { .. }));

  let cmdr_error = result.resources["cmdr"].error.as_ref().unwrap();
  match cmdr_error {
    NodeFault::Dependency { resource, .. } => assert_eq!(resource, "redis"),
    other => panic!("expected dependency fault, got {other:?}"),
  }
  assert!(matches!(
    cmdr_error.root_cause(),
    NodeFault::Provider { resource, .. } if resource == "redis"
  ));
}

#[tokio::test]
async fn test_unrelated_subgraph_continues_after_failure() {
  let provider = Arc::new(RecordingProvider {
    failing: ["bad".to_string()].into_iter().collect(),
    ..Default::default()
  });
  let stack = lock(stack_def(
    "split",
    vec![
      resource("bad", "docker:network", &[]),
      resource(
        "bad_child",
        "docker:container",
        &[("network", reference("bad", "id"))],
      ),
      resource("good", "docker:network", &[]),
      resource(
        "good_child",
        "docker:container",
        &[("network", reference("good", "id"))],
      ),
    ],
  ));

  let result = engine(provider.clone())
    .evaluate(&stack, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(result.status("bad"), Some(ResourceStatus::Failed));
  assert_eq!(result.status("bad_child"), Some(ResourceStatus::Failed));
  assert_eq!(result.status("good"), Some(ResourceStatus::Succeeded));
  assert_eq!(result.status("good_child"), Some(ResourceStatus::Succeeded));
  // bad, good, good_child; never bad_child.
  assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn test_independent_resources_complete_regardless_of_declaration_order() {
  let provider = Arc::new(RecordingProvider::default());
  let stack = lock(stack_def(
    "independent",
    vec![
      resource("second", "docker:network", &[]),
      resource("first", "docker:network", &[]),
    ],
  ));

  let result = engine(provider.clone())
    .evaluate(&stack, CancellationToken::new())
    .await
    .unwrap();

  assert!(result.succeeded());
  assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_cancellation_drains_in_flight_and_marks_unstarted() {
  let cancel = CancellationToken::new();
  let provider = Arc::new(RecordingProvider {
    cancel_on: Some(("redis".to_string(), cancel.clone())),
    ..Default::default()
  });
  let stack = lock(three_tier());

  let result = engine(provider.clone())
    .evaluate(&stack, cancel)
    .await
    .unwrap();

  // In-flight resources keep their true outcome.
  assert_eq!(result.status("net"), Some(ResourceStatus::Succeeded));
  assert_eq!(result.status("redis"), Some(ResourceStatus::Succeeded));
  // Never-started resources are cancelled, not failed.
  assert_eq!(result.status("cmdr"), Some(ResourceStatus::Cancelled));
  assert_eq!(provider.calls(), 2);

  assert!(matches!(
    result.resources["cmdr"].error.as_ref().unwrap(),
    NodeFault::Cancelled { .. }
  ));
  assert!(matches!(
    &result.outputs["app_name"],
    StackOutput::Failed(NodeFault::Cancelled { .. })
  ));
}

#[tokio::test]
async fn test_parallelism_limit_bounds_concurrent_applies() {
  let defs = stack_def(
    "wide",
    (0..4)
      .map(|i| resource(&format!("net{i}"), "docker:network", &[]))
      .collect(),
  );

  let provider = Arc::new(RecordingProvider {
    delay: Some(Duration::from_millis(30)),
    ..Default::default()
  });
  let stack = lock(defs.clone());
  let result = Engine::new(EngineConfig { parallelism: 1 }, provider.clone())
    .evaluate(&stack, CancellationToken::new())
    .await
    .unwrap();

  assert!(result.succeeded());
  assert_eq!(provider.max_in_flight(), 1);

  let provider = Arc::new(RecordingProvider {
    delay: Some(Duration::from_millis(30)),
    ..Default::default()
  });
  let stack = lock(defs);
  let result = Engine::new(EngineConfig { parallelism: 4 }, provider.clone())
    .evaluate(&stack, CancellationToken::new())
    .await
    .unwrap();

  assert!(result.succeeded());
  assert!(provider.max_in_flight() >= 2);
}

#[tokio::test]
async fn test_timeout_fails_resource_and_dependents() {
  let provider = Arc::new(RecordingProvider {
    delay: Some(Duration::from_millis(200)),
    ..Default::default()
  });

  let mut slow = resource("slow", "docker:network", &[]);
  slow.timeout_ms = Some(20);
  let stack = lock(stack_def(
    "timeouts",
    vec![
      slow,
      resource(
        "child",
        "docker:container",
        &[("network", reference("slow", "id"))],
      ),
    ],
  ));

  let result = engine(provider.clone())
    .evaluate(&stack, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(result.status("slow"), Some(ResourceStatus::Failed));
  assert_eq!(result.status("child"), Some(ResourceStatus::Failed));
  assert_eq!(provider.calls(), 1);

  assert!(matches!(
    result.resources["slow"].error.as_ref().unwrap(),
    NodeFault::Timeout { timeout_ms: 20, .. }
  ));
}

#[tokio::test]
async fn test_missing_attribute_fails_referencing_resource() {
  let provider = Arc::new(RecordingProvider {
    withholding: ["net".to_string()].into_iter().collect(),
    ..Default::default()
  });
  let stack = lock(stack_def(
    "missing",
    vec![
      resource("net", "docker:network", &[]),
      resource(
        "redis",
        "docker:container",
        &[("network", reference("net", "id"))],
      ),
    ],
  ));

  let result = engine(provider.clone())
    .evaluate(&stack, CancellationToken::new())
    .await
    .unwrap();

  // The withholding resource itself still succeeds; the reference fails.
  assert_eq!(result.status("net"), Some(ResourceStatus::Succeeded));
  assert_eq!(result.status("redis"), Some(ResourceStatus::Failed));
  assert_eq!(provider.calls(), 1);

  let error = result.resources["redis"].error.as_ref().unwrap();
  assert!(matches!(
    error.root_cause(),
    NodeFault::MissingAttribute { resource, attribute }
      if resource == "net" && attribute == "id"
  ));
}

#[tokio::test]
async fn test_stack_outputs_report_upstream_faults() {
  let provider = Arc::new(RecordingProvider {
    failing: ["redis".to_string()].into_iter().collect(),
    ..Default::default()
  });
  let stack = lock(three_tier());

  let result = engine(provider)
    .evaluate(&stack, CancellationToken::new())
    .await
    .unwrap();

  match &result.outputs["app_name"] {
    StackOutput::Failed(fault) => {
      assert!(matches!(
        fault.root_cause(),
        NodeFault::Provider { resource, .. } if resource == "redis"
      ));
    }
    other => panic!("expected failed output, got {other:?}"),
  }
}

#[tokio::test]
async fn test_empty_stack_evaluates_to_empty_report() {
  let provider = Arc::new(RecordingProvider::default());
  let stack = lock(stack_def("empty", Vec::new()));

  let result = engine(provider.clone())
    .evaluate(&stack, CancellationToken::new())
    .await
    .unwrap();

  assert!(result.succeeded());
  assert!(result.resources.is_empty());
  assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_notifier_observes_lifecycle_in_dependency_order() {
  let provider = Arc::new(RecordingProvider::default());
  let stack = lock(three_tier());

  let (notifier, mut receiver) = ChannelNotifier::new();
  let engine = Engine::with_notifier(EngineConfig { parallelism: 4 }, provider, notifier);

  let result = engine
    .evaluate(&stack, CancellationToken::new())
    .await
    .unwrap();
  assert!(result.succeeded());

  let mut events = Vec::new();
  while let Ok(event) = receiver.try_recv() {
    events.push(event);
  }

  assert!(matches!(
    events.first(),
    Some(EvaluationEvent::EvaluationStarted { .. })
  ));
  assert!(matches!(
    events.last(),
    Some(EvaluationEvent::EvaluationCompleted { .. })
  ));

  let started: Vec<&String> = events
    .iter()
    .filter_map(|event| match event {
      EvaluationEvent::ResourceStarted { resource, .. } => Some(resource),
      _ => None,
    })
    .collect();
  assert_eq!(started, [&"net".to_string(), &"redis".to_string(), &"cmdr".to_string()]);
}
