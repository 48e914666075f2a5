//! Stack evaluation engine.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use quarry_graph::{Node, NodeFault, Stack};
use quarry_provider::Provider;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::EngineError;
use crate::events::{EvaluationEvent, EvaluationNotifier, NoopNotifier};
use crate::input::{resolve_attributes, resolve_settled};
use crate::report::{EvaluationResult, ResourceReport, ResourceStatus, StackOutput};

/// Configuration for the evaluation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Maximum number of resources applied concurrently.
  pub parallelism: usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self { parallelism: 8 }
  }
}

/// The stack evaluation engine.
///
/// Generic over `N: EvaluationNotifier` to allow different notification
/// strategies. Use `Engine::new()` for a default engine with no-op
/// notifications, or `Engine::with_notifier()` to provide a custom notifier.
pub struct Engine<N: EvaluationNotifier = NoopNotifier> {
  provider: Arc<dyn Provider>,
  config: EngineConfig,
  notifier: N,
}

impl Engine<NoopNotifier> {
  /// Create a new engine with no-op notifications.
  pub fn new(config: EngineConfig, provider: Arc<dyn Provider>) -> Self {
    Self::with_notifier(config, provider, NoopNotifier)
  }
}

impl<N: EvaluationNotifier> Engine<N> {
  /// Create a new engine with a custom notifier.
  pub fn with_notifier(config: EngineConfig, provider: Arc<dyn Provider>, notifier: N) -> Self {
    Self {
      provider,
      config,
      notifier,
    }
  }

  /// Evaluate a locked stack.
  ///
  /// Every resource ends in a terminal status; the returned report carries
  /// all of them, along with the stack's declared outputs.
  #[instrument(
    name = "stack_evaluate",
    skip(self, stack, cancel),
    fields(stack_id = %stack.stack_id)
  )]
  pub async fn evaluate(
    &self,
    stack: &Stack,
    cancel: CancellationToken,
  ) -> Result<EvaluationResult, EngineError> {
    let evaluation_id = uuid::Uuid::new_v4().to_string();

    info!(
      evaluation_id = %evaluation_id,
      stack_id = %stack.stack_id,
      resources = stack.len(),
      "evaluation_started"
    );
    self.notifier.notify(EvaluationEvent::EvaluationStarted {
      evaluation_id: evaluation_id.clone(),
      stack_id: stack.stack_id.clone(),
    });

    let evaluation = Evaluation::new(
      stack,
      Arc::clone(&self.provider),
      &self.notifier,
      &self.config,
      evaluation_id.clone(),
    );
    let result = evaluation.run(cancel).await;

    match &result {
      Ok(report) => {
        info!(
          evaluation_id = %evaluation_id,
          succeeded = report.succeeded(),
          "evaluation_completed"
        );
        self
          .notifier
          .notify(EvaluationEvent::EvaluationCompleted { evaluation_id });
      }
      Err(e) => {
        error!(
          evaluation_id = %evaluation_id,
          error = %e,
          "evaluation_failed"
        );
      }
    }

    result
  }
}

/// Outcome of one resource's worker task.
struct NodeOutcome {
  name: String,
  result: Result<Map<String, Value>, NodeFault>,
}

/// Mutable state of one evaluation run.
struct Evaluation<'a, N: EvaluationNotifier> {
  stack: &'a Stack,
  provider: Arc<dyn Provider>,
  notifier: &'a N,
  evaluation_id: String,
  semaphore: Arc<Semaphore>,
  /// Resource name -> declaration index.
  index_of: HashMap<String, usize>,
  /// Unresolved upstream count per declaration index.
  remaining: Vec<usize>,
  /// Declaration indices of resources ready to dispatch; ordered, so ties
  /// among independent resources go to the earliest declaration.
  ready: BTreeSet<usize>,
  statuses: HashMap<String, ResourceStatus>,
  faults: HashMap<String, NodeFault>,
  attributes: HashMap<String, Map<String, Value>>,
  handles: FuturesUnordered<JoinHandle<NodeOutcome>>,
  cancelled: bool,
}

impl<'a, N: EvaluationNotifier> Evaluation<'a, N> {
  fn new(
    stack: &'a Stack,
    provider: Arc<dyn Provider>,
    notifier: &'a N,
    config: &EngineConfig,
    evaluation_id: String,
  ) -> Self {
    let graph = stack.graph();

    let index_of: HashMap<String, usize> = stack
      .order()
      .iter()
      .enumerate()
      .map(|(index, name)| (name.clone(), index))
      .collect();

    let remaining: Vec<usize> = stack
      .order()
      .iter()
      .map(|name| graph.upstream(name).len())
      .collect();

    let ready: BTreeSet<usize> = remaining
      .iter()
      .enumerate()
      .filter(|(_, count)| **count == 0)
      .map(|(index, _)| index)
      .collect();

    let statuses: HashMap<String, ResourceStatus> = stack
      .order()
      .iter()
      .map(|name| (name.clone(), ResourceStatus::NotStarted))
      .collect();

    Self {
      stack,
      provider,
      notifier,
      evaluation_id,
      semaphore: Arc::new(Semaphore::new(config.parallelism.max(1))),
      index_of,
      remaining,
      ready,
      statuses,
      faults: HashMap::new(),
      attributes: HashMap::new(),
      handles: FuturesUnordered::new(),
      cancelled: false,
    }
  }

  /// Run the evaluation loop until every reachable resource has settled.
  async fn run(mut self, cancel: CancellationToken) -> Result<EvaluationResult, EngineError> {
    loop {
      if !self.cancelled && cancel.is_cancelled() {
        self.cancelled = true;
      }
      if !self.cancelled {
        self.dispatch_ready();
      }
      if self.handles.is_empty() {
        break;
      }

      tokio::select! {
        joined = self.handles.next() => {
          if let Some(joined) = joined {
            let outcome = joined.map_err(|e| EngineError::Worker {
              message: e.to_string(),
            })?;
            self.handle_outcome(outcome);
          }
        }
        _ = cancel.cancelled(), if !self.cancelled => {
          self.cancelled = true;
          warn!(
            evaluation_id = %self.evaluation_id,
            in_flight = self.handles.len(),
            "evaluation cancelled; draining in-flight resources"
          );
        }
      }
    }

    Ok(self.finalize())
  }

  /// Spawn a worker for every ready resource, in declaration order.
  fn dispatch_ready(&mut self) {
    while let Some(index) = self.ready.pop_first() {
      let name = self.stack.order()[index].clone();
      let Some(node) = self.stack.node(&name) else {
        continue;
      };

      info!(
        evaluation_id = %self.evaluation_id,
        resource = %name,
        kind = %node.kind,
        "resource_started"
      );
      self.notifier.notify(EvaluationEvent::ResourceStarted {
        evaluation_id: self.evaluation_id.clone(),
        resource: name.clone(),
      });

      let node = node.clone();
      let provider = Arc::clone(&self.provider);
      let semaphore = Arc::clone(&self.semaphore);
      self.handles.push(tokio::spawn(async move {
        // The semaphore is never closed; permits only bound concurrency.
        let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
        let result = run_node(&node, provider.as_ref()).await;
        NodeOutcome { name, result }
      }));
    }
  }

  fn handle_outcome(&mut self, outcome: NodeOutcome) {
    let NodeOutcome { name, result } = outcome;
    match result {
      Ok(applied) => {
        info!(
          evaluation_id = %self.evaluation_id,
          resource = %name,
          "resource_succeeded"
        );
        self.notifier.notify(EvaluationEvent::ResourceSucceeded {
          evaluation_id: self.evaluation_id.clone(),
          resource: name.clone(),
          attributes: applied.clone(),
        });
        self.statuses.insert(name.clone(), ResourceStatus::Succeeded);
        self.attributes.insert(name.clone(), applied);

        let stack = self.stack;
        for dependent in stack.graph().downstream(&name) {
          if !matches!(
            self.statuses.get(dependent),
            Some(ResourceStatus::NotStarted)
          ) {
            continue;
          }
          let index = self.index_of[dependent];
          self.remaining[index] -= 1;
          if self.remaining[index] == 0 {
            self.ready.insert(index);
          }
        }
      }
      Err(fault) => {
        error!(
          evaluation_id = %self.evaluation_id,
          resource = %name,
          error = %fault,
          "resource_failed"
        );
        self.notifier.notify(EvaluationEvent::ResourceFailed {
          evaluation_id: self.evaluation_id.clone(),
          resource: name.clone(),
          error: fault.to_string(),
        });
        self.statuses.insert(name.clone(), ResourceStatus::Failed);
        self.faults.insert(name.clone(), fault);
        self.propagate_failure(&name);
      }
    }
  }

  /// Fail every transitive dependent of a failed resource without invoking
  /// its provider, chaining the upstream fault.
  fn propagate_failure(&mut self, failed: &str) {
    let stack = self.stack;
    let graph = stack.graph();
    let mut queue: Vec<String> = vec![failed.to_string()];

    while let Some(current) = queue.pop() {
      let Some(cause) = self.faults.get(&current).cloned() else {
        continue;
      };

      for dependent in graph.downstream(&current) {
        if !matches!(
          self.statuses.get(dependent),
          Some(ResourceStatus::NotStarted)
        ) {
          continue;
        }

        let fault = NodeFault::Dependency {
          resource: current.clone(),
          source: Box::new(cause.clone()),
        };

        error!(
          evaluation_id = %self.evaluation_id,
          resource = %dependent,
          error = %fault,
          "resource_failed"
        );
        self.notifier.notify(EvaluationEvent::ResourceFailed {
          evaluation_id: self.evaluation_id.clone(),
          resource: dependent.clone(),
          error: fault.to_string(),
        });

        if let Some(node) = stack.node(dependent) {
          for (_, cell) in node.outputs() {
            let _ = cell.fail(fault.clone());
          }
        }

        self.statuses.insert(dependent.clone(), ResourceStatus::Failed);
        self.faults.insert(dependent.clone(), fault);
        self.ready.remove(&self.index_of[dependent]);
        queue.push(dependent.clone());
      }
    }
  }

  /// Settle everything that never ran and assemble the report.
  fn finalize(mut self) -> EvaluationResult {
    let stack = self.stack;

    if self.cancelled {
      for name in stack.order() {
        if !matches!(self.statuses.get(name), Some(ResourceStatus::NotStarted)) {
          continue;
        }
        let fault = NodeFault::Cancelled {
          resource: name.clone(),
        };
        if let Some(node) = stack.node(name) {
          for (_, cell) in node.outputs() {
            let _ = cell.fail(fault.clone());
          }
        }
        warn!(
          evaluation_id = %self.evaluation_id,
          resource = %name,
          "resource_cancelled"
        );
        self.notifier.notify(EvaluationEvent::ResourceCancelled {
          evaluation_id: self.evaluation_id.clone(),
          resource: name.clone(),
        });
        self.statuses.insert(name.clone(), ResourceStatus::Cancelled);
        self.faults.insert(name.clone(), fault);
      }
    }

    let mut outputs = BTreeMap::new();
    for (output_name, binding) in stack.outputs() {
      let output = match resolve_settled("outputs", output_name, binding) {
        Ok(value) => StackOutput::Value(value),
        Err(fault) => StackOutput::Failed(fault),
      };
      outputs.insert(output_name.clone(), output);
    }

    let mut resources = BTreeMap::new();
    for name in stack.order() {
      let status = self
        .statuses
        .get(name)
        .copied()
        .unwrap_or(ResourceStatus::NotStarted);
      resources.insert(
        name.clone(),
        ResourceReport {
          status,
          attributes: self.attributes.remove(name),
          error: self.faults.remove(name),
        },
      );
    }

    EvaluationResult {
      evaluation_id: self.evaluation_id,
      resources,
      outputs,
    }
  }
}

/// Resolve inputs, apply through the provider, and settle the node's output
/// cells.
///
/// Output cells are written here and nowhere else while the node is live;
/// dependents only ever read them.
async fn run_node(node: &Node, provider: &dyn Provider) -> Result<Map<String, Value>, NodeFault> {
  match apply_node(node, provider).await {
    Ok(applied) => {
      for (attribute, cell) in node.outputs() {
        match applied.get(attribute) {
          Some(value) => {
            let _ = cell.resolve(value.clone());
          }
          None => {
            let _ = cell.fail(NodeFault::MissingAttribute {
              resource: node.name.clone(),
              attribute: attribute.to_string(),
            });
          }
        }
      }
      Ok(applied)
    }
    Err(fault) => {
      for (_, cell) in node.outputs() {
        let _ = cell.fail(fault.clone());
      }
      Err(fault)
    }
  }
}

async fn apply_node(node: &Node, provider: &dyn Provider) -> Result<Map<String, Value>, NodeFault> {
  let attributes = resolve_attributes(node).await?;

  let call = provider.apply(&node.kind, &node.name, attributes);
  let applied = match node.timeout_ms {
    Some(timeout_ms) => tokio::time::timeout(Duration::from_millis(timeout_ms), call)
      .await
      .map_err(|_| NodeFault::Timeout {
        resource: node.name.clone(),
        timeout_ms,
      })?,
    None => call.await,
  };

  applied.map_err(|e| NodeFault::Provider {
    resource: node.name.clone(),
    message: e.to_string(),
  })
}
