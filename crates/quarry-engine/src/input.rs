//! Input resolution against upstream output cells.
//!
//! Literal inputs are substituted as-is. Referenced inputs read the upstream
//! cell, suspending until it settles. Template inputs are rendered with
//! minijinja against a context keyed by resource name:
//!
//! ```json
//! { "redis": { "name": "redis-1a2b" } }
//! ```
//!
//! so `REDIS_HOST={{ redis.name }}` resolves once `redis` has been applied.
//! Rendered templates always produce JSON strings.

use std::collections::BTreeMap;

use minijinja::Environment;
use quarry_graph::{BoundRef, InputBinding, Node, NodeFault};
use serde_json::{Map, Value};

/// Resolve a node's inputs into the attribute map passed to the provider.
///
/// Suspends until every referenced cell has settled; a failed upstream cell
/// fails the whole resolution with a `Dependency` fault.
pub(crate) async fn resolve_attributes(node: &Node) -> Result<Map<String, Value>, NodeFault> {
  let mut attributes = Map::new();
  for (input_name, binding) in &node.inputs {
    let value = resolve_binding(&node.name, input_name, binding).await?;
    attributes.insert(input_name.clone(), value);
  }
  Ok(attributes)
}

/// Resolve a single binding, suspending on unresolved cells.
async fn resolve_binding(
  owner: &str,
  input: &str,
  binding: &InputBinding,
) -> Result<Value, NodeFault> {
  match binding {
    InputBinding::Literal(value) => Ok(value.clone()),
    InputBinding::Output(bound) => await_value(bound).await,
    InputBinding::Template { source, references } => {
      let mut context: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
      for bound in references {
        let value = await_value(bound).await?;
        context
          .entry(bound.target.resource.clone())
          .or_default()
          .insert(bound.target.attribute.clone(), value);
      }
      render(owner, input, source, &context)
    }
  }
}

/// Resolve a binding whose cells have all settled, without suspending.
///
/// Used after evaluation has halted; an unsettled cell at that point belongs
/// to a resource that never ran.
pub(crate) fn resolve_settled(
  owner: &str,
  input: &str,
  binding: &InputBinding,
) -> Result<Value, NodeFault> {
  match binding {
    InputBinding::Literal(value) => Ok(value.clone()),
    InputBinding::Output(bound) => settled_value(bound),
    InputBinding::Template { source, references } => {
      let mut context: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
      for bound in references {
        let value = settled_value(bound)?;
        context
          .entry(bound.target.resource.clone())
          .or_default()
          .insert(bound.target.attribute.clone(), value);
      }
      render(owner, input, source, &context)
    }
  }
}

async fn await_value(bound: &BoundRef) -> Result<Value, NodeFault> {
  bound.cell.ready().await.map_err(|fault| NodeFault::Dependency {
    resource: bound.target.resource.clone(),
    source: Box::new(fault),
  })
}

fn settled_value(bound: &BoundRef) -> Result<Value, NodeFault> {
  match bound.cell.try_get() {
    Some(Ok(value)) => Ok(value),
    Some(Err(fault)) => Err(NodeFault::Dependency {
      resource: bound.target.resource.clone(),
      source: Box::new(fault),
    }),
    None => Err(NodeFault::Cancelled {
      resource: bound.target.resource.clone(),
    }),
  }
}

fn render(
  owner: &str,
  input: &str,
  source: &str,
  context: &BTreeMap<String, Map<String, Value>>,
) -> Result<Value, NodeFault> {
  let env = Environment::new();
  env
    .render_str(source, minijinja::Value::from_serialize(context))
    .map(Value::String)
    .map_err(|e| NodeFault::InputResolution {
      resource: owner.to_string(),
      input: input.to_string(),
      message: e.to_string(),
    })
}
