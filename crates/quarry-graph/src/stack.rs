use std::collections::{BTreeMap, HashMap, HashSet};

use minijinja::Environment;
use quarry_config::{InputValue, OutputRef, StackDef};

use crate::error::GraphError;
use crate::graph::Graph;
use crate::node::{BoundRef, InputBinding, Node};

/// Referrer label used for stack output bindings in error messages.
const OUTPUTS_REFERRER: &str = "outputs";

/// A locked stack ready for evaluation.
///
/// Locking validates the declaration: duplicate names, dangling references,
/// and dependency cycles are all rejected here, before any provider call.
#[derive(Debug)]
pub struct Stack {
  pub stack_id: String,
  pub name: String,
  nodes: HashMap<String, Node>,
  order: Vec<String>,
  edges: Vec<(String, String)>,
  graph: Graph,
  outputs: BTreeMap<String, InputBinding>,
}

impl Stack {
  /// Validate a declaration and derive its dependency structure.
  ///
  /// Every input reference materializes an output cell on the referenced
  /// node and contributes an edge; the resulting edge set must be acyclic.
  pub fn lock(def: StackDef) -> Result<Self, GraphError> {
    let mut nodes: HashMap<String, Node> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    // Register every resource first so references may point forward.
    for resource in &def.resources {
      if nodes.contains_key(&resource.name) {
        return Err(GraphError::DuplicateResource(resource.name.clone()));
      }
      nodes.insert(
        resource.name.clone(),
        Node::new(
          resource.name.clone(),
          resource.kind.clone(),
          resource.timeout_ms,
          order.len(),
        ),
      );
      order.push(resource.name.clone());
    }

    // Scan references, materialize output cells, derive edges.
    let mut edges: Vec<(String, String)> = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for resource in def.resources {
      let mut bindings = BTreeMap::new();
      for (input_name, value) in resource.inputs {
        let binding = bind_input(&resource.name, &input_name, &value, &mut nodes)?;
        for reference in binding.references() {
          let edge = (reference.resource.clone(), resource.name.clone());
          if seen.insert(edge.clone()) {
            edges.push(edge);
          }
        }
        bindings.insert(input_name, binding);
      }
      nodes
        .get_mut(&resource.name)
        .expect("resource registered above")
        .set_inputs(bindings);
    }

    let graph = Graph::new(order.clone(), edges.clone());
    graph.topological_order()?;

    let mut outputs = BTreeMap::new();
    for (output_name, value) in def.outputs {
      let binding = bind_input(OUTPUTS_REFERRER, &output_name, &value, &mut nodes)?;
      outputs.insert(output_name, binding);
    }

    Ok(Self {
      stack_id: def.stack_id,
      name: def.name,
      nodes,
      order,
      edges,
      graph,
      outputs,
    })
  }

  pub fn node(&self, name: &str) -> Option<&Node> {
    self.nodes.get(name)
  }

  /// Nodes in declaration order.
  pub fn nodes(&self) -> impl Iterator<Item = &Node> {
    self.order.iter().filter_map(|name| self.nodes.get(name))
  }

  /// Node names in declaration order.
  pub fn order(&self) -> &[String] {
    &self.order
  }

  /// Derived edges, deduplicated, as `(from, to)` pairs.
  pub fn edges(&self) -> &[(String, String)] {
    &self.edges
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  /// Declared stack outputs, lowered to bindings.
  pub fn outputs(&self) -> &BTreeMap<String, InputBinding> {
    &self.outputs
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }
}

/// Lower a declared input into a binding, materializing output cells for
/// every reference.
fn bind_input(
  referrer: &str,
  input: &str,
  value: &InputValue,
  nodes: &mut HashMap<String, Node>,
) -> Result<InputBinding, GraphError> {
  match value {
    InputValue::Literal(literal) => Ok(InputBinding::Literal(literal.clone())),
    InputValue::Ref(target) => Ok(InputBinding::Output(bind_ref(
      referrer, input, target, nodes,
    )?)),
    InputValue::Template(source) => {
      let targets = scan_template(referrer, input, source)?;
      let references = targets
        .iter()
        .map(|target| bind_ref(referrer, input, target, nodes))
        .collect::<Result<Vec<_>, _>>()?;
      Ok(InputBinding::Template {
        source: source.clone(),
        references,
      })
    }
  }
}

fn bind_ref(
  referrer: &str,
  input: &str,
  target: &OutputRef,
  nodes: &mut HashMap<String, Node>,
) -> Result<BoundRef, GraphError> {
  let node = nodes
    .get_mut(&target.resource)
    .ok_or_else(|| GraphError::UnresolvedReference {
      referrer: format!("{referrer}.{input}"),
      resource: target.resource.clone(),
      attribute: target.attribute.clone(),
    })?;
  let cell = node.ensure_output(&target.attribute);
  Ok(BoundRef {
    target: target.clone(),
    cell,
  })
}

/// Compile a template and turn its undeclared variables into references.
///
/// Variables must be `resource.attribute` paths; deeper paths index into the
/// attribute value at render time.
fn scan_template(
  referrer: &str,
  input: &str,
  source: &str,
) -> Result<Vec<OutputRef>, GraphError> {
  let env = Environment::new();
  let template =
    env
      .template_from_str(source)
      .map_err(|e| GraphError::InvalidTemplate {
        referrer: referrer.to_string(),
        input: input.to_string(),
        message: e.to_string(),
      })?;

  // HashSet order is unstable; sort so the derived reference order is
  // deterministic.
  let mut paths: Vec<String> = template.undeclared_variables(true).into_iter().collect();
  paths.sort();

  let mut references: Vec<OutputRef> = Vec::new();
  for path in paths {
    let mut parts = path.splitn(3, '.');
    let resource = parts.next().unwrap_or_default();
    let Some(attribute) = parts.next() else {
      return Err(GraphError::InvalidTemplate {
        referrer: referrer.to_string(),
        input: input.to_string(),
        message: format!(
          "variable '{path}' must reference an output as 'resource.attribute'"
        ),
      });
    };
    let reference = OutputRef {
      resource: resource.to_string(),
      attribute: attribute.to_string(),
    };
    if !references.contains(&reference) {
      references.push(reference);
    }
  }

  Ok(references)
}
