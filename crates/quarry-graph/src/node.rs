use std::collections::{BTreeMap, HashMap};
use std::slice;

use quarry_cell::Cell;
use quarry_config::OutputRef;
use serde_json::Value;

use crate::fault::NodeFault;

/// Output cell of a resource: the attribute value, or the fault that
/// prevented it.
pub type OutputCell = Cell<Value, NodeFault>;

/// A reference bound to the cell it points at.
#[derive(Debug, Clone)]
pub struct BoundRef {
  pub target: OutputRef,
  pub cell: OutputCell,
}

/// A resource input after locking.
#[derive(Debug, Clone)]
pub enum InputBinding {
  /// A literal value, substituted as-is.
  Literal(Value),
  /// Another resource's output cell.
  Output(BoundRef),
  /// A template rendered against the referenced outputs once they resolve.
  Template {
    source: String,
    references: Vec<BoundRef>,
  },
}

impl InputBinding {
  /// The references this binding contributes to the edge set.
  pub fn references(&self) -> impl Iterator<Item = &OutputRef> {
    let bound: &[BoundRef] = match self {
      InputBinding::Literal(_) => &[],
      InputBinding::Output(bound) => slice::from_ref(bound),
      InputBinding::Template { references, .. } => references,
    };
    bound.iter().map(|b| &b.target)
  }
}

/// A locked resource node.
///
/// Output cells exist from construction onward, so dependents can hold them
/// before this node has run. Each cell is written exactly once, by the
/// evaluation step of its owning node.
#[derive(Debug, Clone)]
pub struct Node {
  pub name: String,
  pub kind: String,
  pub inputs: BTreeMap<String, InputBinding>,
  pub timeout_ms: Option<u64>,
  outputs: HashMap<String, OutputCell>,
  index: usize,
}

impl Node {
  pub(crate) fn new(name: String, kind: String, timeout_ms: Option<u64>, index: usize) -> Self {
    Self {
      name,
      kind,
      inputs: BTreeMap::new(),
      timeout_ms,
      outputs: HashMap::new(),
      index,
    }
  }

  /// The cell for a referenced output attribute, creating it if this is the
  /// first reference.
  pub(crate) fn ensure_output(&mut self, attribute: &str) -> OutputCell {
    self
      .outputs
      .entry(attribute.to_string())
      .or_insert_with(Cell::new)
      .clone()
  }

  pub(crate) fn set_inputs(&mut self, inputs: BTreeMap<String, InputBinding>) {
    self.inputs = inputs;
  }

  /// The cell for an output attribute, if anything references it.
  pub fn output(&self, attribute: &str) -> Option<&OutputCell> {
    self.outputs.get(attribute)
  }

  /// All referenced output attributes and their cells.
  pub fn outputs(&self) -> impl Iterator<Item = (&str, &OutputCell)> {
    self.outputs.iter().map(|(name, cell)| (name.as_str(), cell))
  }

  /// Every upstream reference across all inputs.
  pub fn references(&self) -> impl Iterator<Item = &OutputRef> {
    self.inputs.values().flat_map(|binding| binding.references())
  }

  /// Position in declaration order; ties among independent resources are
  /// broken by this.
  pub fn declaration_index(&self) -> usize {
    self.index
  }
}
