//! Quarry Graph
//!
//! This crate provides the locked resource graph for quarry. Locking a
//! [`StackDef`](quarry_config::StackDef) validates it and derives the
//! dependency structure the evaluator needs:
//!
//! - every input reference is scanned, so edges come from data dependencies
//!   rather than declaration order;
//! - each referenced output materializes a [`Cell`](quarry_cell::Cell) on the
//!   owning node, so dependents hold the output before the node has run;
//! - duplicate names, dangling references, and cycles are construction-time
//!   errors, reported before any provider is called.

mod error;
mod fault;
mod graph;
mod node;
mod stack;

pub use error::GraphError;
pub use fault::NodeFault;
pub use graph::Graph;
pub use node::{BoundRef, InputBinding, Node, OutputCell};
pub use stack::Stack;
