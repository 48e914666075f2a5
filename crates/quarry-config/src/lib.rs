//! Quarry Config
//!
//! This crate contains the serializable stack declaration types for quarry.
//! A stack declares a set of resources with literal, referenced, or templated
//! inputs; it never declares edges. Dependency edges are derived from the
//! references when the stack is locked for evaluation.
//!
//! Declarations can be loaded from JSON files (via the CLI with
//! `quarry up stack.json`) or built programmatically.

mod input;
mod resource;
mod stack;

pub use input::{InputValue, OutputRef};
pub use resource::ResourceDef;
pub use stack::StackDef;
