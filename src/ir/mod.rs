//! Continuation-passing-style intermediate representation.
//!
//! Storage follows an arena + typed-index model: the graph owns nodes and
//! references, while parent pointers and use-lists are index-valued
//! back-edges. See [`graph::CpsGraph`] for the maintained invariants.

pub mod arena;
pub mod builder;
pub mod constant;
pub mod graph;
pub mod node;
pub mod world;

pub use arena::{Arena, Id};
pub use builder::CpsBuilder;
pub use constant::ConstantValue;
pub use graph::CpsGraph;
pub use node::{Args, Node, NodeId, NodeKind, RefId, Reference, TypeOp};
pub use world::{ClassId, ClassWorld, CoreClasses, FieldId, FunctionId, Selector};
