//! Turning folded abstract constants back into IR nodes.

use crate::ir::{ConstantValue, CpsGraph, NodeId, NodeKind};
use crate::opt::internal_error;

/// Materialize a primitive constant as a fresh `Constant` node.
///
/// The analyzer only ever folds to bool, int, double, null, or string;
/// being handed a composite constant means a folding rule is broken, and
/// compilation aborts.
pub fn materialize_constant(graph: &mut CpsGraph, value: ConstantValue) -> NodeId {
    if !value.is_primitive() {
        internal_error(
            "materialize_constant",
            "composite constants cannot be materialized",
        );
    }
    graph.add_node(NodeKind::Constant { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materializes_primitives() {
        let mut graph = CpsGraph::new();
        for value in [
            ConstantValue::Bool(true),
            ConstantValue::Int(42),
            ConstantValue::Double(2.5),
            ConstantValue::Null,
            ConstantValue::string("hello"),
        ] {
            let node = materialize_constant(&mut graph, value.clone());
            match &graph.node(node).kind {
                NodeKind::Constant { value: stored } => assert_eq!(*stored, value),
                other => panic!("expected Constant, got {}", other.name()),
            }
        }
    }

    #[test]
    #[should_panic(expected = "internal compiler error")]
    fn test_rejects_composite_constants() {
        let mut graph = CpsGraph::new();
        materialize_constant(&mut graph, ConstantValue::List(vec![]));
    }

    #[test]
    #[should_panic(expected = "internal compiler error")]
    fn test_rejects_function_constants() {
        let mut graph = CpsGraph::new();
        let mut world = crate::ir::ClassWorld::new();
        let f = world.add_function("main");
        materialize_constant(&mut graph, ConstantValue::Function(f));
    }
}
