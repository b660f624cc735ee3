//! Construction helpers for CPS programs.
//!
//! The builder wraps a [`CpsGraph`] and wires references as nodes are
//! created, so callers deal only in definitions. Finish by installing the
//! root body, which also runs the parent walk.

use crate::opt::internal_error;

use super::constant::ConstantValue;
use super::graph::CpsGraph;
use super::node::{Args, NodeId, NodeKind, TypeOp};
use super::world::{ClassId, FieldId, FunctionId, Selector};

pub struct CpsBuilder {
    graph: CpsGraph,
}

impl CpsBuilder {
    pub fn new() -> Self {
        CpsBuilder {
            graph: CpsGraph::new(),
        }
    }

    /// The root's return continuation (one parameter, no body).
    pub fn return_cont(&self) -> NodeId {
        self.graph.return_cont()
    }

    /// Append a fresh parameter to the root.
    pub fn add_root_param(&mut self) -> NodeId {
        let root = self.graph.root();
        let index = match &self.graph.node(root).kind {
            NodeKind::Root { params, .. } => params.len() as u32,
            other => internal_error(other.name(), "root node has non-root kind"),
        };
        let param = self.graph.add_node(NodeKind::Parameter { index });
        match &mut self.graph.node_mut(root).kind {
            NodeKind::Root { params, .. } => params.push(param),
            other => internal_error(other.name(), "root node has non-root kind"),
        }
        param
    }

    fn args(&mut self, defs: &[NodeId]) -> Args {
        defs.iter().map(|&d| self.graph.new_ref(d)).collect()
    }

    // =========================================================================
    // Definitions
    // =========================================================================

    pub fn constant(&mut self, value: ConstantValue) -> NodeId {
        self.graph.add_node(NodeKind::Constant { value })
    }

    /// A continuation with `param_count` fresh parameters and no body yet.
    pub fn continuation(&mut self, param_count: usize) -> NodeId {
        let params: Vec<NodeId> = (0..param_count)
            .map(|i| {
                self.graph
                    .add_node(NodeKind::Parameter { index: i as u32 })
            })
            .collect();
        self.graph
            .add_node(NodeKind::Continuation { params, body: None })
    }

    pub fn cont_param(&self, cont: NodeId, index: usize) -> NodeId {
        match &self.graph.node(cont).kind {
            NodeKind::Continuation { params, .. } => params[index],
            other => internal_error(other.name(), "expected a continuation"),
        }
    }

    pub fn set_cont_body(&mut self, cont: NodeId, body: NodeId) {
        match &mut self.graph.node_mut(cont).kind {
            NodeKind::Continuation { body: slot, .. } => *slot = Some(body),
            other => internal_error(other.name(), "expected a continuation"),
        }
    }

    pub fn mutable_variable(&mut self) -> NodeId {
        self.graph.add_node(NodeKind::MutableVariable)
    }

    pub fn create_function(&mut self, function: FunctionId) -> NodeId {
        self.graph.add_node(NodeKind::CreateFunction { function })
    }

    pub fn literal_list(&mut self, items: &[NodeId]) -> NodeId {
        let items = self.args(items);
        self.graph.add_node(NodeKind::LiteralList { items })
    }

    pub fn literal_map(&mut self, keys: &[NodeId], values: &[NodeId]) -> NodeId {
        let keys = self.args(keys);
        let values = self.args(values);
        self.graph.add_node(NodeKind::LiteralMap { keys, values })
    }

    pub fn create_box(&mut self) -> NodeId {
        self.graph.add_node(NodeKind::CreateBox)
    }

    pub fn create_instance(&mut self, class: ClassId, args: &[NodeId]) -> NodeId {
        let args = self.args(args);
        self.graph.add_node(NodeKind::CreateInstance { class, args })
    }

    pub fn interceptor(&mut self, input: NodeId) -> NodeId {
        let input = self.graph.new_ref(input);
        self.graph.add_node(NodeKind::Interceptor { input })
    }

    pub fn create_invocation_mirror(&mut self, selector: Selector, args: &[NodeId]) -> NodeId {
        let args = self.args(args);
        self.graph
            .add_node(NodeKind::CreateInvocationMirror { selector, args })
    }

    pub fn reify_type_var(&mut self, index: u32) -> NodeId {
        self.graph.add_node(NodeKind::ReifyTypeVar { index })
    }

    pub fn reify_runtime_type(&mut self, value: NodeId) -> NodeId {
        let value = self.graph.new_ref(value);
        self.graph.add_node(NodeKind::ReifyRuntimeType { value })
    }

    pub fn read_type_variable(&mut self, index: u32, target: NodeId) -> NodeId {
        let target = self.graph.new_ref(target);
        self.graph
            .add_node(NodeKind::ReadTypeVariable { index, target })
    }

    pub fn type_expression(&mut self, arguments: &[NodeId]) -> NodeId {
        let arguments = self.args(arguments);
        self.graph.add_node(NodeKind::TypeExpression { arguments })
    }

    pub fn get_field(&mut self, object: NodeId, field: FieldId) -> NodeId {
        let object = self.graph.new_ref(object);
        self.graph.add_node(NodeKind::GetField { object, field })
    }

    pub fn get_static(&mut self, field: FieldId) -> NodeId {
        self.graph.add_node(NodeKind::GetStatic { field })
    }

    pub fn get_mutable(&mut self, variable: NodeId) -> NodeId {
        let variable = self.graph.new_ref(variable);
        self.graph.add_node(NodeKind::GetMutable { variable })
    }

    pub fn identical(&mut self, left: NodeId, right: NodeId) -> NodeId {
        let left = self.graph.new_ref(left);
        let right = self.graph.new_ref(right);
        self.graph.add_node(NodeKind::Identical { left, right })
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    pub fn let_prim(&mut self, prim: NodeId, body: NodeId) -> NodeId {
        self.graph.add_node(NodeKind::LetPrim { prim, body })
    }

    pub fn let_cont(&mut self, cont: NodeId, body: NodeId) -> NodeId {
        self.graph.add_node(NodeKind::LetCont { cont, body })
    }

    pub fn let_handler(&mut self, handler: NodeId, body: NodeId) -> NodeId {
        self.graph.add_node(NodeKind::LetHandler { handler, body })
    }

    pub fn let_mutable(&mut self, variable: NodeId, value: NodeId, body: NodeId) -> NodeId {
        let value = self.graph.new_ref(value);
        self.graph.add_node(NodeKind::LetMutable {
            variable,
            value,
            body,
        })
    }

    pub fn declare_function(
        &mut self,
        variable: NodeId,
        function: FunctionId,
        body: NodeId,
    ) -> NodeId {
        self.graph.add_node(NodeKind::DeclareFunction {
            variable,
            function,
            body,
        })
    }

    pub fn invoke_continuation(&mut self, cont: NodeId, args: &[NodeId]) -> NodeId {
        let cont = self.graph.new_ref(cont);
        let args = self.args(args);
        self.graph
            .add_node(NodeKind::InvokeContinuation { cont, args })
    }

    pub fn invoke_static(&mut self, target: FunctionId, args: &[NodeId], cont: NodeId) -> NodeId {
        let args = self.args(args);
        let cont = self.graph.new_ref(cont);
        self.graph
            .add_node(NodeKind::InvokeStatic { target, args, cont })
    }

    pub fn invoke_method(
        &mut self,
        receiver: NodeId,
        selector: Selector,
        args: &[NodeId],
        cont: NodeId,
    ) -> NodeId {
        let receiver = self.graph.new_ref(receiver);
        let args = self.args(args);
        let cont = self.graph.new_ref(cont);
        self.graph.add_node(NodeKind::InvokeMethod {
            receiver,
            selector,
            args,
            cont,
        })
    }

    pub fn invoke_method_directly(
        &mut self,
        receiver: NodeId,
        target: FunctionId,
        selector: Selector,
        args: &[NodeId],
        cont: NodeId,
    ) -> NodeId {
        let receiver = self.graph.new_ref(receiver);
        let args = self.args(args);
        let cont = self.graph.new_ref(cont);
        self.graph.add_node(NodeKind::InvokeMethodDirectly {
            receiver,
            target,
            selector,
            args,
            cont,
        })
    }

    pub fn invoke_constructor(
        &mut self,
        class: ClassId,
        target: FunctionId,
        args: &[NodeId],
        cont: NodeId,
    ) -> NodeId {
        let args = self.args(args);
        let cont = self.graph.new_ref(cont);
        self.graph.add_node(NodeKind::InvokeConstructor {
            class,
            target,
            args,
            cont,
        })
    }

    pub fn concatenate_strings(&mut self, args: &[NodeId], cont: NodeId) -> NodeId {
        let args = self.args(args);
        let cont = self.graph.new_ref(cont);
        self.graph
            .add_node(NodeKind::ConcatenateStrings { args, cont })
    }

    pub fn type_operator(
        &mut self,
        op: TypeOp,
        value: NodeId,
        target: ClassId,
        cont: NodeId,
    ) -> NodeId {
        let value = self.graph.new_ref(value);
        let cont = self.graph.new_ref(cont);
        self.graph.add_node(NodeKind::TypeOperator {
            op,
            value,
            target,
            cont,
        })
    }

    /// Branch on the truth of `condition`'s value.
    pub fn branch(&mut self, condition: NodeId, true_cont: NodeId, false_cont: NodeId) -> NodeId {
        let condition = self.graph.new_ref(condition);
        let true_cont = self.graph.new_ref(true_cont);
        let false_cont = self.graph.new_ref(false_cont);
        self.graph.add_node(NodeKind::Branch {
            condition,
            true_cont,
            false_cont,
        })
    }

    pub fn throw(&mut self, value: NodeId) -> NodeId {
        let value = self.graph.new_ref(value);
        self.graph.add_node(NodeKind::Throw { value })
    }

    pub fn set_mutable(&mut self, variable: NodeId, value: NodeId, body: NodeId) -> NodeId {
        let variable = self.graph.new_ref(variable);
        let value = self.graph.new_ref(value);
        self.graph.add_node(NodeKind::SetMutable {
            variable,
            value,
            body,
        })
    }

    pub fn set_field(
        &mut self,
        object: NodeId,
        field: FieldId,
        value: NodeId,
        body: NodeId,
    ) -> NodeId {
        let object = self.graph.new_ref(object);
        let value = self.graph.new_ref(value);
        self.graph.add_node(NodeKind::SetField {
            object,
            field,
            value,
            body,
        })
    }

    pub fn set_static(&mut self, field: FieldId, value: NodeId, body: NodeId) -> NodeId {
        let value = self.graph.new_ref(value);
        self.graph
            .add_node(NodeKind::SetStatic { field, value, body })
    }

    pub fn rethrow(&mut self) -> NodeId {
        self.graph.add_node(NodeKind::Rethrow)
    }

    /// Chain `LetCont` bindings around `body`, innermost binding first.
    pub fn let_conts(&mut self, conts: &[NodeId], body: NodeId) -> NodeId {
        let mut current = body;
        for &cont in conts {
            current = self.let_cont(cont, current);
        }
        current
    }

    // =========================================================================
    // Finishing
    // =========================================================================

    /// Install `body` as the root body and rebuild parent pointers.
    pub fn finish(mut self, body: NodeId) -> CpsGraph {
        let root = self.graph.root();
        match &mut self.graph.node_mut(root).kind {
            NodeKind::Root { body: slot, .. } => *slot = Some(body),
            other => internal_error(other.name(), "root node has non-root kind"),
        }
        self.graph.refresh_parents();
        self.graph
    }

    /// Finish without a body (the empty program).
    pub fn finish_empty(mut self) -> CpsGraph {
        self.graph.refresh_parents();
        self.graph
    }
}

impl Default for CpsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_minimal_program() {
        let mut b = CpsBuilder::new();
        let c = b.constant(ConstantValue::Int(42));
        let ret = b.return_cont();
        let invoke = b.invoke_continuation(ret, &[c]);
        let body = b.let_prim(c, invoke);
        let graph = b.finish(body);

        assert_eq!(graph.body(), Some(body));
        graph.verify().expect("builder output is well-formed");
        assert_eq!(graph.use_count(c), 1);
        assert_eq!(graph.use_count(graph.return_cont()), 1);
    }

    #[test]
    fn test_continuation_params() {
        let mut b = CpsBuilder::new();
        let k = b.continuation(2);
        let p0 = b.cont_param(k, 0);
        let p1 = b.cont_param(k, 1);
        assert_ne!(p0, p1);
        assert!(matches!(
            b.graph.node(p0).kind,
            NodeKind::Parameter { index: 0 }
        ));
        assert!(matches!(
            b.graph.node(p1).kind,
            NodeKind::Parameter { index: 1 }
        ));
    }

    #[test]
    fn test_finish_empty_is_bodyless() {
        let graph = CpsBuilder::new().finish_empty();
        assert!(graph.body().is_none());
        graph.verify().expect("empty graph is well-formed");
    }

    #[test]
    fn test_literal_map_wires_key_and_value_references() {
        let mut b = CpsBuilder::new();
        let p = b.add_root_param();
        let key = b.constant(ConstantValue::string("k"));
        let map = b.literal_map(&[key], &[p]);
        assert_eq!(b.graph.use_count(key), 1);
        assert_eq!(b.graph.use_count(p), 1);
        assert!(matches!(b.graph.node(map).kind, NodeKind::LiteralMap { .. }));
        assert_eq!(b.graph.node(map).kind.refs().len(), 2);
    }

    #[test]
    fn test_set_field_holds_two_references_and_a_body() {
        let mut world = crate::ir::ClassWorld::new();
        let field = world.add_field("x");

        let mut b = CpsBuilder::new();
        let p = b.add_root_param();
        let obj = b.create_box();
        let ret = b.return_cont();
        let invoke = b.invoke_continuation(ret, &[p]);
        let store = b.set_field(obj, field, p, invoke);

        assert_eq!(b.graph.node(store).kind.refs().len(), 2);
        assert_eq!(b.graph.node(store).kind.children().len(), 1);
        assert_eq!(b.graph.use_count(obj), 1);
        assert_eq!(b.graph.use_count(p), 2);
    }
}
