//! CPS IR node definitions.
//!
//! The IR is a tree of expressions rooted at [`NodeKind::Root`]. Values are
//! produced by primitives (definitions) and consumed through [`Reference`]s;
//! every reference participates in its definition's intrusive use-list.
//! Control flow is expressed by continuation invocation: a continuation is a
//! named block whose parameters act as SSA φ-nodes, merging the argument
//! values of every invocation that targets it.

use smallvec::SmallVec;

use super::arena::Id;
use super::constant::ConstantValue;
use super::world::{ClassId, FieldId, FunctionId, Selector};

/// Identifier of a node in the graph.
pub type NodeId = Id<Node>;

/// Identifier of a reference (a single use-site of a definition).
pub type RefId = Id<Reference>;

/// Inline argument list; most call sites carry zero to two arguments.
pub type Args = SmallVec<[RefId; 2]>;

/// A single use of a definition.
///
/// References form a doubly-linked list per definition (headed by the
/// definition node's `first_use`), so removing one is O(1).
#[derive(Debug, Clone)]
pub struct Reference {
    /// The definition being used.
    pub def: NodeId,
    /// The node holding this reference; set when the holder is created.
    pub user: Option<NodeId>,
    pub(crate) prev: Option<RefId>,
    pub(crate) next: Option<RefId>,
    pub(crate) linked: bool,
}

/// An IR node: the tagged kind plus the two back-edges the optimizer
/// maintains (structural parent, head of the use-list when the node is a
/// definition).
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub first_use: Option<RefId>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Node {
            kind,
            parent: None,
            first_use: None,
        }
    }
}

/// Type test vs. type cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOp {
    Is,
    As,
}

/// The closed set of CPS node kinds.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Program or function entry. `return_cont` is a one-parameter
    /// continuation with no body; invoking it returns from the function.
    /// A `None` body is the empty program.
    Root {
        params: Vec<NodeId>,
        return_cont: NodeId,
        body: Option<NodeId>,
    },

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------
    LetPrim {
        prim: NodeId,
        body: NodeId,
    },
    LetCont {
        cont: NodeId,
        body: NodeId,
    },
    /// Installs an exception handler continuation around `body`.
    LetHandler {
        handler: NodeId,
        body: NodeId,
    },
    LetMutable {
        variable: NodeId,
        value: RefId,
        body: NodeId,
    },
    DeclareFunction {
        variable: NodeId,
        function: FunctionId,
        body: NodeId,
    },
    InvokeStatic {
        target: FunctionId,
        args: Args,
        cont: RefId,
    },
    InvokeMethod {
        receiver: RefId,
        selector: Selector,
        args: Args,
        cont: RefId,
    },
    InvokeMethodDirectly {
        receiver: RefId,
        target: FunctionId,
        selector: Selector,
        args: Args,
        cont: RefId,
    },
    InvokeConstructor {
        class: ClassId,
        target: FunctionId,
        args: Args,
        cont: RefId,
    },
    InvokeContinuation {
        cont: RefId,
        args: Args,
    },
    ConcatenateStrings {
        args: Args,
        cont: RefId,
    },
    TypeOperator {
        op: TypeOp,
        value: RefId,
        target: ClassId,
        cont: RefId,
    },
    /// Two-way branch on the truth of `condition`'s value.
    Branch {
        condition: RefId,
        true_cont: RefId,
        false_cont: RefId,
    },
    Throw {
        value: RefId,
    },
    Rethrow,
    /// Must be eliminated before optimization; reaching one is a bug.
    NonTailThrow {
        value: RefId,
    },
    SetMutable {
        variable: RefId,
        value: RefId,
        body: NodeId,
    },
    SetField {
        object: RefId,
        field: FieldId,
        value: RefId,
        body: NodeId,
    },
    SetStatic {
        field: FieldId,
        value: RefId,
        body: NodeId,
    },

    // ------------------------------------------------------------------
    // Primitives / definitions
    // ------------------------------------------------------------------
    Constant {
        value: ConstantValue,
    },
    Parameter {
        index: u32,
    },
    /// Named block. `body` is installed by the binding `LetCont` or
    /// `LetHandler`; the root's return continuation has none.
    Continuation {
        params: Vec<NodeId>,
        body: Option<NodeId>,
    },
    MutableVariable,
    LiteralList {
        items: Args,
    },
    LiteralMap {
        keys: Args,
        values: Args,
    },
    CreateFunction {
        function: FunctionId,
    },
    CreateBox,
    CreateInstance {
        class: ClassId,
        args: Args,
    },
    GetField {
        object: RefId,
        field: FieldId,
    },
    GetStatic {
        field: FieldId,
    },
    GetMutable {
        variable: RefId,
    },
    ReifyTypeVar {
        index: u32,
    },
    ReifyRuntimeType {
        value: RefId,
    },
    ReadTypeVariable {
        index: u32,
        target: RefId,
    },
    TypeExpression {
        arguments: Args,
    },
    Interceptor {
        input: RefId,
    },
    Identical {
        left: RefId,
        right: RefId,
    },
    CreateInvocationMirror {
        selector: Selector,
        args: Args,
    },
}

impl NodeKind {
    /// Every reference slot embedded in this node, in field order.
    pub fn refs(&self) -> SmallVec<[RefId; 4]> {
        let mut out = SmallVec::new();
        match self {
            NodeKind::Root { .. }
            | NodeKind::LetPrim { .. }
            | NodeKind::LetCont { .. }
            | NodeKind::LetHandler { .. }
            | NodeKind::DeclareFunction { .. }
            | NodeKind::Rethrow
            | NodeKind::Constant { .. }
            | NodeKind::Parameter { .. }
            | NodeKind::Continuation { .. }
            | NodeKind::MutableVariable
            | NodeKind::CreateFunction { .. }
            | NodeKind::CreateBox
            | NodeKind::GetStatic { .. }
            | NodeKind::ReifyTypeVar { .. } => {}

            NodeKind::LetMutable { value, .. } => out.push(*value),
            NodeKind::InvokeStatic { args, cont, .. } => {
                out.extend(args.iter().copied());
                out.push(*cont);
            }
            NodeKind::InvokeMethod {
                receiver,
                args,
                cont,
                ..
            }
            | NodeKind::InvokeMethodDirectly {
                receiver,
                args,
                cont,
                ..
            } => {
                out.push(*receiver);
                out.extend(args.iter().copied());
                out.push(*cont);
            }
            NodeKind::InvokeConstructor { args, cont, .. } => {
                out.extend(args.iter().copied());
                out.push(*cont);
            }
            NodeKind::InvokeContinuation { cont, args } => {
                out.push(*cont);
                out.extend(args.iter().copied());
            }
            NodeKind::ConcatenateStrings { args, cont } => {
                out.extend(args.iter().copied());
                out.push(*cont);
            }
            NodeKind::TypeOperator { value, cont, .. } => {
                out.push(*value);
                out.push(*cont);
            }
            NodeKind::Branch {
                condition,
                true_cont,
                false_cont,
            } => {
                out.push(*condition);
                out.push(*true_cont);
                out.push(*false_cont);
            }
            NodeKind::Throw { value } | NodeKind::NonTailThrow { value } => out.push(*value),
            NodeKind::SetMutable {
                variable, value, ..
            } => {
                out.push(*variable);
                out.push(*value);
            }
            NodeKind::SetField { object, value, .. } => {
                out.push(*object);
                out.push(*value);
            }
            NodeKind::SetStatic { value, .. } => out.push(*value),

            NodeKind::LiteralList { items } => out.extend(items.iter().copied()),
            NodeKind::LiteralMap { keys, values } => {
                out.extend(keys.iter().copied());
                out.extend(values.iter().copied());
            }
            NodeKind::CreateInstance { args, .. } => out.extend(args.iter().copied()),
            NodeKind::GetField { object, .. } => out.push(*object),
            NodeKind::GetMutable { variable } => out.push(*variable),
            NodeKind::ReifyRuntimeType { value } => out.push(*value),
            NodeKind::ReadTypeVariable { target, .. } => out.push(*target),
            NodeKind::TypeExpression { arguments } => out.extend(arguments.iter().copied()),
            NodeKind::Interceptor { input } => out.push(*input),
            NodeKind::Identical { left, right } => {
                out.push(*left);
                out.push(*right);
            }
            NodeKind::CreateInvocationMirror { args, .. } => out.extend(args.iter().copied()),
        }
        out
    }

    /// Every owned child node (bound definitions and sub-expressions).
    pub fn children(&self) -> SmallVec<[NodeId; 4]> {
        let mut out = SmallVec::new();
        match self {
            NodeKind::Root {
                params,
                return_cont,
                body,
            } => {
                out.extend(params.iter().copied());
                out.push(*return_cont);
                out.extend(body.iter().copied());
            }
            NodeKind::LetPrim { prim, body } => {
                out.push(*prim);
                out.push(*body);
            }
            NodeKind::LetCont { cont, body } => {
                out.push(*cont);
                out.push(*body);
            }
            NodeKind::LetHandler { handler, body } => {
                out.push(*handler);
                out.push(*body);
            }
            NodeKind::LetMutable { variable, body, .. }
            | NodeKind::DeclareFunction { variable, body, .. } => {
                out.push(*variable);
                out.push(*body);
            }
            NodeKind::SetMutable { body, .. }
            | NodeKind::SetField { body, .. }
            | NodeKind::SetStatic { body, .. } => out.push(*body),
            NodeKind::Continuation { params, body } => {
                out.extend(params.iter().copied());
                out.extend(body.iter().copied());
            }
            _ => {}
        }
        out
    }

    /// Whether this node produces a value other nodes may reference.
    pub fn is_definition(&self) -> bool {
        matches!(
            self,
            NodeKind::Constant { .. }
                | NodeKind::Parameter { .. }
                | NodeKind::Continuation { .. }
                | NodeKind::MutableVariable
                | NodeKind::LiteralList { .. }
                | NodeKind::LiteralMap { .. }
                | NodeKind::CreateFunction { .. }
                | NodeKind::CreateBox
                | NodeKind::CreateInstance { .. }
                | NodeKind::GetField { .. }
                | NodeKind::GetStatic { .. }
                | NodeKind::GetMutable { .. }
                | NodeKind::ReifyTypeVar { .. }
                | NodeKind::ReifyRuntimeType { .. }
                | NodeKind::ReadTypeVariable { .. }
                | NodeKind::TypeExpression { .. }
                | NodeKind::Interceptor { .. }
                | NodeKind::Identical { .. }
                | NodeKind::CreateInvocationMirror { .. }
        )
    }

    /// Short name for dumps and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Root { .. } => "Root",
            NodeKind::LetPrim { .. } => "LetPrim",
            NodeKind::LetCont { .. } => "LetCont",
            NodeKind::LetHandler { .. } => "LetHandler",
            NodeKind::LetMutable { .. } => "LetMutable",
            NodeKind::DeclareFunction { .. } => "DeclareFunction",
            NodeKind::InvokeStatic { .. } => "InvokeStatic",
            NodeKind::InvokeMethod { .. } => "InvokeMethod",
            NodeKind::InvokeMethodDirectly { .. } => "InvokeMethodDirectly",
            NodeKind::InvokeConstructor { .. } => "InvokeConstructor",
            NodeKind::InvokeContinuation { .. } => "InvokeContinuation",
            NodeKind::ConcatenateStrings { .. } => "ConcatenateStrings",
            NodeKind::TypeOperator { .. } => "TypeOperator",
            NodeKind::Branch { .. } => "Branch",
            NodeKind::Throw { .. } => "Throw",
            NodeKind::Rethrow => "Rethrow",
            NodeKind::NonTailThrow { .. } => "NonTailThrow",
            NodeKind::SetMutable { .. } => "SetMutable",
            NodeKind::SetField { .. } => "SetField",
            NodeKind::SetStatic { .. } => "SetStatic",
            NodeKind::Constant { .. } => "Constant",
            NodeKind::Parameter { .. } => "Parameter",
            NodeKind::Continuation { .. } => "Continuation",
            NodeKind::MutableVariable => "MutableVariable",
            NodeKind::LiteralList { .. } => "LiteralList",
            NodeKind::LiteralMap { .. } => "LiteralMap",
            NodeKind::CreateFunction { .. } => "CreateFunction",
            NodeKind::CreateBox => "CreateBox",
            NodeKind::CreateInstance { .. } => "CreateInstance",
            NodeKind::GetField { .. } => "GetField",
            NodeKind::GetStatic { .. } => "GetStatic",
            NodeKind::GetMutable { .. } => "GetMutable",
            NodeKind::ReifyTypeVar { .. } => "ReifyTypeVar",
            NodeKind::ReifyRuntimeType { .. } => "ReifyRuntimeType",
            NodeKind::ReadTypeVariable { .. } => "ReadTypeVariable",
            NodeKind::TypeExpression { .. } => "TypeExpression",
            NodeKind::Interceptor { .. } => "Interceptor",
            NodeKind::Identical { .. } => "Identical",
            NodeKind::CreateInvocationMirror { .. } => "CreateInvocationMirror",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_branch_refs_in_field_order() {
        let condition = RefId::new(0);
        let true_cont = RefId::new(1);
        let false_cont = RefId::new(2);
        let kind = NodeKind::Branch {
            condition,
            true_cont,
            false_cont,
        };
        assert_eq!(kind.refs().to_vec(), vec![condition, true_cont, false_cont]);
        assert!(kind.children().is_empty());
    }

    #[test]
    fn test_invoke_method_refs() {
        let receiver = RefId::new(0);
        let arg = RefId::new(1);
        let cont = RefId::new(2);
        let kind = NodeKind::InvokeMethod {
            receiver,
            selector: Selector::binary_operator("+"),
            args: smallvec![arg],
            cont,
        };
        assert_eq!(kind.refs().to_vec(), vec![receiver, arg, cont]);
    }

    #[test]
    fn test_let_prim_children() {
        let prim = NodeId::new(0);
        let body = NodeId::new(1);
        let kind = NodeKind::LetPrim { prim, body };
        assert_eq!(kind.children().to_vec(), vec![prim, body]);
        assert!(kind.refs().is_empty());
    }

    #[test]
    fn test_definition_classification() {
        assert!(NodeKind::Constant {
            value: crate::ir::ConstantValue::Null
        }
        .is_definition());
        assert!(NodeKind::MutableVariable.is_definition());
        assert!(!NodeKind::Rethrow.is_definition());
        assert!(!NodeKind::Branch {
            condition: RefId::new(0),
            true_cont: RefId::new(1),
            false_cont: RefId::new(2),
        }
        .is_definition());
    }
}
