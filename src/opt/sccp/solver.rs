//! Fixed-point analyzer.
//!
//! The solver simultaneously discovers which nodes can execute and how
//! much is known about every definition's value, visiting only code it has
//! proven reachable. Two worklists drive it:
//!
//! - the **node worklist** holds newly-reachable nodes awaiting their
//!   first (or a repeated) visit;
//! - the **definition worklist** holds definitions whose lattice value
//!   rose; draining one revisits every use-site, which may raise further
//!   values or reach new code.
//!
//! Continuation parameters are the φ-nodes of the representation: every
//! invocation joins its argument values into the target's parameters, so
//! merges happen along use-def edges instead of block boundaries. Values
//! rise monotonically through a three-level lattice, which bounds the
//! number of visits and guarantees termination.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::ir::{ClassWorld, ConstantValue, CpsGraph, NodeId, NodeKind, RefId, TypeOp};
use crate::opt::internal_error;

use super::constants::ConstantSystem;
use super::lattice::AbstractValue;
use super::types::TypeSystem;

/// Counters from one solver run.
#[derive(Debug, Clone, Default)]
pub struct SolverStats {
    /// Number of visit-dispatches performed.
    pub nodes_visited: usize,
    /// Number of lattice value changes.
    pub value_changes: usize,
    /// Definitions that ended at the `Constant` level.
    pub constants_found: usize,
    /// Continuations never proven reachable.
    pub unreachable_continuations: usize,
}

/// The analyzer's output: reachability and per-node abstract values.
#[derive(Debug)]
pub struct SolverResult<Ty> {
    pub values: FxHashMap<NodeId, AbstractValue<Ty>>,
    pub reachable: FxHashSet<NodeId>,
    pub stats: SolverStats,
}

impl<Ty: Copy + Eq + std::fmt::Debug> SolverResult<Ty> {
    /// The abstract value of `node`; absent means `Nothing`.
    pub fn value_of(&self, node: NodeId) -> AbstractValue<Ty> {
        self.values
            .get(&node)
            .cloned()
            .unwrap_or(AbstractValue::Nothing)
    }

    pub fn is_reachable(&self, node: NodeId) -> bool {
        self.reachable.contains(&node)
    }
}

/// Two-worklist sparse conditional constant propagation solver.
pub struct SccpSolver<'a, T: TypeSystem, C: ConstantSystem> {
    graph: &'a CpsGraph,
    world: &'a ClassWorld,
    types: &'a T,
    constants: &'a C,
    values: FxHashMap<NodeId, AbstractValue<T::Ty>>,
    reachable: FxHashSet<NodeId>,
    node_worklist: Vec<NodeId>,
    def_worklist: Vec<NodeId>,
    def_enqueued: FxHashSet<NodeId>,
    stats: SolverStats,
}

impl<'a, T: TypeSystem, C: ConstantSystem> SccpSolver<'a, T, C> {
    pub fn new(graph: &'a CpsGraph, world: &'a ClassWorld, types: &'a T, constants: &'a C) -> Self {
        SccpSolver {
            graph,
            world,
            types,
            constants,
            values: FxHashMap::default(),
            reachable: FxHashSet::default(),
            node_worklist: Vec::new(),
            def_worklist: Vec::new(),
            def_enqueued: FxHashSet::default(),
            stats: SolverStats::default(),
        }
    }

    /// Run to quiescence and return the computed facts.
    pub fn solve(mut self) -> SolverResult<T::Ty> {
        self.set_reachable(self.graph.root());

        loop {
            if let Some(node) = self.node_worklist.pop() {
                self.visit(node);
            } else if let Some(def) = self.def_worklist.pop() {
                self.def_enqueued.remove(&def);
                let users: SmallVec<[NodeId; 8]> = self
                    .graph
                    .uses(def)
                    .filter_map(|r| self.graph.reference(r).user)
                    .collect();
                for user in users {
                    self.visit(user);
                }
            } else {
                break;
            }
        }

        self.stats.constants_found = self.values.values().filter(|v| v.is_constant()).count();
        self.stats.unreachable_continuations = self
            .graph
            .nodes()
            .filter(|(id, node)| {
                matches!(node.kind, NodeKind::Continuation { .. }) && !self.reachable.contains(id)
            })
            .count();

        SolverResult {
            values: self.values,
            reachable: self.reachable,
            stats: self.stats,
        }
    }

    // =========================================================================
    // Lattice state
    // =========================================================================

    fn set_reachable(&mut self, node: NodeId) {
        if self.reachable.insert(node) {
            self.node_worklist.push(node);
        }
    }

    /// Join `value` into `node`'s entry; on change, schedule the uses of a
    /// definition for revisiting.
    fn set_value(&mut self, node: NodeId, value: AbstractValue<T::Ty>) {
        let old = self.value_of(node);
        let new = old.join(&value, self.types);
        if new == old {
            return;
        }
        debug_assert!(
            new.kind() >= old.kind(),
            "lattice value regressed at {:?}: {:?} -> {:?}",
            node,
            old,
            new
        );
        self.stats.value_changes += 1;
        self.values.insert(node, new);
        if self.graph.node(node).kind.is_definition() && self.def_enqueued.insert(node) {
            self.def_worklist.push(node);
        }
    }

    fn value_of(&self, node: NodeId) -> AbstractValue<T::Ty> {
        self.values
            .get(&node)
            .cloned()
            .unwrap_or(AbstractValue::Nothing)
    }

    fn value_of_ref(&self, r: RefId) -> AbstractValue<T::Ty> {
        self.value_of(self.graph.def_of(r))
    }

    fn constant_of(&self, value: ConstantValue) -> AbstractValue<T::Ty> {
        let ty = self.types.type_of_constant(&value);
        AbstractValue::constant(value, ty)
    }

    fn dynamic(&self) -> AbstractValue<T::Ty> {
        AbstractValue::non_constant(self.types.dynamic_type())
    }

    /// Join `value` into the first parameter of a continuation (the result
    /// slot of a call-style expression).
    fn set_continuation_result(&mut self, cont: NodeId, value: AbstractValue<T::Ty>) {
        if let NodeKind::Continuation { params, .. } = &self.graph.node(cont).kind {
            if let Some(&result) = params.first() {
                self.set_value(result, value);
            }
        }
    }

    // =========================================================================
    // Visit dispatch
    // =========================================================================

    fn visit(&mut self, node: NodeId) {
        self.stats.nodes_visited += 1;
        let graph = self.graph;
        match &graph.node(node).kind {
            NodeKind::Root { params, body, .. } => {
                for &param in params {
                    match &graph.node(param).kind {
                        NodeKind::Parameter { .. } => {
                            let ty = self.types.parameter_type(param);
                            self.set_value(param, AbstractValue::non_constant(ty));
                        }
                        NodeKind::MutableVariable => {
                            let value = self.dynamic();
                            self.set_value(param, value);
                        }
                        other => internal_error(other.name(), "unexpected root parameter"),
                    }
                }
                if let Some(body) = body {
                    self.set_reachable(*body);
                }
            }

            // ------------------------------------------------------------
            // Binding expressions
            // ------------------------------------------------------------
            NodeKind::LetPrim { prim, body } => {
                let (prim, body) = (*prim, *body);
                self.visit(prim);
                self.set_reachable(body);
            }
            NodeKind::LetCont { body, .. } => {
                // The bound continuation becomes reachable only when
                // something invokes it.
                self.set_reachable(*body);
            }
            NodeKind::LetHandler { handler, body } => {
                // Handlers are assumed reachable; nothing tracks which
                // protected operations can actually throw.
                self.set_reachable(*body);
                self.set_reachable(*handler);
                if let NodeKind::Continuation { params, .. } = &graph.node(*handler).kind {
                    for &param in params {
                        let value = self.dynamic();
                        self.set_value(param, value);
                    }
                }
            }
            NodeKind::LetMutable {
                variable,
                value,
                body,
            } => {
                let transferred = self.value_of_ref(*value);
                self.set_value(*variable, transferred);
                self.set_reachable(*body);
            }
            NodeKind::DeclareFunction { variable, body, .. } => {
                let value = self.dynamic();
                self.set_value(*variable, value);
                self.set_reachable(*body);
            }

            // ------------------------------------------------------------
            // Control transfer
            // ------------------------------------------------------------
            NodeKind::InvokeContinuation { cont, args } => {
                let target = graph.def_of(*cont);
                self.set_reachable(target);
                if let NodeKind::Continuation { params, .. } = &graph.node(target).kind {
                    let pairs: SmallVec<[(NodeId, RefId); 2]> =
                        params.iter().copied().zip(args.iter().copied()).collect();
                    for (param, arg) in pairs {
                        let value = self.value_of_ref(arg);
                        self.set_value(param, value);
                    }
                }
            }
            NodeKind::InvokeStatic { target, cont, .. } => {
                let cont = graph.def_of(*cont);
                self.set_reachable(cont);
                let ty = self.types.return_type(*target);
                self.set_continuation_result(cont, AbstractValue::non_constant(ty));
            }
            NodeKind::InvokeMethodDirectly { target, cont, .. } => {
                let cont = graph.def_of(*cont);
                self.set_reachable(cont);
                let ty = self.types.return_type(*target);
                self.set_continuation_result(cont, AbstractValue::non_constant(ty));
            }
            NodeKind::InvokeConstructor { target, cont, .. } => {
                let cont = graph.def_of(*cont);
                self.set_reachable(cont);
                let ty = self.types.return_type(*target);
                self.set_continuation_result(cont, AbstractValue::non_constant(ty));
            }
            NodeKind::InvokeMethod {
                receiver,
                selector,
                args,
                cont,
            } => {
                let cont = graph.def_of(*cont);
                self.set_reachable(cont);

                let lhs = self.value_of_ref(*receiver);
                if lhs.is_nothing() {
                    return; // Receiver not seen yet; revisited on change.
                }
                let result = if lhs.is_non_const() {
                    let ty = self.types.selector_return_type(selector);
                    AbstractValue::non_constant(ty)
                } else if !selector.is_operator() {
                    self.dynamic()
                } else if args.is_empty() {
                    let folded = self
                        .constants
                        .lookup_unary(selector)
                        .zip(lhs.constant_value())
                        .and_then(|(op, c)| self.constants.fold_unary(op, c));
                    match folded {
                        Some(c) => self.constant_of(c),
                        None => self.dynamic(),
                    }
                } else {
                    let rhs = self.value_of_ref(args[0]);
                    if rhs.is_nothing() {
                        return;
                    }
                    match (lhs.constant_value(), rhs.constant_value()) {
                        (Some(l), Some(r)) => {
                            let folded = self
                                .constants
                                .lookup_binary(selector)
                                .and_then(|op| self.constants.fold_binary(op, l, r));
                            match folded {
                                Some(c) => self.constant_of(c),
                                None => self.dynamic(),
                            }
                        }
                        _ => self.dynamic(),
                    }
                };
                self.set_value(node, result.clone());
                self.set_continuation_result(cont, result);
            }
            NodeKind::ConcatenateStrings { args, cont } => {
                let cont = graph.def_of(*cont);
                self.set_reachable(cont);

                let mut concatenated = Some(String::new());
                for &arg in args.iter() {
                    match &graph.node(graph.def_of(arg)).kind {
                        NodeKind::Constant {
                            value: ConstantValue::String(s),
                        } => {
                            if let Some(buffer) = concatenated.as_mut() {
                                buffer.push_str(s);
                            }
                        }
                        _ => concatenated = None,
                    }
                }
                let result = match concatenated {
                    Some(s) => self.constant_of(ConstantValue::string(s)),
                    None => AbstractValue::non_constant(self.types.string_type()),
                };
                self.set_value(node, result.clone());
                self.set_continuation_result(cont, result);
            }
            NodeKind::Branch {
                condition,
                true_cont,
                false_cont,
            } => {
                let cond_def = graph.def_of(*condition);
                let true_target = graph.def_of(*true_cont);
                let false_target = graph.def_of(*false_cont);
                match self.value_of(cond_def) {
                    AbstractValue::Nothing => {}
                    AbstractValue::NonConst(_) => {
                        self.set_reachable(true_target);
                        self.set_reachable(false_target);
                    }
                    AbstractValue::Constant(c, _) => match c {
                        ConstantValue::Bool(true) => self.set_reachable(true_target),
                        ConstantValue::Bool(false) => self.set_reachable(false_target),
                        _ => {
                            // A non-bool condition traps at runtime in
                            // checked mode; treat the value as an unknown
                            // boolean and keep both targets live.
                            let demoted = AbstractValue::non_constant(self.types.bool_type());
                            self.set_value(cond_def, demoted);
                            self.set_reachable(true_target);
                            self.set_reachable(false_target);
                        }
                    },
                }
            }
            NodeKind::TypeOperator {
                op,
                value,
                target,
                cont,
            } => {
                let cont = graph.def_of(*cont);
                self.set_reachable(cont);
                let result = match op {
                    TypeOp::As => self.dynamic(),
                    TypeOp::Is => match self.value_of_ref(*value) {
                        AbstractValue::Nothing => return,
                        AbstractValue::NonConst(_) => {
                            AbstractValue::non_constant(self.types.bool_type())
                        }
                        AbstractValue::Constant(c, _) => {
                            let core = self.world.core();
                            let holds = if c.is_null() {
                                // `null is T` holds only for Null and Object.
                                *target == core.null || *target == core.object
                            } else {
                                let class = self.world.class_of_constant(&c);
                                self.constants.is_subtype(self.world, class, *target)
                            };
                            self.constant_of(ConstantValue::Bool(holds))
                        }
                    },
                };
                self.set_value(node, result.clone());
                self.set_continuation_result(cont, result);
            }
            NodeKind::Throw { .. } | NodeKind::Rethrow => {}
            NodeKind::NonTailThrow { .. } => {
                internal_error("NonTailThrow", "must be eliminated before optimization")
            }
            NodeKind::SetMutable { body, .. }
            | NodeKind::SetField { body, .. }
            | NodeKind::SetStatic { body, .. } => {
                self.set_reachable(*body);
            }

            // ------------------------------------------------------------
            // Definitions
            // ------------------------------------------------------------
            NodeKind::Constant { value } => {
                let result = self.constant_of(value.clone());
                self.set_value(node, result);
            }
            NodeKind::Parameter { .. } => {
                match graph.node(node).parent.map(|p| &graph.node(p).kind) {
                    Some(NodeKind::Root { .. }) => {
                        let ty = self.types.parameter_type(node);
                        self.set_value(node, AbstractValue::non_constant(ty));
                    }
                    // Continuation parameters accrue values from their
                    // invocations only.
                    Some(NodeKind::Continuation { .. }) => {}
                    _ => internal_error("Parameter", "unexpected parent"),
                }
            }
            NodeKind::Continuation { body, .. } => {
                if let Some(body) = body {
                    self.set_reachable(*body);
                }
            }
            NodeKind::MutableVariable => {
                match graph.node(node).parent.map(|p| &graph.node(p).kind) {
                    Some(NodeKind::Root { .. }) => {
                        let value = self.dynamic();
                        self.set_value(node, value);
                    }
                    // Bound variables could track their known value; stay
                    // conservative for now.
                    Some(NodeKind::LetMutable { .. }) | Some(NodeKind::DeclareFunction { .. }) => {
                        let value = self.dynamic();
                        self.set_value(node, value);
                    }
                    _ => internal_error("MutableVariable", "unexpected parent"),
                }
            }
            NodeKind::Identical { left, right } => {
                let l = self.value_of_ref(*left);
                let r = self.value_of_ref(*right);
                if l.is_nothing() || r.is_nothing() {
                    return;
                }
                let result = match (l.constant_value(), r.constant_value()) {
                    (Some(lc), Some(rc)) if lc.is_primitive() && rc.is_primitive() => {
                        self.constant_of(ConstantValue::Bool(lc == rc))
                    }
                    _ => AbstractValue::non_constant(self.types.bool_type()),
                };
                self.set_value(node, result);
            }
            NodeKind::CreateFunction { function } => {
                let result = self.constant_of(ConstantValue::Function(*function));
                self.set_value(node, result);
            }
            NodeKind::LiteralList { .. } => {
                let value = AbstractValue::non_constant(self.types.list_type());
                self.set_value(node, value);
            }
            NodeKind::LiteralMap { .. } => {
                let value = AbstractValue::non_constant(self.types.map_type());
                self.set_value(node, value);
            }
            NodeKind::ReifyTypeVar { .. }
            | NodeKind::ReifyRuntimeType { .. }
            | NodeKind::ReadTypeVariable { .. }
            | NodeKind::TypeExpression { .. } => {
                let value = AbstractValue::non_constant(self.types.type_type());
                self.set_value(node, value);
            }
            NodeKind::CreateBox
            | NodeKind::CreateInstance { .. }
            | NodeKind::GetField { .. }
            | NodeKind::GetStatic { .. }
            | NodeKind::GetMutable { .. }
            | NodeKind::Interceptor { .. }
            | NodeKind::CreateInvocationMirror { .. } => {
                let value = self.dynamic();
                self.set_value(node, value);
            }
        }
    }
}
