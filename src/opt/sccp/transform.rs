//! Graph rewriting with the solver's results.
//!
//! The transformer walks the tree once and applies three local rewrites:
//!
//! - **constify**: a call-style expression whose abstract value is a
//!   primitive constant becomes `LetPrim` of the materialized constant,
//!   whose body invokes the original continuation with it;
//! - **branch**: a branch with exactly one reachable target becomes an
//!   unconditional invocation of that target;
//! - **identical**: `Identical(x, true)` where `x` is provably boolean is
//!   replaced, at every use, by `x` itself.
//!
//! Every splice re-points the parent slot and the new node's parent
//! together, and every reference the detached node held is unlinked, so
//! use-lists stay exact for the shrinking pass that later collects the
//! orphaned definitions and unreachable continuations.

use smallvec::smallvec;

use crate::ir::{ConstantValue, CpsGraph, NodeId, NodeKind, RefId};

use super::lattice::AbstractValue;
use super::materialize::materialize_constant;
use super::solver::SolverResult;
use super::types::TypeSystem;
use super::{SccpConfig, SccpStats};

pub struct Transformer<'a, T: TypeSystem> {
    graph: &'a mut CpsGraph,
    result: &'a SolverResult<T::Ty>,
    types: &'a T,
    config: &'a SccpConfig,
    stats: &'a mut SccpStats,
    changed: bool,
}

impl<'a, T: TypeSystem> Transformer<'a, T> {
    pub fn new(
        graph: &'a mut CpsGraph,
        result: &'a SolverResult<T::Ty>,
        types: &'a T,
        config: &'a SccpConfig,
        stats: &'a mut SccpStats,
    ) -> Self {
        Transformer {
            graph,
            result,
            types,
            config,
            stats,
            changed: false,
        }
    }

    /// Rewrite the whole tree; returns whether anything changed.
    pub fn run(mut self) -> bool {
        if let Some(body) = self.graph.body() {
            self.transform(body);
        }
        self.changed
    }

    fn transform(&mut self, node: NodeId) {
        let node = self.rewrite(node).unwrap_or(node);
        let children = self.graph.node(node).kind.children();
        for child in children {
            self.transform(child);
        }
    }

    /// Apply the local rewrite for `node`, returning the replacement to
    /// recurse into instead, if one was spliced in.
    fn rewrite(&mut self, node: NodeId) -> Option<NodeId> {
        match &self.graph.node(node).kind {
            NodeKind::InvokeMethod { cont, .. }
            | NodeKind::ConcatenateStrings { cont, .. }
            | NodeKind::TypeOperator { cont, .. } => {
                let cont = *cont;
                if self.config.fold_constants {
                    self.constify(node, cont)
                } else {
                    None
                }
            }
            NodeKind::Branch {
                condition: _,
                true_cont,
                false_cont,
            } => {
                let (true_cont, false_cont) = (*true_cont, *false_cont);
                if self.config.rewrite_branches {
                    self.rewrite_branch(node, true_cont, false_cont)
                } else {
                    None
                }
            }
            NodeKind::LetPrim { prim, .. } => {
                let prim = *prim;
                if self.config.simplify_identical {
                    self.simplify_identical(prim);
                }
                None
            }
            _ => None,
        }
    }

    /// Replace a call-style expression whose value is a known constant by
    /// `LetPrim(c, InvokeContinuation(cont, [c]))` spliced into the
    /// parent's body slot.
    fn constify(&mut self, node: NodeId, cont_ref: RefId) -> Option<NodeId> {
        let constant = match self.result.value_of(node) {
            AbstractValue::Constant(c, _) => c,
            _ => return None,
        };
        let parent = self.graph.node(node).parent?;
        let target = self.graph.def_of(cont_ref);

        let prim = materialize_constant(self.graph, constant);
        let arg = self.graph.new_ref(prim);
        let new_cont = self.graph.new_ref(target);
        let invoke = self.graph.add_node(NodeKind::InvokeContinuation {
            cont: new_cont,
            args: smallvec![arg],
        });
        let let_prim = self.graph.add_node(NodeKind::LetPrim { prim, body: invoke });
        self.graph.set_parent(prim, let_prim);
        self.graph.set_parent(invoke, let_prim);

        self.graph.unlink_node_refs(node);
        self.graph.replace_child(parent, node, let_prim);

        self.stats.constants_folded += 1;
        self.changed = true;
        Some(let_prim)
    }

    /// Replace a branch with exactly one reachable target by an
    /// unconditional invocation. Branch targets take no parameters, so the
    /// argument list is empty. The all-dead case is the shrinking pass's
    /// business.
    fn rewrite_branch(
        &mut self,
        node: NodeId,
        true_cont: RefId,
        false_cont: RefId,
    ) -> Option<NodeId> {
        let true_target = self.graph.def_of(true_cont);
        let false_target = self.graph.def_of(false_cont);
        let true_live = self.result.is_reachable(true_target);
        let false_live = self.result.is_reachable(false_target);
        if true_live == false_live {
            return None;
        }
        let parent = self.graph.node(node).parent?;
        let target = if true_live { true_target } else { false_target };

        let new_cont = self.graph.new_ref(target);
        let invoke = self.graph.add_node(NodeKind::InvokeContinuation {
            cont: new_cont,
            args: smallvec![],
        });
        self.graph.unlink_node_refs(node);
        self.graph.replace_child(parent, node, invoke);

        self.stats.branches_simplified += 1;
        self.changed = true;
        Some(invoke)
    }

    /// `Identical(x, true)` is `x` when the type system proves `x` is a
    /// non-null boolean; move every use over to `x` and leave the dead
    /// primitive for collection.
    fn simplify_identical(&mut self, prim: NodeId) {
        let (left_ref, right_ref) = match &self.graph.node(prim).kind {
            NodeKind::Identical { left, right } => (*left, *right),
            _ => return,
        };
        let left = self.graph.def_of(left_ref);
        let right = self.graph.def_of(right_ref);

        let right_is_true = matches!(
            &self.graph.node(right).kind,
            NodeKind::Constant {
                value: ConstantValue::Bool(true)
            }
        );
        if !right_is_true {
            return;
        }
        if !self.result.value_of(left).is_bool(self.types) {
            return;
        }
        if self.graph.use_count(prim) == 0 {
            return;
        }
        self.graph.replace_all_uses(prim, left);
        self.stats.identities_simplified += 1;
        self.changed = true;
    }
}
