//! Sparse Conditional Constant Propagation (SCCP) over the CPS graph.
//!
//! The pass simultaneously discovers which parts of a program can execute
//! and which definitions are compile-time constants, then rewrites the
//! graph to exploit both facts: dead branches become unconditional jumps
//! and pure call-style expressions with constant results become
//! materialized constants.
//!
//! # Lattice
//!
//! ```text
//!     NonConst(τ)   — value varies at runtime
//!          |
//!   Constant(c, τ)  — value is the compile-time constant c
//!          |
//!       Nothing     — no value has flowed here
//! ```
//!
//! # Phases
//!
//! 1. **Analysis** ([`solver::SccpSolver`]): a two-worklist fixed point
//!    over reachability and per-definition lattice values. Continuation
//!    parameters act as φ-nodes, joined across every reachable invocation.
//! 2. **Transform** ([`transform::Transformer`]): a single rewrite walk
//!    consuming the analysis; it leaves unreachable subtrees and orphaned
//!    definitions in place for the downstream shrinking pass.
//!
//! The pass mutates the graph in place and keeps the per-node abstract
//! values available afterwards for debugging and later passes.
//!
//! # Performance
//!
//! Time is O((nodes + references) × lattice height); the lattice is three
//! levels tall, so every definition's value changes at most twice.

pub mod constants;
pub mod lattice;
pub mod materialize;
pub mod solver;
pub mod transform;
pub mod types;

pub use constants::{BinaryOp, ConstantSystem, NativeConstantSystem, UnaryOp};
pub use lattice::{AbstractValue, ValueKind};
pub use solver::{SccpSolver, SolverResult, SolverStats};
pub use types::{TypeMask, TypeMaskSystem, TypeSystem, UnitType, UnitTypeSystem};

use rustc_hash::FxHashMap;

use crate::ir::{ClassWorld, CpsGraph, NodeId};

use transform::Transformer;

/// Configuration for the SCCP pass.
#[derive(Debug, Clone)]
pub struct SccpConfig {
    /// Materialize constant-valued call expressions.
    pub fold_constants: bool,
    /// Replace one-sided branches with unconditional invocations.
    pub rewrite_branches: bool,
    /// Simplify `Identical(x, true)` when `x` is provably boolean.
    pub simplify_identical: bool,
}

impl Default for SccpConfig {
    fn default() -> Self {
        Self {
            fold_constants: true,
            rewrite_branches: true,
            simplify_identical: true,
        }
    }
}

impl SccpConfig {
    /// Analysis-only verification configuration: solve, rewrite nothing.
    pub fn analysis_only() -> Self {
        Self {
            fold_constants: false,
            rewrite_branches: false,
            simplify_identical: false,
        }
    }
}

/// Statistics from the transform phase of the last run.
#[derive(Debug, Clone, Default)]
pub struct SccpStats {
    /// Call-style expressions replaced by materialized constants.
    pub constants_folded: usize,
    /// Branches replaced by unconditional invocations.
    pub branches_simplified: usize,
    /// `Identical` primitives bypassed at their uses.
    pub identities_simplified: usize,
}

/// The SCCP pass.
///
/// Generic over the type system (unit before inference, type masks after)
/// and the constant system supplying operator folds.
pub struct Sccp<T: TypeSystem, C: ConstantSystem> {
    types: T,
    constants: C,
    config: SccpConfig,
    stats: SccpStats,
    solver_stats: SolverStats,
    values: FxHashMap<NodeId, AbstractValue<T::Ty>>,
}

impl<T: TypeSystem, C: ConstantSystem> Sccp<T, C> {
    pub fn new(types: T, constants: C) -> Self {
        Self::with_config(types, constants, SccpConfig::default())
    }

    pub fn with_config(types: T, constants: C, config: SccpConfig) -> Self {
        Sccp {
            types,
            constants,
            config,
            stats: SccpStats::default(),
            solver_stats: SolverStats::default(),
            values: FxHashMap::default(),
        }
    }

    /// Transform-phase statistics from the last run.
    pub fn stats(&self) -> &SccpStats {
        &self.stats
    }

    /// Analysis-phase statistics from the last run.
    pub fn solver_stats(&self) -> &SolverStats {
        &self.solver_stats
    }

    /// The abstract value computed for `node` in the last run; `Nothing`
    /// when the node was never reached.
    pub fn value_of(&self, node: NodeId) -> AbstractValue<T::Ty> {
        self.values
            .get(&node)
            .cloned()
            .unwrap_or(AbstractValue::Nothing)
    }

    /// Run the pass on `graph`, mutating it in place. Returns whether the
    /// graph changed. An empty root returns immediately without mutation.
    pub fn run(&mut self, graph: &mut CpsGraph, world: &ClassWorld) -> bool {
        self.stats = SccpStats::default();
        self.solver_stats = SolverStats::default();
        self.values = FxHashMap::default();

        if graph.body().is_none() {
            return false;
        }

        // Rewrites navigate through parent pointers; establish them before
        // anything else looks at the tree.
        graph.refresh_parents();

        let result = SccpSolver::new(graph, world, &self.types, &self.constants).solve();
        let changed = Transformer::new(
            graph,
            &result,
            &self.types,
            &self.config,
            &mut self.stats,
        )
        .run();

        self.solver_stats = result.stats;
        self.values = result.values;
        changed
    }
}

impl Sccp<UnitTypeSystem, NativeConstantSystem> {
    /// A pass instance for running before type inference.
    pub fn untyped() -> Self {
        Self::new(UnitTypeSystem, NativeConstantSystem::new())
    }
}

impl Sccp<TypeMaskSystem, NativeConstantSystem> {
    /// A pass instance consuming dataflow-inferred type masks.
    pub fn with_type_masks(types: TypeMaskSystem) -> Self {
        Self::new(types, NativeConstantSystem::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConstantValue, CpsBuilder};

    #[test]
    fn test_empty_root_is_a_no_op() {
        let mut graph = CpsBuilder::new().finish_empty();
        let world = ClassWorld::new();
        let before = graph.dump();

        let mut pass = Sccp::with_type_masks(TypeMaskSystem::new());
        let changed = pass.run(&mut graph, &world);

        assert!(!changed);
        assert_eq!(graph.dump(), before);
        assert_eq!(pass.stats().constants_folded, 0);
    }

    #[test]
    fn test_straight_line_program_is_unchanged() {
        let mut b = CpsBuilder::new();
        let c = b.constant(ConstantValue::Int(1));
        let ret = b.return_cont();
        let invoke = b.invoke_continuation(ret, &[c]);
        let body = b.let_prim(c, invoke);
        let mut graph = b.finish(body);
        let world = ClassWorld::new();
        let before = graph.dump();

        let mut pass = Sccp::with_type_masks(TypeMaskSystem::new());
        let changed = pass.run(&mut graph, &world);

        assert!(!changed);
        assert_eq!(graph.dump(), before);
        assert!(pass.value_of(c).is_constant());
    }

    #[test]
    fn test_analysis_only_config_never_rewrites() {
        let mut b = CpsBuilder::new();
        let ret = b.return_cont();
        let c = b.constant(ConstantValue::Bool(true));
        let null_c = b.constant(ConstantValue::Null);

        let kt = b.continuation(0);
        let t_invoke = b.invoke_continuation(ret, &[null_c]);
        let t_body = b.let_prim(null_c, t_invoke);
        b.set_cont_body(kt, t_body);
        let kf = b.continuation(0);
        let f_invoke = b.invoke_continuation(ret, &[c]);
        b.set_cont_body(kf, f_invoke);

        let branch = b.branch(c, kt, kf);
        let inner = b.let_conts(&[kf, kt], branch);
        let body = b.let_prim(c, inner);
        let mut graph = b.finish(body);
        let world = ClassWorld::new();
        let before = graph.dump();

        let mut pass = Sccp::with_config(
            TypeMaskSystem::new(),
            NativeConstantSystem::new(),
            SccpConfig::analysis_only(),
        );
        let changed = pass.run(&mut graph, &world);

        assert!(!changed);
        assert_eq!(graph.dump(), before);
    }
}
