//! SCCP pass benchmarks.
//!
//! Two workloads: a ladder of single-use constants (pure solver traffic)
//! and a chain of foldable operator calls threaded through continuations
//! (solver plus transformer splicing at every level).

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use opal_opt::ir::{ClassWorld, ConstantValue, CpsBuilder, CpsGraph, Selector};
use opal_opt::opt::sccp::{Sccp, TypeMaskSystem};

/// `depth` nested `LetPrim(Constant, ...)` bindings over a single return.
fn build_constant_ladder(depth: i64) -> CpsGraph {
    let mut b = CpsBuilder::new();
    let ret = b.return_cont();
    let mut body = {
        let c = b.constant(ConstantValue::Int(0));
        let invoke = b.invoke_continuation(ret, &[c]);
        b.let_prim(c, invoke)
    };
    for i in 1..depth {
        let c = b.constant(ConstantValue::Int(i));
        body = b.let_prim(c, body);
    }
    b.finish(body)
}

/// A chain of continuations, each adding 1 to its argument via a foldable
/// operator call; the whole chain collapses to constants.
fn build_fold_chain(depth: usize) -> CpsGraph {
    let mut b = CpsBuilder::new();
    let ret = b.return_cont();

    let mut conts = Vec::with_capacity(depth);
    let mut next = ret;
    for _ in 0..depth {
        let k = b.continuation(1);
        let x = b.cont_param(k, 0);
        let one = b.constant(ConstantValue::Int(1));
        let call = b.invoke_method(x, Selector::binary_operator("+"), &[one], next);
        let k_body = b.let_prim(one, call);
        b.set_cont_body(k, k_body);
        conts.push(k);
        next = k;
    }

    let seed = b.constant(ConstantValue::Int(0));
    let start = b.invoke_continuation(next, &[seed]);
    let mut body = b.let_prim(seed, start);
    // Bind so that each continuation sees its callee: the first-created
    // continuation (calling ret) ends up outermost.
    for &k in conts.iter().rev() {
        body = b.let_cont(k, body);
    }
    b.finish(body)
}

fn bench_sccp(c: &mut Criterion) {
    let world = ClassWorld::new();

    let ladder = build_constant_ladder(400);
    c.bench_function("sccp_constant_ladder_400", |bench| {
        bench.iter_batched(
            || ladder.clone(),
            |mut graph| {
                let mut pass = Sccp::with_type_masks(TypeMaskSystem::new());
                black_box(pass.run(&mut graph, &world));
            },
            BatchSize::SmallInput,
        )
    });

    let chain = build_fold_chain(100);
    c.bench_function("sccp_fold_chain_100", |bench| {
        bench.iter_batched(
            || chain.clone(),
            |mut graph| {
                let mut pass = Sccp::with_type_masks(TypeMaskSystem::new());
                black_box(pass.run(&mut graph, &world));
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_sccp);
criterion_main!(benches);
