//! Update engine throughput: lazy propagation through chains and fan-out
//! trees of attributes.
//!
//! Run with: cargo bench --bench update_propagation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use attrgraph::{
    AttributeId, AttributeTypeBuilder, Graph, InputOptions, Subgraph, TraversalOptions, TypeId,
    TypeMetadata, UpdateOptions,
};

fn make_graph() -> (std::sync::Arc<Graph>, TypeId, TypeId) {
    let graph = Graph::new();
    let source_type = graph.intern_type(TypeMetadata("bench::update_propagation::source"), || {
        AttributeTypeBuilder::new("source", |ctx, _id| ctx.set_value(0i32)).build()
    });
    let increment_type = graph.intern_type(TypeMetadata("bench::update_propagation::increment"), || {
        AttributeTypeBuilder::new("increment", |ctx, _id| {
            let Some(prev) = ctx.body_mut::<AttributeId>().copied() else {
                return;
            };
            if let Ok(n) = ctx.input::<i32>(prev, InputOptions::NONE) {
                ctx.set_value(n + 1);
            }
        })
        .build()
    });
    (graph, source_type, increment_type)
}

/// A linear chain: each attribute depends on exactly the one before it.
/// Measures how the evaluation stack and dirty propagation scale with
/// chain depth.
fn bench_chain_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_propagation");

    for &len in &[10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            let (graph, source_type, increment_type) = make_graph();
            let ctx = graph.new_context();

            ctx.enter(|| {
                let subgraph = Subgraph::new(&ctx, None);
                let mut chain = vec![subgraph.create_attribute(source_type, ())];
                for _ in 1..len {
                    let prev = *chain.last().unwrap();
                    chain.push(subgraph.create_attribute(increment_type, prev));
                }
                let last = *chain.last().unwrap();
                let root = chain[0];

                // Settle the chain once so the benchmarked body only pays
                // for re-propagation after a single upstream edit.
                attrgraph::get_value::<i32>(last, TraversalOptions::UPDATE_DEPENDENCIES).unwrap();

                b.iter(|| {
                    attrgraph::set_value(root, black_box(1i32)).unwrap();
                    let read = attrgraph::get_value::<i32>(last, TraversalOptions::UPDATE_DEPENDENCIES).unwrap();
                    black_box(read.value);
                    // Reset so the next iteration re-triggers the full chain.
                    attrgraph::set_value(root, black_box(0i32)).unwrap();
                    attrgraph::update_value(last, UpdateOptions::NONE);
                });
            });
        });
    }

    group.finish();
}

/// A single source fanning out to many direct consumers, none of which
/// depend on each other. Measures dirty-propagation breadth rather than
/// evaluation-stack depth.
fn bench_fan_out_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out_propagation");

    for &width in &[10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            let (graph, source_type, increment_type) = make_graph();
            let ctx = graph.new_context();

            ctx.enter(|| {
                let subgraph = Subgraph::new(&ctx, None);
                let source = subgraph.create_attribute(source_type, ());
                let consumers: Vec<AttributeId> = (0..width)
                    .map(|_| subgraph.create_attribute(increment_type, source))
                    .collect();

                for &c in &consumers {
                    attrgraph::get_value::<i32>(c, TraversalOptions::UPDATE_DEPENDENCIES).unwrap();
                }

                b.iter(|| {
                    attrgraph::invalidate_value(source);
                    for &c in &consumers {
                        let read = attrgraph::get_value::<i32>(c, TraversalOptions::UPDATE_DEPENDENCIES).unwrap();
                        black_box(read.value);
                    }
                });
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chain_propagation, bench_fan_out_propagation);
criterion_main!(benches);
