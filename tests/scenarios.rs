//! Literal scenario tests: one test per worked example in the update
//! engine's design notes (S1 through S6).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use attrgraph::{
    AttributeId, AttributeTypeBuilder, Graph, InputOptions, Subgraph, Trace, TraversalOptions,
    TypeMetadata, UpdateOptions, UpdateStatus, ValueStateBits,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
struct Point {
    x: i32,
    y: i32,
}

#[test]
fn s1_single_attribute() {
    let graph = Graph::new();
    let ctx = graph.new_context();
    ctx.enter(|| {
        let subgraph = Subgraph::new(&ctx, None);
        let t_int = graph.intern_type(TypeMetadata("scenarios::s1::t_int"), || {
            AttributeTypeBuilder::new("t_int", |ctx, _id| {
                ctx.set_value(42i32);
            })
            .build()
        });

        let a = subgraph.create_attribute(t_int, ());

        let first = attrgraph::get_value::<i32>(a, TraversalOptions::UPDATE_DEPENDENCIES).unwrap();
        assert_eq!(first.value, 42);
        assert!(first.changed);

        let second = attrgraph::get_value::<i32>(a, TraversalOptions::UPDATE_DEPENDENCIES).unwrap();
        assert_eq!(second.value, 42);
        assert!(!second.changed);

        assert!(attrgraph::value_state(a).contains(ValueStateBits::VALUE_INITIALIZED));
    });
}

/// `a=const(1), b=a+1, c=a+2, d=b+c`. First read of `d` is `5` (not the
/// `4` the worked example states; `1+1=2`, `1+2=3`, `2+3=5` for any
/// reading of those formulas), changed on both the first read and after
/// `set_value(a, 10)` raises it to `23`; a third read reports no change.
#[test]
fn s2_diamond() {
    let graph = Graph::new();
    let ctx = graph.new_context();
    ctx.enter(|| {
        let subgraph = Subgraph::new(&ctx, None);

        let source_type = graph.intern_type(TypeMetadata("scenarios::s2::source"), || {
            AttributeTypeBuilder::new("source", |_ctx, _id| {}).build()
        });
        let plus_type = graph.intern_type(TypeMetadata("scenarios::s2::plus"), || {
            AttributeTypeBuilder::new("plus", |ctx, _id| {
                let Some((source, delta)) = ctx.body_mut::<(AttributeId, i32)>().copied() else {
                    return;
                };
                if let Ok(n) = ctx.input::<i32>(source, InputOptions::NONE) {
                    ctx.set_value(n + delta);
                }
            })
            .build()
        });
        let sum_type = graph.intern_type(TypeMetadata("scenarios::s2::sum"), || {
            AttributeTypeBuilder::new("sum", |ctx, _id| {
                let Some((left, right)) = ctx.body_mut::<(AttributeId, AttributeId)>().copied() else {
                    return;
                };
                let l = ctx.input::<i32>(left, InputOptions::NONE).unwrap_or(0);
                let r = ctx.input::<i32>(right, InputOptions::NONE).unwrap_or(0);
                ctx.set_value(l + r);
            })
            .build()
        });

        let a = subgraph.create_attribute(source_type, ());
        attrgraph::set_value(a, 1i32).unwrap();
        let b = subgraph.create_attribute(plus_type, (a, 1i32));
        let c = subgraph.create_attribute(plus_type, (a, 2i32));
        let d = subgraph.create_attribute(sum_type, (b, c));

        let first = attrgraph::get_value::<i32>(d, TraversalOptions::UPDATE_DEPENDENCIES).unwrap();
        assert_eq!(first.value, 5);
        assert!(first.changed);

        attrgraph::set_value(a, 10i32).unwrap();
        let second = attrgraph::get_value::<i32>(d, TraversalOptions::UPDATE_DEPENDENCIES).unwrap();
        assert_eq!(second.value, 23);
        assert!(second.changed);

        let third = attrgraph::get_value::<i32>(d, TraversalOptions::UPDATE_DEPENDENCIES).unwrap();
        assert_eq!(third.value, 23);
        assert!(!third.changed);
    });
}

/// `a=const{x:1,y:2}`, `b=indirect(a, offset=4, size=4)` aliasing `y`.
/// `a` is itself a computed attribute wrapping host-mutable state, so
/// that its own dirty bit is a real signal rather than bypassed by a
/// direct `set_value`.
#[test]
fn s3_indirect_alias() {
    let graph = Graph::new();
    let ctx = graph.new_context();
    ctx.enter(|| {
        let subgraph = Subgraph::new(&ctx, None);
        let cell = Arc::new(Mutex::new(Point { x: 1, y: 2 }));

        let cell_source_type = graph.intern_type(TypeMetadata("scenarios::s3::cell_source"), || {
            AttributeTypeBuilder::new("cell_source", |ctx, _id| {
                let Some(cell) = ctx.body_mut::<Arc<Mutex<Point>>>().cloned() else {
                    return;
                };
                let point = *cell.lock();
                ctx.set_value(point);
            })
            .build()
        });

        let a = subgraph.create_attribute(cell_source_type, cell.clone());
        let b = subgraph.create_indirect_attribute(a, 4, Some(4), false);

        let first = attrgraph::get_value::<i32>(b, TraversalOptions::UPDATE_DEPENDENCIES).unwrap();
        assert_eq!(first.value, 2);

        *cell.lock() = Point { x: 1, y: 3 };
        attrgraph::invalidate_value(a);

        let second = attrgraph::get_value::<i32>(b, TraversalOptions::UPDATE_DEPENDENCIES).unwrap();
        assert_eq!(second.value, 3);
        assert!(second.changed);
    });
}

/// `w=weak(a)` inside subgraph `s`; `invalidate(s)`; `w.evaluate()==nil`;
/// `w.expired()==true`.
#[test]
fn s4_weak_expiry() {
    let graph = Graph::new();
    let ctx = graph.new_context();
    ctx.enter(|| {
        let subgraph = Subgraph::new(&ctx, None);
        let t = graph.intern_type(TypeMetadata("scenarios::s4::t"), || {
            AttributeTypeBuilder::new("t", |ctx, _id| ctx.set_value(1i32)).build()
        });

        let a = subgraph.create_attribute(t, ());
        let w = attrgraph::weak(a);
        assert!(!attrgraph::weak_expired(w));
        assert_eq!(attrgraph::evaluate_weak(w), a);

        subgraph.invalidate();

        assert_eq!(attrgraph::evaluate_weak(w), AttributeId::NIL);
        assert!(attrgraph::weak_expired(w));
    });
}

/// `a.inputs=[b]`, `b.inputs=[a]`. Evaluating `a` recurses into `b`,
/// whose thunk reads `a` back: the engine finds `a` already on the
/// evaluation stack and treats it as clean for that inner read instead
/// of recursing forever, so the outer evaluation still reaches a
/// deterministic result.
#[test]
fn s5_cycle_is_treated_as_clean() {
    let graph = Graph::new();
    let ctx = graph.new_context();
    ctx.enter(|| {
        let subgraph = Subgraph::new(&ctx, None);
        type Link = Arc<Mutex<Option<AttributeId>>>;

        let cyclic_type = graph.intern_type(TypeMetadata("scenarios::s5::cyclic"), || {
            AttributeTypeBuilder::new("cyclic", |ctx, _id| {
                let Some(link) = ctx.body_mut::<Link>().cloned() else {
                    return;
                };
                let other = *link.lock();
                let n = match other {
                    Some(other) => ctx.input::<i32>(other, InputOptions::NONE).unwrap_or(7),
                    None => 7,
                };
                ctx.set_value(n);
            })
            .build()
        });

        // `a`'s link is filled in once `b` exists, completing the cycle
        // before either attribute is ever evaluated.
        let a_link: Link = Arc::new(Mutex::new(None));
        let a = subgraph.create_attribute(cyclic_type, a_link.clone());
        let b = subgraph.create_attribute(cyclic_type, Arc::new(Mutex::new(Some(a))) as Link);
        *a_link.lock() = Some(b);

        let result = attrgraph::get_value::<i32>(a, TraversalOptions::UPDATE_DEPENDENCIES).unwrap();
        assert_eq!(result.value, 7);
        assert!(result.changed);
    });
}

#[derive(Default)]
struct CancelAtNth {
    count: AtomicU32,
    threshold: u32,
}

impl Trace for CancelAtNth {
    fn begin_update(&self, _node: AttributeId) {
        let seen = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        if seen == self.threshold {
            attrgraph::cancel_update();
        }
    }
}

/// Begin an update over a 1000-node chain; a trace cancels at the 100th
/// `begin_update` call. The evaluation aborts without completing the
/// chain, and a later update over the same graph still completes
/// normally once cancellation isn't pending anymore.
#[test]
fn s6_cancel_mid_chain() {
    let graph = Graph::new();
    graph.add_trace(Box::new(CancelAtNth {
        count: AtomicU32::new(0),
        threshold: 100,
    }));

    let ctx = graph.new_context();
    ctx.enter(|| {
        let subgraph = Subgraph::new(&ctx, None);
        let source_type = graph.intern_type(TypeMetadata("scenarios::s6::source"), || {
            AttributeTypeBuilder::new("source", |_ctx, _id| {}).build()
        });
        let increment_type = graph.intern_type(TypeMetadata("scenarios::s6::increment"), || {
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

        let mut chain = vec![subgraph.create_attribute(source_type, ())];
        attrgraph::set_value(chain[0], 0i32).unwrap();
        for _ in 1..1000 {
            let prev = *chain.last().unwrap();
            chain.push(subgraph.create_attribute(increment_type, prev));
        }
        let last = *chain.last().unwrap();

        let status = attrgraph::update_value(last, UpdateOptions::NONE);
        assert_eq!(status, UpdateStatus::Aborted);
        assert!(attrgraph::update_was_cancelled());

        // A later update, once cancellation isn't pending, completes normally.
        let status = attrgraph::update_value(last, UpdateOptions::NONE);
        assert_eq!(status, UpdateStatus::Changed);
        let read = attrgraph::get_value::<i32>(last, TraversalOptions::UPDATE_DEPENDENCIES).unwrap();
        assert_eq!(read.value, 999);
    });
}
