//! One test per numbered testable property in the update engine's design
//! notes (properties 1 through 11).

use std::sync::Arc;

use attrgraph::{
    AttributeId, AttributeTypeBuilder, AttributeTypeFlags, ByteEqualityOracle, EnumCase, Graph,
    InputOptions, Kind, LayoutBuilder, PropagationFlags, Subgraph, TraversalOptions, TypeMetadata,
    UpdateOptions, UpdateStatus, ValueCompareOptions, ValueLayout, ValueStateBits,
    with_main_thread_handler, with_update,
};

/// Property 1: arena round-trip. A page-local allocation is offset-aligned
/// and its bytes read back exactly what was written.
#[test]
fn property_1_arena_round_trip() {
    use attrgraph::arena::{Zone, PAGE_SIZE};

    let mut zone = Zone::new(1, false);
    let ptr = zone.alloc_bytes(16, 7); // alignment_mask 7 == align to 8
    assert_eq!(ptr.offset() % 8, 0);
    assert!(ptr.offset() < PAGE_SIZE);

    zone.write_bytes(ptr, &[1, 2, 3, 4]);
    assert_eq!(zone.read_bytes(ptr, 4), vec![1, 2, 3, 4]);
}

/// Property 2: `AttributeId` kind tags match how the handle was created,
/// and the nil handle is the unique zero representation.
#[test]
fn property_2_kind_tags() {
    let graph = Graph::new();
    let ctx = graph.new_context();
    ctx.enter(|| {
        let subgraph = Subgraph::new(&ctx, None);
        let t = graph.intern_type(TypeMetadata("invariants::p2::t"), || {
            AttributeTypeBuilder::new("t", |ctx, _id| ctx.set_value(0i32)).build()
        });

        let direct = subgraph.create_attribute(t, ());
        assert_eq!(direct.kind(), Kind::Direct);

        let indirect = subgraph.create_indirect_attribute(direct, 0, Some(4), false);
        assert_eq!(indirect.kind(), Kind::Indirect);

        assert!(AttributeId::NIL.is_nil());
        assert_eq!(AttributeId::NIL.kind(), Kind::Nil);
    });
}

/// Property 3: a weak reference captured in a subgraph resolves to its
/// attribute until that subgraph is invalidated, after which it's nil.
#[test]
fn property_3_weak_expiry() {
    let graph = Graph::new();
    let ctx = graph.new_context();
    ctx.enter(|| {
        let subgraph = Subgraph::new(&ctx, None);
        let t = graph.intern_type(TypeMetadata("invariants::p3::t"), || {
            AttributeTypeBuilder::new("t", |ctx, _id| ctx.set_value(0i32)).build()
        });
        let a = subgraph.create_attribute(t, ());
        let w = attrgraph::weak(a);

        assert_eq!(attrgraph::evaluate_weak(w), a);
        assert!(!attrgraph::weak_expired(w));

        subgraph.invalidate();

        assert_eq!(attrgraph::evaluate_weak(w), AttributeId::NIL);
        assert!(attrgraph::weak_expired(w));
    });
}

/// Property 4: a declared input edge is mirrored as an output edge on the
/// source, so dirtying the source propagates forward to the consumer. We
/// can't read `Node::outputs` directly through the public surface (the
/// slot table is private to `Graph`), so we observe the edge's effect:
/// invalidating the source must dirty the consumer that read it as input.
#[test]
fn property_4_edge_symmetry() {
    let graph = Graph::new();
    let ctx = graph.new_context();
    ctx.enter(|| {
        let subgraph = Subgraph::new(&ctx, None);
        let source_type = graph.intern_type(TypeMetadata("invariants::p4::source"), || {
            AttributeTypeBuilder::new("source", |ctx, _id| ctx.set_value(1i32)).build()
        });
        let consumer_type = graph.intern_type(TypeMetadata("invariants::p4::consumer"), || {
            AttributeTypeBuilder::new("consumer", |ctx, _id| ctx.set_value(2i32)).build()
        });

        let source = subgraph.create_attribute(source_type, ());
        let consumer = subgraph.create_attribute(consumer_type, ());

        // Settle both nodes so neither is dirty from creation. This has to
        // happen *before* wiring the static edge below: evaluating a node
        // clears and rebuilds its input list from scratch, which would
        // otherwise immediately discard an edge this consumer's own thunk
        // never re-declares via `ctx.input`.
        attrgraph::update_value(source, UpdateOptions::NONE);
        attrgraph::update_value(consumer, UpdateOptions::NONE);
        assert!(!attrgraph::value_state(consumer).intersects(ValueStateBits::DIRTY));

        // Wire a static input edge without going through a thunk's own
        // `ctx.input` call (spec §4.4's host-declared dependency path).
        attrgraph::add_input(consumer, source, InputOptions::NONE);

        // Invalidating the source walks its recorded output edge back to
        // the consumer, proving the edge was mirrored when it was added.
        attrgraph::invalidate_value(source);
        assert!(attrgraph::value_state(consumer).intersects(ValueStateBits::DIRTY));
    });
}

/// Property 5: `set_value` reports `changed=true` exactly once for a
/// repeated identical write.
#[test]
fn property_5_idempotent_set() {
    let graph = Graph::new();
    let ctx = graph.new_context();
    ctx.enter(|| {
        let subgraph = Subgraph::new(&ctx, None);
        let t = graph.intern_type(TypeMetadata("invariants::p5::t"), || {
            AttributeTypeBuilder::new("t", |_ctx, _id| {}).build()
        });
        let a = subgraph.create_attribute(t, ());

        assert!(attrgraph::set_value(a, 7i32).unwrap());
        assert!(!attrgraph::set_value(a, 7i32).unwrap());
        assert!(attrgraph::set_value(a, 8i32).unwrap());
    });
}

/// Property 6: for a plain, enum-free, indirection-free type, the trivial
/// layout's structural compare agrees with a raw `memcmp`.
#[test]
fn property_6_layout_byte_compare_agreement() {
    let oracle = ByteEqualityOracle;
    let layout = ValueLayout::trivial(4);

    let lhs = 42i32.to_le_bytes();
    let rhs_same = 42i32.to_le_bytes();
    let rhs_diff = 43i32.to_le_bytes();

    assert_eq!(
        lhs == rhs_same,
        attrgraph::layout::compare(Some(&layout), &lhs, &rhs_same, &oracle, ValueCompareOptions::NONE)
    );
    assert_eq!(
        lhs == rhs_diff,
        attrgraph::layout::compare(Some(&layout), &lhs, &rhs_diff, &oracle, ValueCompareOptions::NONE)
    );
}

/// Property 7: enum comparison short-circuits on a discriminant mismatch,
/// and otherwise recurses into the matching case's payload layout.
#[test]
fn property_7_enum_compare() {
    let oracle = ByteEqualityOracle;
    let mut builder = LayoutBuilder::new(8);
    builder.enum_cases(
        0,
        4,
        4,
        vec![
            EnumCase {
                tag: 0,
                layout: ValueLayout::trivial(4),
            },
            EnumCase {
                tag: 1,
                layout: ValueLayout::trivial(4),
            },
        ],
    );
    let layout = builder.build();

    let mut same_tag_same_payload = [0u8; 8];
    same_tag_same_payload[0..4].copy_from_slice(&0u32.to_le_bytes());
    same_tag_same_payload[4..8].copy_from_slice(&9u32.to_le_bytes());
    let rhs = same_tag_same_payload;
    assert!(layout.compare(&same_tag_same_payload, &rhs, &oracle, ValueCompareOptions::NONE));

    let mut different_tag = [0u8; 8];
    different_tag[0..4].copy_from_slice(&1u32.to_le_bytes());
    different_tag[4..8].copy_from_slice(&9u32.to_le_bytes());
    assert!(!layout.compare(&same_tag_same_payload, &different_tag, &oracle, ValueCompareOptions::NONE));

    let mut same_tag_diff_payload = same_tag_same_payload;
    same_tag_diff_payload[4..8].copy_from_slice(&10u32.to_le_bytes());
    assert!(!layout.compare(&same_tag_same_payload, &same_tag_diff_payload, &oracle, ValueCompareOptions::NONE));
}

/// Property 8: after a subgraph update returns without aborting, no node
/// it covers is still dirty.
#[test]
fn property_8_update_fixed_point() {
    let graph = Graph::new();
    let ctx = graph.new_context();
    ctx.enter(|| {
        let subgraph = Subgraph::new(&ctx, None);
        let source_type = graph.intern_type(TypeMetadata("invariants::p8::source"), || {
            AttributeTypeBuilder::new("source", |ctx, _id| ctx.set_value(1i32)).build()
        });
        let plus_one_type = graph.intern_type(TypeMetadata("invariants::p8::plus_one"), || {
            AttributeTypeBuilder::new("plus_one", |ctx, _id| {
                let Some(source) = ctx.body_mut::<AttributeId>().copied() else {
                    return;
                };
                if let Ok(n) = ctx.input::<i32>(source, InputOptions::NONE) {
                    ctx.set_value(n + 1);
                }
            })
            .build()
        });

        let a = subgraph.create_attribute(source_type, ());
        let _b = subgraph.create_attribute(plus_one_type, a);
        let _c = subgraph.create_attribute(plus_one_type, a);

        let status = subgraph.update(PropagationFlags::ALL);
        assert_ne!(status, UpdateStatus::Aborted);
        assert!(!subgraph.is_dirty(PropagationFlags::ALL));
    });
}

/// Property 9: a node reached while it is already on the evaluation stack
/// is treated as clean for that pass rather than recursing forever or
/// panicking (the distinction the engine draws between a benign read-path
/// cycle and a fatal host-level reentrancy bug).
#[test]
fn property_9_no_reentrant_eval() {
    use std::sync::Mutex;

    type Link = Arc<Mutex<Option<AttributeId>>>;

    let graph = Graph::new();
    let ctx = graph.new_context();
    ctx.enter(|| {
        let subgraph = Subgraph::new(&ctx, None);
        let cyclic_type = graph.intern_type(TypeMetadata("invariants::p9::cyclic"), || {
            AttributeTypeBuilder::new("cyclic", |ctx, _id| {
                let Some(link) = ctx.body_mut::<Link>().cloned() else {
                    return;
                };
                let other = *link.lock().unwrap();
                let n = match other {
                    Some(other) => ctx.input::<i32>(other, InputOptions::NONE).unwrap_or(5),
                    None => 5,
                };
                ctx.set_value(n);
            })
            .build()
        });

        let a_link: Link = Arc::new(Mutex::new(None));
        let a = subgraph.create_attribute(cyclic_type, a_link.clone());
        let b = subgraph.create_attribute(cyclic_type, Arc::new(Mutex::new(Some(a))) as Link);
        *a_link.lock().unwrap() = Some(b);

        // Evaluating `a` recurses into `b`, whose thunk reads `a` back;
        // the in-stack check short-circuits that inner read instead of
        // overflowing the call stack.
        let result = attrgraph::get_value::<i32>(a, TraversalOptions::UPDATE_DEPENDENCIES).unwrap();
        assert_eq!(result.value, 5);
    });
}

/// Property 10: invalidating a subgraph cascades to every subgraph it owns
/// (`ChildKind::Owned`), destroying their nodes too.
#[test]
fn property_10_invalidation_cascade() {
    let graph = Graph::new();
    let ctx = graph.new_context();
    ctx.enter(|| {
        let parent = Subgraph::new(&ctx, None);
        let child = Subgraph::new(&ctx, Some(&parent));

        let t = graph.intern_type(TypeMetadata("invariants::p10::t"), || {
            AttributeTypeBuilder::new("t", |ctx, _id| ctx.set_value(1i32)).build()
        });
        let a = child.create_attribute(t, ());
        attrgraph::get_value::<i32>(a, TraversalOptions::UPDATE_DEPENDENCIES).unwrap();

        parent.invalidate();

        // The child's node list was cleared by the cascading invalidation;
        // a read against its now-destroyed attribute fails to resolve, and
        // iterating the child's (now empty) node list visits nothing.
        assert!(attrgraph::get_value::<i32>(a, TraversalOptions::NONE).is_err());
        let mut visited = 0;
        child.apply(PropagationFlags::ALL, |_| visited += 1);
        assert_eq!(visited, 0);
    });
}

/// Property 11: within a `with_update` scope, `invalidate` on a subgraph
/// does not destroy its nodes until the scope exits — reads against it
/// still succeed for the remainder of the scope — and the invalidation
/// actually lands once the scope ends.
#[test]
fn property_11_no_premature_invalidation() {
    let graph = Graph::new();
    let ctx = graph.new_context();
    ctx.enter(|| {
        let subgraph = Subgraph::new(&ctx, None);
        let t = graph.intern_type(TypeMetadata("invariants::p11::t"), || {
            AttributeTypeBuilder::new("t", |ctx, _id| ctx.set_value(3i32)).build()
        });
        let a = subgraph.create_attribute(t, ());

        // Still readable before any invalidation call.
        let read = attrgraph::get_value::<i32>(a, TraversalOptions::UPDATE_DEPENDENCIES).unwrap();
        assert_eq!(read.value, 3);

        with_update(|| {
            subgraph.invalidate();
            // Deferred: the node is still live for the rest of the scope.
            let read = attrgraph::get_value::<i32>(a, TraversalOptions::NONE).unwrap();
            assert_eq!(read.value, 3);
        });

        // The scope has exited, so the deferred invalidation has now run.
        assert!(attrgraph::get_value::<i32>(a, TraversalOptions::NONE).is_err());
    });
}

/// A `MAIN_THREAD`-flagged attribute cannot be evaluated outside
/// `with_main_thread_handler`: `update_value` reports
/// `UpdateStatus::NeedsCallMainHandler` instead of running the thunk, and
/// only completes once retried from inside that scope.
#[test]
fn main_thread_dispatch_requires_handler_scope() {
    let graph = Graph::new();
    let ctx = graph.new_context();
    ctx.enter(|| {
        let subgraph = Subgraph::new(&ctx, None);
        let main_thread_type = graph.intern_type(TypeMetadata("invariants::main_thread::t"), || {
            AttributeTypeBuilder::new("main_thread", |ctx, _id| ctx.set_value(7i32))
                .flags(AttributeTypeFlags::MAIN_THREAD)
                .build()
        });
        let a = subgraph.create_attribute(main_thread_type, ());

        let status = attrgraph::update_value(a, UpdateOptions::NONE);
        assert_eq!(status, UpdateStatus::NeedsCallMainHandler);
        assert!(!attrgraph::has_value(a));

        let status = with_main_thread_handler(|| attrgraph::update_value(a, UpdateOptions::NONE));
        assert_ne!(status, UpdateStatus::NeedsCallMainHandler);
        let read = attrgraph::get_value::<i32>(a, TraversalOptions::NONE).unwrap();
        assert_eq!(read.value, 7);
    });
}
