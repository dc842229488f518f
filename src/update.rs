//! The update engine: lazy, on-demand evaluation with cycle detection
//! and cooperative cancellation (spec §4.5, §5).
//!
//! Evaluation is single-threaded per graph (spec §5 "single-threaded
//! update per graph" — concurrent readers are safe, concurrent updaters
//! are not our problem to arbitrate beyond the state mutex). The
//! in-stack bit used for cycle detection (spec §3, S5 scenario) is kept
//! as a thread-local `Vec<AttributeId>` rather than a per-node flag,
//! since only one update can be in flight per thread at a time and this
//! avoids a second state-mutex round trip per frame.

use std::cell::{Cell, RefCell};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::context::{current_graph, UpdateContext};
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::identity::{AttributeId, Kind, WeakAttributeId};
use crate::options::{InputOptions, TraversalOptions, UpdateOptions, UpdateStatus, ValueStateBits};
use crate::value::AttributeValue;

thread_local! {
    static STACK: RefCell<Vec<AttributeId>> = const { RefCell::new(Vec::new()) };
    static CANCELLED: Cell<bool> = const { Cell::new(false) };
    static ON_MAIN_HANDLER: Cell<bool> = const { Cell::new(false) };
}

/// Run `f` with this thread marked as the main-thread handler, so
/// attributes flagged [`crate::attribute_type::AttributeTypeFlags::MAIN_THREAD`]
/// are allowed to evaluate instead of returning
/// [`UpdateStatus::NeedsCallMainHandler`] (spec §4.5 "Main-thread
/// handler"). Nests: leaving the inner scope restores whatever the outer
/// scope had set.
pub fn with_main_thread_handler<R>(f: impl FnOnce() -> R) -> R {
    let graph = current_graph();
    let previous = ON_MAIN_HANDLER.with(|h| h.replace(true));
    let was_already_deferring = graph.begin_deferring();
    let _guard = DeferGuard {
        graph: &graph,
        was_already_deferring,
    };
    let result = f();
    ON_MAIN_HANDLER.with(|h| h.set(previous));
    result
}

/// Run `f` with the current graph deferring invalidation: any
/// `Subgraph::invalidate` call made during `f` is enqueued instead of
/// destroying nodes immediately, and flushed once this (outermost) scope
/// ends (spec §3 "deferred invalidation", §8 property 11). Reads against
/// a subgraph invalidated inside the scope still succeed until then.
/// Clears the deferring flag on scope exit even if `f` panics.
pub fn with_update<R>(f: impl FnOnce() -> R) -> R {
    let graph = current_graph();
    let was_already_deferring = graph.begin_deferring();
    let _guard = DeferGuard {
        graph: &graph,
        was_already_deferring,
    };
    f()
}

struct DeferGuard<'a> {
    graph: &'a Graph,
    was_already_deferring: bool,
}

impl Drop for DeferGuard<'_> {
    fn drop(&mut self) {
        if !self.was_already_deferring {
            self.graph.end_deferring_and_flush();
        }
    }
}

pub(crate) fn current_thread_is_updating() -> bool {
    STACK.with(|s| !s.borrow().is_empty())
}

pub(crate) fn past_deadline(deadline_nanos: u64) -> bool {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    now > deadline_nanos
}

/// The result of a [`get_value`] read: the value plus whether fetching it
/// just triggered an evaluation that changed it (spec §4.5).
#[derive(Debug, Clone, Copy)]
pub struct ValueRead<V> {
    pub value: V,
    pub changed: bool,
}

/// Evaluate `id` if it is dirty, recursing into whatever inputs its
/// thunk reads. Returns `NoChange` for attributes that are already
/// clean, indirect aliases (evaluation always targets the direct
/// attribute they resolve to), or nil.
pub(crate) fn update_attribute(graph: &Graph, id: AttributeId, is_lookup: bool) -> UpdateStatus {
    if id.is_nil() {
        return UpdateStatus::NoChange;
    }

    let direct = match graph.kind_of(id) {
        Kind::Nil => return UpdateStatus::NoChange,
        Kind::Direct => id,
        Kind::Indirect => match graph.resolve_indirection(id) {
            Some((direct, _, _)) => direct,
            None => return UpdateStatus::NoChange,
        },
    };

    let top_level = STACK.with(|s| s.borrow().is_empty());
    if top_level {
        CANCELLED.with(|c| c.set(false));
    }

    if !graph.node_state(direct).intersects(ValueStateBits::DIRTY) {
        return UpdateStatus::NoChange;
    }

    // A node reached while it is still on the evaluation stack is part of
    // a cycle reached through the normal input-reading path (spec §8
    // property 9, S5 scenario) rather than a host-level reentrancy bug:
    // treat it as clean for this pass instead of recomputing it.
    let already_on_stack = STACK.with(|s| s.borrow().contains(&direct));
    if already_on_stack {
        tracing::warn!(?direct, "cycle detected while updating an attribute; treating as clean");
        return UpdateStatus::NoChange;
    }

    if CANCELLED.with(|c| c.get()) {
        return UpdateStatus::Aborted;
    }
    if graph.deadline().is_some_and(past_deadline) {
        return UpdateStatus::Aborted;
    }

    let requires_main_thread = graph
        .node_type_id(direct)
        .map(|type_id| graph.type_of(type_id).flags.contains(crate::attribute_type::AttributeTypeFlags::MAIN_THREAD))
        .unwrap_or(false);
    if requires_main_thread && !ON_MAIN_HANDLER.with(|h| h.get()) {
        return UpdateStatus::NeedsCallMainHandler;
    }

    let Some(mut node) = graph.take_node(direct) else {
        return UpdateStatus::NoChange;
    };

    let old_inputs: Vec<AttributeId> = node.inputs.iter().map(|e| e.source).collect();
    graph.unlink_inputs(direct, &old_inputs);
    node.clear_inputs();
    node.state |= ValueStateBits::EVALUATING;

    STACK.with(|s| s.borrow_mut().push(direct));
    graph.for_each_trace(|t| t.begin_update(direct));
    tracing::trace!(?direct, is_lookup, "updating attribute");

    let ty = graph.type_of(node.type_id);
    let (cancelled, changed) = {
        let mut ctx = UpdateContext::new(graph, direct, &mut node);
        ty.invoke_update(&mut ctx, direct);
        (ctx.is_cancelled(), ctx.changed())
    };

    graph.for_each_trace(|t| t.end_update(direct, changed));
    STACK.with(|s| {
        s.borrow_mut().pop();
    });

    node.state.0 &= !ValueStateBits::EVALUATING.0;
    // A cancelled evaluation leaves the node dirty so a later update
    // retries it from scratch instead of treating a never-computed value
    // as settled (spec §8 S6 scenario: a later `update_value` completes
    // normally).
    if !cancelled {
        node.clear_dirty_pending();
    }
    graph.restore_node(direct, node);

    if changed {
        graph.propagate_dirty(direct);
    }

    if cancelled {
        UpdateStatus::Aborted
    } else if changed {
        UpdateStatus::Changed
    } else {
        UpdateStatus::NoChange
    }
}

/// Declare a structural dependency from `node` on `input` without going
/// through an update thunk (spec §4.4) — used for attributes a host
/// wires up directly rather than discovering via evaluation. Returns the
/// input's index in `node`'s edge list.
pub fn add_input(node: AttributeId, input: AttributeId, options: InputOptions) -> u32 {
    current_graph().add_static_input(node, input, options)
}

pub fn get_value<V: AttributeValue>(a: AttributeId, options: TraversalOptions) -> Result<ValueRead<V>> {
    let graph = current_graph();
    if a.is_nil() {
        if options.contains(TraversalOptions::ASSERT_NOT_NIL) {
            crate::error::precondition_failure("get_value called with a nil attribute");
        }
        return Err(GraphError::NotFound("nil attribute has no value"));
    }
    let (direct, offset, _) = graph
        .resolve_indirection(a)
        .ok_or(GraphError::NotFound("attribute does not resolve to a live value"))?;
    if a.kind() == Kind::Direct {
        graph.check_and_record_value_type(direct, std::any::TypeId::of::<V>());
    }
    let status = update_attribute(&graph, direct, true);
    let bytes = graph
        .read_value_bytes(direct)
        .ok_or(GraphError::NotFound("attribute has no value yet"))?;
    let start = offset as usize;
    let end = start
        .checked_add(V::byte_size())
        .filter(|&end| end <= bytes.len())
        .ok_or(GraphError::Corruption("indirect offset out of range of the aliased value".into()))?;
    Ok(ValueRead {
        value: V::from_bytes(&bytes[start..end]),
        changed: status == UpdateStatus::Changed,
    })
}

/// Directly publish a value for `a`, bypassing its update thunk. Meant
/// for source attributes the host drives from outside the graph (spec
/// §4.4 "settable" attributes). Downstream consumers are marked dirty
/// when the value actually changes.
///
/// `a` must be a source attribute, i.e. one with no registered inputs;
/// calling this on a computed attribute is a precondition failure (spec
/// §4.4 step 1).
pub fn set_value<V: AttributeValue>(a: AttributeId, value: V) -> Result<bool> {
    let graph = current_graph();
    if graph.node_has_inputs(a) {
        crate::error::precondition_failure("set_value called on an attribute that already has inputs");
    }
    graph.check_and_record_value_type(a, std::any::TypeId::of::<V>());
    let bytes = value.as_bytes().to_vec();
    let old = graph.read_value_bytes(a);
    let changed = old.as_deref() != Some(bytes.as_slice());
    graph.write_value_bytes(a, &bytes);
    if changed {
        graph.propagate_dirty(a);
    }
    Ok(changed)
}

pub fn has_value(a: AttributeId) -> bool {
    let graph = current_graph();
    graph
        .resolve_indirection(a)
        .map(|(direct, _, _)| graph.node_state(direct).intersects(ValueStateBits::VALUE_INITIALIZED))
        .unwrap_or(false)
}

pub fn value_state(a: AttributeId) -> ValueStateBits {
    let graph = current_graph();
    graph.node_state(a)
}

pub fn update_value(a: AttributeId, options: UpdateOptions) -> UpdateStatus {
    let graph = current_graph();
    if options.contains(UpdateOptions::CANCEL_IF_PASSED_DEADLINE) && graph.deadline().is_some_and(past_deadline) {
        return UpdateStatus::Aborted;
    }
    if options.contains(UpdateOptions::ABORT_IF_CANCELLED) && CANCELLED.with(|c| c.get()) {
        return UpdateStatus::Aborted;
    }
    update_attribute(&graph, a, false)
}

/// Hint that `a` will likely be read soon; this engine has no background
/// evaluation thread (spec Non-goals: no automatic parallelism), so
/// there is nothing to kick off — the hint is a no-op kept for API
/// parity with hosts written against the original interface.
pub fn prefetch_value(_a: AttributeId) {}

pub fn invalidate_value(a: AttributeId) {
    let graph = current_graph();
    if let Some((direct, _, _)) = graph.resolve_indirection(a) {
        graph.mark_node_dirty(direct);
        graph.propagate_dirty(direct);
    }
}

/// Request that the innermost in-flight update (and everything still on
/// its call stack) abort at its next opportunity (spec §5, S6 scenario).
pub fn cancel_update() {
    CANCELLED.with(|c| c.set(true));
}

pub fn update_was_cancelled() -> bool {
    CANCELLED.with(|c| c.get())
}

/// Capture a weak reference to `a`, tagged with its zone's current
/// generation (spec §3, §4.6, property 3).
pub fn weak(a: AttributeId) -> WeakAttributeId {
    current_graph().weak_of(a)
}

/// Resolve a weak reference back to its attribute, or [`AttributeId::NIL`]
/// if the zone that owned it has since been invalidated (spec §4.6 S4
/// scenario: `w.evaluate() == nil` after invalidation).
pub fn evaluate_weak(weak: WeakAttributeId) -> AttributeId {
    current_graph().resolve_weak(weak).unwrap_or(AttributeId::NIL)
}

/// Whether a weak reference's zone has been invalidated since capture.
pub fn weak_expired(weak: WeakAttributeId) -> bool {
    evaluate_weak(weak).is_nil()
}
