//! `Context`: a graph's entry point for a host thread (spec §3, §4.9 —
//! "the first reference to a Graph is its primary context"), plus
//! `UpdateContext`, the per-evaluation handle an attribute type's update
//! thunk runs against.

use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;

use crate::graph::Graph;
use crate::identity::{AttributeId, Kind};
use crate::node::Node;
use crate::options::InputOptions;
use crate::value::AttributeValue;

/// Any `Send + 'static` type can be stored as an attribute's body (spec
/// §4.3's per-node "body" bytes); Rust ownership stands in for the
/// original's explicit body-size registration.
pub trait AttributeBody: Send + 'static {}
impl<T: Send + 'static> AttributeBody for T {}

thread_local! {
    static CURRENT: RefCell<Vec<Arc<Graph>>> = const { RefCell::new(Vec::new()) };
}

/// Push `graph` as the thread's current graph for the duration of `f`.
/// Free functions like [`crate::update::get_value`] resolve against
/// whatever graph is current, mirroring the original's per-thread
/// "current subgraph" pointer (spec §5).
pub(crate) fn with_current<R>(graph: &Arc<Graph>, f: impl FnOnce() -> R) -> R {
    CURRENT.with(|c| c.borrow_mut().push(graph.clone()));
    let result = f();
    CURRENT.with(|c| {
        c.borrow_mut().pop();
    });
    result
}

pub(crate) fn current_graph() -> Arc<Graph> {
    CURRENT.with(|c| {
        c.borrow()
            .last()
            .cloned()
            .unwrap_or_else(|| crate::error::precondition_failure("no current graph; call from within Context::enter"))
    })
}

/// A host thread's handle onto a [`Graph`]. The first `Context` created
/// for a graph is its primary context (spec §4.9); later contexts are
/// cheap, `Clone`-free handles sharing the same graph.
pub struct Context {
    graph: Arc<Graph>,
    id: u32,
}

impl Context {
    pub(crate) fn new(graph: Arc<Graph>, id: u32) -> Self {
        Context { graph, id }
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn set_deadline(&self, nanos: u64) {
        self.graph.set_deadline(nanos);
    }

    /// Run `f` with this context's graph installed as the thread-current
    /// graph, so the free functions in [`crate::update`] can find it.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        with_current(&self.graph, f)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("id", &self.id).finish()
    }
}

/// Handed to an attribute type's update thunk while it evaluates `self_id`
/// (spec §4.2/§4.5). Bundles the graph, the evaluating node (temporarily
/// taken out of the slot table so nested updates don't need to re-enter
/// the state lock), and the set of source ids it reads during this pass.
pub struct UpdateContext<'a> {
    graph: &'a Graph,
    self_id: AttributeId,
    node: &'a mut Node,
    cancelled: bool,
    changed: bool,
}

impl<'a> UpdateContext<'a> {
    pub(crate) fn new(graph: &'a Graph, self_id: AttributeId, node: &'a mut Node) -> Self {
        UpdateContext {
            graph,
            self_id,
            node,
            cancelled: false,
            changed: false,
        }
    }

    pub(crate) fn changed(&self) -> bool {
        self.changed
    }

    pub fn self_id(&self) -> AttributeId {
        self.self_id
    }

    /// Read `source`'s current value, recording it as an input of the
    /// attribute under evaluation (spec §4.4 dependency tracking).
    pub fn input<V: AttributeValue>(&mut self, source: AttributeId, options: InputOptions) -> crate::error::Result<V> {
        // Dependency edges always land on the direct attribute a source
        // resolves to, indirect or not, so dirty propagation from that
        // attribute reaches this node (spec §4.4, §4.6).
        let (direct, offset, _) = self
            .graph
            .resolve_indirection(source)
            .ok_or(crate::error::GraphError::NotFound("input does not resolve to a live value"))?;
        if source.kind() == Kind::Direct {
            self.graph.check_and_record_value_type(direct, std::any::TypeId::of::<V>());
        }
        self.node.add_input(direct, options);
        if !options.contains(InputOptions::UNPREFETCHED) {
            crate::update::update_attribute(self.graph, direct, true);
        }
        let bytes = self
            .graph
            .read_value_bytes(direct)
            .ok_or(crate::error::GraphError::NotFound("attribute has no value"))?;
        let start = offset as usize;
        let end = start
            .checked_add(V::byte_size())
            .filter(|&end| end <= bytes.len())
            .ok_or(crate::error::GraphError::Corruption("indirect offset out of range of the aliased value".into()))?;
        Ok(V::from_bytes(&bytes[start..end]))
    }

    /// Publish a new value for the attribute under evaluation, returning
    /// whether it differs from the previous one under the type's
    /// registered comparison mode (spec §4.5, §4.7).
    pub fn set_value<V: AttributeValue>(&mut self, value: V) -> bool {
        self.graph.check_and_record_value_type(self.self_id, std::any::TypeId::of::<V>());
        let bytes = value.as_bytes().to_vec();
        let old = self.graph.read_value_bytes(self.self_id);
        let ty = self.graph.type_of(self.node.type_id);
        let changed = match (&old, ty.comparison_mode) {
            (_, crate::attribute_type::ComparisonMode::Never) => true,
            (_, crate::attribute_type::ComparisonMode::AlwaysEqual) => false,
            (None, crate::attribute_type::ComparisonMode::Structural) => true,
            (Some(old), crate::attribute_type::ComparisonMode::Structural) => {
                let oracle = crate::external::ByteEqualityOracle;
                !crate::layout::compare(
                    ty.layout.as_ref(),
                    old,
                    &bytes,
                    &oracle,
                    crate::options::ValueCompareOptions::NONE,
                )
            }
        };
        self.graph.write_value_bytes(self.self_id, &bytes);
        self.changed = self.changed || changed;
        changed
    }

    pub fn body_mut<B: AttributeBody>(&mut self) -> Option<&mut B> {
        self.node.body.as_deref_mut().and_then(<dyn Any + Send>::downcast_mut::<B>)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
            || crate::update::update_was_cancelled()
            || self.graph.deadline().is_some_and(|d| crate::update::past_deadline(d))
    }

    /// Cancel the update in progress from inside its own thunk, without
    /// going through the thread-local [`crate::update::cancel_update`].
    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }
}
