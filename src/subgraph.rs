//! Subgraphs: the owning scope for a set of attributes (spec §3, §4.8).
//!
//! A [`Subgraph`] is a thin `Arc<Graph>` + index handle; the actual
//! bookkeeping lives in [`SubgraphRecord`], owned by `Graph`'s internal
//! state, mirroring how the teacher crate keeps `Transaction` a handle
//! over state the `GraphDB` actually owns.

use std::sync::Arc;

use crate::arena::Zone;
use crate::context::Context;
use crate::external::RetainedClosure;
use crate::graph::Graph;
use crate::identity::AttributeId;
use crate::options::{ChildKind, PropagationFlags, UpdateStatus};

/// Handle returned by [`Subgraph::add_observer`], passed back to
/// [`Subgraph::remove_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(pub(crate) u32);

/// Lifecycle state of a subgraph (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    Valid,
    InvalidationScheduled,
    Invalidated,
    GraphDestroyed,
}

/// One node in the debug tree an `AG_TREE`-enabled subgraph records
/// (spec §4.8 "Tree", SPEC_FULL §10).
#[derive(Debug, Clone, Default)]
pub struct TreeNode {
    pub label: String,
    pub values: Vec<String>,
    pub children: Vec<TreeNode>,
}

/// Internal per-subgraph state, owned by `Graph`'s slot table.
pub(crate) struct SubgraphRecord {
    /// The `Context` this subgraph was created under. Invalidation only
    /// recurses into an `Owned` child that shares this id (spec §3
    /// "Lifecycles").
    pub(crate) context_id: u32,
    pub(crate) parents: Vec<(u32, ChildKind)>,
    pub(crate) children: Vec<(u32, ChildKind)>,
    pub(crate) observers: Vec<(u32, RetainedClosure)>,
    next_observer_id: u32,
    pub(crate) validation: ValidationState,
    pub(crate) propagation: PropagationFlags,
    /// Attribute ids directly owned by this subgraph, in creation order —
    /// this is the page-local node list spec §4.3 threads through
    /// `next_in_subgraph`; we also keep it flattened here for fast
    /// iteration in `apply`.
    pub(crate) nodes: Vec<AttributeId>,
    pub(crate) zone: Zone,
    tree: Option<TreeNode>,
    tree_path: Vec<usize>,
    /// Stamped by `Graph::reachable_subgraphs` so a single `apply`/
    /// `update`/`is_dirty` traversal visits this subgraph at most once
    /// even if it is reachable through more than one parent (spec §4.8
    /// "a monotonically-increasing traversal seed per-subgraph").
    pub(crate) last_traversal_seed: u32,
}

impl SubgraphRecord {
    pub(crate) fn new(zone: Zone, record_tree: bool, context_id: u32) -> Self {
        SubgraphRecord {
            context_id,
            parents: Vec::new(),
            children: Vec::new(),
            observers: Vec::new(),
            next_observer_id: 1,
            validation: ValidationState::Valid,
            propagation: PropagationFlags::ALL,
            nodes: Vec::new(),
            zone,
            tree: if record_tree {
                Some(TreeNode::default())
            } else {
                None
            },
            tree_path: Vec::new(),
            last_traversal_seed: 0,
        }
    }

    pub(crate) fn add_observer(&mut self, f: RetainedClosure) -> ObserverId {
        let id = self.next_observer_id;
        self.next_observer_id += 1;
        self.observers.push((id, f));
        ObserverId(id)
    }

    pub(crate) fn remove_observer(&mut self, id: ObserverId) {
        self.observers.retain(|(existing, _)| *existing != id.0);
    }

    pub(crate) fn notify_observers(&mut self) {
        for (_, observer) in &mut self.observers {
            observer();
        }
    }

    fn current_tree_node_mut(&mut self) -> Option<&mut TreeNode> {
        let mut node = self.tree.as_mut()?;
        for &index in &self.tree_path {
            node = node.children.get_mut(index)?;
        }
        Some(node)
    }

    pub(crate) fn begin_tree_element(&mut self, label: impl Into<String>) {
        let Some(parent) = self.current_tree_node_mut() else {
            return;
        };
        parent.children.push(TreeNode {
            label: label.into(),
            ..Default::default()
        });
        let next_index = parent.children.len() - 1;
        self.tree_path.push(next_index);
    }

    pub(crate) fn end_tree_element(&mut self) {
        self.tree_path.pop();
    }

    pub(crate) fn add_tree_value(&mut self, value: impl Into<String>) {
        if let Some(node) = self.current_tree_node_mut() {
            node.values.push(value.into());
        }
    }

    pub(crate) fn tree(&self) -> Option<&TreeNode> {
        self.tree.as_ref()
    }
}

/// A scope that owns a set of attributes and forms a DAG with other
/// subgraphs via [`Subgraph::add_child`] (spec §3, §4.8).
#[derive(Clone)]
pub struct Subgraph {
    pub(crate) graph: Arc<Graph>,
    pub(crate) index: u32,
}

impl Subgraph {
    /// Create a new subgraph under `context`'s graph. `owner`, if given,
    /// immediately becomes a parent with [`ChildKind::Owned`].
    pub fn new(context: &Context, owner: Option<&Subgraph>) -> Subgraph {
        let graph = context.graph().clone();
        let index = graph.create_subgraph(context.id());
        let subgraph = Subgraph { graph, index };
        if let Some(owner) = owner {
            owner.add_child(&subgraph, ChildKind::Owned);
        }
        subgraph
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn add_child(&self, child: &Subgraph, tag: ChildKind) {
        self.graph.link_subgraphs(self.index, child.index, tag);
    }

    pub fn remove_child(&self, child: &Subgraph) {
        self.graph.unlink_subgraphs(self.index, child.index);
    }

    /// Invalidate every attribute owned by this subgraph, recursively
    /// through `Owned` children (spec §4.8 invariant: invalidating a
    /// subgraph invalidates everything it owns).
    pub fn invalidate(&self) {
        self.graph.invalidate_subgraph(self.index);
    }

    pub fn add_observer(&self, f: impl FnMut() + Send + 'static) -> ObserverId {
        self.graph.add_subgraph_observer(self.index, Box::new(f))
    }

    pub fn remove_observer(&self, id: ObserverId) {
        self.graph.remove_subgraph_observer(self.index, id);
    }

    /// Call `body` once for every attribute owned by this subgraph or by a
    /// child reachable through the subgraph DAG whose propagation flags
    /// intersect `flags`; each reachable subgraph is visited at most once
    /// even if shared by more than one ancestor (spec §4.8 "Apply").
    pub fn apply(&self, flags: PropagationFlags, body: impl FnMut(AttributeId)) {
        self.graph.subgraph_apply(self.index, flags, body);
    }

    /// Drive this subgraph and every subgraph reachable through its
    /// children to quiescence for `flags` (spec §4.5, §4.8 "Update").
    pub fn update(&self, flags: PropagationFlags) -> UpdateStatus {
        self.graph.update_subgraph(self.index, flags)
    }

    pub fn intersects(&self, flags: PropagationFlags) -> bool {
        self.graph.subgraph_propagation(self.index).intersects(flags)
    }

    pub fn is_dirty(&self, flags: PropagationFlags) -> bool {
        self.graph.subgraph_is_dirty(self.index, flags)
    }

    pub fn create_attribute<B: crate::context::AttributeBody>(
        &self,
        type_id: crate::graph::TypeId,
        body: B,
    ) -> AttributeId {
        self.graph.create_attribute(self.index, type_id, body)
    }

    pub fn create_indirect_attribute(
        &self,
        source: AttributeId,
        offset: u32,
        size: Option<u16>,
        mutable_: bool,
    ) -> AttributeId {
        self.graph
            .create_indirect_attribute(self.index, source, offset, size, mutable_)
    }

    pub fn tree_snapshot(&self) -> Option<TreeNode> {
        self.graph.subgraph_tree(self.index)
    }
}

impl std::fmt::Debug for Subgraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subgraph").field("index", &self.index).finish()
    }
}
