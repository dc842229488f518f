//! `Graph`: the global coordinator owning the type registry, the node
//! slot table, subgraphs, traces, and key interning (spec §3, §4.9).
//!
//! Spec §4.3 describes nodes as byte-packed records inside a mapped
//! arena; we keep [`crate::arena`] for attribute *value* bytes (needed
//! for the §4.7 structural comparator) but store node bookkeeping in a
//! plain `Vec<Option<NodeSlot>>` slot table, indexed by
//! [`AttributeId::slot_index`]. This mirrors how the teacher crate keeps
//! its B-tree nodes in a `Vec`-backed page cache rather than walking raw
//! bytes for every structural operation.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::arena::Zone;
use crate::attribute_type::AttributeType;
use crate::config::GraphConfig;
use crate::context::{AttributeBody, Context};
use crate::error::precondition_failure;
use crate::external::{AtomicIdGenerator, IdGenerator};
use crate::identity::{AttributeId, Kind, WeakAttributeId};
use crate::node::{IndirectNode, MutableIndirectNode, Node, NodeSlot};
use crate::options::{ChildKind, GraphCounter, PropagationFlags, UpdateStatus, ValueStateBits};
use crate::subgraph::{ObserverId, SubgraphRecord, TreeNode, ValidationState};
use crate::trace::Trace;

/// Index into a [`Graph`]'s type registry (spec §4.2).
pub type TypeId = u32;

/// Handle returned by [`Graph::add_trace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceId(pub(crate) u32);

/// Memoization key for [`Graph::intern_type`]: types registered under the
/// same metadata reuse the same [`TypeId`] rather than re-running `make`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeMetadata(pub &'static str);

const VALUE_ALIGN_MASK: u32 = 7;

/// String interning table for trace event names (spec §4.9 "key
/// interning", SPEC_FULL §10).
#[derive(Default)]
pub(crate) struct KeyTable {
    forward: Vec<String>,
    reverse: FxHashMap<String, u32>,
}

impl KeyTable {
    pub(crate) fn intern(&mut self, key: &str) -> u32 {
        if let Some(id) = self.reverse.get(key) {
            return *id;
        }
        let id = self.forward.len() as u32;
        self.forward.push(key.to_string());
        self.reverse.insert(key.to_string(), id);
        id
    }

    pub(crate) fn resolve(&self, id: u32) -> Option<&str> {
        self.forward.get(id as usize).map(String::as_str)
    }
}

pub(crate) struct GraphState {
    pub(crate) config: GraphConfig,
    pub(crate) types: crate::attribute_type::TypeRegistry,
    pub(crate) type_by_metadata: FxHashMap<TypeMetadata, TypeId>,
    pub(crate) subgraphs: Vec<Option<SubgraphRecord>>,
    pub(crate) nodes: Vec<Option<NodeSlot>>,
    pub(crate) slot_generation: Vec<u32>,
    free_slots: Vec<u32>,
    pub(crate) keys: KeyTable,
    traces: Vec<(u32, Box<dyn Trace>)>,
    next_trace_id: u32,
    next_context_id: u32,
    /// Subgraphs whose invalidation was requested while the graph was
    /// deferring (spec §3 "list of pending-to-invalidate Subgraphs"),
    /// flushed when the deferring scope ends.
    pending_invalidations: Vec<u32>,
}

impl GraphState {
    fn new(config: GraphConfig) -> Self {
        GraphState {
            config,
            types: crate::attribute_type::TypeRegistry::new(),
            type_by_metadata: FxHashMap::default(),
            subgraphs: Vec::new(),
            // Index 0 is reserved: `AttributeId` slot index 0 only ever
            // names `AttributeId::NIL`.
            nodes: vec![None],
            slot_generation: vec![0],
            free_slots: Vec::new(),
            keys: KeyTable::default(),
            traces: Vec::new(),
            next_trace_id: 1,
            next_context_id: 1,
            pending_invalidations: Vec::new(),
        }
    }

    fn alloc_slot(&mut self) -> u32 {
        if let Some(index) = self.free_slots.pop() {
            index
        } else {
            let index = self.nodes.len() as u32;
            self.nodes.push(None);
            self.slot_generation.push(0);
            index
        }
    }

    fn for_each_trace(&self, mut f: impl FnMut(&dyn Trace)) {
        for (_, trace) in self.traces.iter().rev() {
            f(trace.as_ref());
        }
    }

    /// Mark `id`'s direct outputs dirty, recursing through already-clean
    /// nodes only (spec §4.5 dirty propagation).
    fn propagate_dirty(&mut self, id: AttributeId) {
        let outputs = match self.nodes[id.slot_index() as usize].as_ref() {
            Some(NodeSlot::Direct(node)) => node.outputs.iter().map(|e| e.target).collect::<Vec<_>>(),
            _ => Vec::new(),
        };
        for target in outputs {
            if let Some(NodeSlot::Direct(node)) = self.nodes.get_mut(target.slot_index() as usize).and_then(|s| s.as_mut())
            {
                if node.is_dirty() {
                    continue;
                }
                node.mark_dirty();
                node.mark_pending();
                self.propagate_dirty(target);
            }
        }
    }

}

/// The global coordinator: type registry, node slots, subgraphs, traces
/// (spec §3, §4.9). Always held behind `Arc` since subgraphs, contexts,
/// and the thread-local "current graph" pointer all share ownership.
pub struct Graph {
    id: u32,
    pub(crate) state: Mutex<GraphState>,
    deadline_nanos: AtomicU64,
    needs_update: std::sync::atomic::AtomicBool,
    ids: AtomicIdGenerator,
    /// Monotonic source for the per-traversal seed `reachable_subgraphs`
    /// stamps on every subgraph it visits, so `apply`/`update`/`is_dirty`
    /// (spec §4.8) visit each descendant reachable through the child DAG
    /// exactly once even when two ancestors share a descendant. Starts at
    /// 1 so a record's zero-initialized `last_traversal_seed` never reads
    /// as "already visited".
    traversal_seed: AtomicU32,
    /// Set for the duration of a [`crate::update::with_update`] scope;
    /// while set, `invalidate_subgraph` enqueues instead of destroying
    /// nodes immediately (spec §3 "deferred invalidation", §8 property 11).
    deferring: std::sync::atomic::AtomicBool,
}

impl Graph {
    pub fn new() -> Arc<Graph> {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Arc<Graph> {
        static GRAPH_IDS: AtomicU32 = AtomicU32::new(1);
        let graph = Graph {
            id: GRAPH_IDS.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(GraphState::new(config)),
            deadline_nanos: AtomicU64::new(0),
            needs_update: std::sync::atomic::AtomicBool::new(false),
            ids: AtomicIdGenerator::default(),
            traversal_seed: AtomicU32::new(1),
            deferring: std::sync::atomic::AtomicBool::new(false),
        };
        Arc::new(graph)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn new_context(self: &Arc<Graph>) -> Context {
        let id = {
            let mut state = self.state.lock();
            let id = state.next_context_id;
            state.next_context_id += 1;
            id
        };
        Context::new(self.clone(), id)
    }

    pub fn invalidate(&self) {
        let indices: Vec<u32> = {
            let state = self.state.lock();
            (0..state.subgraphs.len() as u32)
                .filter(|i| state.subgraphs[*i as usize].is_some())
                .collect()
        };
        for index in indices {
            self.invalidate_subgraph(index);
        }
    }

    pub fn invalidate_all_values(&self) {
        let mut state = self.state.lock();
        let ids: Vec<AttributeId> = state
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Some(NodeSlot::Direct(_)) if i != 0 => Some(AttributeId::direct(i as u32)),
                _ => None,
            })
            .collect();
        for id in ids {
            if let Some(NodeSlot::Direct(node)) = state.nodes[id.slot_index() as usize].as_mut() {
                node.mark_dirty();
                node.mark_pending();
            }
        }
    }

    pub fn counter(&self, query: GraphCounter) -> u64 {
        let state = self.state.lock();
        match query {
            GraphCounter::NodeCount => state.nodes.iter().filter(|s| s.is_some()).count() as u64,
            GraphCounter::SubgraphCount => state.subgraphs.iter().filter(|s| s.is_some()).count() as u64,
            GraphCounter::GraphId => self.id as u64,
            GraphCounter::ContextId => state.next_context_id as u64,
            GraphCounter::NeedsUpdate => self.needs_update.load(Ordering::Relaxed) as u64,
            GraphCounter::ThreadUpdating => crate::update::current_thread_is_updating() as u64,
        }
    }

    pub fn intern_type(&self, metadata: TypeMetadata, make: impl FnOnce() -> AttributeType) -> TypeId {
        let mut state = self.state.lock();
        if let Some(id) = state.type_by_metadata.get(&metadata) {
            return *id;
        }
        let ty = make();
        let id = state.types.register(ty);
        state.type_by_metadata.insert(metadata, id);
        id
    }

    pub fn set_deadline(&self, nanos: u64) {
        self.deadline_nanos.store(nanos, Ordering::Relaxed);
    }

    pub fn deadline(&self) -> Option<u64> {
        match self.deadline_nanos.load(Ordering::Relaxed) {
            0 => None,
            n => Some(n),
        }
    }

    pub fn add_trace(&self, trace: Box<dyn Trace>) -> TraceId {
        let mut state = self.state.lock();
        let id = state.next_trace_id;
        state.next_trace_id += 1;
        state.traces.push((id, trace));
        TraceId(id)
    }

    pub fn remove_trace(&self, id: TraceId) {
        let mut state = self.state.lock();
        state.traces.retain(|(existing, _)| *existing != id.0);
    }

    pub(crate) fn for_each_trace(&self, f: impl FnMut(&dyn Trace)) {
        self.state.lock().for_each_trace(f);
    }

    pub(crate) fn next_process_id(&self) -> u32 {
        self.ids.next()
    }

    // -- subgraphs ---------------------------------------------------

    pub(crate) fn create_subgraph(&self, context_id: u32) -> u32 {
        let mut state = self.state.lock();
        let record_tree = state.config.tree;
        let index = state.subgraphs.len() as u32;
        let zone = Zone::new(index, state.config.unmap_reusable);
        state
            .subgraphs
            .push(Some(SubgraphRecord::new(zone, record_tree, context_id)));
        index
    }

    fn next_traversal_seed(&self) -> u32 {
        self.traversal_seed.fetch_add(1, Ordering::Relaxed)
    }

    /// All subgraph indices reachable from `root` through the child DAG
    /// (any tag), each visited at most once (spec §4.8 "Apply": "a
    /// monotonically-increasing traversal seed per-subgraph to guarantee
    /// each descendant is visited at most once").
    pub(crate) fn reachable_subgraphs(&self, root: u32) -> Vec<u32> {
        let seed = self.next_traversal_seed();
        let mut result = Vec::new();
        let mut to_visit = vec![root];
        let mut state = self.state.lock();
        while let Some(current) = to_visit.pop() {
            let Some(Some(record)) = state.subgraphs.get_mut(current as usize) else {
                continue;
            };
            if record.last_traversal_seed == seed {
                continue;
            }
            record.last_traversal_seed = seed;
            result.push(current);
            to_visit.extend(record.children.iter().map(|(c, _)| *c));
        }
        result
    }

    pub(crate) fn link_subgraphs(&self, parent: u32, child: u32, tag: ChildKind) {
        let mut state = self.state.lock();
        if let Some(Some(p)) = state.subgraphs.get_mut(parent as usize) {
            if !p.children.iter().any(|(c, _)| *c == child) {
                p.children.push((child, tag));
            }
        }
        if let Some(Some(c)) = state.subgraphs.get_mut(child as usize) {
            if !c.parents.iter().any(|(p, _)| *p == parent) {
                c.parents.push((parent, tag));
            }
        }
    }

    pub(crate) fn unlink_subgraphs(&self, parent: u32, child: u32) {
        let mut state = self.state.lock();
        if let Some(Some(p)) = state.subgraphs.get_mut(parent as usize) {
            p.children.retain(|(c, _)| *c != child);
        }
        if let Some(Some(c)) = state.subgraphs.get_mut(child as usize) {
            c.parents.retain(|(p, _)| *p != parent);
        }
    }

    /// Invalidate `index` and recurse through its `Owned` children, but
    /// only into children that share the invalidated subgraph's context id
    /// (spec §3 "Lifecycles": "invalidation is recursive through children
    /// that share the context id"). An owned child linked from a different
    /// `Context` survives its owner's invalidation.
    /// Invalidate `index`, recursively through owned children, unless the
    /// graph is currently inside a `with_update`/main-handler deferring
    /// scope, in which case the invalidation is enqueued and run on scope
    /// exit instead (spec §3 "deferred invalidation", §8 property 11).
    /// Reads against `index` still succeed until the invalidation actually
    /// runs.
    pub(crate) fn invalidate_subgraph(&self, index: u32) {
        if self.deferring.load(Ordering::SeqCst) {
            let mut state = self.state.lock();
            if let Some(Some(record)) = state.subgraphs.get_mut(index as usize) {
                if record.validation == ValidationState::Valid {
                    record.validation = ValidationState::InvalidationScheduled;
                }
            }
            if !state.pending_invalidations.contains(&index) {
                state.pending_invalidations.push(index);
            }
            return;
        }
        self.invalidate_subgraph_immediate(index);
    }

    fn invalidate_subgraph_immediate(&self, index: u32) {
        let root_context = {
            let state = self.state.lock();
            match state.subgraphs.get(index as usize).and_then(|s| s.as_ref()) {
                Some(record) => record.context_id,
                None => return,
            }
        };
        let mut to_visit = vec![index];
        let mut visited = std::collections::HashSet::new();
        while let Some(current) = to_visit.pop() {
            if !visited.insert(current) {
                continue;
            }
            let (nodes, owned_children) = {
                let mut state = self.state.lock();
                let Some(Some(record)) = state.subgraphs.get_mut(current as usize) else {
                    continue;
                };
                record.validation = ValidationState::Invalidated;
                let nodes = std::mem::take(&mut record.nodes);
                let owned_children: Vec<u32> = record
                    .children
                    .iter()
                    .filter(|(_, tag)| *tag == ChildKind::Owned)
                    .map(|(c, _)| *c)
                    .collect();
                record.notify_observers();
                (nodes, owned_children)
            };
            for id in nodes {
                self.destroy_node(id);
            }
            let state = self.state.lock();
            to_visit.extend(owned_children.into_iter().filter(|c| {
                state
                    .subgraphs
                    .get(*c as usize)
                    .and_then(|s| s.as_ref())
                    .is_some_and(|r| r.context_id == root_context)
            }));
        }
    }

    /// Enter a deferring scope, returning whether the graph was already
    /// deferring (a nested scope leaves flushing to the outermost one).
    pub(crate) fn begin_deferring(&self) -> bool {
        self.deferring.swap(true, Ordering::SeqCst)
    }

    /// Leave the deferring scope and run every invalidation enqueued while
    /// it was active, in request order.
    pub(crate) fn end_deferring_and_flush(&self) {
        self.deferring.store(false, Ordering::SeqCst);
        let pending = {
            let mut state = self.state.lock();
            std::mem::take(&mut state.pending_invalidations)
        };
        for index in pending {
            self.invalidate_subgraph_immediate(index);
        }
    }

    pub(crate) fn add_subgraph_observer(&self, index: u32, f: Box<dyn FnMut() + Send>) -> ObserverId {
        let mut state = self.state.lock();
        state.subgraphs[index as usize].as_mut().unwrap().add_observer(f)
    }

    pub(crate) fn remove_subgraph_observer(&self, index: u32, id: ObserverId) {
        let mut state = self.state.lock();
        if let Some(Some(record)) = state.subgraphs.get_mut(index as usize) {
            record.remove_observer(id);
        }
    }

    pub(crate) fn subgraph_nodes(&self, index: u32) -> Vec<AttributeId> {
        let state = self.state.lock();
        state.subgraphs[index as usize]
            .as_ref()
            .map(|r| r.nodes.clone())
            .unwrap_or_default()
    }

    pub(crate) fn node_propagation(&self, id: AttributeId) -> PropagationFlags {
        let state = self.state.lock();
        match state.nodes.get(id.slot_index() as usize).and_then(|s| s.as_ref()) {
            Some(NodeSlot::Direct(n)) => n.propagation,
            _ => PropagationFlags::NONE,
        }
    }

    pub(crate) fn subgraph_propagation(&self, index: u32) -> PropagationFlags {
        let state = self.state.lock();
        state.subgraphs[index as usize]
            .as_ref()
            .map(|r| r.propagation)
            .unwrap_or(PropagationFlags::NONE)
    }

    fn subgraph_is_dirty_local(&self, index: u32, flags: PropagationFlags) -> bool {
        let state = self.state.lock();
        let Some(Some(record)) = state.subgraphs.get(index as usize) else {
            return false;
        };
        record.nodes.iter().any(|id| {
            matches!(
                state.nodes[id.slot_index() as usize].as_ref(),
                Some(NodeSlot::Direct(n)) if n.is_dirty() && n.propagation.intersects(flags)
            )
        })
    }

    /// Whether any attribute in `index` or a reachable child matches
    /// `flags` and is dirty (spec §4.8 "Apply"/"Update" share the same
    /// reachable-set semantics).
    pub(crate) fn subgraph_is_dirty(&self, index: u32, flags: PropagationFlags) -> bool {
        self.reachable_subgraphs(index)
            .into_iter()
            .any(|sg| self.subgraph_is_dirty_local(sg, flags))
    }

    /// Iterate every attribute in `index` and every subgraph reachable
    /// through its children whose propagation flags intersect `flags`
    /// (spec §4.8 "Apply").
    pub(crate) fn subgraph_apply(&self, index: u32, flags: PropagationFlags, mut body: impl FnMut(AttributeId)) {
        for sg in self.reachable_subgraphs(index) {
            for id in self.subgraph_nodes(sg) {
                if self.node_propagation(id).intersects(flags) {
                    body(id);
                }
            }
        }
    }

    /// Drive `index` and every subgraph reachable through its children to
    /// quiescence for `flags`: repeatedly re-scan the reachable set and
    /// evaluate whatever is still dirty until a pass finds nothing left to
    /// do, matching flags, or the update aborts (spec §4.8 "Update").
    /// Looping (rather than a single pass) is required because evaluating
    /// one node can dirty another reachable node that an earlier pass
    /// already judged clean.
    pub(crate) fn update_subgraph(&self, index: u32, flags: PropagationFlags) -> UpdateStatus {
        let subgraphs = self.reachable_subgraphs(index);
        let mut overall = UpdateStatus::NoChange;
        loop {
            let mut any_dirty = false;
            for &sg in &subgraphs {
                for id in self.subgraph_nodes(sg) {
                    if !self.node_propagation(id).intersects(flags) {
                        continue;
                    }
                    if !self.node_state(id).intersects(ValueStateBits::DIRTY) {
                        continue;
                    }
                    any_dirty = true;
                    match crate::update::update_attribute(self, id, false) {
                        UpdateStatus::Aborted => return UpdateStatus::Aborted,
                        // This node stays dirty until a thread running
                        // under `with_main_thread_handler` retries it, so
                        // looping further here would spin forever.
                        UpdateStatus::NeedsCallMainHandler => return UpdateStatus::NeedsCallMainHandler,
                        UpdateStatus::Changed if overall == UpdateStatus::NoChange => overall = UpdateStatus::Changed,
                        _ => {}
                    }
                }
            }
            if !any_dirty {
                return overall;
            }
        }
    }

    pub(crate) fn subgraph_tree(&self, index: u32) -> Option<TreeNode> {
        let state = self.state.lock();
        state.subgraphs[index as usize].as_ref().and_then(|r| r.tree().cloned())
    }

    // -- attributes ----------------------------------------------------

    pub(crate) fn create_attribute<B: AttributeBody>(&self, subgraph: u32, type_id: TypeId, body: B) -> AttributeId {
        let mut state = self.state.lock();
        let index = state.alloc_slot();
        let mut node = Node::new(type_id, subgraph);
        node.body = Some(Box::new(body));
        state.nodes[index as usize] = Some(NodeSlot::Direct(node));
        let id = AttributeId::direct(index);
        if let Some(Some(record)) = state.subgraphs.get_mut(subgraph as usize) {
            record.nodes.push(id);
        }
        state.for_each_trace(|t| t.created(id));
        id
    }

    pub(crate) fn create_indirect_attribute(
        &self,
        subgraph: u32,
        source: AttributeId,
        offset: u32,
        size: Option<u16>,
        mutable_: bool,
    ) -> AttributeId {
        let mut state = self.state.lock();
        let generation = state.slot_generation[source.slot_index() as usize];
        let weak = WeakAttributeId::new(source, generation);
        let size = size.map(|s| s as u32).unwrap_or(0);
        let index = state.alloc_slot();
        if mutable_ {
            let mut node = MutableIndirectNode::new(weak, offset, size, subgraph, source);
            node.base.is_mutable = true;
            state.nodes[index as usize] = Some(NodeSlot::MutableIndirect(node));
        } else {
            state.nodes[index as usize] = Some(NodeSlot::Indirect(IndirectNode::new(weak, offset, size, subgraph)));
        }
        let id = AttributeId::indirect(index);
        if let Some(Some(record)) = state.subgraphs.get_mut(subgraph as usize) {
            record.nodes.push(id);
        }
        id
    }

    /// Remove a node from the slot table and, for direct attributes whose
    /// type registered one, run its destroy-self thunk (spec §4.2). The
    /// state lock is released before the thunk runs: destroy-self thunks
    /// are host code that may itself read or write the graph.
    pub(crate) fn destroy_node(&self, id: AttributeId) {
        let direct = {
            let mut state = self.state.lock();
            let slot = state.nodes[id.slot_index() as usize].take();
            state.slot_generation[id.slot_index() as usize] += 1;
            state.free_slots.push(id.slot_index());
            match slot {
                Some(NodeSlot::Direct(mut node)) => {
                    let inputs: Vec<AttributeId> = node.inputs.drain(..).map(|e| e.source).collect();
                    for source in &inputs {
                        if let Some(NodeSlot::Direct(s)) =
                            state.nodes.get_mut(source.slot_index() as usize).and_then(|s| s.as_mut())
                        {
                            s.remove_output(id);
                        }
                    }
                    Some(node)
                }
                _ => None,
            }
        };
        if let Some(mut node) = direct {
            let ty = self.type_of(node.type_id);
            if ty.flags.contains(crate::attribute_type::AttributeTypeFlags::HAS_DESTROY_SELF) {
                let mut ctx = crate::context::UpdateContext::new(self, id, &mut node);
                ty.invoke_destroy_self(&mut ctx, id);
            }
        }
        self.for_each_trace(|t| t.destroyed(id));
    }

    pub(crate) fn weak_of(&self, id: AttributeId) -> WeakAttributeId {
        if id.is_nil() {
            return WeakAttributeId::new(id, 0);
        }
        let state = self.state.lock();
        WeakAttributeId::new(id, state.slot_generation[id.slot_index() as usize])
    }

    pub(crate) fn resolve_weak(&self, weak: WeakAttributeId) -> Option<AttributeId> {
        if weak.id.is_nil() {
            return None;
        }
        let state = self.state.lock();
        let index = weak.id.slot_index() as usize;
        if state.slot_generation.get(index) == Some(&weak.generation) && state.nodes[index].is_some() {
            Some(weak.id)
        } else {
            None
        }
    }

    /// Resolve an indirect attribute chain down to the direct attribute
    /// (and byte offset within its value) it ultimately names, following
    /// weak links and detecting cycles (spec §3, S3/S5 scenarios).
    pub(crate) fn resolve_indirection(&self, id: AttributeId) -> Option<(AttributeId, u32, u32)> {
        let mut current = id;
        let mut total_offset = 0u32;
        let mut seen = std::collections::HashSet::new();
        loop {
            if !seen.insert(current) {
                precondition_failure("indirection cycle detected");
            }
            let state = self.state.lock();
            match state.nodes.get(current.slot_index() as usize)?.as_ref()? {
                NodeSlot::Direct(node) => return Some((current, total_offset, node.value_size)),
                NodeSlot::Indirect(node) => {
                    let source = node.source;
                    let offset = node.offset;
                    drop(state);
                    let resolved = self.resolve_weak(source)?;
                    current = resolved;
                    total_offset += offset;
                }
                NodeSlot::MutableIndirect(node) => {
                    let source = node.base.source;
                    let offset = node.base.offset;
                    drop(state);
                    let resolved = self.resolve_weak(source)?;
                    current = resolved;
                    total_offset += offset;
                }
            }
        }
    }

    pub(crate) fn kind_of(&self, id: AttributeId) -> Kind {
        id.kind()
    }

    pub(crate) fn type_of(&self, type_id: TypeId) -> Arc<AttributeType> {
        self.state.lock().types.get(type_id)
    }

    /// Take the direct `Node` at `id` out of the slot table, leaving the
    /// slot empty. Used by the update engine to evaluate a node's thunk
    /// without holding the state lock for the duration of the call.
    pub(crate) fn take_node(&self, id: AttributeId) -> Option<Node> {
        let mut state = self.state.lock();
        match state.nodes.get_mut(id.slot_index() as usize)?.take()? {
            NodeSlot::Direct(node) => Some(node),
            other => {
                state.nodes[id.slot_index() as usize] = Some(other);
                None
            }
        }
    }

    /// Put a `Node` back into its slot after evaluation, re-linking its
    /// (possibly rebuilt) input edges' reverse `outputs` pointers.
    pub(crate) fn restore_node(&self, id: AttributeId, node: Node) {
        let mut state = self.state.lock();
        let inputs: Vec<AttributeId> = node.inputs.iter().map(|e| e.source).collect();
        state.nodes[id.slot_index() as usize] = Some(NodeSlot::Direct(node));
        for source in inputs {
            if let Some(NodeSlot::Direct(s)) = state.nodes.get_mut(source.slot_index() as usize).and_then(|s| s.as_mut())
            {
                s.add_output(id);
            }
        }
    }

    /// Drop a taken-out node's stale inputs' reverse `outputs` links
    /// before the node is re-evaluated and its input set rebuilt.
    pub(crate) fn unlink_inputs(&self, id: AttributeId, sources: &[AttributeId]) {
        let mut state = self.state.lock();
        for source in sources {
            if let Some(NodeSlot::Direct(s)) = state.nodes.get_mut(source.slot_index() as usize).and_then(|s| s.as_mut())
            {
                s.remove_output(id);
            }
        }
    }

    pub(crate) fn propagate_dirty(&self, id: AttributeId) {
        self.state.lock().propagate_dirty(id);
    }

    pub(crate) fn mark_node_dirty(&self, id: AttributeId) {
        let mut state = self.state.lock();
        if let Some(NodeSlot::Direct(node)) = state.nodes.get_mut(id.slot_index() as usize).and_then(|s| s.as_mut()) {
            node.mark_dirty();
            node.mark_pending();
        }
    }

    pub(crate) fn add_static_input(&self, id: AttributeId, source: AttributeId, options: crate::options::InputOptions) -> u32 {
        let mut state = self.state.lock();
        if let Some(NodeSlot::Direct(node)) = state.nodes.get_mut(id.slot_index() as usize).and_then(|s| s.as_mut()) {
            node.add_input(source, options);
        }
        if let Some(NodeSlot::Direct(source_node)) =
            state.nodes.get_mut(source.slot_index() as usize).and_then(|s| s.as_mut())
        {
            source_node.add_output(id);
        }
        state
            .nodes
            .get(id.slot_index() as usize)
            .and_then(|s| s.as_ref())
            .and_then(|s| s.as_direct())
            .map(|n| n.inputs.len().saturating_sub(1) as u32)
            .unwrap_or(0)
    }

    pub(crate) fn node_state(&self, id: AttributeId) -> ValueStateBits {
        let state = self.state.lock();
        match state.nodes.get(id.slot_index() as usize).and_then(|s| s.as_ref()) {
            Some(NodeSlot::Direct(n)) => n.state,
            _ => ValueStateBits::NONE,
        }
    }

    /// Record `id`'s value type on first access; trap if a later access
    /// under a different Rust type is observed (spec §4.6 step 2, §7
    /// "mismatched type identities on value read/write"). A no-op for ids
    /// that do not currently name a direct node (e.g. an indirect
    /// attribute's aliased sub-field, which this engine does not track a
    /// separate value type for).
    pub(crate) fn check_and_record_value_type(&self, id: AttributeId, ty: std::any::TypeId) {
        let mut state = self.state.lock();
        let Some(node) = state.nodes.get_mut(id.slot_index() as usize).and_then(|s| s.as_mut()).and_then(NodeSlot::as_direct_mut) else {
            return;
        };
        match node.value_type {
            Some(existing) if existing != ty => {
                drop(state);
                crate::error::precondition_failure("value type identity mismatch on attribute value read/write");
            }
            _ => node.value_type = Some(ty),
        }
    }

    pub(crate) fn node_type_id(&self, id: AttributeId) -> Option<TypeId> {
        let state = self.state.lock();
        state
            .nodes
            .get(id.slot_index() as usize)
            .and_then(|s| s.as_ref())
            .and_then(|s| s.as_direct())
            .map(|n| n.type_id)
    }

    /// Zone value-storage accessors, scoped through the owning node's
    /// subgraph.
    pub(crate) fn read_value_bytes(&self, id: AttributeId) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let node = state.nodes.get(id.slot_index() as usize)?.as_ref()?.as_direct()?;
        let ptr = node.value?;
        let zone = state.subgraphs[node.subgraph as usize].as_ref()?;
        Some(zone.zone.read_bytes(ptr, node.value_size as usize))
    }

    pub(crate) fn write_value_bytes(&self, id: AttributeId, bytes: &[u8]) {
        let mut state = self.state.lock();
        let subgraph = match state.nodes[id.slot_index() as usize].as_ref().and_then(|s| s.as_direct()) {
            Some(n) => n.subgraph,
            None => return,
        };
        let ptr = {
            let zone = &mut state.subgraphs[subgraph as usize].as_mut().unwrap().zone;
            zone.alloc_bytes_recycle(bytes.len() as u32, VALUE_ALIGN_MASK)
        };
        {
            let zone = &state.subgraphs[subgraph as usize].as_ref().unwrap().zone;
            zone.write_bytes(ptr, bytes);
        }
        if let Some(node) = state.nodes[id.slot_index() as usize].as_mut().and_then(|s| s.as_direct_mut()) {
            node.value = Some(ptr);
            node.value_size = bytes.len() as u32;
            node.state |= ValueStateBits::VALUE_INITIALIZED;
        }
    }

    /// Whether `id` names a direct node with at least one registered
    /// input, i.e. a computed attribute rather than a source one (spec
    /// §4.4 step 1: `set_value` is only valid on a source attribute).
    pub(crate) fn node_has_inputs(&self, id: AttributeId) -> bool {
        let state = self.state.lock();
        state
            .nodes
            .get(id.slot_index() as usize)
            .and_then(|s| s.as_ref())
            .and_then(|s| s.as_direct())
            .is_some_and(|n| !n.inputs.is_empty())
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph").field("id", &self.id).finish()
    }
}
