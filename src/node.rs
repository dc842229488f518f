//! Node records: the per-attribute bookkeeping spec §3/§4.3 describes as
//! byte-packed arena records. We keep the same fields but store them as
//! ordinary Rust structs owned by [`crate::graph::Graph`]'s slot table
//! rather than literal byte offsets into a mapped region — see
//! `DESIGN.md` for why. [`crate::arena`] is still used, but only for the
//! attribute *value* bytes the §4.7 comparator needs to walk.

use smallvec::SmallVec;

use crate::arena::Ptr;
use crate::identity::{AttributeId, WeakAttributeId};
use crate::options::{InputOptions, PropagationFlags, ValueStateBits};

/// Most attributes read a handful of inputs and feed a handful of
/// outputs; inline storage for the common case avoids a heap allocation
/// per node (mirrors the teacher crate's inline adjacency entries).
const INLINE_EDGES: usize = 4;

/// An edge recording that `source`'s value feeds into the owning node,
/// tagged with the options it was read under (spec §4.4, §4.6).
#[derive(Debug, Clone, Copy)]
pub struct InputEdge {
    pub source: AttributeId,
    pub options: InputOptions,
}

/// An edge recording that the owning node's value feeds `target` (the
/// inverse of an [`InputEdge`], kept so invalidation can walk forward).
#[derive(Debug, Clone, Copy)]
pub struct OutputEdge {
    pub target: AttributeId,
}

/// Bits that don't vary per subgraph, unlike [`PropagationFlags`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeFlags(pub u8);

impl NodeFlags {
    pub const NONE: NodeFlags = NodeFlags(0);
    pub const HAS_INDIRECT_SELF: NodeFlags = NodeFlags(0x01);
    pub const HAS_INDIRECT_VALUE: NodeFlags = NodeFlags(0x02);

    pub fn contains(self, other: NodeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: NodeFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: NodeFlags) {
        self.0 &= !other.0;
    }
}

/// A direct attribute: owns a type, a value, and its edges (spec §3,
/// §4.3 "28-byte Node record").
pub struct Node {
    pub state: ValueStateBits,
    pub type_id: u32,
    pub flags: NodeFlags,
    /// Per-subgraph propagation bytes (spec §3: "four propagation bytes").
    pub propagation: PropagationFlags,
    pub subgraph: u32,
    /// Where the current value's bytes live in the value arena, if the
    /// node has ever been evaluated.
    pub value: Option<Ptr>,
    pub value_size: u32,
    /// The concrete Rust type of the bytes in `value`, recorded the first
    /// time the attribute is read or written and checked against on every
    /// later access (spec §4.6 step 2, §7 "mismatched type identities on
    /// value read/write").
    pub value_type: Option<std::any::TypeId>,
    pub inputs: SmallVec<[InputEdge; INLINE_EDGES]>,
    pub outputs: SmallVec<[OutputEdge; INLINE_EDGES]>,
    /// Threads this node into its owning subgraph's node list, mirroring
    /// the page-local sibling list spec §4.3 describes — kept as a plain
    /// link rather than a 16-bit relative offset.
    pub next_in_subgraph: Option<AttributeId>,
    /// Extra per-node state an [`crate::attribute_type::AttributeType`]'s
    /// update thunk keeps between evaluations, analogous to the body
    /// bytes spec §4.3 stores ahead of the Node record. Type-erased since
    /// every registered type can choose its own body shape.
    pub body: Option<Box<dyn std::any::Any + Send>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("state", &self.state)
            .field("type_id", &self.type_id)
            .field("flags", &self.flags)
            .field("propagation", &self.propagation)
            .field("subgraph", &self.subgraph)
            .field("value", &self.value)
            .field("value_size", &self.value_size)
            .field("value_type", &self.value_type)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("next_in_subgraph", &self.next_in_subgraph)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

impl Node {
    pub fn new(type_id: u32, subgraph: u32) -> Self {
        Node {
            state: ValueStateBits::NONE | ValueStateBits::DIRTY | ValueStateBits::PENDING,
            type_id,
            flags: NodeFlags::NONE,
            propagation: PropagationFlags::ALL,
            subgraph,
            value: None,
            value_size: 0,
            value_type: None,
            inputs: SmallVec::new(),
            outputs: SmallVec::new(),
            next_in_subgraph: None,
            body: None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.state.intersects(ValueStateBits::DIRTY)
    }

    pub fn is_pending(&self) -> bool {
        self.state.intersects(ValueStateBits::PENDING)
    }

    pub fn is_evaluating(&self) -> bool {
        self.state.intersects(ValueStateBits::EVALUATING)
    }

    pub fn mark_dirty(&mut self) {
        self.state |= ValueStateBits::DIRTY;
    }

    pub fn mark_pending(&mut self) {
        self.state |= ValueStateBits::PENDING;
    }

    pub fn clear_dirty_pending(&mut self) {
        self.state.0 &= !(ValueStateBits::DIRTY.0 | ValueStateBits::PENDING.0);
    }

    pub fn add_input(&mut self, source: AttributeId, options: InputOptions) {
        if let Some(existing) = self.inputs.iter_mut().find(|e| e.source == source) {
            existing.options |= options;
        } else {
            self.inputs.push(InputEdge { source, options });
        }
    }

    pub fn clear_inputs(&mut self) {
        self.inputs.clear();
    }

    pub fn add_output(&mut self, target: AttributeId) {
        if !self.outputs.iter().any(|e| e.target == target) {
            self.outputs.push(OutputEdge { target });
        }
    }

    pub fn remove_output(&mut self, target: AttributeId) {
        self.outputs.retain(|e| e.target != target);
    }
}

impl PartialEq for InputEdge {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// An indirect attribute: an alias for a byte range inside another
/// attribute's value, optionally evaluated through a weak reference
/// (spec §3, §4.6).
#[derive(Debug, Clone, Copy)]
pub struct IndirectNode {
    pub source: WeakAttributeId,
    pub offset: u32,
    pub size: u32,
    pub traverses_graph_contexts: bool,
    pub is_mutable: bool,
    pub subgraph: u32,
    pub next_in_subgraph: Option<AttributeId>,
}

impl IndirectNode {
    pub fn new(source: WeakAttributeId, offset: u32, size: u32, subgraph: u32) -> Self {
        IndirectNode {
            source,
            offset,
            size,
            traverses_graph_contexts: false,
            is_mutable: false,
            subgraph,
            next_in_subgraph: None,
        }
    }
}

/// A mutable indirect attribute: an [`IndirectNode`] whose target can be
/// redirected at runtime, tracked against the attribute it now depends on
/// so invalidation still reaches it (spec §3, §4.6 "mutable indirect
/// retargeting").
#[derive(Debug, Clone, Copy)]
pub struct MutableIndirectNode {
    pub base: IndirectNode,
    pub dependency: AttributeId,
    pub back_pointer: Option<AttributeId>,
    pub initial_source: WeakAttributeId,
    pub initial_offset: u32,
}

impl MutableIndirectNode {
    pub fn new(source: WeakAttributeId, offset: u32, size: u32, subgraph: u32, dependency: AttributeId) -> Self {
        MutableIndirectNode {
            base: IndirectNode::new(source, offset, size, subgraph),
            dependency,
            back_pointer: None,
            initial_source: source,
            initial_offset: offset,
        }
    }

    /// Retarget this attribute at a new source, recording the new
    /// dependency for invalidation. Does not touch `initial_source` /
    /// `initial_offset`, which spec keeps around for `reset`-style
    /// rebinding back to the original target.
    pub fn retarget(&mut self, source: WeakAttributeId, offset: u32, dependency: AttributeId) {
        self.base.source = source;
        self.base.offset = offset;
        self.dependency = dependency;
    }

    pub fn reset_to_initial(&mut self) {
        self.base.source = self.initial_source;
        self.base.offset = self.initial_offset;
    }
}

/// A node slot: which of the three record shapes an [`AttributeId`]'s
/// index currently names. Stored in [`crate::graph::Graph`]'s slot
/// table, one per occupied index.
#[derive(Debug)]
pub enum NodeSlot {
    Direct(Node),
    Indirect(IndirectNode),
    MutableIndirect(MutableIndirectNode),
}

impl NodeSlot {
    pub fn subgraph(&self) -> u32 {
        match self {
            NodeSlot::Direct(n) => n.subgraph,
            NodeSlot::Indirect(n) => n.subgraph,
            NodeSlot::MutableIndirect(n) => n.base.subgraph,
        }
    }

    pub fn as_direct(&self) -> Option<&Node> {
        match self {
            NodeSlot::Direct(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_direct_mut(&mut self) -> Option<&mut Node> {
        match self {
            NodeSlot::Direct(n) => Some(n),
            _ => None,
        }
    }
}
