//! # attrgraph - an incremental attribute graph
//!
//! attrgraph is an embedded incremental-computation engine: hosts declare
//! attributes (nodes wrapping a typed update thunk) and wire them together
//! with inputs, and the engine lazily recomputes exactly the attributes a
//! read actually needs, gated on structural equality so a recomputation
//! that produces an unchanged value does not re-dirty its dependents.
//!
//! ## Quick start
//!
//! ```rust
//! use attrgraph::{AttributeTypeBuilder, Graph, TypeMetadata};
//!
//! let graph = Graph::new();
//! let ctx = graph.new_context();
//! ctx.enter(|| {
//!     let subgraph = attrgraph::Subgraph::new(&ctx, None);
//!
//!     let source_type = graph.intern_type(TypeMetadata("demo::source"), || {
//!         AttributeTypeBuilder::new("source", |input, id| {
//!             let _ = (input, id);
//!         })
//!         .build()
//!     });
//!     let doubled_type = graph.intern_type(TypeMetadata("demo::doubled"), || {
//!         AttributeTypeBuilder::new("doubled", |ctx, _id| {
//!             // a real thunk would read an input attribute here
//!             ctx.set_value(2i32);
//!         })
//!         .build()
//!     });
//!
//!     let source = subgraph.create_attribute(source_type, ());
//!     let _doubled = subgraph.create_attribute(doubled_type, ());
//!     let _ = source;
//! });
//! ```
//!
//! ## Architecture
//!
//! attrgraph is organized in layers:
//! - **Arena layer**: page-granular, zone-scoped byte storage for attribute
//!   values (see [`arena`]).
//! - **Identity layer**: tagged handles naming nodes and their weak
//!   references (see [`identity`]).
//! - **Node layer**: the per-attribute record (edges, dirty/pending state,
//!   type-erased body) (see [`node`]).
//! - **Type layer**: registered attribute types and their update/destroy
//!   thunks (see [`attribute_type`]).
//! - **Graph/subgraph layer**: the coordinator owning the node slot table,
//!   subgraphs, and traces (see [`graph`], [`subgraph`]).
//! - **Update engine**: lazy evaluation, cycle detection, cancellation (see
//!   [`update`]).
//! - **Value comparator**: structural equality over raw value bytes (see
//!   [`layout`]).
//!
//! See `DESIGN.md` in the repository root for how each layer is grounded.

pub mod arena;
pub mod attribute_type;
pub mod config;
pub mod context;
pub mod error;
pub mod external;
pub mod graph;
pub mod identity;
pub mod layout;
pub mod logging;
pub mod node;
pub mod options;
pub mod subgraph;
pub mod trace;
pub mod update;
pub mod value;

pub use crate::attribute_type::{
    AttributeType, AttributeTypeBuilder, AttributeTypeFlags, ComparisonMode,
};
pub use crate::config::GraphConfig;
pub use crate::context::{AttributeBody, Context, UpdateContext};
pub use crate::error::{GraphError, Result};
pub use crate::external::{AtomicIdGenerator, ByteEqualityOracle, EqualityOracle, IdGenerator, TypeIntrospectionProvider};
pub use crate::graph::{Graph, TraceId, TypeId, TypeMetadata};
pub use crate::identity::{AttributeId, Kind, WeakAttributeId};
pub use crate::layout::{EnumCase, LayoutBuilder, LayoutOp, ValueLayout};
pub use crate::options::{
    ChildKind, GraphCounter, InputOptions, PropagationFlags, TraversalOptions, UpdateOptions,
    UpdateStatus, ValueCompareOptions, ValueStateBits,
};
pub use crate::subgraph::{ObserverId, Subgraph, TreeNode, ValidationState};
pub use crate::trace::{CountingTrace, Trace};
pub use crate::update::{
    add_input, cancel_update, evaluate_weak, get_value, has_value, invalidate_value, prefetch_value,
    set_value, update_value, update_was_cancelled, value_state, weak, weak_expired, with_main_thread_handler,
    with_update, ValueRead,
};
pub use crate::value::AttributeValue;
