//! Option/flag bitsets from spec §6. Hand-rolled rather than pulled from
//! the `bitflags` crate — the teacher crate does the same for its page
//! and header flags (see `storage::page`), preferring small `const`
//! associated values plus `ops::{BitOr, BitAnd}` impls.

use std::ops::{BitOr, BitOrAssign};

macro_rules! bitset {
    ($name:ident: $repr:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name(pub $repr);

        impl $name {
            pub const NONE: $name = $name(0);

            pub fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn intersects(self, other: $name) -> bool {
                self.0 & other.0 != 0
            }
        }

        impl BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: $name) {
                self.0 |= rhs.0;
            }
        }
    };
}

bitset!(TraversalOptions: u32);
impl TraversalOptions {
    pub const UPDATE_DEPENDENCIES: TraversalOptions = TraversalOptions(1);
    pub const ASSERT_NOT_NIL: TraversalOptions = TraversalOptions(2);
    pub const SKIP_MUTABLE_REFERENCE: TraversalOptions = TraversalOptions(4);
    pub const REPORT_INDIRECTION_IN_OFFSET: TraversalOptions = TraversalOptions(8);
    pub const EVALUATE_WEAK_REFERENCES: TraversalOptions = TraversalOptions(16);
}

bitset!(InputOptions: u32);
impl InputOptions {
    pub const UNPREFETCHED: InputOptions = InputOptions(1);
    pub const ALWAYS_ENABLED: InputOptions = InputOptions(4);
    pub const CHANGED: InputOptions = InputOptions(8);
    pub const ENABLED: InputOptions = InputOptions(16);
}

bitset!(UpdateOptions: u32);
impl UpdateOptions {
    pub const IN_TRANSACTION: UpdateOptions = UpdateOptions(1);
    pub const ABORT_IF_CANCELLED: UpdateOptions = UpdateOptions(2);
    pub const CANCEL_IF_PASSED_DEADLINE: UpdateOptions = UpdateOptions(4);
    pub const INITIALIZE_CLEARED: UpdateOptions = UpdateOptions(8);
    pub const END_DEFERRING_ON_EXIT: UpdateOptions = UpdateOptions(16);
}

bitset!(ValueCompareOptions: u32);
impl ValueCompareOptions {
    pub const MODE_MASK: u32 = 0xf;
    pub const COPY_ON_WRITE: ValueCompareOptions = ValueCompareOptions(0x100);
    pub const FETCH_LAYOUTS_SYNCHRONOUSLY: ValueCompareOptions = ValueCompareOptions(0x200);
    pub const REPORT_FAILURES: ValueCompareOptions = ValueCompareOptions(0x8000_0000);

    pub fn mode(self) -> u32 {
        self.0 & Self::MODE_MASK
    }
}

bitset!(ValueStateBits: u32);
impl ValueStateBits {
    pub const DIRTY: ValueStateBits = ValueStateBits(0x01);
    pub const PENDING: ValueStateBits = ValueStateBits(0x02);
    pub const EVALUATING: ValueStateBits = ValueStateBits(0x04);
    pub const VALUE_INITIALIZED: ValueStateBits = ValueStateBits(0x08);
    pub const MAIN_REF: ValueStateBits = ValueStateBits(0x10);
    pub const UPDATES_ON_MAIN_SEEN: ValueStateBits = ValueStateBits(0x20);
    pub const MAIN_THREAD_PENDING: ValueStateBits = ValueStateBits(0x40);
    pub const EXPLICIT_MARK: ValueStateBits = ValueStateBits(0x80);
}

/// Arbitrary host-assigned propagation bits, one per subgraph (spec
/// §3 "four propagation bytes", §4.8 `apply`/`update`/`intersects`).
bitset!(PropagationFlags: u8);
impl PropagationFlags {
    pub const ALL: PropagationFlags = PropagationFlags(0xff);
}

/// The 2-bit tag a subgraph attaches to each child edge (spec §3, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    /// The child's lifetime is bound to the parent: invalidating the
    /// parent always invalidates the child.
    Owned,
    /// The child is merely referenced; it may outlive this parent as long
    /// as another parent keeps it alive.
    Referenced,
}

/// Outcome of driving an attribute's update thunk (spec §4.5, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    NoChange,
    Changed,
    Aborted,
    NeedsCallMainHandler,
}

/// Counters a host can query from a [`crate::graph::Graph`] (spec §6,
/// §10 of SPEC_FULL.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphCounter {
    NodeCount,
    SubgraphCount,
    GraphId,
    ContextId,
    NeedsUpdate,
    ThreadUpdating,
}
