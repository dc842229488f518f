//! The attribute-type registry (spec §4.2): per-type update thunks and
//! metadata, looked up by the `type_id` stored in every [`crate::node::Node`].

use crate::context::UpdateContext;
use crate::identity::AttributeId;
use crate::layout::ValueLayout;

/// How two values of a type should be compared when deciding whether an
/// update actually changed anything (spec §4.5, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonMode {
    /// Never compare; every update is treated as a change.
    Never,
    /// Compare with the value-layout walker, degrading to `memcmp` when
    /// no [`ValueLayout`] is registered.
    Structural,
    /// Skip comparison and always treat the update as unchanged; used for
    /// "write-only" attribute types that exist for their side effects.
    AlwaysEqual,
}

/// Flags describing a registered type's evaluation requirements (spec
/// §4.2's vtable flags).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeTypeFlags(pub u8);

impl AttributeTypeFlags {
    pub const NONE: AttributeTypeFlags = AttributeTypeFlags(0);
    pub const HAS_DESTROY_SELF: AttributeTypeFlags = AttributeTypeFlags(0x01);
    pub const MAIN_THREAD: AttributeTypeFlags = AttributeTypeFlags(0x02);
    pub const EXTERNAL: AttributeTypeFlags = AttributeTypeFlags(0x04);
    pub const THREAD_SAFE: AttributeTypeFlags = AttributeTypeFlags(0x08);

    pub fn contains(self, other: AttributeTypeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// `(context, self_attribute_id) -> ()`. The thunk reads its inputs
/// through `context` and calls `context.set_value` to publish a result;
/// spec §4.3's `body*` parameter is folded into `context`, which exposes
/// the evaluating attribute's body via [`UpdateContext::body_mut`].
pub type UpdateThunk = dyn Fn(&mut UpdateContext, AttributeId) + Send + Sync;

/// Called when a node of this type is removed from the graph, to tear
/// down any external resources its body holds (spec §4.2 `destroy_self`).
pub type DestroySelfThunk = dyn Fn(&mut UpdateContext, AttributeId) + Send + Sync;

/// Formats a human-readable description of an attribute's current value,
/// for trace/debug output (spec §4.2 "description hooks").
pub type DescribeThunk = dyn Fn(&UpdateContext, AttributeId) -> String + Send + Sync;

/// Registered metadata for one attribute type: its update thunk plus the
/// vtable spec §4.2 calls out (destroy, describe, optional initial
/// value), its comparison mode, and a cached [`ValueLayout`] if the host
/// supplied one up front.
pub struct AttributeType {
    pub name: &'static str,
    pub flags: AttributeTypeFlags,
    pub comparison_mode: ComparisonMode,
    pub layout: Option<ValueLayout>,
    update: Box<UpdateThunk>,
    destroy_self: Option<Box<DestroySelfThunk>>,
    describe: Option<Box<DescribeThunk>>,
}

impl AttributeType {
    pub fn invoke_update(&self, context: &mut UpdateContext, id: AttributeId) {
        (self.update)(context, id);
    }

    pub fn invoke_destroy_self(&self, context: &mut UpdateContext, id: AttributeId) {
        if let Some(destroy) = &self.destroy_self {
            destroy(context, id);
        }
    }

    pub fn describe(&self, context: &UpdateContext, id: AttributeId) -> Option<String> {
        self.describe.as_ref().map(|d| d(context, id))
    }
}

impl std::fmt::Debug for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeType")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("comparison_mode", &self.comparison_mode)
            .field("has_layout", &self.layout.is_some())
            .finish()
    }
}

/// Builds an [`AttributeType`] before it is interned into a
/// [`TypeRegistry`].
pub struct AttributeTypeBuilder {
    name: &'static str,
    flags: AttributeTypeFlags,
    comparison_mode: ComparisonMode,
    layout: Option<ValueLayout>,
    update: Box<UpdateThunk>,
    destroy_self: Option<Box<DestroySelfThunk>>,
    describe: Option<Box<DescribeThunk>>,
}

impl AttributeTypeBuilder {
    pub fn new(name: &'static str, update: impl Fn(&mut UpdateContext, AttributeId) + Send + Sync + 'static) -> Self {
        AttributeTypeBuilder {
            name,
            flags: AttributeTypeFlags::NONE,
            comparison_mode: ComparisonMode::Structural,
            layout: None,
            update: Box::new(update),
            destroy_self: None,
            describe: None,
        }
    }

    pub fn flags(mut self, flags: AttributeTypeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn comparison_mode(mut self, mode: ComparisonMode) -> Self {
        self.comparison_mode = mode;
        self
    }

    pub fn layout(mut self, layout: ValueLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn destroy_self(mut self, thunk: impl Fn(&mut UpdateContext, AttributeId) + Send + Sync + 'static) -> Self {
        self.flags.0 |= AttributeTypeFlags::HAS_DESTROY_SELF.0;
        self.destroy_self = Some(Box::new(thunk));
        self
    }

    pub fn describe(mut self, thunk: impl Fn(&UpdateContext, AttributeId) -> String + Send + Sync + 'static) -> Self {
        self.describe = Some(Box::new(thunk));
        self
    }

    pub fn build(self) -> AttributeType {
        AttributeType {
            name: self.name,
            flags: self.flags,
            comparison_mode: self.comparison_mode,
            layout: self.layout,
            update: self.update,
            destroy_self: self.destroy_self,
            describe: self.describe,
        }
    }
}

/// Graph-wide table of registered attribute types, looked up by the
/// `type_id` spec §4.2 stores in every node. Entries are `Arc`-wrapped so
/// the update engine can clone a type's thunk out and invoke it without
/// holding the graph's state lock (the thunk recursively updates other
/// attributes, which also needs that lock).
#[derive(Default)]
pub struct TypeRegistry {
    types: Vec<std::sync::Arc<AttributeType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ty: AttributeType) -> u32 {
        if self.types.len() >= (1 << 24) {
            crate::error::precondition_failure("too many attribute types registered (> 2^24)");
        }
        let id = self.types.len() as u32;
        self.types.push(std::sync::Arc::new(ty));
        id
    }

    pub fn get(&self, id: u32) -> std::sync::Arc<AttributeType> {
        self.types[id as usize].clone()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn register_assigns_sequential_ids() {
        let mut registry = TypeRegistry::new();
        let a = registry.register(AttributeTypeBuilder::new("a", |_, _| {}).build());
        let b = registry.register(AttributeTypeBuilder::new("b", |_, _| {}).build());
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(registry.get(a).name, "a");
        assert_eq!(registry.get(b).name, "b");
    }

    #[test]
    fn destroy_self_sets_has_destroy_self_flag() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let ty = AttributeTypeBuilder::new("tracked", |_, _| {})
            .destroy_self(move |_, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        assert!(ty.flags.contains(AttributeTypeFlags::HAS_DESTROY_SELF));
    }
}
