//! Attribute values: the `Copy` types an attribute can hold.
//!
//! Spec §4.3 calls bodies/values "bitwise-takable" when they may be
//! copied byte-for-byte rather than run through a copy constructor; we
//! take that literally and only allow `Copy` values, which lets the value
//! comparator (§4.7) work over a plain `&[u8]` instead of needing a
//! generic visitor for every host type.

use std::mem::size_of;
use std::slice;

/// A value an attribute can hold. Any `Copy + 'static` type qualifies —
/// this mirrors the "bitwise-takable" values spec §4.3 stores inline.
pub trait AttributeValue: Copy + Send + Sync + 'static {
    /// Byte size of the value's in-memory representation.
    fn byte_size() -> usize {
        size_of::<Self>()
    }

    /// View `self` as its raw byte representation.
    ///
    /// # Safety invariants upheld by this crate
    /// `Self: Copy` guarantees no drop glue and no interior references
    /// that could dangle once copied. For a direct attribute, every
    /// `get_value`/`set_value`/`input` call is checked against the
    /// `TypeId` recorded on first access ([`crate::graph::Graph::check_and_record_value_type`]),
    /// so its bytes are never read back as a different concrete type.
    /// Indirect attributes intentionally fall outside that check — they
    /// alias a byte range of a host-chosen type inside another
    /// attribute's value, so padding bytes there are only ever inspected
    /// by the value-layout comparator, never reinterpreted as a type of
    /// their own.
    fn as_bytes(&self) -> &[u8] {
        // SAFETY: `Self: Copy` (no Drop, no uninitialized padding shared
        // with non-Copy state) and the slice length matches `size_of`.
        unsafe { slice::from_raw_parts((self as *const Self).cast::<u8>(), size_of::<Self>()) }
    }

    /// Reconstruct a value from its raw byte representation. `bytes` must
    /// be exactly [`AttributeValue::byte_size`] long and must have been
    /// produced by [`AttributeValue::as_bytes`] for this same type.
    fn from_bytes(bytes: &[u8]) -> Self {
        assert_eq!(bytes.len(), size_of::<Self>(), "value byte-size mismatch");
        // SAFETY: length checked above; caller contract (see doc comment)
        // guarantees the bytes were produced from a value of this type,
        // so every field's validity invariant already holds.
        unsafe { (bytes.as_ptr() as *const Self).read_unaligned() }
    }
}

impl<T: Copy + Send + Sync + 'static> AttributeValue for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn round_trips_through_bytes() {
        let p = Point { x: 1, y: -2 };
        let bytes = p.as_bytes().to_vec();
        let back = Point::from_bytes(&bytes);
        assert_eq!(p, back);
    }
}
