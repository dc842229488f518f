//! Interfaces to the collaborators spec §1 calls out as explicitly
//! external: host reflection, the equality oracle, tracing sinks, the
//! OS virtual-memory mapping, the process-unique id generator, and
//! closure retention. None of these are implemented generically here —
//! the engine only depends on the trait boundary, exactly as spec.md
//! describes them.

/// Dispatches equality for value-layout opcodes `01` (`Equals`) and the
/// enum-discriminant reads used by opcodes `08`-`16` (spec §4.7).
///
/// `type_tag` is whatever the host uses to identify which concrete type
/// occupies the byte range being compared; this crate never interprets
/// it, only threads it through.
pub trait EqualityOracle: Send + Sync {
    /// Compare two same-typed values by the host's own equality.
    fn equals(&self, type_tag: u32, lhs: &[u8], rhs: &[u8]) -> bool;

    /// Read an enum's discriminant out of its raw bytes.
    fn discriminant(&self, type_tag: u32, bytes: &[u8]) -> u32;
}

/// An oracle that falls back to byte-for-byte comparison and treats the
/// leading 4 bytes as the discriminant. Adequate for tests and for hosts
/// whose "equatable" types are already `Eq`-over-bytes; real hosts with
/// custom `PartialEq` impls should supply their own oracle.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteEqualityOracle;

impl EqualityOracle for ByteEqualityOracle {
    fn equals(&self, _type_tag: u32, lhs: &[u8], rhs: &[u8]) -> bool {
        lhs == rhs
    }

    fn discriminant(&self, _type_tag: u32, bytes: &[u8]) -> u32 {
        let mut buf = [0u8; 4];
        let n = bytes.len().min(4);
        buf[..n].copy_from_slice(&bytes[..n]);
        u32::from_le_bytes(buf)
    }
}

/// Host-side field reflection used to build a [`crate::layout::ValueLayout`]
/// for a type the engine has never seen the definition of. Out of scope
/// per spec §1 ("the host language's runtime reflection"): this crate only
/// consumes whatever [`crate::layout::ValueLayout`] the host hands it, it
/// never walks host type definitions on its own.
pub trait TypeIntrospectionProvider: Send + Sync {
    /// Build (or fetch a cached) layout for `type_tag`, or `None` if the
    /// type is unknown to this provider — callers fall back to a trivial
    /// byte-range comparison in that case (spec §4.7, "builder bails out").
    fn layout_for(&self, type_tag: u32) -> Option<crate::layout::ValueLayout>;
}

/// A process-unique identifier generator. Spec §1 lists this among the
/// external collaborators, but it is trivial enough to provide a default
/// in-process implementation for; hosts embedding multiple engines in one
/// process may still supply their own to keep ids globally unique.
pub trait IdGenerator: Send + Sync {
    fn next(&self) -> u32;
}

/// An atomically-incrementing default [`IdGenerator`].
#[derive(Debug, Default)]
pub struct AtomicIdGenerator(std::sync::atomic::AtomicU32);

impl IdGenerator for AtomicIdGenerator {
    fn next(&self) -> u32 {
        self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1
    }
}

/// A closure the host retains on the engine's behalf, e.g. a subgraph
/// observer or an attribute-type update thunk's captured state. Spec §1:
/// "closure-retention plumbing exposed to the host is reduced to an
/// abstract retained closure handle" — in Rust that's just ownership, so
/// this is a type alias rather than a distinct retain/release API.
pub type RetainedClosure = Box<dyn FnMut() + Send>;
