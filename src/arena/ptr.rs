//! A 32-bit offset into the [`super::table::Table`]'s mapped region.
//!
//! Mirrors the `AG::data::ptr<T>` template from the original engine: a
//! difference-type offset, not a real pointer, so it survives the
//! region being grown (the backing mapping may move; the offset never
//! does).

use std::fmt;

/// Offset 0 is reserved as null (spec §3, invariant 1).
pub const NULL_OFFSET: u32 = 0;

/// A raw byte offset into the table's mapped region.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ptr(u32);

impl Ptr {
    /// The canonical null pointer.
    pub const NULL: Ptr = Ptr(NULL_OFFSET);

    /// Wrap a raw offset. Does not validate that the offset is in range;
    /// callers that need that guarantee should go through
    /// [`super::table::Table::check_offset`].
    pub const fn from_offset(offset: u32) -> Self {
        Ptr(offset)
    }

    /// The raw byte offset.
    pub const fn offset(self) -> u32 {
        self.0
    }

    /// `true` for the null pointer.
    pub const fn is_null(self) -> bool {
        self.0 == NULL_OFFSET
    }

    /// Offset rounded up to the given alignment mask (`alignment - 1`).
    pub const fn aligned(self, alignment_mask: u32) -> Ptr {
        Ptr((self.0 + alignment_mask) & !alignment_mask)
    }

    /// Offset of the page containing this pointer, given `page_size`.
    pub fn page_relative_offset(self, page_size: u32) -> u32 {
        self.0 % page_size
    }
}

impl fmt::Debug for Ptr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Ptr(null)")
        } else {
            write!(f, "Ptr(0x{:x})", self.0)
        }
    }
}

impl From<u32> for Ptr {
    fn from(offset: u32) -> Self {
        Ptr(offset)
    }
}
