//! # Entity References
//!
//! Entity references are lightweight identifiers consisting of:
//! - An index into the arena's slot table
//! - A generation counter for safe reuse

use std::fmt;

use serde::{Deserialize, Serialize};

/// Weak, copyable handle to an entity.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Index into the arena's slots
/// - Upper 32 bits: Generation counter for detecting stale references
///
/// A reference may outlive the entity it names. Check it with
/// [`EntityArena::is_alive`](crate::EntityArena::is_alive) before touching
/// component storage.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct EntityRef(u64);

impl EntityRef {
    /// Creates a new entity reference from index and generation.
    ///
    /// # Arguments
    ///
    /// * `index` - The slot index (0 to 2^32-1)
    /// * `generation` - The generation counter (0 to 2^32-1)
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the index portion of the reference.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the reference.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Raw 64-bit representation, as written into wire payloads.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Rebuilds a reference from [`to_bits`](Self::to_bits).
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Null/invalid entity reference.
    pub const NULL: Self = Self(u64::MAX);

    /// Checks if this reference is the null reference.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for EntityRef {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("EntityRef(null)")
        } else {
            write!(f, "EntityRef({}v{})", self.index(), self.generation())
        }
    }
}
