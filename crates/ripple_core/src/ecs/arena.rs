//! # Entity Arena
//!
//! Owner of entity liveness. Pre-allocates all slots at creation time.

use super::entity::EntityRef;

/// One slot of the arena.
#[derive(Clone, Copy, Debug)]
struct Slot {
    /// Reference most recently handed out for this slot.
    id: EntityRef,
    /// Whether this slot is currently alive.
    alive: bool,
}

impl Slot {
    const fn dead() -> Self {
        Self {
            id: EntityRef::NULL,
            alive: false,
        }
    }
}

/// Fixed-capacity arena of entity slots.
///
/// Despawned slots go back on a free list; the next spawn into that slot
/// bumps its generation, so every reference handed out earlier becomes stale.
///
/// # Example
///
/// ```rust
/// use ripple_core::EntityArena;
///
/// let mut arena = EntityArena::new(4);
/// let a = arena.spawn();
/// arena.despawn(a);
/// let b = arena.spawn();
///
/// assert_eq!(a.index(), b.index());
/// assert!(!arena.is_alive(a));
/// assert!(arena.is_alive(b));
/// ```
pub struct EntityArena {
    slots: Box<[Slot]>,
    /// Free list of slot indices for reuse.
    free_indices: Vec<u32>,
    alive_count: usize,
    capacity: usize,
}

impl EntityArena {
    /// Creates a new arena with the specified entity capacity.
    ///
    /// # Panics
    ///
    /// Panics if capacity is zero or exceeds `u32::MAX`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero");
        assert!(
            u32::try_from(capacity).is_ok(),
            "Capacity cannot exceed u32::MAX"
        );

        let slots = vec![Slot::dead(); capacity].into_boxed_slice();

        // Reversed so the lowest indices are handed out first
        #[allow(clippy::cast_possible_truncation)]
        let free_indices: Vec<u32> = (0..capacity as u32).rev().collect();

        Self {
            slots,
            free_indices,
            alive_count: 0,
            capacity,
        }
    }

    /// Returns the maximum capacity of this arena.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of currently alive entities.
    #[inline]
    #[must_use]
    pub const fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Spawns a new entity, returning its reference.
    ///
    /// # Returns
    ///
    /// The new entity's reference, or `EntityRef::NULL` if capacity is reached.
    #[inline]
    pub fn spawn(&mut self) -> EntityRef {
        let Some(index) = self.free_indices.pop() else {
            return EntityRef::NULL;
        };

        let slot = &mut self.slots[index as usize];

        // A never-used slot holds NULL, whose generation wraps to 0
        let generation = slot.id.generation().wrapping_add(1);
        let id = EntityRef::new(index, generation);

        slot.id = id;
        slot.alive = true;
        self.alive_count += 1;

        id
    }

    /// Despawns an entity, freeing its slot for reuse.
    ///
    /// # Returns
    ///
    /// `true` if the entity was despawned, `false` if it was already dead
    /// or the reference was invalid/stale.
    #[inline]
    pub fn despawn(&mut self, id: EntityRef) -> bool {
        if !self.is_alive(id) {
            return false;
        }

        self.slots[id.index() as usize].alive = false;
        self.alive_count -= 1;
        self.free_indices.push(id.index());

        true
    }

    /// Checks if a reference names a live entity.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, id: EntityRef) -> bool {
        if id.is_null() {
            return false;
        }

        match self.slots.get(id.index() as usize) {
            Some(slot) => slot.alive && slot.id == id,
            None => false,
        }
    }

    /// Iterates over the references of all alive entities, in slot order.
    pub fn iter_alive(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.slots.iter().filter(|s| s.alive).map(|s| s.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_creation() {
        let arena = EntityArena::new(1000);
        assert_eq!(arena.capacity(), 1000);
        assert_eq!(arena.alive_count(), 0);
    }

    #[test]
    fn test_spawn_despawn() {
        let mut arena = EntityArena::new(100);

        let id1 = arena.spawn();
        assert!(!id1.is_null());
        assert!(arena.is_alive(id1));
        assert_eq!(arena.alive_count(), 1);

        let id2 = arena.spawn();
        assert!(!id2.is_null());
        assert_eq!(arena.alive_count(), 2);

        assert!(arena.despawn(id1));
        assert!(!arena.is_alive(id1));
        assert_eq!(arena.alive_count(), 1);

        // Spawn again - should reuse the slot
        let id3 = arena.spawn();
        assert_eq!(id3.index(), id1.index());
        assert_ne!(id3.generation(), id1.generation());
        assert!(!arena.is_alive(id1));
    }

    #[test]
    fn test_double_despawn_is_rejected() {
        let mut arena = EntityArena::new(4);
        let id = arena.spawn();
        assert!(arena.despawn(id));
        assert!(!arena.despawn(id));
        assert_eq!(arena.alive_count(), 0);
    }

    #[test]
    fn test_capacity_exhaustion_returns_null() {
        let mut arena = EntityArena::new(2);
        assert!(!arena.spawn().is_null());
        assert!(!arena.spawn().is_null());
        assert!(arena.spawn().is_null());
    }

    #[test]
    fn test_out_of_range_and_null_are_dead() {
        let arena = EntityArena::new(2);
        assert!(!arena.is_alive(EntityRef::NULL));
        assert!(!arena.is_alive(EntityRef::new(99, 0)));
    }

    #[test]
    fn test_iter_alive() {
        let mut arena = EntityArena::new(8);
        let a = arena.spawn();
        let b = arena.spawn();
        let c = arena.spawn();
        arena.despawn(b);

        let alive: Vec<_> = arena.iter_alive().collect();
        assert_eq!(alive, vec![a, c]);
    }
}
