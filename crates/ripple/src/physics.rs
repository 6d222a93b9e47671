//! # Contact Producer
//!
//! Broad-phase contact detection over axis-aligned boxes. Each overlapping
//! pair of live bodies becomes one [`CollisionPayload`] per tick.
//!
//! Bodies are tested pairwise in insertion order, which keeps the output
//! order stable from tick to tick.

use ripple_core::{EntityArena, EntityRef};
use ripple_shared::{CollisionPayload, Vec3};

// ============================================================================
// AABB (Axis-Aligned Bounding Box)
// ============================================================================

/// Axis-aligned bounding box in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// Box spanning two corners, given in any order.
    #[must_use]
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Box centered at `center` extending `half_extents` along each axis.
    #[must_use]
    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    /// Checks if this box touches or overlaps another.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Overlap on each axis. Positive = overlap, negative = gap.
    #[must_use]
    pub fn overlap(&self, other: &Self) -> Vec3 {
        self.max.min(other.max) - self.min.max(other.min)
    }

    /// Center point.
    #[inline]
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Point of this box nearest to `point`.
    #[inline]
    #[must_use]
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        point.clamp(self.min, self.max)
    }

    /// The box moved by `delta`.
    #[must_use]
    pub fn translate(&self, delta: Vec3) -> Self {
        Self {
            min: self.min + delta,
            max: self.max + delta,
        }
    }
}

// ============================================================================
// CONTACT DETECTOR
// ============================================================================

/// Tracks entity bounds and reports contacts.
#[derive(Clone, Debug, Default)]
pub struct ContactDetector {
    bodies: Vec<(EntityRef, Aabb)>,
}

impl ContactDetector {
    /// Creates an empty detector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a body, or replaces its bounds if already present.
    ///
    /// Returns the previous bounds.
    pub fn insert(&mut self, entity: EntityRef, bounds: Aabb) -> Option<Aabb> {
        if let Some(slot) = self.slot_mut(entity) {
            return Some(std::mem::replace(slot, bounds));
        }
        self.bodies.push((entity, bounds));
        None
    }

    /// Removes a body, returning its bounds.
    pub fn remove(&mut self, entity: EntityRef) -> Option<Aabb> {
        let index = self.bodies.iter().position(|(e, _)| *e == entity)?;
        Some(self.bodies.remove(index).1)
    }

    /// Updates the bounds of a known body. Returns `false` if unknown.
    pub fn set_bounds(&mut self, entity: EntityRef, bounds: Aabb) -> bool {
        match self.slot_mut(entity) {
            Some(slot) => {
                *slot = bounds;
                true
            }
            None => false,
        }
    }

    /// Current bounds of a body.
    #[must_use]
    pub fn bounds(&self, entity: EntityRef) -> Option<Aabb> {
        self.bodies
            .iter()
            .find(|(e, _)| *e == entity)
            .map(|&(_, bounds)| bounds)
    }

    /// Drops bodies whose entity is no longer alive. Returns how many.
    pub fn prune(&mut self, arena: &EntityArena) -> usize {
        let before = self.bodies.len();
        self.bodies.retain(|(e, _)| arena.is_alive(*e));
        before - self.bodies.len()
    }

    /// Number of tracked bodies.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Whether no bodies are tracked.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Every touching pair of live bodies.
    ///
    /// `entity_a` is the body inserted first. The contact point on each body
    /// is the point of that body closest to the other body's center.
    #[must_use]
    pub fn detect(&self, arena: &EntityArena) -> Vec<CollisionPayload> {
        let live: Vec<&(EntityRef, Aabb)> = self
            .bodies
            .iter()
            .filter(|(e, _)| arena.is_alive(*e))
            .collect();

        let mut contacts = Vec::new();
        for (i, &&(entity_a, box_a)) in live.iter().enumerate() {
            for &&(entity_b, box_b) in &live[i + 1..] {
                if box_a.intersects(&box_b) {
                    contacts.push(CollisionPayload::new(
                        entity_a,
                        box_a.closest_point(box_b.center()),
                        entity_b,
                        box_b.closest_point(box_a.center()),
                    ));
                }
            }
        }
        contacts
    }

    fn slot_mut(&mut self, entity: EntityRef) -> Option<&mut Aabb> {
        self.bodies
            .iter_mut()
            .find(|(e, _)| *e == entity)
            .map(|(_, bounds)| bounds)
    }
}
