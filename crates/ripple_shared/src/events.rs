//! Event payload types and the contract every payload kind implements.
//!
//! A payload is a plain, immutable record describing one occurrence of an
//! event. The bus never names these types; it sees them through [`Payload`]
//! and the kind id the registry binds them to.

use std::fmt;

use ripple_core::EntityRef;
use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Event kind discriminant.
///
/// Small integer tag identifying which payload type an event carries. Ids are
/// bound to types by the payload registry at startup; the payload types
/// themselves never hard-code one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KindId(u16);

impl KindId {
    /// Creates a kind id from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl From<u16> for KindId {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for KindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KindId({})", self.0)
    }
}

impl fmt::Display for KindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Implemented by every type that can travel through the event bus.
///
/// `NAME` is the stable, schema-facing name of the kind. Name-based id
/// allocation, config-driven id tables and wire-schema checks all key on it,
/// so it must be unique across the payload types an application registers.
///
/// Adding a new kind means defining a record and implementing this trait;
/// the registry and the bus need no changes.
pub trait Payload: Send + Sync + 'static {
    /// Stable name of this payload kind.
    const NAME: &'static str;
}

/// Two bodies came into contact.
///
/// Produced by the contact producer once per contact per tick; it is consumed
/// during that tick and never persisted. Both entity references are weak and
/// may already be dead by the time a subscriber looks at them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollisionPayload {
    /// The first entity in the collision.
    pub entity_a: EntityRef,
    /// World-space point on `entity_a` where the contact occurred.
    pub position_a: Vec3,
    /// The second entity in the collision.
    pub entity_b: EntityRef,
    /// World-space point on `entity_b` where the contact occurred.
    pub position_b: Vec3,
}

impl CollisionPayload {
    /// Creates a collision payload.
    #[must_use]
    pub const fn new(
        entity_a: EntityRef,
        position_a: Vec3,
        entity_b: EntityRef,
        position_b: Vec3,
    ) -> Self {
        Self {
            entity_a,
            position_a,
            entity_b,
            position_b,
        }
    }

    /// Whether `entity` is one of the two participants.
    #[must_use]
    pub fn involves(&self, entity: EntityRef) -> bool {
        self.entity_a == entity || self.entity_b == entity
    }

    /// The participant that is not `entity`, or `None` if `entity` is not involved.
    ///
    /// For a self-collision this returns `entity` itself.
    #[must_use]
    pub fn other(&self, entity: EntityRef) -> Option<EntityRef> {
        if self.entity_a == entity {
            Some(self.entity_b)
        } else if self.entity_b == entity {
            Some(self.entity_a)
        } else {
            None
        }
    }

    /// Contact point on `entity`, if it participates.
    #[must_use]
    pub fn contact_on(&self, entity: EntityRef) -> Option<Vec3> {
        if self.entity_a == entity {
            Some(self.position_a)
        } else if self.entity_b == entity {
            Some(self.position_b)
        } else {
            None
        }
    }

    /// The same contact seen from `entity_b`'s side.
    #[must_use]
    pub const fn swapped(self) -> Self {
        Self::new(self.entity_b, self.position_b, self.entity_a, self.position_a)
    }
}

impl Payload for CollisionPayload {
    const NAME: &'static str = "collision";
}
