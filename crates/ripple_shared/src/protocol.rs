//! Wire schema for events mirrored into network or save-file streams.
//!
//! Every variant's discriminant must equal the kind id the payload registry
//! binds to the same payload. The registry checks this against
//! [`WireEvent::SCHEMA`] at startup; a mismatch is data corruption, not a
//! recoverable condition.
//!
//! Frame layout: little-endian `u16` discriminant followed by the variant's
//! `Pod` record.

use bytemuck::{Pod, Zeroable};
use ripple_core::EntityRef;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::{CollisionPayload, KindId, Payload};
use crate::math::Vec3;

/// One variant of the wire schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchemaVariant {
    /// `Payload::NAME` of the payload this variant carries.
    pub name: &'static str,
    /// Discriminant written on the wire.
    pub discriminant: u16,
}

/// Wire form of a collision.
///
/// Entity references travel as raw bits. Field order keeps the layout free of
/// padding.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct CollisionRecord {
    /// `EntityRef` bits of the first entity.
    pub entity_a: u64,
    /// `EntityRef` bits of the second entity.
    pub entity_b: u64,
    /// Contact point on the first entity.
    pub position_a: Vec3,
    /// Contact point on the second entity.
    pub position_b: Vec3,
}

impl From<CollisionPayload> for CollisionRecord {
    fn from(c: CollisionPayload) -> Self {
        Self {
            entity_a: c.entity_a.to_bits(),
            entity_b: c.entity_b.to_bits(),
            position_a: c.position_a,
            position_b: c.position_b,
        }
    }
}

impl From<CollisionRecord> for CollisionPayload {
    fn from(r: CollisionRecord) -> Self {
        Self::new(
            EntityRef::from_bits(r.entity_a),
            r.position_a,
            EntityRef::from_bits(r.entity_b),
            r.position_b,
        )
    }
}

/// Errors decoding a wire frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Frame shorter than its header or record.
    #[error("truncated frame: need {needed} bytes, got {got}")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        got: usize,
    },

    /// Discriminant not in the schema.
    #[error("unknown wire discriminant: {0}")]
    UnknownDiscriminant(u16),

    /// Trailing bytes after the record.
    #[error("frame length mismatch: expected {expected} bytes, got {got}")]
    LengthMismatch {
        /// Exact frame length for this discriminant.
        expected: usize,
        /// Actual frame length.
        got: usize,
    },
}

/// Serialized union of mirrored events.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum WireEvent {
    /// A collision.
    Collision(CollisionRecord),
}

/// Header size (discriminant).
const HEADER_LEN: usize = std::mem::size_of::<u16>();

impl WireEvent {
    /// Discriminant of [`WireEvent::Collision`].
    pub const COLLISION: u16 = 4;

    /// Every variant with its discriminant.
    pub const SCHEMA: &'static [SchemaVariant] = &[SchemaVariant {
        name: CollisionPayload::NAME,
        discriminant: Self::COLLISION,
    }];

    /// Returns the discriminant of this event.
    #[must_use]
    pub const fn discriminant(&self) -> u16 {
        match self {
            Self::Collision(_) => Self::COLLISION,
        }
    }

    /// Returns the discriminant as a kind id.
    #[must_use]
    pub const fn kind(&self) -> KindId {
        KindId::new(self.discriminant())
    }

    /// Encodes this event into a frame.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let body: &[u8] = match self {
            Self::Collision(record) => bytemuck::bytes_of(record),
        };
        let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
        frame.extend_from_slice(&self.discriminant().to_le_bytes());
        frame.extend_from_slice(body);
        frame
    }

    /// Decodes a frame produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] if the frame is truncated, has trailing bytes
    /// or carries an unknown discriminant.
    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        if frame.len() < HEADER_LEN {
            return Err(WireError::Truncated {
                needed: HEADER_LEN,
                got: frame.len(),
            });
        }
        let (header, body) = frame.split_at(HEADER_LEN);

        match u16::from_le_bytes([header[0], header[1]]) {
            Self::COLLISION => read_record::<CollisionRecord>(body).map(Self::Collision),
            other => Err(WireError::UnknownDiscriminant(other)),
        }
    }
}

impl From<CollisionPayload> for WireEvent {
    fn from(c: CollisionPayload) -> Self {
        Self::Collision(c.into())
    }
}

fn read_record<T: Pod>(body: &[u8]) -> Result<T, WireError> {
    let expected = std::mem::size_of::<T>();
    if body.len() < expected {
        return Err(WireError::Truncated {
            needed: HEADER_LEN + expected,
            got: HEADER_LEN + body.len(),
        });
    }
    if body.len() > expected {
        return Err(WireError::LengthMismatch {
            expected: HEADER_LEN + expected,
            got: HEADER_LEN + body.len(),
        });
    }
    Ok(bytemuck::pod_read_unaligned(body))
}
