//! # Ripple Shared
//!
//! Types that event producers, consumers and the wire layer agree on.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on the event bus. Payload types are declared
//! here without any kind id; ids are bound by the payload registry in
//! `ripple` during startup.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod events;
pub mod math;
pub mod protocol;

pub use events::{CollisionPayload, KindId, Payload};
pub use math::Vec3;
pub use protocol::{CollisionRecord, SchemaVariant, WireError, WireEvent};
pub use ripple_core::EntityRef;
