//! # Wire Bridge
//!
//! Moves events between the bus and the wire schema in
//! [`ripple_shared::protocol`]. Inbound frames are decoded elsewhere and
//! handed to [`publish_wire`]; outbound frames come from [`mirror_collisions`].
//!
//! Kind ids used here are the wire discriminants, so the registry must be
//! built to match them. [`engine_registry`] does that and verifies it.

use crossbeam_channel::{Sender, TrySendError};
use ripple_shared::{CollisionPayload, KindId, WireEvent};

use crate::dispatch::{EventBus, SubscriptionHandle};
use crate::error::{DispatchResult, RegistryResult};
use crate::registry::PayloadRegistry;

/// Registry binding every wire-mirrored payload to its discriminant.
///
/// # Errors
///
/// Returns a [`RegistryError`](crate::RegistryError) if the schema and the
/// registrations disagree.
pub fn engine_registry() -> RegistryResult<PayloadRegistry> {
    let mut builder = PayloadRegistry::builder();
    builder.register::<CollisionPayload>(KindId::new(WireEvent::COLLISION))?;

    let registry = builder.build();
    registry.verify_schema(WireEvent::SCHEMA)?;
    Ok(registry)
}

/// Publishes a decoded wire event under its discriminant.
///
/// # Errors
///
/// - [`DispatchError::Registry`](crate::DispatchError::Registry) if the
///   discriminant is not a registered kind
/// - [`DispatchError::KindTypeMismatch`](crate::DispatchError::KindTypeMismatch)
///   if the registry binds the discriminant to another payload type
///
/// otherwise as [`EventBus::publish`].
pub fn publish_wire(bus: &EventBus, event: WireEvent) -> DispatchResult<()> {
    let kind = event.kind();
    match event {
        WireEvent::Collision(record) => bus.publish_kind(kind, CollisionPayload::from(record)),
    }
}

/// Encodes every delivered collision into a frame and sends it to `sink`.
///
/// A full or closed sink drops the frame with a warning; the bus is never
/// blocked by a slow consumer.
///
/// # Errors
///
/// As [`EventBus::subscribe`].
pub fn mirror_collisions(
    bus: &EventBus,
    sink: Sender<Vec<u8>>,
) -> DispatchResult<SubscriptionHandle> {
    bus.subscribe(move |collision: &CollisionPayload| {
        let frame = WireEvent::from(*collision).encode();
        match sink.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(payload = "collision", "wire sink full, frame dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!(payload = "collision", "wire sink closed, frame dropped");
            }
        }
    })
}
