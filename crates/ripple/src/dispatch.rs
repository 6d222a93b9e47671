//! # Event Bus
//!
//! Decouples event producers from consumers without knowing any payload type.
//!
//! ## Flow
//!
//! ```text
//! producer ── publish::<T>(payload) ──> kind = registry.id_for::<T>()
//!                                            │
//!                  Immediate ───────────────┤─────────────── Deferred
//!                      │                                        │
//!                      │                         ErasedEvent { kind, TypeId, Box<dyn Any> }
//!                      │                                        │  crossbeam queue
//!                      ▼                                        ▼
//!              subscribers[kind] (snapshot) <─────────────── drain()
//!                      │
//!                      └── typed adapter: downcast_ref::<T>() ──> handler(&T)
//! ```
//!
//! ## Guarantees
//!
//! - Subscribers of one kind run in subscription order
//! - Each subscriber sees each event at most once, and only events published
//!   while it was subscribed
//! - No lock is held while handlers run: a handler may publish, subscribe or
//!   unsubscribe (itself included)
//! - A handler only ever receives the payload type it subscribed with

use std::any::{type_name, Any, TypeId};
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use ripple_shared::{KindId, Payload};

use crate::config::{DeliveryMode, DispatchConfig};
use crate::error::{DispatchError, DispatchResult};
use crate::registry::PayloadRegistry;

/// Handler with its payload type erased.
type ErasedHandler = dyn Fn(&dyn Any) + Send + Sync;

thread_local! {
    /// Nesting of `deliver` on this thread.
    static DISPATCH_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// An event whose payload type has been erased.
///
/// Remembers the kind id and the payload's `TypeId`, so the bus can check it
/// against the registry before any handler sees it.
pub struct ErasedEvent {
    kind: KindId,
    type_id: TypeId,
    type_name: &'static str,
    payload: Box<dyn Any + Send>,
}

impl ErasedEvent {
    /// Erases `payload`, tagging it with `kind`.
    #[must_use]
    pub fn new<T: Payload>(kind: KindId, payload: T) -> Self {
        Self {
            kind,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            payload: Box::new(payload),
        }
    }

    /// The kind id this event was tagged with.
    #[must_use]
    pub const fn kind(&self) -> KindId {
        self.kind
    }

    /// Rust type name of the payload.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether the payload is a `T`.
    #[must_use]
    pub fn is<T: Payload>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// The payload as a `T`, if it is one.
    #[must_use]
    pub fn downcast_ref<T: Payload>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for ErasedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedEvent")
            .field("kind", &self.kind)
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Handle to one subscription.
///
/// Cloning the handle does not duplicate the subscription. Dropping it leaves
/// the subscription in place.
#[derive(Clone, Debug)]
#[must_use = "a subscription can only be cancelled through its handle"]
pub struct SubscriptionHandle {
    kind: KindId,
    id: u64,
    active: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    /// Kind this subscription listens to.
    #[must_use]
    pub const fn kind(&self) -> KindId {
        self.kind
    }

    /// Whether the subscription still receives events.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stops delivery to this subscription.
    ///
    /// Takes effect for every delivery that starts after this call, including
    /// the rest of an in-progress dispatch. Safe to call from inside the
    /// subscription's own handler. The bus drops the entry on its next
    /// subscribe or [`EventBus::unsubscribe`].
    pub fn cancel(&self) {
        self.active.store(false, Ordering::Release);
    }
}

struct Subscriber {
    id: u64,
    /// First event sequence number this subscriber may receive.
    since: u64,
    active: Arc<AtomicBool>,
    handler: Box<ErasedHandler>,
}

struct Queued {
    seq: u64,
    event: ErasedEvent,
}

struct Shared {
    registry: Arc<PayloadRegistry>,
    config: DispatchConfig,
    subscribers: RwLock<HashMap<KindId, Vec<Arc<Subscriber>>>>,
    next_subscriber: AtomicU64,
    next_sequence: AtomicU64,
    delivered: AtomicU64,
    queue_tx: Sender<Queued>,
    queue_rx: Receiver<Queued>,
}

/// Type-safe event bus over a frozen [`PayloadRegistry`].
///
/// Cheap to clone; clones share subscribers and queue. `publish` may be
/// called from any thread. In deferred mode `drain` is meant to be called by
/// a single consumer, once per tick.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use ripple::{EventBus, PayloadRegistry};
/// use ripple_shared::{CollisionPayload, EntityRef, KindId, Vec3};
///
/// let mut builder = PayloadRegistry::builder();
/// builder.register::<CollisionPayload>(KindId::new(4))?;
/// let bus = EventBus::new(Arc::new(builder.build()));
///
/// let _hits = bus.subscribe(|c: &CollisionPayload| {
///     assert_eq!(c.position_a, Vec3::X);
/// })?;
///
/// bus.publish(CollisionPayload::new(
///     EntityRef::new(1, 0),
///     Vec3::X,
///     EntityRef::new(2, 0),
///     Vec3::Z,
/// ))?;
/// # Ok::<(), ripple::DispatchError>(())
/// ```
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Shared>,
}

impl EventBus {
    /// Creates a bus with default settings (immediate delivery).
    #[must_use]
    pub fn new(registry: Arc<PayloadRegistry>) -> Self {
        Self::with_config(registry, DispatchConfig::default())
    }

    /// Creates a bus with explicit settings.
    ///
    /// A zero `queue_capacity` or `max_dispatch_depth` is raised to one; use
    /// [`DispatchConfig::validate`] to reject such configs up front.
    #[must_use]
    pub fn with_config(registry: Arc<PayloadRegistry>, mut config: DispatchConfig) -> Self {
        config.queue_capacity = config.queue_capacity.max(1);
        config.max_dispatch_depth = config.max_dispatch_depth.max(1);

        let (queue_tx, queue_rx) = bounded(config.queue_capacity);
        tracing::debug!(
            delivery = ?config.delivery,
            queue_capacity = config.queue_capacity,
            kinds = registry.len(),
            "event bus created"
        );

        Self {
            inner: Arc::new(Shared {
                registry,
                config,
                subscribers: RwLock::new(HashMap::new()),
                next_subscriber: AtomicU64::new(0),
                next_sequence: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                queue_tx,
                queue_rx,
            }),
        }
    }

    /// Registry this bus resolves kinds with.
    #[must_use]
    pub fn registry(&self) -> &Arc<PayloadRegistry> {
        &self.inner.registry
    }

    /// Settings in effect.
    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    /// Delivery mode in effect.
    #[must_use]
    pub fn mode(&self) -> DeliveryMode {
        self.inner.config.delivery
    }

    /// Subscribes `handler` to the kind registered for `T`.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Registry`] if `T` is not registered.
    pub fn subscribe<T, F>(&self, handler: F) -> DispatchResult<SubscriptionHandle>
    where
        T: Payload,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let kind = self.inner.registry.id_for::<T>()?;
        self.subscribe_kind(kind, handler)
    }

    /// Subscribes `handler` to `kind`, which must carry `T`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Registry`] if `kind` is not registered
    /// - [`DispatchError::KindTypeMismatch`] if `kind` carries another type
    pub fn subscribe_kind<T, F>(
        &self,
        kind: KindId,
        handler: F,
    ) -> DispatchResult<SubscriptionHandle>
    where
        T: Payload,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.check_kind(kind, TypeId::of::<T>(), type_name::<T>())?;

        // Payload types are checked against the registry before delivery
        let adapter = move |payload: &dyn Any| {
            if let Some(typed) = payload.downcast_ref::<T>() {
                handler(typed);
            }
        };

        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        let subscriber = Arc::new(Subscriber {
            id,
            since: self.inner.next_sequence.load(Ordering::SeqCst),
            active: Arc::clone(&active),
            handler: Box::new(adapter),
        });

        {
            let mut table = self.inner.subscribers.write();
            let list = table.entry(kind).or_default();
            list.retain(|s| s.active.load(Ordering::Acquire));
            list.push(subscriber);
        }

        tracing::debug!(kind = kind.get(), subscription = id, "subscribed");
        Ok(SubscriptionHandle { kind, id, active })
    }

    /// Removes a subscription. Calling it again is a no-op.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        handle.cancel();

        let mut table = self.inner.subscribers.write();
        if let Some(list) = table.get_mut(&handle.kind) {
            let before = list.len();
            list.retain(|s| s.id != handle.id);
            if list.len() != before {
                tracing::debug!(kind = handle.kind.get(), subscription = handle.id, "unsubscribed");
            }
        }
    }

    /// Publishes `payload` under the kind registered for `T`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Registry`] if `T` is not registered
    /// - [`DispatchError::QueueFull`] in deferred mode when the queue is full
    /// - [`DispatchError::DepthExceeded`] in immediate mode when handlers
    ///   re-publish too deeply
    pub fn publish<T: Payload>(&self, payload: T) -> DispatchResult<()> {
        let kind = self.inner.registry.id_for::<T>().map_err(|err| {
            tracing::error!(payload = T::NAME, "publish of unregistered payload type");
            err
        })?;
        self.publish_kind(kind, payload)
    }

    /// Publishes `payload` under an explicit kind, which must carry `T`.
    ///
    /// # Errors
    ///
    /// [`DispatchError::KindTypeMismatch`] if `kind` carries another type,
    /// otherwise as [`publish`](Self::publish).
    pub fn publish_kind<T: Payload>(&self, kind: KindId, payload: T) -> DispatchResult<()> {
        self.publish_counted(kind, payload).map(drop)
    }

    /// Publishes like [`publish_kind`](Self::publish_kind) and returns the
    /// handler invocations it ran: 0 in deferred mode.
    pub(crate) fn publish_counted<T: Payload>(
        &self,
        kind: KindId,
        payload: T,
    ) -> DispatchResult<usize> {
        self.check_kind(kind, TypeId::of::<T>(), type_name::<T>())?;

        match self.inner.config.delivery {
            DeliveryMode::Immediate => {
                let seq = self.inner.next_sequence.fetch_add(1, Ordering::SeqCst);
                self.deliver(kind, seq, &payload)
            }
            DeliveryMode::Deferred => self.enqueue(ErasedEvent::new(kind, payload)).map(|()| 0),
        }
    }

    /// Publishes a type-erased event.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Registry`] if the event's kind is not registered
    /// - [`DispatchError::KindTypeMismatch`] if its payload is not the
    ///   registered type
    ///
    /// otherwise as [`publish`](Self::publish). No handler runs on error.
    pub fn publish_erased(&self, event: ErasedEvent) -> DispatchResult<()> {
        self.check_kind(event.kind, event.type_id, event.type_name)?;

        match self.inner.config.delivery {
            DeliveryMode::Immediate => {
                let seq = self.inner.next_sequence.fetch_add(1, Ordering::SeqCst);
                self.deliver(event.kind, seq, &*event.payload).map(drop)
            }
            DeliveryMode::Deferred => self.enqueue(event),
        }
    }

    /// Delivers every event queued before this call, in publish order.
    ///
    /// Events published by handlers during the drain wait for the next one.
    /// Returns the number of handler invocations. Always 0 in immediate mode.
    ///
    /// # Errors
    ///
    /// [`DispatchError::DepthExceeded`] if called from inside a handler
    /// nested past the limit; undelivered events stay queued.
    pub fn drain(&self) -> DispatchResult<usize> {
        if self.inner.config.delivery == DeliveryMode::Immediate {
            return Ok(0);
        }

        let pending = self.inner.queue_rx.len();
        let mut delivered = 0;
        for _ in 0..pending {
            // Depth is claimed before the event leaves the queue
            let _depth = DepthGuard::enter(self.inner.config.max_dispatch_depth)?;
            let Ok(queued) = self.inner.queue_rx.try_recv() else {
                break;
            };
            delivered += self.fan_out(queued.event.kind, queued.seq, &*queued.event.payload);
        }
        Ok(delivered)
    }

    /// Events waiting for [`drain`](Self::drain).
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.queue_rx.len()
    }

    /// Handler invocations since the bus was created, across all threads.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    /// Active subscriptions for `kind`.
    #[must_use]
    pub fn subscriber_count(&self, kind: KindId) -> usize {
        self.inner
            .subscribers
            .read()
            .get(&kind)
            .map_or(0, |list| list.iter().filter(|s| s.active.load(Ordering::Acquire)).count())
    }

    fn check_kind(
        &self,
        kind: KindId,
        type_id: TypeId,
        actual: &'static str,
    ) -> DispatchResult<()> {
        let registered = self.inner.registry.type_for(kind).map_err(|err| {
            tracing::error!(kind = kind.get(), payload = actual, "kind not registered");
            err
        })?;

        if registered.type_id() != type_id {
            tracing::error!(
                kind = kind.get(),
                expected = registered.type_name(),
                actual,
                "payload type does not match kind"
            );
            return Err(DispatchError::KindTypeMismatch {
                kind,
                expected: registered.type_name(),
                actual,
            });
        }
        Ok(())
    }

    fn enqueue(&self, event: ErasedEvent) -> DispatchResult<()> {
        let kind = event.kind;
        let seq = self.inner.next_sequence.fetch_add(1, Ordering::SeqCst);

        // The receiver lives in `Shared`, so a full queue is the only failure
        if self.inner.queue_tx.try_send(Queued { seq, event }).is_err() {
            let capacity = self.inner.config.queue_capacity;
            tracing::warn!(kind = kind.get(), capacity, "event queue full");
            return Err(DispatchError::QueueFull { kind, capacity });
        }
        Ok(())
    }

    fn deliver(&self, kind: KindId, seq: u64, payload: &dyn Any) -> DispatchResult<usize> {
        let _depth = DepthGuard::enter(self.inner.config.max_dispatch_depth)?;
        Ok(self.fan_out(kind, seq, payload))
    }

    /// Runs every eligible handler for one event. The caller holds a
    /// [`DepthGuard`].
    fn fan_out(&self, kind: KindId, seq: u64, payload: &dyn Any) -> usize {
        let snapshot: Vec<Arc<Subscriber>> = match self.inner.subscribers.read().get(&kind) {
            Some(list) => list.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for subscriber in &snapshot {
            if subscriber.since > seq || !subscriber.active.load(Ordering::Acquire) {
                continue;
            }
            (subscriber.handler)(payload);
            delivered += 1;
        }

        self.inner.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        tracing::trace!(kind = kind.get(), seq, delivered, "event dispatched");
        delivered
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("delivery", &self.inner.config.delivery)
            .field("kinds", &self.inner.registry.len())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Tracks handler nesting on the current thread.
struct DepthGuard;

impl DepthGuard {
    fn enter(limit: u32) -> DispatchResult<Self> {
        DISPATCH_DEPTH.with(|depth| {
            let current = depth.get();
            if current >= limit {
                tracing::warn!(limit, "dispatch depth limit reached");
                return Err(DispatchError::DepthExceeded { limit });
            }
            depth.set(current + 1);
            Ok(Self)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DISPATCH_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use ripple_shared::{CollisionPayload, EntityRef, Vec3};

    use crate::error::RegistryError;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Ping(u32);
    impl Payload for Ping {
        const NAME: &'static str = "ping";
    }

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Pong(u32);
    impl Payload for Pong {
        const NAME: &'static str = "pong";
    }

    const PING: KindId = KindId::new(1);
    const PONG: KindId = KindId::new(2);

    fn registry() -> Arc<PayloadRegistry> {
        let mut builder = PayloadRegistry::builder();
        builder.register::<Ping>(PING).unwrap();
        builder.register::<Pong>(PONG).unwrap();
        Arc::new(builder.build())
    }

    fn recorder<T: Payload + Copy>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync + 'static) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        (log, move |p: &T| sink.lock().push(*p))
    }

    #[test]
    fn test_bus_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EventBus>();
        assert_send_sync::<SubscriptionHandle>();
    }

    #[test]
    fn test_fifo_subscription_order() {
        let bus = EventBus::new(registry());
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..3)
            .map(|n| {
                let order = Arc::clone(&order);
                bus.subscribe(move |_: &Ping| order.lock().push(n)).unwrap()
            })
            .collect();

        bus.publish(Ping(0)).unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert_eq!(handles.len(), 3);
    }

    #[test]
    fn test_handlers_only_see_their_kind() {
        let bus = EventBus::new(registry());
        let (pings, on_ping) = recorder::<Ping>();
        let (pongs, on_pong) = recorder::<Pong>();
        let _a = bus.subscribe(on_ping).unwrap();
        let _b = bus.subscribe(on_pong).unwrap();

        bus.publish(Ping(1)).unwrap();
        bus.publish(Pong(2)).unwrap();
        bus.publish(Ping(3)).unwrap();

        assert_eq!(*pings.lock(), vec![Ping(1), Ping(3)]);
        assert_eq!(*pongs.lock(), vec![Pong(2)]);
        assert_eq!(pongs.lock()[0].0, 2);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::new(registry());
        let (pings, on_ping) = recorder::<Ping>();
        let handle = bus.subscribe(on_ping).unwrap();

        bus.publish(Ping(1)).unwrap();
        bus.unsubscribe(&handle);
        bus.unsubscribe(&handle);
        bus.publish(Ping(2)).unwrap();

        assert_eq!(*pings.lock(), vec![Ping(1)]);
        assert!(!handle.is_active());
        assert_eq!(bus.subscriber_count(PING), 0);
    }

    #[test]
    fn test_subscribe_kind_checks_type() {
        let bus = EventBus::new(registry());

        let err = bus.subscribe_kind(PONG, |_: &Ping| {}).unwrap_err();
        assert!(matches!(err, DispatchError::KindTypeMismatch { kind, .. } if kind == PONG));

        let err = bus.subscribe_kind(KindId::new(99), |_: &Ping| {}).unwrap_err();
        assert_eq!(
            err,
            DispatchError::Registry(RegistryError::UnregisteredKind(KindId::new(99)))
        );

        let handle = bus.subscribe_kind(PING, |_: &Ping| {}).unwrap();
        assert_eq!(handle.kind(), PING);
    }

    #[test]
    fn test_unregistered_payload_type_is_rejected() {
        let bus = EventBus::new(registry());
        let hit = CollisionPayload::new(EntityRef::NULL, Vec3::ZERO, EntityRef::NULL, Vec3::ZERO);

        assert!(matches!(
            bus.publish(hit),
            Err(DispatchError::Registry(RegistryError::UnregisteredType(_)))
        ));
        assert!(bus.subscribe(|_: &CollisionPayload| {}).is_err());
    }

    #[test]
    fn test_erased_publish_validates_payload_type() {
        let bus = EventBus::new(registry());
        let (pings, on_ping) = recorder::<Ping>();
        let _h = bus.subscribe(on_ping).unwrap();

        let wrong = ErasedEvent::new(PING, Pong(5));
        assert!(matches!(
            bus.publish_erased(wrong),
            Err(DispatchError::KindTypeMismatch { .. })
        ));

        bus.publish_erased(ErasedEvent::new(PING, Ping(6))).unwrap();
        assert_eq!(*pings.lock(), vec![Ping(6)]);
    }

    #[test]
    fn test_erased_event_accessors() {
        let event = ErasedEvent::new(PING, Ping(7));
        assert_eq!(event.kind(), PING);
        assert!(event.is::<Ping>());
        assert!(!event.is::<Pong>());
        assert_eq!(event.downcast_ref::<Ping>(), Some(&Ping(7)));
        assert_eq!(event.downcast_ref::<Pong>(), None);
    }

    #[test]
    fn test_self_unsubscribe_during_dispatch() {
        let bus = EventBus::new(registry());
        let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicU64::new(0));

        let handle = {
            let slot = Arc::clone(&slot);
            let calls = Arc::clone(&calls);
            bus.subscribe(move |_: &Ping| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(me) = slot.lock().as_ref() {
                    me.cancel();
                }
            })
            .unwrap()
        };
        *slot.lock() = Some(handle);

        bus.publish(Ping(1)).unwrap();
        bus.publish(Ping(2)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(PING), 0);
    }

    #[test]
    fn test_subscriber_added_during_dispatch_misses_current_event() {
        let bus = EventBus::new(registry());
        let (late, on_late) = recorder::<Ping>();
        let on_late = Arc::new(on_late);
        let late_handle: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

        let _first = {
            let bus_for_handler = bus.clone();
            let late_handle = Arc::clone(&late_handle);
            bus.subscribe(move |_: &Ping| {
                let mut slot = late_handle.lock();
                if slot.is_none() {
                    let on_late = Arc::clone(&on_late);
                    *slot = bus_for_handler.subscribe(move |p: &Ping| on_late(p)).ok();
                }
            })
            .unwrap()
        };

        bus.publish(Ping(1)).unwrap();
        assert!(late.lock().is_empty());

        bus.publish(Ping(2)).unwrap();
        assert_eq!(*late.lock(), vec![Ping(2)]);
    }

    #[test]
    fn test_subscriber_removed_during_dispatch_gets_nothing_after() {
        let bus = EventBus::new(registry());
        let victim_slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

        let _killer = {
            let bus_for_handler = bus.clone();
            let victim_slot = Arc::clone(&victim_slot);
            bus.subscribe(move |_: &Ping| {
                if let Some(victim) = victim_slot.lock().as_ref() {
                    bus_for_handler.unsubscribe(victim);
                }
            })
            .unwrap()
        };
        let (victim_log, on_victim) = recorder::<Ping>();
        *victim_slot.lock() = Some(bus.subscribe(on_victim).unwrap());

        bus.publish(Ping(1)).unwrap();
        bus.publish(Ping(2)).unwrap();
        assert!(victim_log.lock().is_empty());
    }

    #[test]
    fn test_deferred_delivery_waits_for_drain() {
        let bus = EventBus::with_config(registry(), DispatchConfig::deferred());
        let (pings, on_ping) = recorder::<Ping>();
        let _h = bus.subscribe(on_ping).unwrap();

        bus.publish(Ping(1)).unwrap();
        bus.publish(Ping(2)).unwrap();
        assert!(pings.lock().is_empty());
        assert_eq!(bus.pending(), 2);

        assert_eq!(bus.delivered(), 0);
        assert_eq!(bus.drain().unwrap(), 2);
        assert_eq!(*pings.lock(), vec![Ping(1), Ping(2)]);
        assert_eq!(bus.pending(), 0);
        assert_eq!(bus.delivered(), 2);
    }

    #[test]
    fn test_deferred_subscriber_misses_events_published_before_it() {
        let bus = EventBus::with_config(registry(), DispatchConfig::deferred());
        bus.publish(Ping(1)).unwrap();

        let (pings, on_ping) = recorder::<Ping>();
        let _h = bus.subscribe(on_ping).unwrap();
        bus.publish(Ping(2)).unwrap();

        bus.drain().unwrap();
        assert_eq!(*pings.lock(), vec![Ping(2)]);
    }

    #[test]
    fn test_events_published_while_draining_wait_for_next_drain() {
        let bus = EventBus::with_config(registry(), DispatchConfig::deferred());
        let (pongs, on_pong) = recorder::<Pong>();
        let _echo = {
            let bus_for_handler = bus.clone();
            bus.subscribe(move |p: &Ping| {
                bus_for_handler.publish(Pong(p.0)).unwrap();
            })
            .unwrap()
        };
        let _h = bus.subscribe(on_pong).unwrap();

        bus.publish(Ping(3)).unwrap();
        assert_eq!(bus.drain().unwrap(), 1);
        assert!(pongs.lock().is_empty());
        assert_eq!(bus.pending(), 1);

        assert_eq!(bus.drain().unwrap(), 1);
        assert_eq!(*pongs.lock(), vec![Pong(3)]);
    }

    #[test]
    fn test_queue_full_is_reported() {
        let config = DispatchConfig::deferred().with_queue_capacity(2);
        let bus = EventBus::with_config(registry(), config);

        bus.publish(Ping(1)).unwrap();
        bus.publish(Ping(2)).unwrap();
        assert_eq!(
            bus.publish(Ping(3)),
            Err(DispatchError::QueueFull { kind: PING, capacity: 2 })
        );
        assert_eq!(bus.pending(), 2);
    }

    #[test]
    fn test_immediate_drain_is_noop() {
        let bus = EventBus::new(registry());
        bus.publish(Ping(1)).unwrap();
        assert_eq!(bus.drain(), Ok(0));
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn test_recursive_publish_is_bounded() {
        let config = DispatchConfig {
            max_dispatch_depth: 4,
            ..DispatchConfig::default()
        };
        let bus = EventBus::with_config(registry(), config);
        let calls = Arc::new(AtomicU64::new(0));
        let failure: Arc<Mutex<Option<DispatchError>>> = Arc::new(Mutex::new(None));

        let _loop = {
            let bus_for_handler = bus.clone();
            let calls = Arc::clone(&calls);
            let failure = Arc::clone(&failure);
            bus.subscribe(move |p: &Ping| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Err(err) = bus_for_handler.publish(Ping(p.0 + 1)) {
                    let mut slot = failure.lock();
                    if slot.is_none() {
                        *slot = Some(err);
                    }
                }
            })
            .unwrap()
        };

        bus.publish(Ping(0)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(*failure.lock(), Some(DispatchError::DepthExceeded { limit: 4 }));

        // Depth is released once the outer publish returns
        bus.publish(Ping(0)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_nested_drain_past_depth_keeps_events_queued() {
        let config = DispatchConfig {
            max_dispatch_depth: 1,
            ..DispatchConfig::deferred()
        };
        let bus = EventBus::with_config(registry(), config);
        let (pings, on_ping) = recorder::<Ping>();
        let _log = bus.subscribe(on_ping).unwrap();
        let nested: Arc<Mutex<Vec<DispatchResult<usize>>>> = Arc::new(Mutex::new(Vec::new()));

        let _reentrant = {
            let bus_for_handler = bus.clone();
            let nested = Arc::clone(&nested);
            bus.subscribe(move |_: &Ping| nested.lock().push(bus_for_handler.drain()))
                .unwrap()
        };

        bus.publish(Ping(1)).unwrap();
        bus.publish(Ping(2)).unwrap();

        assert_eq!(bus.drain(), Ok(4));
        assert_eq!(*pings.lock(), vec![Ping(1), Ping(2)]);
        assert_eq!(
            *nested.lock(),
            vec![
                Err(DispatchError::DepthExceeded { limit: 1 }),
                Err(DispatchError::DepthExceeded { limit: 1 }),
            ]
        );
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn test_concurrent_publishers() {
        let config = DispatchConfig::deferred().with_queue_capacity(4096);
        let bus = EventBus::with_config(registry(), config);
        let (pings, on_ping) = recorder::<Ping>();
        let _h = bus.subscribe(on_ping).unwrap();

        std::thread::scope(|scope| {
            for worker in 0..4u32 {
                let bus = bus.clone();
                scope.spawn(move || {
                    for i in 0..250 {
                        bus.publish(Ping(worker * 1000 + i)).unwrap();
                    }
                });
            }
        });

        assert_eq!(bus.drain().unwrap(), 1000);
        let seen = pings.lock();
        assert_eq!(seen.len(), 1000);

        // Per-producer order is preserved
        for worker in 0..4u32 {
            let mine: Vec<u32> = seen
                .iter()
                .map(|p| p.0)
                .filter(|v| v / 1000 == worker)
                .collect();
            assert!(mine.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
