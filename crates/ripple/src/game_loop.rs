//! # Simulation Loop
//!
//! One tick of the contact pipeline:
//!
//! ```text
//! Frame N:
//! ┌─────────────────────────────────────────────────────────────┐
//! │ 1. DETECT                                                   │
//! │    └─ ContactDetector::detect(&arena), live bodies only     │
//! │                                                             │
//! │ 2. PUBLISH                                                  │
//! │    └─ one CollisionPayload per contact                      │
//! │       (immediate mode: handlers run here)                   │
//! │                                                             │
//! │ 3. DRAIN (deferred mode)                                    │
//! │    └─ handlers run here, in publish order                   │
//! │                                                             │
//! │ 4. END FRAME                                                │
//! │    └─ record FrameStats, warn if over budget                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::time::Instant;

use ripple_core::{EntityArena, EntityRef};
use ripple_shared::{CollisionPayload, Payload};

use crate::config::DeliveryMode;
use crate::dispatch::EventBus;
use crate::error::DispatchResult;
use crate::physics::{Aabb, ContactDetector};

/// Per-frame statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame number, starting at 0.
    pub frame: u64,
    /// Contacts detected and published.
    pub contacts: u32,
    /// Handler invocations run by this frame's publishes and drain.
    ///
    /// Deliveries triggered by other threads publishing during the frame are
    /// not counted, except for their queued events this frame's drain runs.
    pub delivered: u64,
    /// Wall time of the frame in microseconds.
    pub elapsed_us: u64,
    /// Whether the frame exceeded `frame_budget_us`.
    pub over_budget: bool,
}

/// Owns the entity arena, the contact detector and the bus, and runs ticks.
pub struct SimulationLoop {
    arena: EntityArena,
    detector: ContactDetector,
    bus: EventBus,
    frame_count: u64,
    stats_accumulator: FrameStatsAccumulator,
}

impl SimulationLoop {
    /// Creates a loop over `arena`, publishing to `bus`.
    ///
    /// The frame budget comes from the bus's [`DispatchConfig`](crate::DispatchConfig).
    #[must_use]
    pub fn new(arena: EntityArena, bus: EventBus) -> Self {
        Self {
            arena,
            detector: ContactDetector::new(),
            bus,
            frame_count: 0,
            stats_accumulator: FrameStatsAccumulator::new(),
        }
    }

    /// Spawns an entity and tracks its bounds.
    ///
    /// Returns `EntityRef::NULL` without tracking anything if the arena is full.
    pub fn spawn_body(&mut self, bounds: Aabb) -> EntityRef {
        let entity = self.arena.spawn();
        if !entity.is_null() {
            self.detector.insert(entity, bounds);
        }
        entity
    }

    /// Despawns an entity and stops tracking it.
    ///
    /// References held by queued payloads stay valid handles but no longer
    /// name a live entity.
    pub fn despawn(&mut self, entity: EntityRef) -> bool {
        self.detector.remove(entity);
        self.arena.despawn(entity)
    }

    /// Runs one tick.
    ///
    /// # Errors
    ///
    /// Returns the first publish or drain error. The frame is not counted;
    /// events published before the error stay delivered or queued.
    pub fn step(&mut self) -> DispatchResult<FrameStats> {
        let start = Instant::now();

        let contacts = self.detector.detect(&self.arena);
        let mut delivered = 0;
        if !contacts.is_empty() {
            let kind = self.bus.registry().id_for::<CollisionPayload>().map_err(|err| {
                tracing::error!(payload = CollisionPayload::NAME, "collision payload not registered");
                err
            })?;
            for contact in &contacts {
                delivered += self.bus.publish_counted(kind, *contact)?;
            }
        }

        if self.bus.mode() == DeliveryMode::Deferred {
            delivered += self.bus.drain()?;
        }

        let elapsed_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
        let budget_us = self.bus.config().frame_budget_us;
        let stats = FrameStats {
            frame: self.frame_count,
            contacts: u32::try_from(contacts.len()).unwrap_or(u32::MAX),
            delivered: u64::try_from(delivered).unwrap_or(u64::MAX),
            elapsed_us,
            over_budget: elapsed_us > budget_us,
        };

        if stats.over_budget {
            tracing::warn!(
                frame = stats.frame,
                elapsed_us,
                budget_us,
                contacts = stats.contacts,
                "frame exceeded budget"
            );
        }
        tracing::debug!(
            frame = stats.frame,
            contacts = stats.contacts,
            delivered = stats.delivered,
            elapsed_us,
            "frame complete"
        );

        self.frame_count += 1;
        self.stats_accumulator.record(stats);
        Ok(stats)
    }

    /// Returns the current frame count.
    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Entity arena.
    #[must_use]
    pub fn arena(&self) -> &EntityArena {
        &self.arena
    }

    /// Contact detector, for moving bodies between ticks.
    #[must_use]
    pub fn detector_mut(&mut self) -> &mut ContactDetector {
        &mut self.detector
    }

    /// Contact detector.
    #[must_use]
    pub fn detector(&self) -> &ContactDetector {
        &self.detector
    }

    /// The bus contacts are published to.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Returns the accumulated statistics.
    #[must_use]
    pub fn stats(&self) -> &FrameStatsAccumulator {
        &self.stats_accumulator
    }
}

/// Accumulator for frame statistics.
#[derive(Clone, Debug)]
pub struct FrameStatsAccumulator {
    /// Total frames recorded.
    pub frames_recorded: u64,
    /// Sum of frame times.
    pub elapsed_us_sum: u64,
    /// Sum of contacts.
    pub contacts_sum: u64,
    /// Sum of handler invocations.
    pub delivered_sum: u64,
    /// Min frame time.
    pub min_frame_us: u64,
    /// Max frame time.
    pub max_frame_us: u64,
    /// Frames that exceeded budget.
    pub frames_over_budget: u64,
}

impl FrameStatsAccumulator {
    /// Creates a new accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames_recorded: 0,
            elapsed_us_sum: 0,
            contacts_sum: 0,
            delivered_sum: 0,
            min_frame_us: u64::MAX,
            max_frame_us: 0,
            frames_over_budget: 0,
        }
    }

    /// Records a frame's statistics.
    pub fn record(&mut self, stats: FrameStats) {
        self.frames_recorded += 1;
        self.elapsed_us_sum = self.elapsed_us_sum.saturating_add(stats.elapsed_us);
        self.contacts_sum += u64::from(stats.contacts);
        self.delivered_sum += stats.delivered;
        self.min_frame_us = self.min_frame_us.min(stats.elapsed_us);
        self.max_frame_us = self.max_frame_us.max(stats.elapsed_us);

        if stats.over_budget {
            self.frames_over_budget += 1;
        }
    }

    /// Returns average frame time in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_frame_ms(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        (self.elapsed_us_sum as f64 / self.frames_recorded as f64) / 1000.0
    }

    /// Returns the fraction of frames over budget.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn over_budget_ratio(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        self.frames_over_budget as f64 / self.frames_recorded as f64
    }
}

impl Default for FrameStatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
