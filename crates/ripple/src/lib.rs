//! # Ripple
//!
//! Typed event payloads and dispatch for entity-component engines.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                               RIPPLE                                 │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  ┌──────────────────┐    frozen, Arc    ┌──────────────────────────┐ │
//! │  │ RegistryBuilder  │ ────────────────> │ EventBus                 │ │
//! │  │  • register      │  PayloadRegistry  │  • subscribe / publish   │ │
//! │  │  • register_with │                   │  • immediate / deferred  │ │
//! │  └────────┬─────────┘                   └────────────┬─────────────┘ │
//! │           │ verify_schema                ▲           │               │
//! │           ▼                              │ publish   │ drain         │
//! │  ┌──────────────────┐    ┌───────────────┴────────┐  ▼               │
//! │  │ WireEvent schema │    │ SimulationLoop         │  handlers(&T)    │
//! │  │ (ripple_shared)  │    │  • ContactDetector     │                  │
//! │  └──────────────────┘    │  • EntityArena         │                  │
//! │                          └────────────────────────┘                  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Startup
//!
//! Every payload type is registered once, explicitly, before the bus exists.
//! The bus only accepts a frozen registry, so nothing can publish or
//! subscribe against a half-built one.
//!
//! ```rust
//! use std::sync::Arc;
//! use ripple::{wire, EventBus, RippleConfig};
//!
//! let config = RippleConfig::from_toml_str("[dispatch]\ndelivery = \"deferred\"\n")?;
//! let registry = Arc::new(wire::engine_registry()?);
//! let bus = EventBus::with_config(registry, config.dispatch);
//! assert_eq!(bus.drain()?, 0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Modules
//!
//! - `registry`: payload type ↔ kind id table and id allocators
//! - `dispatch`: the event bus
//! - `wire`: bridge between the bus and the wire schema
//! - `physics`: contact producer
//! - `game_loop`: tick orchestration and timing
//! - `config`: TOML configuration

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod game_loop;
pub mod physics;
pub mod registry;
pub mod wire;

// Re-export the lower layers
pub use ripple_core as core;
pub use ripple_shared as shared;

// Re-export commonly used types
pub use config::{DeliveryMode, DispatchConfig, KindTable, RippleConfig};
pub use dispatch::{ErasedEvent, EventBus, SubscriptionHandle};
pub use error::{
    ConfigError, ConfigResult, DispatchError, DispatchResult, RegistryError, RegistryResult,
};
pub use game_loop::{FrameStats, FrameStatsAccumulator, SimulationLoop};
pub use physics::{Aabb, ContactDetector};
pub use registry::{
    ConfiguredKinds, HashedKinds, KindAllocator, PayloadRegistry, PayloadType, RegistryBuilder,
    SequentialKinds,
};
