//! # Ripple Core
//!
//! Entity identity shared by every system that produces or consumes events.
//!
//! ## Architecture Rules
//!
//! 1. **Payloads never own entities** - they carry an [`EntityRef`], a weak handle
//! 2. **Handles may dangle** - validity is checked against the [`EntityArena`],
//!    never by dereferencing
//! 3. **Slot reuse bumps the generation** - stale handles are always detectable
//!
//! ## Example
//!
//! ```rust
//! use ripple_core::EntityArena;
//!
//! let mut arena = EntityArena::new(16);
//! let player = arena.spawn();
//! assert!(arena.is_alive(player));
//!
//! arena.despawn(player);
//! assert!(!arena.is_alive(player));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod ecs;

pub use ecs::{EntityArena, EntityRef};
