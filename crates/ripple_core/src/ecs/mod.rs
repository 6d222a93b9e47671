//! # Entity Management
//!
//! - Entity references are indices with generation counters
//! - The arena hands out references and is the only authority on liveness
//! - Nothing here knows about components or events

mod arena;
mod entity;

pub use arena::EntityArena;
pub use entity::EntityRef;
