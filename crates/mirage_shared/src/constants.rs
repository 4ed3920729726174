//! # Replication Constants
//!
//! Defaults baked into both contexts. Anything tunable at startup lives in
//! [`crate::config`] instead.

/// Simulation ticks per second.
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Render frames per second.
pub const DEFAULT_FRAME_RATE: u32 = 144;

/// Initial drawing surface width.
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;

/// Initial drawing surface height.
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 720;

/// Capacity of every `name` string field, in bytes.
pub const NAME_CAPACITY: usize = 32;
