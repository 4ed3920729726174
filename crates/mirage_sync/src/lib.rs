//! # MIRAGE Sync
//!
//! The producer half of replication. Lives on the game thread.
//!
//! ## Per-Tick Flow
//!
//! ```text
//! set_field() ──> dirty set ──┐
//!                             ▼
//! flush():  1. send queued creations (one `Proxy` message)
//!           2. encode each dirty object into the scratch slot
//!           3. copy_to_write_buffer -> single atomic publish
//!           4. publish the SimulationInfo block
//! ```
//!
//! The render thread never receives state over the channel; it reads the
//! latest published slot whenever a proxy field is accessed.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod dirty;
pub mod error;
pub mod ids;
pub mod synchronizer;

pub use dirty::DirtySet;
pub use error::{SyncError, SyncResult};
pub use ids::IdAllocator;
pub use synchronizer::{FlushStats, Synchronizer};
