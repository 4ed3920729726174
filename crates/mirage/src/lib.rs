//! # MIRAGE
//!
//! Lock-free replication of scene state from a game thread to a render
//! thread.
//!
//! ```text
//! ┌──────────────────────┐   triple buffers (one per object)   ┌──────────────────────┐
//! │ GAME THREAD          │ ──────────────────────────────────> │ RENDER THREAD        │
//! │                      │                                     │                      │
//! │  Synchronizer        │   control port (ordered, reliable)  │  RenderContext       │
//! │  • authoritative     │ <─────────────────────────────────> │  • render proxies    │
//! │    field values      │   Init / Proxy / Rpc / Ref /        │  • id -> proxy map   │
//! │  • dirty set         │   Destroy / Running / Shutdown      │  • rendering info    │
//! └──────────────────────┘                                     └──────────────────────┘
//! ```
//!
//! ## Crates
//!
//! - [`core`]: triple buffer, schemas, field codec, proxy ids
//! - [`shared`]: built-in classes, control protocol, ports, config
//! - [`sync`]: producer side
//! - [`render`]: consumer side
//!
//! [`GameLoop`] wires both sides together on two threads.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod game_loop;

pub use mirage_core as core;
pub use mirage_render as render;
pub use mirage_shared as shared;
pub use mirage_sync as sync;

pub use game_loop::{
    GameLoop, LoopError, LoopTimings, RenderReport, SchemaSetup, BOOTSTRAP_TIMEOUT,
};
