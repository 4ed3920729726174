//! # MIRAGE Shared
//!
//! Everything both execution contexts must agree on:
//!
//! - `scene`: static schemas of the built-in replicated classes
//! - `protocol`: control messages carried between contexts
//! - `channel`: ordered, reliable message ports
//! - `config`: startup configuration (TOML)
//!
//! ## CRITICAL RULE
//!
//! Schemas are rebuilt in each context from the functions in [`scene`].
//! Never share a mutable registry across threads.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod channel;
pub mod config;
pub mod constants;
pub mod protocol;
pub mod scene;

pub use channel::{channel, MessagePort, PeerGone};
pub use config::{ConfigError, MirageConfig};
pub use constants::{DEFAULT_FRAME_RATE, DEFAULT_TICK_RATE, NAME_CAPACITY};
pub use protocol::{
    ControlMessage, InitMessage, ProxyCreate, RenderSurface, RpcMessage, RpcValue,
};
pub use scene::{register_scene_schemas, RenderingInfo, SimulationInfo, Transform};
