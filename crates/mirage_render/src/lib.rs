//! # MIRAGE Render
//!
//! The consumer half of replication. Lives on the render thread.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ RenderContext                                            │
//! │  ├─ control port  (Proxy / Rpc / Ref / Destroy / ...)    │
//! │  ├─ ProxyFactory  constructor name -> Box<dyn RenderProxy>│
//! │  └─ ProxyRegistry ProxyId -> proxy                       │
//! │        └─ ProxyCore: TripleBufferHandle + Arc<Schema>    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Proxies never cache field values: every getter reads the slot that is
//! published at the moment of the call.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod context;
pub mod error;
pub mod factory;
pub mod proxy;
pub mod registry;
pub mod scene;
pub mod surface;

pub use context::{Flow, RenderContext};
pub use error::{ContextError, ProxyError, ProxyResult};
pub use factory::{ProxyBuilder, ProxyFactory};
pub use proxy::{GenericProxy, ProxyCore, RenderProxy, RpcOutcome};
pub use registry::{ProxyRegistry, Resolution, RpcStats};
pub use scene::{CameraProxy, CameraUniform, NodeUniform, SceneNodeProxy};
pub use surface::HeadlessSurface;
