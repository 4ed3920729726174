//! # Synchronization Primitives for the Game/Render Split
//!
//! No locks. No tearing. Neither side ever waits for the other.
//!
//! ## The Problem
//!
//! ```text
//! Game thread:    WRITE object state every tick
//! Render thread:  READ object state every frame (different rate)
//!
//! Without synchronization: TORN READS (half old tick, half new tick)
//! With Mutex:              the slower loop stalls the faster one
//! ```
//!
//! ## The Solution: Triple Buffering
//!
//! ```text
//! slots:   [ A ]      [ B ]      [ C ]
//!          write      read       spare
//!
//! publish (one atomic store of the flags word):
//!          spare      write      read
//! ```
//!
//! The writer always fills a slot nobody is told to read. Readers always go
//! through the published index. A per-slot sequence word lets a reader that
//! fell two publishes behind detect the overwrite and retry.

mod triple_buffer;

pub use triple_buffer::{
    BufferFlags,
    Snapshot,
    TripleBuffer,
    TripleBufferHandle,
    TripleBufferWriter,
    WriteSlot,
};
