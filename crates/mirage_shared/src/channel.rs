//! # Message Channel
//!
//! Bidirectional, ordered, reliable ports between two execution contexts.
//!
//! ```text
//! ┌─────────────┐   post ───────────────> try_recv   ┌─────────────┐
//! │ Game port   │                                     │ Render port │
//! └─────────────┘   try_recv <─────────────── post    └─────────────┘
//! ```
//!
//! FIFO within one port pair. No redelivery: the transport is in-process and
//! never drops a message while both ends are alive. Queues are unbounded, so
//! `post` never waits on a slow peer.

use std::fmt;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use thiserror::Error;

/// The other end of a port pair was dropped and nothing is left to read.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("peer port was dropped")]
pub struct PeerGone;

/// One end of a bidirectional port pair.
pub struct MessagePort<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
}

/// Creates an unbounded port pair.
#[must_use]
pub fn channel<T>() -> (MessagePort<T>, MessagePort<T>) {
    let (a_tx, a_rx) = unbounded();
    let (b_tx, b_rx) = unbounded();
    (
        MessagePort { sender: a_tx, receiver: b_rx },
        MessagePort { sender: b_tx, receiver: a_rx },
    )
}

impl<T> MessagePort<T> {
    /// Sends a message to the peer without waiting.
    ///
    /// Returns `false` if the peer end was dropped.
    #[inline]
    pub fn post(&self, message: T) -> bool {
        self.sender.send(message).is_ok()
    }

    /// Receives one message (non-blocking).
    #[inline]
    pub fn try_recv(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Receives one message (non-blocking), telling an idle peer apart from
    /// a dropped one.
    ///
    /// # Errors
    ///
    /// [`PeerGone`] once the peer was dropped and the queue is empty.
    pub fn poll(&self) -> Result<Option<T>, PeerGone> {
        match self.receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(PeerGone),
        }
    }

    /// Receives one message, waiting up to `timeout`.
    ///
    /// Returns `None` on timeout or if the peer is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Receives all pending messages (non-blocking), in order.
    #[inline]
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }

    /// Number of messages waiting on this end.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }
}

impl<T> fmt::Debug for MessagePort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePort")
            .field("pending", &self.receiver.len())
            .finish()
    }
}
