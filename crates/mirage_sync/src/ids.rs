//! Proxy id allocation.

use mirage_core::ProxyId;

use crate::error::{SyncError, SyncResult};

/// Hands out monotonically increasing ids starting at 1.
///
/// Ids are never reused, so a destroyed object's id can only miss in a
/// consumer lookup. `0` stays reserved for the empty reference.
#[derive(Debug)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    /// Creates an allocator whose first id is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    /// Returns a fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::IdsExhausted`] after `u32::MAX - 1` allocations.
    pub fn allocate(&mut self) -> SyncResult<ProxyId> {
        let id = self.next;
        self.next = id.checked_add(1).ok_or(SyncError::IdsExhausted)?;
        Ok(ProxyId::new(id))
    }

    /// Number of ids handed out so far.
    #[must_use]
    pub const fn allocated(&self) -> u32 {
        self.next - 1
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
