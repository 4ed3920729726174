//! Dirty tracking for replicated objects.

use std::collections::BTreeSet;

use mirage_core::ProxyId;

/// Objects modified since the last flush.
///
/// Ids are never reused, so the id space only grows; the set holds the
/// dirty ids alone and its cost follows the dirty count, not the largest id.
///
/// ## Performance
///
/// - Mark / unmark / contains: O(log dirty)
/// - Clear all: O(dirty)
/// - Iterate: O(dirty), ascending
#[derive(Debug, Default)]
pub struct DirtySet {
    ids: BTreeSet<ProxyId>,
}

impl DirtySet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` dirty.
    #[inline]
    pub fn mark(&mut self, id: ProxyId) {
        self.ids.insert(id);
    }

    /// Clears `id` without touching the others.
    #[inline]
    pub fn unmark(&mut self, id: ProxyId) {
        self.ids.remove(&id);
    }

    /// Checks whether `id` is dirty.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: ProxyId) -> bool {
        self.ids.contains(&id)
    }

    /// Number of dirty ids.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if nothing is dirty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Forgets every dirty id.
    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Iterates dirty ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ProxyId> + '_ {
        self.ids.iter().copied()
    }
}
