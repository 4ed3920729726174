//! # Proxy Identifiers
//!
//! Numeric ids shared by an authoritative object and its render proxy.
//! The id is the only link between the two sides; references are always
//! resolved through a registry lookup, never held as pointers.

use std::fmt;

/// Unique identifier for a replicated object.
///
/// Ids are allocated monotonically and never reused, so a stale id can only
/// ever miss in a registry lookup, never alias a newer object.
/// `0` is reserved as [`ProxyId::NONE`], the empty reference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ProxyId(u32);

impl ProxyId {
    /// The empty reference.
    pub const NONE: Self = Self(0);

    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw id as stored in a buffer slot.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Checks if this is the empty reference.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
