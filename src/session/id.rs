//! Session identifier type.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one started session.
///
/// Every start gets a fresh id, so events from a session that already
/// ended can be told apart from events of its successor in the same
/// context. Displayed as `sess-XXXXXXXX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate the next unused id.
    pub fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw counter value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess-{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique() {
        let ids: HashSet<SessionId> = (0..1_000).map(|_| SessionId::next()).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn test_ids_increase() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_display_format() {
        assert_eq!(SessionId(255).to_string(), "sess-000000ff");
    }
}
