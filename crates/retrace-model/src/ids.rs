//! Graph-unique identifiers
//!
//! States, actions, objects and stories of one graph draw their ids from a
//! single [`IdAllocator`], so an id is unique across all node kinds of that
//! graph. This mirrors how persisted dumps reference nodes by plain integers.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

macro_rules! graph_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Raw integer value
            #[inline]
            #[must_use]
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

graph_id!(
    /// Identifier of a [`StateNode`](crate::StateNode)
    StateId,
    "s"
);
graph_id!(
    /// Identifier of an [`ActionNode`](crate::ActionNode)
    ActionId,
    "a"
);
graph_id!(
    /// Identifier of a registered [`ObjectRef`](crate::ObjectRef)
    ObjectId,
    "o"
);
graph_id!(
    /// Identifier of a story (ordered slide sequence)
    StoryId,
    "t"
);

/// Monotonic id source shared by everything that lives in one graph
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next: Arc<AtomicU64>,
}

impl IdAllocator {
    /// Allocator starting at zero
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator whose first id is `start`
    #[inline]
    #[must_use]
    pub fn starting_at(start: u64) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(start)),
        }
    }

    /// Take the next raw id
    #[inline]
    pub fn next_raw(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Take the next id as a typed identifier
    #[inline]
    pub fn next<I: From<u64>>(&self) -> I {
        I::from(self.next_raw())
    }

    /// Make sure ids handed out from now on are strictly greater than `seen`
    ///
    /// # Errors
    /// Returns [`ModelError::IdOutOfRange`] for `u64::MAX`; the counter is
    /// left as it was
    pub fn observe(&self, seen: u64) -> Result<(), ModelError> {
        let next = seen.checked_add(1).ok_or(ModelError::IdOutOfRange(seen))?;
        self.next.fetch_max(next, Ordering::SeqCst);
        Ok(())
    }

    /// Restart numbering at zero
    pub fn reset(&self) {
        self.next.store(0, Ordering::SeqCst);
    }

    /// Id that the next call would return
    #[inline]
    #[must_use]
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ids_are_unique_across_kinds() {
        let ids = IdAllocator::new();
        let s: StateId = ids.next();
        let a: ActionId = ids.next();
        let o: ObjectId = ids.next();
        assert_eq!((s.get(), a.get(), o.get()), (0, 1, 2));
    }

    #[test]
    fn observe_moves_past_seen_ids() {
        let ids = IdAllocator::new();
        ids.observe(41).unwrap();
        assert_eq!(ids.next_raw(), 42);

        // Observing a smaller id never rewinds
        ids.observe(3).unwrap();
        assert_eq!(ids.next_raw(), 43);
    }

    #[test]
    fn observe_rejects_the_last_id() {
        let ids = IdAllocator::starting_at(7);
        assert_eq!(ids.observe(u64::MAX), Err(ModelError::IdOutOfRange(u64::MAX)));
        assert_eq!(ids.peek(), 7);
    }

    #[test]
    fn clones_share_the_counter() {
        let ids = IdAllocator::starting_at(10);
        let other = ids.clone();
        assert_eq!(ids.next_raw(), 10);
        assert_eq!(other.next_raw(), 11);
    }

    #[test]
    fn display_prefixes() {
        assert_eq!(StateId(3).to_string(), "s3");
        assert_eq!(ActionId(4).to_string(), "a4");
        assert_eq!(ObjectId(5).to_string(), "o5");
    }

    proptest! {
        #[test]
        fn prop_fresh_ids_exceed_observed(seen in prop::collection::vec(0u64..10_000, 0..50)) {
            let ids = IdAllocator::new();
            for s in &seen {
                ids.observe(*s).unwrap();
            }
            let fresh = ids.next_raw();
            prop_assert!(seen.iter().all(|s| fresh > *s));
        }
    }
}
