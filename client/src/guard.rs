use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ClientError, Result};

/// Visual slots that can have a request in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    View,
    Detail,
    Point,
}

impl Slot {
    const COUNT: usize = 3;

    const fn index(self) -> usize {
        match self {
            Self::View => 0,
            Self::Detail => 1,
            Self::Point => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    slot: Slot,
    generation: u64,
}

/// Last request wins: each new request for a slot invalidates the tickets
/// issued before it.
#[derive(Debug, Default)]
pub struct RequestGuard {
    generations: [AtomicU64; Slot::COUNT],
}

impl RequestGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, slot: Slot) -> Ticket {
        let generation = self.generations[slot.index()]
            .fetch_add(1, Ordering::AcqRel)
            .wrapping_add(1);
        Ticket { slot, generation }
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.generations[ticket.slot.index()].load(Ordering::Acquire) == ticket.generation
    }

    /// Pass `value` through if `ticket` is still current.
    pub fn settle<T>(&self, ticket: Ticket, value: T) -> Result<T> {
        if self.is_current(ticket) {
            Ok(value)
        } else {
            tracing::debug!(slot = ?ticket.slot, "discarding stale response");
            Err(ClientError::Superseded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RequestGuard, Slot};
    use crate::error::ClientError;

    #[test]
    fn newer_request_supersedes_older() {
        let guard = RequestGuard::new();
        let first = guard.begin(Slot::View);
        let second = guard.begin(Slot::View);
        assert!(matches!(guard.settle(first, 1), Err(ClientError::Superseded)));
        assert_eq!(guard.settle(second, 2).ok(), Some(2));
    }

    #[test]
    fn slots_are_independent() {
        let guard = RequestGuard::new();
        let view = guard.begin(Slot::View);
        let _detail = guard.begin(Slot::Detail);
        assert!(guard.is_current(view));
    }
}
