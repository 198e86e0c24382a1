//! Internal run deadline.
//!
//! Hosts may kill a run after a fixed duration. Checking an internal deadline
//! between units of work lets a batch stop early and still emit its terminal
//! record.

use std::time::Duration;

use tokio::time::Instant;

/// Point in time after which no new unit of work starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    /// Deadline `secs` from now; `None` when `secs` is 0 (disabled).
    pub fn after_secs(secs: u64) -> Option<Self> {
        (secs > 0).then(|| Self(Instant::now() + Duration::from_secs(secs)))
    }

    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }
}

/// Whether an optional deadline has passed.
pub(crate) fn expired(deadline: Option<Deadline>) -> bool {
    deadline.is_some_and(|d| d.is_expired())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_disables() {
        assert!(Deadline::after_secs(0).is_none());
        assert!(!expired(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_after_duration() {
        let deadline = Deadline::after_secs(5).unwrap();
        assert!(!deadline.is_expired());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(deadline.is_expired());
        assert!(expired(Some(deadline)));
    }
}
