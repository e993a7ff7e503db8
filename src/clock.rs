//! Per-turn deadline tracking.

use tokio::time::{Duration, Instant};

/// Deadline for the participant currently holding the turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnClock {
    limit: Duration,
    deadline: Instant,
}

impl TurnClock {
    /// Start a clock that expires `limit` from now.
    pub fn start(limit: Duration) -> Self {
        Self {
            limit,
            deadline: Instant::now() + limit,
        }
    }

    /// Restart the full limit from now.
    pub fn rearm(&mut self) {
        self.deadline = Instant::now() + self.limit;
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whole seconds left, rounded up so a live turn never reports 0.
    pub fn remaining_secs(&self) -> u64 {
        let left = self.remaining();
        left.as_secs() + u64::from(left.subsec_nanos() > 0)
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}
