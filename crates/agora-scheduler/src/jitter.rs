//! Random start delay for scheduled runs.
//!
//! Cron ticks land on round minutes; a random delay keeps batch starts from
//! looking mechanical and spreads load on the generation service.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JitterConfig {
    /// Upper bound of the delay in seconds (0 disables jitter).
    pub max_jitter_secs: u64,
}

impl JitterConfig {
    pub fn new(max_jitter_secs: u64) -> Self {
        Self { max_jitter_secs }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.max_jitter_secs > 0
    }

    /// A delay in `[0, max_jitter_secs)`, millisecond resolution.
    pub fn generate_jitter(&self) -> Duration {
        if !self.is_enabled() {
            return Duration::ZERO;
        }
        let ms = rand::thread_rng().gen_range(0..self.max_jitter_secs * 1000);
        Duration::from_millis(ms)
    }
}
