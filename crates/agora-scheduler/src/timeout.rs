//! Upper bound on a single scheduled run.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Seconds before a run is abandoned (0 disables the timeout).
    pub timeout_secs: u64,
}

impl TimeoutConfig {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn duration(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Await `job`, failing with a message if it outlives the timeout.
    pub async fn run<F, T>(&self, job: F) -> Result<T, String>
    where
        F: Future<Output = Result<T, String>>,
    {
        match self.duration() {
            Some(limit) => tokio::time::timeout(limit, job)
                .await
                .unwrap_or_else(|_| Err(format!("timed out after {}s", self.timeout_secs))),
            None => job.await,
        }
    }
}
