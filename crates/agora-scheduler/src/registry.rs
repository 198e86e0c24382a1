//! Status of registered jobs.
//!
//! Updated by the job wrapper around every scheduled run and read by the
//! daemon's status command.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the last run of a job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobResult {
    Success,
    Failed(String),
    /// The tick did no work (overlap, throttle, nothing to do)
    Skipped(String),
}

/// What a job reports back to the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutput {
    pub metadata: BTreeMap<String, String>,
    /// Set when the run decided not to do any work
    pub skipped: Option<String>,
}

impl JobOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    pub fn with_generated(self, count: usize) -> Self {
        self.with_metadata("generated", count)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_name: String,
    pub cron_expr: String,
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_result: Option<JobResult>,
    pub run_count: u64,
    pub error_count: u64,
    pub skip_count: u64,
    pub is_running: bool,
    #[serde(default)]
    pub last_run_metadata: BTreeMap<String, String>,
}

impl JobStatus {
    fn new(job_name: &str, cron_expr: &str) -> Self {
        Self {
            job_name: job_name.to_string(),
            cron_expr: cron_expr.to_string(),
            last_run: None,
            last_duration_ms: None,
            last_result: None,
            run_count: 0,
            error_count: 0,
            skip_count: 0,
            is_running: false,
            last_run_metadata: BTreeMap::new(),
        }
    }
}

/// Thread-safe map of job name to status.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<BTreeMap<String, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job, replacing any previous entry of the same name.
    pub fn register(&self, job_name: &str, cron_expr: &str) {
        self.jobs
            .write()
            .unwrap()
            .insert(job_name.to_string(), JobStatus::new(job_name, cron_expr));
    }

    pub fn record_start(&self, job_name: &str) {
        if let Some(status) = self.jobs.write().unwrap().get_mut(job_name) {
            status.is_running = true;
        }
    }

    pub fn record_complete(&self, job_name: &str, result: JobResult, duration_ms: u64) {
        self.record_complete_with_metadata(job_name, result, duration_ms, BTreeMap::new());
    }

    pub fn record_complete_with_metadata(
        &self,
        job_name: &str,
        result: JobResult,
        duration_ms: u64,
        metadata: BTreeMap<String, String>,
    ) {
        let mut jobs = self.jobs.write().unwrap();
        let Some(status) = jobs.get_mut(job_name) else {
            return;
        };
        status.is_running = false;
        status.last_run = Some(Utc::now());
        status.last_duration_ms = Some(duration_ms);
        status.run_count += 1;
        match &result {
            JobResult::Failed(_) => status.error_count += 1,
            JobResult::Skipped(_) => status.skip_count += 1,
            JobResult::Success => {}
        }
        status.last_result = Some(result);
        status.last_run_metadata = metadata;
    }

    pub fn get_status(&self, job_name: &str) -> Option<JobStatus> {
        self.jobs.read().unwrap().get(job_name).cloned()
    }

    /// All jobs, ordered by name.
    pub fn get_all_status(&self) -> Vec<JobStatus> {
        self.jobs.read().unwrap().values().cloned().collect()
    }

    pub fn is_running(&self, job_name: &str) -> bool {
        self.get_status(job_name).is_some_and(|s| s.is_running)
    }

    pub fn job_count(&self) -> usize {
        self.jobs.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_lifecycle() {
        let registry = JobRegistry::new();
        registry.register("persona_batch", "0 */20 * * * *");
        registry.record_start("persona_batch");
        assert!(registry.is_running("persona_batch"));

        let output = JobOutput::new().with_generated(3).with_metadata("agent", "nova");
        registry.record_complete_with_metadata(
            "persona_batch",
            JobResult::Success,
            1200,
            output.metadata,
        );

        let status = registry.get_status("persona_batch").unwrap();
        assert!(!status.is_running);
        assert_eq!(status.run_count, 1);
        assert_eq!(status.last_duration_ms, Some(1200));
        assert_eq!(status.last_run_metadata["generated"], "3");
        assert_eq!(status.last_run_metadata["agent"], "nova");
    }

    #[test]
    fn test_failures_and_skips_are_counted_separately() {
        let registry = JobRegistry::new();
        registry.register("topic_batch", "0 0 */2 * * *");
        registry.record_complete("topic_batch", JobResult::Failed("no topics".into()), 5);
        registry.record_complete("topic_batch", JobResult::Skipped("throttled".into()), 0);
        registry.record_complete("topic_batch", JobResult::Success, 900);

        let status = registry.get_status("topic_batch").unwrap();
        assert_eq!(status.run_count, 3);
        assert_eq!(status.error_count, 1);
        assert_eq!(status.skip_count, 1);
        assert_eq!(status.last_result, Some(JobResult::Success));
    }

    #[test]
    fn test_unknown_job_is_ignored() {
        let registry = JobRegistry::new();
        assert!(!registry.is_running("nope"));
        assert!(registry.get_status("nope").is_none());
        registry.record_complete("nope", JobResult::Success, 1);
        assert_eq!(registry.job_count(), 0);
    }

    #[test]
    fn test_status_sorted_by_name() {
        let registry = JobRegistry::new();
        registry.register("topic_batch", "0 0 * * * *");
        registry.register("persona_batch", "0 0 * * * *");
        let names: Vec<_> = registry
            .get_all_status()
            .into_iter()
            .map(|s| s.job_name)
            .collect();
        assert_eq!(names, vec!["persona_batch", "topic_batch"]);
    }
}
