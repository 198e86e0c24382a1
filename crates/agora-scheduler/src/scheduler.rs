//! Scheduler service wrapper around tokio-cron-scheduler.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono_tz::Tz;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    JitterConfig, JobOutput, JobRegistry, JobResult, OverlapGuard, SchedulerConfig,
    SchedulerError, TimeoutConfig,
};

/// Check a 6-field cron expression (sec min hour day-of-month month day-of-week).
///
/// ```
/// use agora_scheduler::validate_cron_expression;
///
/// assert!(validate_cron_expression("0 */20 * * * *").is_ok());
/// assert!(validate_cron_expression("every now and then").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    Job::new_async(expr, |_uuid, _lock| Box::pin(async {}))
        .map(|_| ())
        .map_err(|e| SchedulerError::InvalidCron(format!("'{expr}': {e}")))
}

/// Owns the cron scheduler, the job registry and the shutdown token.
pub struct SchedulerService {
    scheduler: JobScheduler,
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
    shutdown_token: CancellationToken,
    is_running: AtomicBool,
}

impl SchedulerService {
    /// Create a stopped scheduler. Fails on an unknown default timezone.
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.parse_timezone()?;
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            config,
            registry: Arc::new(JobRegistry::new()),
            shutdown_token: CancellationToken::new(),
            is_running: AtomicBool::new(false),
        })
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.scheduler.start().await?;
        info!(jobs = self.registry.job_count(), "Scheduler started");
        Ok(())
    }

    /// Cancel running jobs, wait for them up to the grace period, then stop.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!("Initiating scheduler shutdown");
        self.shutdown_token.cancel();

        let grace = Duration::from_secs(self.config.shutdown_timeout_secs);
        let waited = Instant::now();
        while self.any_job_running() && waited.elapsed() < grace {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if self.any_job_running() {
            warn!("Jobs still running after shutdown grace period");
        }

        if let Err(e) = self.scheduler.shutdown().await {
            warn!(error = %e, "Error during scheduler shutdown");
        }
        self.is_running.store(false, Ordering::SeqCst);
        info!("Scheduler shutdown complete");
        Ok(())
    }

    fn any_job_running(&self) -> bool {
        self.registry.get_all_status().iter().any(|s| s.is_running)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        self.registry.clone()
    }

    pub fn parse_timezone(tz_str: &str) -> Result<Tz, SchedulerError> {
        tz_str
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone(tz_str.to_string()))
    }

    /// Add a bare timezone-aware cron job. The job receives the shutdown token.
    pub async fn add_cron_job<F, Fut>(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Option<&str>,
        job_fn: F,
    ) -> Result<uuid::Uuid, SchedulerError>
    where
        F: Fn(CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let tz = match timezone {
            Some(tz_str) => Self::parse_timezone(tz_str)?,
            None => self.config.parse_timezone()?,
        };
        validate_cron_expression(cron_expr)?;

        let token = self.shutdown_token.clone();
        let job = Job::new_async_tz(cron_expr, tz, move |_uuid, _lock| {
            let token = token.clone();
            let job_fn = job_fn.clone();
            Box::pin(async move { job_fn(token).await })
        })
        .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;

        let uuid = self.scheduler.add(job).await?;
        info!(job = name, %uuid, cron = cron_expr, timezone = %tz.name(), "Job registered");
        Ok(uuid)
    }

    /// Register a job that reports metadata (or a skip) back to the registry.
    ///
    /// A tick is skipped while the previous run is still in flight. Otherwise
    /// it sleeps the jitter, then runs the job under the timeout. Shutdown
    /// cancels both the jitter sleep and the run.
    pub async fn register_job<F, Fut>(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Option<&str>,
        jitter: JitterConfig,
        timeout: TimeoutConfig,
        job_fn: F,
    ) -> Result<uuid::Uuid, SchedulerError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<JobOutput, String>> + Send + 'static,
    {
        validate_cron_expression(cron_expr)?;
        self.registry.register(name, cron_expr);

        let tracked = TrackedJob {
            name: name.to_string(),
            registry: self.registry.clone(),
            guard: Arc::new(OverlapGuard::new()),
            jitter,
            timeout,
        };

        self.add_cron_job(name, cron_expr, timezone, move |token| {
            let tracked = tracked.clone();
            let job_fn = job_fn.clone();
            async move { tracked.execute(token, job_fn).await }
        })
        .await
    }
}

/// Per-job state shared by every tick of one registered job.
#[derive(Clone)]
pub(crate) struct TrackedJob {
    pub(crate) name: String,
    pub(crate) registry: Arc<JobRegistry>,
    pub(crate) guard: Arc<OverlapGuard>,
    pub(crate) jitter: JitterConfig,
    pub(crate) timeout: TimeoutConfig,
}

impl TrackedJob {
    pub(crate) async fn execute<F, Fut>(&self, token: CancellationToken, job_fn: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<JobOutput, String>>,
    {
        let name = self.name.as_str();
        let Some(_run) = self.guard.try_acquire() else {
            info!(job = name, "Previous run still active, skipping tick");
            self.registry
                .record_complete(name, JobResult::Skipped("overlap".to_string()), 0);
            return;
        };

        let delay = self.jitter.generate_jitter();
        if !delay.is_zero() {
            debug!(job = name, jitter_ms = delay.as_millis() as u64, "Applying jitter delay");
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.registry.record_start(name);
        info!(job = name, "Job started");
        let started = Instant::now();

        let outcome = tokio::select! {
            _ = token.cancelled() => Err("cancelled by shutdown".to_string()),
            result = self.timeout.run(job_fn()) => result,
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                let result = match output.skipped {
                    Some(reason) => {
                        info!(job = name, reason = %reason, "Job skipped");
                        JobResult::Skipped(reason)
                    }
                    None => {
                        info!(job = name, duration_ms, "Job completed");
                        JobResult::Success
                    }
                };
                self.registry
                    .record_complete_with_metadata(name, result, duration_ms, output.metadata);
            }
            Err(e) => {
                warn!(job = name, duration_ms, error = %e, "Job failed");
                self.registry
                    .record_complete(name, JobResult::Failed(e), duration_ms);
            }
        }
    }
}
