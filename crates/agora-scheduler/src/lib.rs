//! Cron scheduling for agora pipeline runs.
//!
//! Wraps `tokio-cron-scheduler` with timezone-aware jobs, a status registry,
//! an overlap guard, start jitter, a per-run timeout and graceful shutdown via
//! `CancellationToken`.
//!
//! # Example
//!
//! ```ignore
//! use agora_scheduler::{SchedulerService, SchedulerConfig, jobs};
//!
//! let scheduler = SchedulerService::new(SchedulerConfig::from(&settings.schedule)).await?;
//! jobs::create_persona_job(&scheduler, pipeline.clone(), store.clone(), persona_config).await?;
//! jobs::create_topic_job(&scheduler, pipeline, topic_config).await?;
//! scheduler.start().await?;
//! ```

mod config;
mod error;
mod jitter;
mod overlap;
mod registry;
mod scheduler;
mod timeout;

pub mod jobs;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use jitter::JitterConfig;
pub use overlap::{OverlapGuard, RunGuard};
pub use registry::{JobOutput, JobRegistry, JobResult, JobStatus};
pub use scheduler::{validate_cron_expression, SchedulerService};
pub use timeout::TimeoutConfig;
