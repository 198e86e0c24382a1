//! Configuration loading for agora.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/agora/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::AgoraError;

/// Generative service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSettings {
    /// Provider name ("openai", "anthropic", "scripted")
    #[serde(default = "default_generator_provider")]
    pub provider: String,

    /// Model name (e.g., "gpt-4o-mini")
    #[serde(default = "default_generator_model")]
    pub model: String,

    /// API key (loaded from env var, not stored in config file)
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,
}

fn default_generator_provider() -> String {
    "openai".to_string()
}

fn default_generator_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_generator_timeout() -> u64 {
    60
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            provider: default_generator_provider(),
            model: default_generator_model(),
            api_key: None,
            api_base_url: None,
            timeout_secs: default_generator_timeout(),
        }
    }
}

/// Hard upper bound on persona batch cycles, whatever the configuration says.
pub const PERSONA_COUNT_LIMIT: usize = 20;

/// Batch bounds and deadlines for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Upper bound for persona batch cycles (at most `PERSONA_COUNT_LIMIT`)
    #[serde(default = "default_max_persona_count")]
    pub max_persona_count: usize,

    /// Number of agents sampled to react to each new unit
    #[serde(default = "default_reactor_sample_size")]
    pub reactor_sample_size: usize,

    /// Recent top-level units passed as conversational context
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,

    /// Internal deadline for a persona batch (0 disables it)
    #[serde(default = "default_persona_deadline")]
    pub persona_deadline_secs: u64,

    /// Internal deadline for a topic batch (0 disables it)
    #[serde(default = "default_topic_deadline")]
    pub topic_deadline_secs: u64,

    /// Internal deadline for a lightweight topic batch (0 disables it)
    #[serde(default = "default_lightweight_deadline")]
    pub lightweight_deadline_secs: u64,
}

fn default_max_persona_count() -> usize {
    20
}

fn default_reactor_sample_size() -> usize {
    5
}

fn default_recent_window() -> usize {
    10
}

fn default_persona_deadline() -> u64 {
    300
}

fn default_topic_deadline() -> u64 {
    660
}

fn default_lightweight_deadline() -> u64 {
    55
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_persona_count: default_max_persona_count(),
            reactor_sample_size: default_reactor_sample_size(),
            recent_window: default_recent_window(),
            persona_deadline_secs: default_persona_deadline(),
            topic_deadline_secs: default_topic_deadline(),
            lightweight_deadline_secs: default_lightweight_deadline(),
        }
    }
}

impl PipelineSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_persona_count == 0 || self.max_persona_count > PERSONA_COUNT_LIMIT {
            return Err(format!(
                "max_persona_count must be within 1..={PERSONA_COUNT_LIMIT}"
            ));
        }
        if self.recent_window == 0 {
            return Err("recent_window must be > 0".to_string());
        }
        Ok(())
    }
}

/// Cron schedules for automated triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// IANA timezone for cron expressions
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Persona batch schedule (6-field cron)
    #[serde(default = "default_persona_cron")]
    pub persona_cron: String,

    /// Cycles per scheduled persona batch
    #[serde(default = "default_persona_count")]
    pub persona_count: usize,

    /// Topic batch schedule (6-field cron)
    #[serde(default = "default_topic_cron")]
    pub topic_cron: String,

    /// Target units per scheduled topic batch
    #[serde(default = "default_topic_count")]
    pub topic_count: usize,

    /// Max jitter applied before a scheduled run
    #[serde(default = "default_jitter_secs")]
    pub jitter_secs: u64,

    /// Shared bearer secret presented by schedule-triggered calls
    #[serde(default)]
    pub cron_secret: Option<String>,

    /// Grace period for running jobs when the daemon stops
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_persona_cron() -> String {
    "0 */20 * * * *".to_string()
}

fn default_persona_count() -> usize {
    3
}

fn default_topic_cron() -> String {
    "0 0 */2 * * *".to_string()
}

fn default_topic_count() -> usize {
    10
}

fn default_jitter_secs() -> u64 {
    60
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            persona_cron: default_persona_cron(),
            persona_count: default_persona_count(),
            topic_cron: default_topic_cron(),
            topic_count: default_topic_count(),
            jitter_secs: default_jitter_secs(),
            cron_secret: None,
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB storage directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub generator: GeneratorSettings,

    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub schedule: ScheduleSettings,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "agora")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            generator: GeneratorSettings::default(),
            pipeline: PipelineSettings::default(),
            schedule: ScheduleSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/agora/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (AGORA_*, nested keys joined by `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, AgoraError> {
        let config_dir = ProjectDirs::from("", "", "agora")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| AgoraError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| AgoraError::Config(e.to_string()))?
            .set_default("generator.provider", default_generator_provider())
            .map_err(|e| AgoraError::Config(e.to_string()))?
            .set_default("generator.model", default_generator_model())
            .map_err(|e| AgoraError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // e.g. AGORA_DB_PATH, AGORA_GENERATOR__API_KEY, AGORA_PIPELINE__RECENT_WINDOW
        builder = builder.add_source(
            Environment::with_prefix("AGORA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| AgoraError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| AgoraError::Config(e.to_string()))?;

        settings.pipeline.validate().map_err(AgoraError::Config)?;
        Ok(settings)
    }

    /// Expand ~ in db_path to actual home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            if let Some(base) = directories::BaseDirs::new() {
                return base.home_dir().join(rest);
            }
        }
        PathBuf::from(&self.db_path)
    }
}
