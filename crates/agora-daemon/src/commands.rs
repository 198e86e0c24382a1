//! Command implementations for the agora binary.
//!
//! Handles:
//! - start/stop: run the scheduler until a signal arrives, PID file bookkeeping
//! - persona-batch/topic-batch: one-off runs through the trigger surface
//! - throttle/status/seed: operator views and local provisioning

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tokio::signal;
use tracing::{debug, info, warn};

use agora_generator::{ApiGenerator, ApiGeneratorConfig, Generator, ScriptedGenerator};
use agora_pipeline::{
    authorize_bearer, PersonaBatchRequest, Pipeline, ThrottleGate, TopicBatchMode,
    TopicBatchRequest, Trigger, TriggerOutcome,
};
use agora_scheduler::jobs::{create_persona_job, create_topic_job, PersonaJobConfig, TopicJobConfig};
use agora_scheduler::{SchedulerConfig, SchedulerService};
use agora_storage::{RocksStore, Store, THROTTLE_SETTING_KEY};
use agora_types::Settings;

use crate::cli::{GlobalArgs, TriggerArgs};
use crate::seed::SeedFile;

fn pid_file_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| {
            #[cfg(unix)]
            {
                dirs.runtime_dir()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| dirs.cache_dir().to_path_buf())
            }
            #[cfg(not(unix))]
            {
                dirs.cache_dir().to_path_buf()
            }
        })
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("agora")
        .join("daemon.pid")
}

fn write_pid_file() -> Result<()> {
    let pid_path = pid_file_path();
    if let Some(parent) = pid_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&pid_path, std::process::id().to_string())?;
    info!(path = ?pid_path, "Wrote PID file");
    Ok(())
}

fn remove_pid_file() {
    let pid_path = pid_file_path();
    if pid_path.exists() {
        if let Err(e) = fs::remove_file(&pid_path) {
            warn!(error = %e, "Failed to remove PID file");
        }
    }
}

fn read_pid_file() -> Option<u32> {
    fs::read_to_string(pid_file_path())
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    // signal 0 only checks that the process exists
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    true
}

/// Load settings and apply CLI overrides (highest precedence).
fn load_settings(global: &GlobalArgs) -> Result<Settings> {
    let mut settings =
        Settings::load(global.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db_path) = &global.db_path {
        settings.db_path = db_path.clone();
    }
    if let Some(log_level) = &global.log_level {
        settings.log_level = log_level.clone();
    }
    Ok(settings)
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        debug!("Tracing subscriber already installed");
    }
    Ok(())
}

/// Load settings, install logging and open the store.
fn bootstrap(global: &GlobalArgs) -> Result<(Settings, Arc<RocksStore>)> {
    let settings = load_settings(global)?;
    init_logging(&settings.log_level)?;

    let db_path = settings.expanded_db_path();
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let store = RocksStore::open(&db_path).context("Failed to open storage")?;
    Ok((settings, Arc::new(store)))
}

/// Generator selected by `generator.provider`.
pub(crate) fn build_generator(settings: &Settings) -> Result<Arc<dyn Generator>> {
    if settings.generator.provider == "scripted" {
        info!("Using scripted generator");
        return Ok(Arc::new(ScriptedGenerator::new()));
    }
    let config = ApiGeneratorConfig::from_settings(&settings.generator);
    let generator = ApiGenerator::new(config).context("Failed to build generator")?;
    Ok(Arc::new(generator))
}

fn build_pipeline(settings: &Settings, store: Arc<RocksStore>) -> Result<Pipeline> {
    let generator = build_generator(settings)?;
    if !generator.has_credential() {
        warn!(
            provider = %settings.generator.provider,
            "Generation credential missing, batches will be refused"
        );
    }
    Ok(Pipeline::new(
        store.clone(),
        store,
        generator,
        settings.pipeline.clone(),
    ))
}

fn trigger_for(settings: &Settings, args: &TriggerArgs) -> Trigger {
    if args.scheduled {
        Trigger::scheduled(authorize_bearer(
            settings.schedule.cron_secret.as_deref(),
            args.bearer.as_deref(),
        ))
    } else {
        Trigger::manual()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

/// Run the scheduler until SIGINT/SIGTERM.
pub async fn start_daemon(global: &GlobalArgs, foreground: bool) -> Result<()> {
    let (settings, store) = bootstrap(global)?;

    info!("Agora daemon starting...");
    info!("  Database path: {}", settings.db_path);
    info!("  Generator: {} ({})", settings.generator.provider, settings.generator.model);
    info!("  Timezone: {}", settings.schedule.timezone);

    if !foreground {
        warn!("Background mode not implemented, running in foreground");
        warn!("Use a process manager (systemd, launchd) for background operation");
    }

    let pipeline = build_pipeline(&settings, store.clone())?;
    let mut scheduler = SchedulerService::new(SchedulerConfig::from(&settings.schedule))
        .await
        .context("Failed to create scheduler")?;

    create_persona_job(
        &scheduler,
        pipeline.clone(),
        store.clone() as Arc<dyn Store>,
        PersonaJobConfig::from(&settings.schedule),
    )
    .await
    .context("Failed to register persona job")?;
    create_topic_job(&scheduler, pipeline, TopicJobConfig::from(&settings.schedule))
        .await
        .context("Failed to register topic job")?;

    write_pid_file()?;
    scheduler.start().await.context("Failed to start scheduler")?;

    shutdown_signal().await;

    let result = scheduler.shutdown().await;
    remove_pid_file();
    result.context("Scheduler shutdown failed")
}

/// Stop the running daemon by sending SIGTERM.
pub fn stop_daemon() -> Result<()> {
    let pid = read_pid_file().context("No PID file found - daemon may not be running")?;

    if !is_process_running(pid) {
        remove_pid_file();
        anyhow::bail!("Daemon not running (stale PID file removed)");
    }

    #[cfg(unix)]
    {
        unsafe {
            if libc::kill(pid as i32, libc::SIGTERM) != 0 {
                anyhow::bail!("Failed to send SIGTERM to daemon");
            }
        }
        println!("Sent SIGTERM to daemon (PID {pid})");
    }

    #[cfg(not(unix))]
    {
        anyhow::bail!("Stop command not implemented on this platform");
    }

    Ok(())
}

/// Run one persona batch, writing each event to stdout as a JSON line.
pub async fn run_persona_batch(
    global: &GlobalArgs,
    agent_id: &str,
    count: usize,
    trigger: &TriggerArgs,
) -> Result<()> {
    let (settings, store) = bootstrap(global)?;
    let pipeline = build_pipeline(&settings, store)?;

    let outcome = pipeline
        .persona_batch(
            trigger_for(&settings, trigger),
            PersonaBatchRequest::new(agent_id, count),
        )
        .await?;

    let mut run = match outcome {
        TriggerOutcome::Completed(run) => run,
        TriggerOutcome::Throttled => {
            println!("{}", json!({"success": false, "throttled": true}));
            return Ok(());
        }
    };

    let mut stdout = std::io::stdout().lock();
    while let Some(event) = run.events.recv().await {
        writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
        stdout.flush()?;
    }
    drop(stdout);

    run.join().await?;
    Ok(())
}

/// Run one topic batch and print its summary as JSON.
pub async fn run_topic_batch(
    global: &GlobalArgs,
    count: Option<usize>,
    lightweight: bool,
    trigger: &TriggerArgs,
) -> Result<()> {
    let (settings, store) = bootstrap(global)?;
    let pipeline = build_pipeline(&settings, store)?;

    let request = TopicBatchRequest {
        count,
        mode: if lightweight {
            TopicBatchMode::Lightweight
        } else {
            TopicBatchMode::Direct
        },
    };

    match pipeline
        .topic_batch(trigger_for(&settings, trigger), request)
        .await
    {
        Ok(TriggerOutcome::Completed(summary)) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Ok(TriggerOutcome::Throttled) => {
            println!("{}", json!({"success": false, "throttled": true}));
            Ok(())
        }
        Err(e) => {
            println!("{}", json!({"success": false, "error": e.to_string()}));
            Err(e.into())
        }
    }
}

/// Print the throttle setting scheduled runs will see.
pub async fn show_throttle(global: &GlobalArgs) -> Result<()> {
    let (_, store) = bootstrap(global)?;
    let throttle = ThrottleGate::new(store).current_setting().await;
    println!("{THROTTLE_SETTING_KEY} = {throttle}");
    Ok(())
}

/// Provision agents, topic briefs and the throttle from a seed file.
pub fn seed_store(global: &GlobalArgs, file: &Path) -> Result<()> {
    let (_, store) = bootstrap(global)?;
    let raw = fs::read_to_string(file)
        .with_context(|| format!("Failed to read seed file {}", file.display()))?;
    let seed = SeedFile::parse(&raw).context("Invalid seed file")?;

    for agent in seed.agents() {
        store.put_agent(&agent)?;
    }
    for brief in seed.topic_briefs() {
        store.put_topic_brief(&brief)?;
    }
    if let Some(throttle) = seed.throttle {
        anyhow::ensure!(throttle <= 100, "throttle must be within 0..=100");
        store.put_setting(THROTTLE_SETTING_KEY, &throttle.to_string())?;
    }

    println!(
        "Seeded {} agents and {} topic briefs",
        seed.agents.len(),
        seed.topics.len()
    );
    Ok(())
}

/// Show daemon state and record counts.
pub async fn show_status(global: &GlobalArgs) -> Result<()> {
    match read_pid_file() {
        Some(pid) if is_process_running(pid) => println!("Agora daemon is running (PID {pid})"),
        Some(pid) => println!("Agora daemon is NOT running (stale PID {pid})"),
        None => println!("Agora daemon is NOT running"),
    }

    let (_, store) = match bootstrap(global) {
        Ok(opened) => opened,
        Err(e) => {
            println!("Store unavailable: {e:#}");
            return Ok(());
        }
    };
    let stats = store.stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    let throttle = ThrottleGate::new(store).current_setting().await;
    println!("{THROTTLE_SETTING_KEY} = {throttle}");
    Ok(())
}
