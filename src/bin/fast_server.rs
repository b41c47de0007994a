//! `fast-server`: the authoritative Flag Store, Submission Scheduler and
//! Event Bus for one Attack/Defense game (§6).
//!
//! Grounded on the teacher's `main.rs` supervisor shape: a `JoinSet<Result<TaskName>>`
//! racing the HTTP server, the tick timer, and the submission scheduler
//! against a shared `CancellationToken`, torn down together on SIGINT or on
//! any task's first error.

use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use fast::config;
use fast::server::scheduler::submitter_mode_from_config;
use fast::server::state::AppState;
use fast::server::{build_router, events, flagstore::FlagStore, recovery, webhooks::WebhookStore};

#[derive(Parser, Debug)]
#[command(name = "fast-server")]
#[command(about = "Flag Acquisition and Submission Tool server")]
struct CliArgs {
    /// Path to the server configuration YAML (§6).
    #[arg(long, default_value = "server.yaml", env = "FAST_SERVER_CONFIG")]
    config: std::path::PathBuf,
}

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    TickTimer,
    SubmissionScheduler,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HttpServer => write!(f, "HttpServer"),
            Self::TickTimer => write!(f, "TickTimer"),
            Self::SubmissionScheduler => write!(f, "SubmissionScheduler"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let state = match bootstrap(&args.config).await {
        Ok(state) => state,
        Err(e) => {
            // §7: ConfigError is fatal on startup, exit code 1 with the
            // offending field path.
            error!(error = %e, "configuration error, refusing to start");
            std::process::exit(1);
        }
    };

    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr, "fast-server listening");

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received SIGINT, shutting down");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    let router = build_router(state.clone());
    let http_cancel = cancel_token.clone();
    task_set.spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { http_cancel.cancelled().await })
            .await
            .map(|()| TaskName::HttpServer)
            .map_err(|e| anyhow::anyhow!("HTTP server error: {e}"))
    });

    let tick_state = state.clone();
    let tick_cancel = cancel_token.clone();
    task_set.spawn(async move {
        tokio::select! {
            _ = recovery::run_tick_timer(tick_state) => Ok(TaskName::TickTimer),
            _ = tick_cancel.cancelled() => Ok(TaskName::TickTimer),
        }
    });

    let scheduler_state = state.clone();
    let scheduler_cancel = cancel_token.clone();
    task_set.spawn(async move {
        tokio::select! {
            _ = fast::server::scheduler::run_submission_scheduler(scheduler_state) => {
                Ok(TaskName::SubmissionScheduler)
            }
            _ = scheduler_cancel.cancelled() => Ok(TaskName::SubmissionScheduler),
        }
    });

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(name))) => info!(task = %name, "task completed normally"),
                    Some(Ok(Err(e))) => {
                        error!(error = %e, "task failed, shutting down");
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "task panicked, shutting down");
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("task panicked: {e}"));
                    }
                    None => {
                        info!("supervisor: all tasks completed");
                        break;
                    }
                }
            }
        }
    }

    info!("fast-server shutdown complete");
    Ok(())
}

async fn bootstrap(config_path: &std::path::Path) -> Result<AppState, fast::error::ConfigError> {
    let config = config::load_server_config(config_path)?;
    let recovery_path = std::path::PathBuf::from(".fast/recover.json");
    let clock = recovery::bootstrap_clock(&config, &recovery_path)?;
    let submitter_mode = submitter_mode_from_config(&config);

    let flags = FlagStore::open(&std::path::Path::new(&config.database.path).join("flags"))
        .map_err(|e| fast::error::ConfigError::InvalidField {
            field: "database.path".into(),
            reason: format!("failed to open flag store: {e}"),
        })?;
    let webhooks = WebhookStore::open(&std::path::Path::new(&config.database.path).join("webhooks"))
        .map_err(|e| fast::error::ConfigError::InvalidField {
            field: "database.path".into(),
            reason: format!("failed to open webhook store: {e}"),
        })?;

    Ok(AppState {
        config: Arc::new(config),
        flags,
        webhooks,
        clock: Arc::new(ArcSwap::new(Arc::new(clock))),
        submitter_mode,
        submission_guard: Arc::new(tokio::sync::Mutex::new(())),
        events: events::new_channel(),
    })
}
