//! `fast-client`: runs the local tick engine (§4.1-§4.5) and the `fire` /
//! `submit` / `reset` CLI subcommands (§6).
//!
//! Grounded on the teacher's `main.rs` supervisor shape, generalized from a
//! drilling-pipeline's HTTP+ingestion+processor trio to the client's
//! tick-loop + local command socket pair.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use fast::client::attack_memo::AttackMemo;
use fast::client::command_socket::run_command_socket;
use fast::client::fallback::FallbackStore;
use fast::client::http_client::ServerClient;
use fast::client::launcher::launch_tick;
use fast::client::session::SessionContext;
use fast::config::{self, client_schema::Protocol, definitions::DefinitionCache};

#[derive(Parser, Debug)]
#[command(name = "fast-client")]
#[command(about = "Flag Acquisition and Submission Tool client")]
struct CliArgs {
    /// Path to the client configuration YAML (§6).
    #[arg(long, default_value = "fast.yaml", env = "FAST_CLIENT_CONFIG")]
    config: std::path::PathBuf,

    /// This team's numeric id, used to derive `auto` exploit targets (§9).
    /// Not part of `fast.yaml`: the server is the only party that needs to
    /// validate team identity, so this stays a deploy-time argument.
    #[arg(long, env = "FAST_TEAM_ID")]
    team_id: Option<u32>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connects to the local listener socket and fires named exploits now.
    Fire { names: Vec<String> },
    /// Asks the server to trigger a submission round immediately.
    Submit,
    /// Clears local client artifacts (fallback store, attack memo).
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Clone, Copy)]
enum TaskName {
    TickEngine,
    CommandSocket,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TickEngine => write!(f, "TickEngine"),
            Self::CommandSocket => write!(f, "CommandSocket"),
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

    let config = config::load_client_config(&args.config).unwrap_or_else(|e| {
        error!(error = %e, "configuration error, refusing to start");
        std::process::exit(1);
    });

    match &args.command {
        Some(Command::Fire { names }) => return fire(&config, names).await,
        Some(Command::Submit) => return submit(&config).await,
        Some(Command::Reset { yes }) => return reset(*yes).await,
        None => {}
    }

    run_engine(args.config, config, args.team_id).await
}

fn base_url(connect: &fast::config::client_schema::ConnectConfig) -> String {
    let scheme = match connect.protocol {
        Protocol::Http => "http",
        Protocol::Https => "https",
    };
    format!("{scheme}://{}:{}", connect.host, connect.port)
}

async fn fire(config: &fast::config::client_schema::ClientConfig, names: &[String]) -> Result<()> {
    let addr = (config.listener.host.as_str(), config.listener.port);
    let mut socket = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to local listener at {:?}", addr))?;
    socket
        .write_all(format!("fire {}\n", names.join(" ")).as_bytes())
        .await?;
    let mut response = String::new();
    BufReader::new(socket).read_line(&mut response).await?;
    print!("{response}");
    Ok(())
}

async fn submit(config: &fast::config::client_schema::ClientConfig) -> Result<()> {
    let client = ServerClient::new(
        base_url(&config.connect),
        config.connect.player.clone(),
        config.connect.password.clone(),
    );
    client.trigger_submit().await?;
    info!("submission triggered");
    Ok(())
}

async fn reset(yes: bool) -> Result<()> {
    if !yes {
        print!("This clears the local fallback store and attack memo. Continue? [y/N] ");
        use std::io::Write;
        std::io::stdout().flush().ok();
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            info!("reset cancelled");
            return Ok(());
        }
    }
    for path in [".fast/fallback.db", ".fast/attack_memo.db"] {
        if std::path::Path::new(path).exists() {
            std::fs::remove_dir_all(path).with_context(|| format!("failed to remove {path}"))?;
        }
    }
    info!("local client state cleared");
    Ok(())
}

async fn run_engine(
    config_path: std::path::PathBuf,
    config: fast::config::client_schema::ClientConfig,
    team_id: Option<u32>,
) -> Result<()> {
    let client = Arc::new(ServerClient::new(
        base_url(&config.connect),
        config.connect.player.clone(),
        config.connect.password.clone(),
    ));
    let fallback = Arc::new(FallbackStore::open(std::path::Path::new(".fast/fallback.db"))?);
    let attack_memo = Arc::new(AttackMemo::open(std::path::Path::new(".fast/attack_memo.db"))?);
    let flag_format = Arc::new(Regex::new(&config.config.flag_format)?);
    let logs_dir = std::path::PathBuf::from("logs");
    let teams_dir_path = std::path::PathBuf::from(".fast/teams.json");
    let definitions = Arc::new(DefinitionCache::new(config_path));

    let ctx = Arc::new(SessionContext {
        client: client.clone(),
        fallback: fallback.clone(),
        attack_memo,
        flag_format,
        logs_dir,
    });

    let sync = client.sync().await.context("initial sync with server failed")?;
    info!(
        tick = sync.tick.current,
        remaining = sync.tick.remaining,
        "synced with server"
    );
    tokio::time::sleep(Duration::from_secs_f64(sync.tick.remaining)).await;

    let tick_duration = Duration::from_secs_f64(sync.tick.duration);

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received SIGINT, shutting down");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    let tick_ctx = ctx.clone();
    let tick_definitions = definitions.clone();
    let tick_client = client.clone();
    let tick_fallback = fallback.clone();
    let tick_player = config.connect.player.clone();
    let tick_teams_dir = teams_dir_path.clone();
    let tick_cancel = cancel_token.clone();
    task_set.spawn(async move {
        let mut interval = tokio::time::interval(tick_duration);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    launch_tick(
                        tick_definitions.clone(),
                        tick_ctx.clone(),
                        tick_client.clone(),
                        tick_fallback.clone(),
                        tick_player.clone(),
                        team_id,
                        tick_teams_dir.clone(),
                    );
                }
                _ = tick_cancel.cancelled() => return Ok(TaskName::TickEngine),
            }
        }
    });

    let socket_cancel = cancel_token.clone();
    let listener_host = config.listener.host.clone();
    let listener_port = config.listener.port;
    let socket_definitions = definitions.clone();
    let socket_ctx = ctx.clone();
    let socket_client = client.clone();
    let socket_fallback = fallback.clone();
    let socket_teams_dir = teams_dir_path.clone();
    task_set.spawn(async move {
        tokio::select! {
            result = run_command_socket(
                listener_host,
                listener_port,
                socket_definitions,
                socket_ctx,
                socket_client,
                socket_fallback,
                team_id,
                socket_teams_dir,
            ) => {
                result.map(|()| TaskName::CommandSocket).map_err(|e| anyhow::anyhow!("command socket error: {e}"))
            }
            _ = socket_cancel.cancelled() => Ok(TaskName::CommandSocket),
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
                        warn!(error = %e, "task failed, shutting down");
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

    info!("fast-client shutdown complete");
    Ok(())
}
