//! Local command socket (§6): a plain-text TCP protocol used by the `fire`
//! CLI subcommand to request immediate execution of named exploits,
//! bypassing their configured `delay`.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::definitions::DefinitionCache;

use super::fallback::FallbackStore;
use super::http_client::ServerClient;
use super::session::{run_session, SessionContext};

pub async fn run_command_socket(
    host: String,
    port: u16,
    definitions: Arc<DefinitionCache>,
    ctx: Arc<SessionContext>,
    _client: Arc<ServerClient>,
    _fallback: Arc<FallbackStore>,
    own_team_id: Option<u32>,
    teams_dir_path: std::path::PathBuf,
) -> std::io::Result<()> {
    let listener = TcpListener::bind((host.as_str(), port)).await?;
    info!(host, port, "local command socket listening");

    loop {
        let (socket, _addr) = listener.accept().await?;
        let definitions = definitions.clone();
        let ctx = ctx.clone();
        let teams_dir_path = teams_dir_path.clone();
        tokio::spawn(async move {
            if let Err(e) =
                handle_connection(socket, definitions, ctx, own_team_id, teams_dir_path).await
            {
                warn!(error = %e, "command socket connection error");
            }
        });
    }
}

async fn handle_connection(
    socket: tokio::net::TcpStream,
    definitions: Arc<DefinitionCache>,
    ctx: Arc<SessionContext>,
    own_team_id: Option<u32>,
    teams_dir_path: std::path::PathBuf,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "exit" {
            break;
        }
        if let Some(names) = line.strip_prefix("fire ") {
            let requested: Vec<&str> = names.split_whitespace().collect();
            let all = definitions.refresh();
            let matching: Vec<_> = all
                .into_iter()
                .filter(|d| requested.contains(&d.name.as_str()))
                .collect();
            let started = matching.len();
            for mut definition in matching {
                definition.delay = 0.0;
                let ctx = ctx.clone();
                let teams_dir_path = teams_dir_path.clone();
                tokio::spawn(async move {
                    run_session(ctx, definition, own_team_id, &teams_dir_path).await;
                });
            }
            write_half
                .write_all(format!("Started {started} exploits.\n").as_bytes())
                .await?;
        } else {
            write_half.write_all(b"Unknown command?\n").await?;
        }
    }
    Ok(())
}
