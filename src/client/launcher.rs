//! Exploit Launcher (C2, §4.2).

use std::sync::Arc;

use tracing::warn;

use crate::config::definitions::DefinitionCache;

use super::fallback::{drain_once, FallbackStore};
use super::http_client::ServerClient;
use super::session::{run_session, SessionContext};

/// Runs on every client-side tick boundary: snapshots the exploit
/// definitions, starts one Exploit Session per definition, and drains the
/// Fallback Store once. Returns immediately — the spawned sessions are not
/// awaited here, since "the next tick must not wait" (§4.2).
pub fn launch_tick(
    definitions: Arc<DefinitionCache>,
    ctx: Arc<SessionContext>,
    client: Arc<ServerClient>,
    fallback: Arc<FallbackStore>,
    player: String,
    own_team_id: Option<u32>,
    teams_dir_path: std::path::PathBuf,
) {
    let defs = definitions.refresh();
    if defs.is_empty() {
        warn!("no exploit definitions available, tick is a no-op");
    }

    for definition in defs {
        let ctx = ctx.clone();
        let teams_dir_path = teams_dir_path.clone();
        tokio::spawn(async move {
            run_session(ctx, definition, own_team_id, &teams_dir_path).await;
        });
    }

    tokio::spawn(async move {
        match drain_once(&fallback, &client, &player).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "drained fallback flags"),
            Err(e) => tracing::warn!(error = %e, "fallback drain errored"),
        }
    });
}
