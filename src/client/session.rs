//! Exploit Session (C3, §4.3) — the hardest algorithm in the system.
//!
//! Grounded on the teacher's `main.rs` supervisor shape (spawn workers, race
//! them against a deadline) and the `echo-session-ws-gateway` example's
//! task-abort-on-deadline pattern, combined with the out-of-process
//! invocation contract resolved in SPEC_FULL.md §4.3.1/§9 (exploit bodies are
//! always child processes, never forcibly killed on timeout).

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::config::client_schema::ExploitDefinitionSpec;
use crate::error::SessionError;

use super::attack_memo::AttackMemo;
use super::batching::partition;
use super::fallback::FallbackStore;
use super::http_client::ServerClient;
use super::matcher::enqueue_response;
use super::targets::expand_targets;

#[derive(Clone)]
pub struct SessionContext {
    pub client: Arc<ServerClient>,
    pub fallback: Arc<FallbackStore>,
    pub attack_memo: Arc<AttackMemo>,
    pub flag_format: Arc<Regex>,
    pub logs_dir: std::path::PathBuf,
}

/// Runs the `[ip]` shell template, or a module script, against `target`, with
/// an optional `flag_id` hint. The host process is never blocked on or
/// responsible for killing this child past its deadline (§4.3.1).
async fn invoke_exploit_body(
    definition: &ExploitDefinitionSpec,
    target: &str,
    flag_id: Option<&str>,
) -> std::io::Result<std::process::Output> {
    let mut command = if let Some(run) = &definition.run {
        let rendered: Vec<String> = shell_words_split(run)
            .into_iter()
            .map(|token| if token == "[ip]" { target.to_string() } else { token })
            .collect();
        let mut cmd = Command::new(&rendered[0]);
        cmd.args(&rendered[1..]);
        cmd
    } else if let Some(module) = &definition.module {
        let mut cmd = Command::new("python3");
        cmd.arg(format!("{module}.py")).arg(target);
        if let Some(flag_id) = flag_id {
            cmd.arg(flag_id);
        }
        cmd
    } else {
        unreachable!("validated at config load: one of module/run is always set")
    };

    command.envs(&definition.env);
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    command.kill_on_drop(false);
    command.output().await
}

fn shell_words_split(template: &str) -> Vec<String> {
    template.split_whitespace().map(str::to_string).collect()
}

async fn run_hook(hook: &str, definition: &ExploitDefinitionSpec) {
    let tokens = shell_words_split(hook);
    if tokens.is_empty() {
        return;
    }
    let mut cmd = Command::new(&tokens[0]);
    cmd.args(&tokens[1..]);
    cmd.envs(&definition.env);
    if let Err(e) = cmd.status().await {
        warn!(hook, error = %e, "exploit hook failed to run");
    }
}

/// One per-attack worker: invokes the exploit body, matches flags out of its
/// output, and logs a truncated snippet on no-match (§4.3 step 6).
async fn run_attack(
    ctx: &SessionContext,
    definition: &ExploitDefinitionSpec,
    target: &str,
    flag_id: Option<&str>,
) {
    let output = match invoke_exploit_body(definition, target, flag_id).await {
        Ok(output) => output,
        Err(e) => {
            let detail = format!("{e}");
            let err = SessionError::WorkerFailed {
                exploit: definition.name.clone(),
                target: target.to_string(),
                source: e,
            };
            error!(exploit = definition.name, target, error = %err, "exploit failed with an error");
            log_to_file(ctx, &definition.name, target, &detail).await;
            return;
        }
    };

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let matched = enqueue_response(
        &ctx.client,
        &ctx.fallback,
        &ctx.flag_format,
        &definition.name,
        target,
        &text,
    )
    .await;

    if matched == 0 {
        let snippet: String = text.chars().take(50).collect();
        warn!(exploit = definition.name, target, "no flags matched, output: {snippet}");
        log_to_file(ctx, &definition.name, target, &text).await;
    } else if let Some(flag_id) = flag_id {
        let attack = crate::model::Attack {
            host: target.to_string(),
            flag_id: flag_id.to_string(),
        };
        if let Err(e) = ctx.attack_memo.record(&attack) {
            warn!(error = %e, "failed to update attack memo");
        }
    }
}

async fn log_to_file(ctx: &SessionContext, exploit: &str, target: &str, body: &str) {
    let now = chrono::Utc::now();
    let filename = format!(
        "{}_{}_{}.txt",
        exploit,
        target.replace([':', '.'], "_"),
        now.format("%H_%M_%S")
    );
    let path = ctx.logs_dir.join(filename);
    if let Some(parent) = path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }
    let _ = tokio::fs::write(path, body).await;
}

/// Runs one batch (or the whole attack list, if unbatched) of workers with a
/// shared wall-clock deadline (§4.3 step 5).
async fn run_batch(
    ctx: &SessionContext,
    definition: &ExploitDefinitionSpec,
    attacks: &[(String, Option<String>)],
) {
    let deadline = Duration::from_secs(definition.timeout);
    let mut set = tokio::task::JoinSet::new();
    for (target, flag_id) in attacks.iter().cloned() {
        let ctx = ctx.clone();
        let definition = definition.clone();
        set.spawn(async move {
            run_attack(&ctx, &definition, &target, flag_id.as_deref()).await;
            target
        });
    }

    let mut remaining: std::collections::HashSet<String> =
        attacks.iter().map(|(t, _)| t.clone()).collect();

    let deadline_fut = tokio::time::sleep(deadline);
    tokio::pin!(deadline_fut);

    loop {
        tokio::select! {
            next = set.join_next() => {
                match next {
                    Some(Ok(target)) => { remaining.remove(&target); }
                    Some(Err(_)) => {}
                    None => break,
                }
            }
            () = &mut deadline_fut => {
                for target in &remaining {
                    let err = SessionError::Timeout {
                        exploit: definition.name.clone(),
                        target: target.clone(),
                        timeout: definition.timeout,
                    };
                    warn!(error = %err, "exploit exceeded its configured timeout");
                }
                // Abandon, not kill: detach the JoinSet so stragglers may
                // still finish in the background (§4.3 step 5).
                break;
            }
        }
    }
}

/// Runs one full Exploit Session for `definition` (§4.3 steps 1-8).
pub async fn run_session(
    ctx: Arc<SessionContext>,
    definition: ExploitDefinitionSpec,
    own_team_id: Option<u32>,
    teams_dir_path: &std::path::Path,
) {
    let targets = if definition.targets == ["auto"] {
        super::targets::TeamsDirectory::load(teams_dir_path)
            .map(|dir| dir.auto_targets(own_team_id.unwrap_or(0)))
            .unwrap_or_default()
    } else {
        expand_targets(&definition.targets)
    };

    if targets.is_empty() {
        info!(exploit = definition.name, "empty target list, session is a no-op");
        return;
    }

    if definition.delay > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(definition.delay)).await;
    }

    if let Some(prepare) = &definition.prepare {
        run_hook(prepare, &definition).await;
    }

    let attacks: Vec<(String, Option<String>)> = targets.into_iter().map(|t| (t, None)).collect();

    match &definition.batches {
        Some(spec) => {
            let batches = partition(&attacks, spec);
            for (i, batch) in batches.iter().enumerate() {
                run_batch(&ctx, &definition, batch).await;
                if i + 1 < batches.len() && spec.wait > 0.0 {
                    tokio::time::sleep(Duration::from_secs_f64(spec.wait)).await;
                }
            }
        }
        None => run_batch(&ctx, &definition, &attacks).await,
    }

    if let Some(cleanup) = &definition.cleanup {
        run_hook(cleanup, &definition).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_words_split_handles_ip_placeholder() {
        let tokens = shell_words_split("python3 exploit.py [ip] --fast");
        assert_eq!(tokens, vec!["python3", "exploit.py", "[ip]", "--fast"]);
    }
}
