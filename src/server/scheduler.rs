//! Submission Scheduler (C8, §4.8) — second hardest algorithm in the system.
//!
//! Grounded on the teacher's `fleet::uploader::run_uploader` interval-loop
//! shape (a `tokio::time::interval` background task draining a queue and
//! calling out to an external collaborator), adapted from a fixed interval
//! to FAST's dual delay/interval firing schedule, and on
//! `fleet::client::FleetClient`'s typed-error-over-child-process-call
//! pattern for invoking the user-supplied submit module (§4.8.1, §9).

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::clock::SubmitterMode;
use crate::config::server_schema::ServerConfig;
use crate::error::SubmitError;
use crate::model::FlagStatus;

use super::events::Event;
use super::state::AppState;

/// Builds the configured submitter mode from `server.yaml`'s `submitter`
/// section; `config::validation` already guarantees exactly one of
/// `delay`/`interval` is set.
pub fn submitter_mode_from_config(config: &ServerConfig) -> SubmitterMode {
    if let Some(delay) = config.submitter.delay {
        SubmitterMode::Delay(Duration::from_secs_f64(delay))
    } else {
        SubmitterMode::Interval(Duration::from_secs_f64(
            config.submitter.interval.expect("validated: one of delay/interval is set"),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitterOutput {
    #[serde(default)]
    pub(crate) accepted: HashMap<String, String>,
    #[serde(default)]
    pub(crate) rejected: HashMap<String, String>,
}

/// Invokes the external submit module as a child process (§4.8.1, §9): the
/// queued values are written as a JSON array to its stdin, it runs to
/// completion with no internal timeout, and its stdout is parsed as
/// `{accepted: {value: response}, rejected: {value: response}}`. Exposed to
/// `ingestion` so a manual `action=submit` call can run the submitter over
/// just the flags it supplied, instead of the whole queue.
pub(crate) async fn invoke_submitter(
    module: &str,
    values: &[String],
) -> Result<SubmitterOutput, SubmitError> {
    let mut child = Command::new("python3")
        .arg(format!("{module}.py"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let payload = serde_json::to_vec(values).expect("Vec<String> always serializes");
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(&payload).await?;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        return Err(SubmitError::MalformedResponse(format!(
            "submitter exited with {}",
            output.status
        )));
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|e| SubmitError::MalformedResponse(e.to_string()))
}

/// Runs one submission round (§4.8 steps 1-5), serialized against any other
/// concurrently firing round via `state.submission_guard` (§5: "submissions
/// are mutually exclusive").
pub async fn submit_now(state: &AppState) -> Result<(), SubmitError> {
    let _guard = state.submission_guard.lock().await;

    let queued = state
        .flags
        .select_by_status(FlagStatus::Queued)
        .map_err(|e| SubmitError::MalformedResponse(e.to_string()))?;

    if queued.is_empty() {
        let _ = state.events.send(Event::SubmitSkip);
        return Ok(());
    }

    let _ = state.events.send(Event::SubmitStart {
        count: queued.len(),
    });

    let values: Vec<String> = queued.iter().map(|f| f.value.clone()).collect();
    let output = invoke_submitter(&state.config.submitter.module, &values).await?;

    let accounted = output.accepted.len() + output.rejected.len();
    if accounted < values.len() {
        warn!(
            missing = values.len() - accounted,
            "submitter response omitted some queued flags; they remain queued"
        );
    }

    let mut updates = HashMap::with_capacity(accounted);
    for (value, response) in &output.accepted {
        updates.insert(value.clone(), (FlagStatus::Accepted, response.clone()));
    }
    for (value, response) in &output.rejected {
        updates.insert(value.clone(), (FlagStatus::Rejected, response.clone()));
    }

    state
        .flags
        .bulk_update_status(&updates)
        .map_err(|e| SubmitError::MalformedResponse(e.to_string()))?;

    let counts = state
        .flags
        .count_by_status()
        .map_err(|e| SubmitError::MalformedResponse(e.to_string()))?;

    let _ = state.events.send(Event::SubmitComplete {
        accepted: *counts.get(&FlagStatus::Accepted).unwrap_or(&0),
        rejected: *counts.get(&FlagStatus::Rejected).unwrap_or(&0),
        queued: *counts.get(&FlagStatus::Queued).unwrap_or(&0),
    });
    let _ = state.events.send(Event::AnalyticsUpdate);

    info!(
        accepted = output.accepted.len(),
        rejected = output.rejected.len(),
        "submission round complete"
    );
    Ok(())
}

/// Background task: fires `submit_now` at each scheduled moment (§4.8) and
/// logs, but never propagates, any `SubmitError` (§7 UpstreamFailure — the
/// tick is left as-is, the next tick proceeds).
pub async fn run_submission_scheduler(state: AppState) {
    loop {
        let now = chrono::Utc::now();
        let clock = state.clock();
        let sleep_for = next_fire_delay(&clock, &state.submitter_mode, now);
        tokio::time::sleep(sleep_for).await;

        if let Err(e) = submit_now(&state).await {
            error!(error = %e, "submission round failed, statuses left unchanged for this tick");
        }
    }
}

fn next_fire_delay(
    clock: &crate::clock::GameClock,
    mode: &SubmitterMode,
    now: chrono::DateTime<chrono::Utc>,
) -> Duration {
    match mode {
        SubmitterMode::Delay(delay) => {
            let current = clock.current_tick_at(now);
            let tick_start = clock.tick_start(current);
            let elapsed = now - tick_start;
            let delay_duration = chrono::Duration::from_std(*delay).unwrap_or_default();
            let next_submit = if elapsed > delay_duration {
                tick_start + chrono::Duration::from_std(clock.tick_duration).unwrap_or_default()
                    + delay_duration
            } else {
                tick_start + delay_duration
            };
            (next_submit - now).to_std().unwrap_or(Duration::from_millis(1))
        }
        SubmitterMode::Interval(interval) => {
            let since_start = (now - clock.game_start).num_milliseconds().max(0) as u128;
            let interval_ms = interval.as_millis().max(1);
            let remainder = since_start % interval_ms;
            let wait_ms = if remainder == 0 { 0 } else { interval_ms - remainder };
            Duration::from_millis(wait_ms.max(1) as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::GameClock;

    fn clock_at(start: chrono::DateTime<chrono::Utc>, secs: u64) -> GameClock {
        GameClock {
            game_start: start,
            tick_duration: Duration::from_secs(secs),
        }
    }

    #[test]
    fn delay_mode_fires_before_first_delay_elapses() {
        let start = chrono::Utc::now();
        let clock = clock_at(start, 60);
        let mode = SubmitterMode::Delay(Duration::from_secs(10));
        let delay = next_fire_delay(&clock, &mode, start);
        assert!(delay <= Duration::from_secs(10));
    }

    #[test]
    fn interval_mode_anchors_to_game_start() {
        let start = chrono::Utc::now() - chrono::Duration::seconds(15);
        let clock = clock_at(start, 60);
        let mode = SubmitterMode::Interval(Duration::from_secs(20));
        let delay = next_fire_delay(&clock, &mode, chrono::Utc::now());
        assert!(delay <= Duration::from_secs(20));
    }
}
