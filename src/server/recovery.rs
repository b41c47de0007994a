//! Recovery & Sync (C9, §4.9). Establishes `game_start` at boot and serves
//! `GET /sync`; also runs the background tick timer that fires `tickStart`
//! on the Event Bus (§4.1).
//!
//! Grounded on the teacher's on-disk artifact idiom (`storage::lockfile`,
//! a small serialized struct read-or-created at startup) generalized from a
//! process lock to the `{started: <unix_ts>}` recovery file, plus `main.rs`'s
//! `tokio::time::interval` background-task shape for the timer.

use std::time::Duration;

use axum::extract::State;
use axum::response::Json;
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::info;

use crate::clock::GameClock;
use crate::config::server_schema::ServerConfig;
use crate::error::ConfigError;

use super::events::Event;
use super::state::AppState;

/// Parses `game.start` (`"YYYY-MM-DD HH:MM[:SS]"`) as a UTC instant.
pub fn parse_configured_start(raw: &str) -> Result<DateTime<Utc>, ConfigError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M"))
        .map(|naive| naive.and_utc())
        .map_err(|e| ConfigError::InvalidField {
            field: "game.start".into(),
            reason: format!("expected \"YYYY-MM-DD HH:MM[:SS]\": {e}"),
        })
}

/// Establishes the authoritative `GameClock` at server startup, following the
/// config > recovery file > now precedence (§4.9), logging whether ticks
/// have already elapsed so an operator restarting mid-game isn't surprised.
pub fn bootstrap_clock(
    config: &ServerConfig,
    recovery_path: &std::path::Path,
) -> Result<GameClock, ConfigError> {
    let configured_start = config
        .game
        .start
        .as_deref()
        .map(parse_configured_start)
        .transpose()?;

    let tick_duration = Duration::from_secs_f64(config.game.tick_duration);
    let clock = GameClock::establish(configured_start, recovery_path, tick_duration)
        .map_err(|e| ConfigError::InvalidField {
            field: "game.start".into(),
            reason: format!("failed to persist recovery file: {e}"),
        })?;

    let now = Utc::now();
    if clock.game_start <= now {
        info!(
            current_tick = clock.current_tick_at(now),
            "game_start is in the past, ticks have already elapsed"
        );
    } else {
        info!(game_start = %clock.game_start, "game_start is in the future, clock starts paused");
    }

    Ok(clock)
}

/// `GET /sync` (§4.9): the tick/submitter timing block clients sleep against
/// before their first local tick.
pub async fn sync_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let now = Utc::now();
    let clock = state.clock();
    let tick = clock.sync_block(now);
    let submitter = state.submitter_mode.sync_block(&clock, now);
    Json(serde_json::json!({ "tick": tick, "submitter": submitter }))
}

/// Background timer (§4.1): sleeps until each `next_tick_start`, advances
/// nothing explicitly (the clock is always derived from wall-clock), and
/// broadcasts `tickStart`. No catch-up: a suspended process simply emits the
/// tick it wakes up in.
pub async fn run_tick_timer(state: AppState) {
    loop {
        let now = Utc::now();
        let clock = state.clock();
        let next_start = clock.next_tick_start_at(now);
        let sleep_for = (next_start - now).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(sleep_for).await;

        let tick = state.clock().current_tick();
        info!(tick, "tick boundary");
        let _ = state.events.send(Event::TickStart { tick });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_date_with_seconds() {
        let dt = parse_configured_start("2026-07-26 09:00:00").unwrap();
        assert_eq!(dt.to_string(), "2026-07-26 09:00:00 UTC");
    }

    #[test]
    fn parses_date_without_seconds() {
        let dt = parse_configured_start("2026-07-26 09:00").unwrap();
        assert_eq!(dt.to_string(), "2026-07-26 09:00:00 UTC");
    }

    #[test]
    fn rejects_malformed_date() {
        assert!(parse_configured_start("not-a-date").is_err());
    }
}
