//! Clock (C1). Shared tick arithmetic for both the server (authoritative)
//! and the client (mirrored via `sync`).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The persisted recovery artifact: `.fast/recover.json`, `{ started: <unix_ts> }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryFile {
    pub started: i64,
}

impl RecoveryFile {
    pub fn load(path: &std::path::Path) -> Option<Self> {
        let bytes = std::fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn save(&self, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes)
    }
}

/// Game clock: `game_start` plus a fixed `tick_duration`. `current_tick` is
/// always derived from wall-clock, never incremented by catch-up (§4.1: "no
/// catch-up; missed ticks are lost, not replayed").
#[derive(Debug, Clone, Copy)]
pub struct GameClock {
    pub game_start: DateTime<Utc>,
    pub tick_duration: Duration,
}

impl GameClock {
    /// Establishes `game_start` using the precedence config > recovery file > now
    /// (§4.9), persisting it to the recovery file when freshly chosen.
    pub fn establish(
        configured_start: Option<DateTime<Utc>>,
        recovery_path: &std::path::Path,
        tick_duration: Duration,
    ) -> std::io::Result<Self> {
        if let Some(start) = configured_start {
            RecoveryFile {
                started: start.timestamp(),
            }
            .save(recovery_path)?;
            return Ok(Self {
                game_start: start,
                tick_duration,
            });
        }

        if let Some(recovered) = RecoveryFile::load(recovery_path) {
            if let Some(start) = DateTime::<Utc>::from_timestamp(recovered.started, 0) {
                return Ok(Self {
                    game_start: start,
                    tick_duration,
                });
            }
        }

        let start = Utc::now();
        RecoveryFile {
            started: start.timestamp(),
        }
        .save(recovery_path)?;
        Ok(Self {
            game_start: start,
            tick_duration,
        })
    }

    /// `current_tick = floor((now - game_start) / tick_duration)`. Saturates
    /// at zero when `game_start` is in the future (clock starts paused).
    pub fn current_tick_at(&self, now: DateTime<Utc>) -> u64 {
        let elapsed = (now - self.game_start).num_milliseconds();
        if elapsed <= 0 {
            return 0;
        }
        let duration_ms = self.tick_duration.as_millis().max(1) as i64;
        (elapsed / duration_ms) as u64
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick_at(Utc::now())
    }

    /// Wall-clock instant at which `tick` began.
    pub fn tick_start(&self, tick: u64) -> DateTime<Utc> {
        self.game_start + chrono::Duration::from_std(self.tick_duration * tick as u32)
            .unwrap_or_default()
    }

    /// Wall-clock instant at which the *next* tick boundary after `now` fires.
    pub fn next_tick_start_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let current = self.current_tick_at(now);
        self.tick_start(current + 1)
    }

    /// Tick derived from an externally supplied timestamp (used by
    /// `enqueue-fallback` when the client reports its own local time, §4.6).
    /// Never negative.
    pub fn tick_for_timestamp(&self, timestamp: DateTime<Utc>) -> u64 {
        self.current_tick_at(timestamp)
    }

    /// `{ current, duration, elapsed, remaining }` block for `GET /sync` (§4.9).
    pub fn sync_block(&self, now: DateTime<Utc>) -> TickSyncBlock {
        let current = self.current_tick_at(now);
        let tick_start = self.tick_start(current);
        let elapsed = (now - tick_start).num_milliseconds().max(0) as f64 / 1000.0;
        let duration = self.tick_duration.as_secs_f64();
        TickSyncBlock {
            current,
            duration,
            elapsed,
            remaining: (duration - elapsed).max(0.0),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TickSyncBlock {
    pub current: u64,
    pub duration: f64,
    pub elapsed: f64,
    pub remaining: f64,
}

/// Submission scheduling mode selected by `server.yaml`'s `submitter` section
/// (§4.8). Mutually exclusive with each other.
#[derive(Debug, Clone, Copy)]
pub enum SubmitterMode {
    Delay(Duration),
    Interval(Duration),
}

impl SubmitterMode {
    /// `{ interval|delay, elapsed, remaining }` block for `GET /sync` (§4.9),
    /// following the delay-mode timing formula this lineage's server uses:
    /// `next_submit = tick_start + delay + (tick_duration if elapsed > delay else 0)`.
    pub fn sync_block(&self, clock: &GameClock, now: DateTime<Utc>) -> SubmitterSyncBlock {
        match self {
            Self::Delay(delay) => {
                let current = clock.current_tick_at(now);
                let tick_start = clock.tick_start(current);
                let elapsed = (now - tick_start).num_milliseconds().max(0) as f64 / 1000.0;
                let delay_s = delay.as_secs_f64();
                let extra = if elapsed > delay_s {
                    clock.tick_duration.as_secs_f64()
                } else {
                    0.0
                };
                let next_submit =
                    tick_start + chrono::Duration::milliseconds(((delay_s + extra) * 1000.0) as i64);
                let remaining = (next_submit - now).num_milliseconds().max(0) as f64 / 1000.0;
                SubmitterSyncBlock {
                    mode: "delay",
                    delay: Some(delay_s),
                    interval: None,
                    elapsed,
                    remaining,
                }
            }
            Self::Interval(interval) => {
                let interval_s = interval.as_secs_f64();
                let since_start = (now - clock.game_start).num_milliseconds().max(0) as f64 / 1000.0;
                let elapsed = since_start % interval_s;
                let remaining = interval_s - elapsed;
                SubmitterSyncBlock {
                    mode: "interval",
                    delay: None,
                    interval: Some(interval_s),
                    elapsed,
                    remaining,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitterSyncBlock {
    pub mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<f64>,
    pub elapsed: f64,
    pub remaining: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock_at(start: DateTime<Utc>, secs: u64) -> GameClock {
        GameClock {
            game_start: start,
            tick_duration: Duration::from_secs(secs),
        }
    }

    #[test]
    fn current_tick_is_zero_at_start() {
        let start = Utc::now();
        let clock = clock_at(start, 60);
        assert_eq!(clock.current_tick_at(start), 0);
    }

    #[test]
    fn current_tick_advances_by_one_per_duration() {
        let start = Utc::now();
        let clock = clock_at(start, 60);
        assert_eq!(clock.current_tick_at(start + chrono::Duration::seconds(59)), 0);
        assert_eq!(clock.current_tick_at(start + chrono::Duration::seconds(60)), 1);
        assert_eq!(clock.current_tick_at(start + chrono::Duration::seconds(120)), 2);
    }

    #[test]
    fn future_game_start_saturates_to_zero() {
        let start = Utc::now() + chrono::Duration::seconds(30);
        let clock = clock_at(start, 60);
        assert_eq!(clock.current_tick_at(Utc::now()), 0);
    }

    #[test]
    fn recovery_scenario_s6() {
        // S6: kill the server 120s into tick 0 (tick_duration=60); restart;
        // expect current_tick=2, game_start unchanged.
        let start = Utc::now() - chrono::Duration::seconds(120);
        let clock = clock_at(start, 60);
        assert_eq!(clock.current_tick(), 2);
    }

    #[test]
    fn tick_for_far_past_timestamp_is_non_negative() {
        let start = Utc::now();
        let clock = clock_at(start, 60);
        let far_past = start - chrono::Duration::days(365);
        assert_eq!(clock.tick_for_timestamp(far_past), 0);
    }
}
