//! Ingestion API (C6, §4.6). Every HTTP handler that mutates or reads the
//! Flag Store / Webhook Store, grounded on the teacher's `api::routes`
//! handler shape: `State<AppState>` extraction, a typed `Json<T>` body,
//! a `Result<Json<U>, AppError>` return so `?` does the status-code mapping.

use std::collections::HashSet;

use axum::extract::{Path, State};
use axum::response::Json;
use regex::Regex;
use serde_json::json;
use tracing::info;

use crate::error::{AppError, IngestError};
use crate::model::{
    EnqueueFallbackItem, EnqueueManualRequest, EnqueueOutcome, EnqueueRequest, Flag, ManualAction,
    VulnReportRequest, WebhookRequest, WebhookUpdateRequest,
};

use super::events::Event;
use super::flagstore::InsertOutcome;
use super::scheduler;
use super::search::{SearchRequest, SearchResponse};
use super::state::AppState;

fn own_team_addresses(state: &AppState) -> HashSet<String> {
    state.config.game.team_ip.clone().into_vec().into_iter().collect()
}

/// `GET /config` (§6): the client's startup copy of the authoritative game
/// config, secrets stripped.
pub async fn config_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "game": state.config.game,
        "submitter": {
            "module": state.config.submitter.module,
            "delay": state.config.submitter.delay,
            "interval": state.config.submitter.interval,
        },
        "server": { "host": state.config.server.host, "port": state.config.server.port },
        "database": { "path": state.config.database.path },
    }))
}

/// `GET /flagstore-stats` (§6): running totals plus the current tick's delta.
pub async fn flagstore_stats_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let counts = state.flags.count_by_status().map_err(IngestError::from)?;
    let tick = state.clock().current_tick();
    let delta = state
        .flags
        .count_by_status_for_tick(tick)
        .map_err(IngestError::from)?;

    Ok(Json(json!({
        "queued": counts.get(&crate::model::FlagStatus::Queued).unwrap_or(&0),
        "accepted": counts.get(&crate::model::FlagStatus::Accepted).unwrap_or(&0),
        "rejected": counts.get(&crate::model::FlagStatus::Rejected).unwrap_or(&0),
        "delta": {
            "accepted": delta.get(&crate::model::FlagStatus::Accepted).unwrap_or(&0),
            "rejected": delta.get(&crate::model::FlagStatus::Rejected).unwrap_or(&0),
        },
    })))
}

const ANALYTICS_WINDOW: u64 = 10;

/// `GET /exploit-analytics` (§6, §4.7): the last ten ticks' accepted-flag
/// counts, grouped by `(player, exploit)`.
pub async fn exploit_analytics_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let current = state.clock().current_tick();
    let tick_lo = current.saturating_sub(ANALYTICS_WINDOW - 1);
    let ticks: Vec<u64> = (tick_lo..=current).collect();

    let series = state
        .flags
        .analytics(tick_lo, current)
        .map_err(IngestError::from)?;

    let exploits: serde_json::Map<String, serde_json::Value> = series
        .into_iter()
        .map(|((player, exploit), data)| {
            let key = format!("{player}-{exploit}");
            let value = json!({
                "player": player,
                "exploit": exploit,
                "data": { "accepted": data },
            });
            (key, value)
        })
        .collect();

    Ok(Json(json!({ "ticks": ticks, "exploits": exploits })))
}

/// `POST /enqueue` (§4.6): bulk-insert flags from an exploit run, unless the
/// reported target is one of our own team's addresses.
pub async fn enqueue_handler(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> Result<Json<EnqueueOutcome>, AppError> {
    if own_team_addresses(&state).contains(&request.target) {
        let _ = state.events.send(Event::VulnerabilityReported {
            exploit: request.exploit.clone(),
            target: request.target.clone(),
            player: request.player.clone(),
        });
        return Ok(Json(EnqueueOutcome::Own {
            own: request.flags.len(),
        }));
    }

    let tick = state.clock().current_tick();
    let (new, duplicates) = insert_all(&state, &request.flags, &request.exploit, &request.player, &request.target, tick)?;

    let _ = state.events.send(Event::Enqueue {
        new: new.len(),
        duplicates: duplicates.len(),
        player: request.player,
        target: request.target,
        exploit: request.exploit,
    });

    Ok(Json(EnqueueOutcome::Inserted { new, duplicates }))
}

fn insert_all(
    state: &AppState,
    values: &[String],
    exploit: &str,
    player: &str,
    target: &str,
    tick: u64,
) -> Result<(Vec<String>, Vec<String>), IngestError> {
    let mut new = Vec::new();
    let mut duplicates = Vec::new();
    for value in values {
        let flag = Flag::new_queued(
            value.clone(),
            exploit.to_string(),
            player.to_string(),
            target.to_string(),
            tick,
        );
        match state.flags.insert(flag)? {
            InsertOutcome::New => new.push(value.clone()),
            InsertOutcome::Duplicate => duplicates.push(value.clone()),
        }
    }
    Ok((new, duplicates))
}

/// `POST /enqueue-fallback` (§4.6): the client's retry path for flags it
/// could not deliver live; `tick` is derived from the reported `timestamp`
/// when present, else the server's current tick.
pub async fn enqueue_fallback_handler(
    State(state): State<AppState>,
    Json(items): Json<Vec<EnqueueFallbackItem>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let clock = state.clock();
    let own = own_team_addresses(&state);
    let mut new = Vec::new();
    let mut duplicates = Vec::new();

    for item in items {
        if own.contains(&item.target) {
            let _ = state.events.send(Event::VulnerabilityReported {
                exploit: item.exploit.clone(),
                target: item.target.clone(),
                player: item.player.clone(),
            });
            continue;
        }
        let tick = item
            .timestamp
            .map(|ts| clock.tick_for_timestamp(ts))
            .unwrap_or_else(|| clock.current_tick());
        let flag = Flag::new_queued(item.flag.clone(), item.exploit, item.player, item.target, tick);
        match state.flags.insert(flag).map_err(IngestError::from)? {
            InsertOutcome::New => new.push(item.flag),
            InsertOutcome::Duplicate => duplicates.push(item.flag),
        }
    }

    let _ = state.events.send(Event::EnqueueFallback { count: new.len() });
    Ok(Json(json!({ "new": new, "duplicates": duplicates })))
}

/// `POST /enqueue-manual` (§4.6): operator-entered flags, either just queued
/// or submitted inline in the same call.
///
/// The `action=submit` branch does not reuse [`scheduler::submit_now`] (which
/// submits the whole queue): it runs the submitter over exactly the flags in
/// this request, then inserts them pre-resolved to their terminal status in
/// one atomic transaction. If the submitter call fails, nothing from this
/// request is inserted at all, not even as `queued` (§4.6/§9: no partial
/// commit of a manual submission).
pub async fn enqueue_manual_handler(
    State(state): State<AppState>,
    Json(request): Json<EnqueueManualRequest>,
) -> Result<Json<EnqueueOutcome>, AppError> {
    let player = request.player.unwrap_or_else(|| "manual".to_string());
    let tick = state.clock().current_tick();

    if matches!(request.action, Some(ManualAction::Submit)) {
        let _guard = state.submission_guard.lock().await;

        let _ = state.events.send(Event::SubmitStart {
            count: request.flags.len(),
        });
        let output = scheduler::invoke_submitter(&state.config.submitter.module, &request.flags)
            .await
            .map_err(AppError::from)?;

        let flags: Vec<Flag> = request
            .flags
            .iter()
            .map(|value| {
                let mut flag = Flag::new_queued(
                    value.clone(),
                    crate::model::MANUAL_EXPLOIT.to_string(),
                    player.clone(),
                    crate::model::UNKNOWN_TARGET.to_string(),
                    tick,
                );
                if let Some(response) = output.accepted.get(value) {
                    flag.status = crate::model::FlagStatus::Accepted;
                    flag.response = Some(response.clone());
                } else if let Some(response) = output.rejected.get(value) {
                    flag.status = crate::model::FlagStatus::Rejected;
                    flag.response = Some(response.clone());
                }
                flag
            })
            .collect();

        let (new, duplicates) = state
            .flags
            .insert_all_with_status(flags)
            .map_err(IngestError::from)?;

        let counts = state.flags.count_by_status().map_err(IngestError::from)?;
        let _ = state.events.send(Event::SubmitComplete {
            accepted: *counts.get(&crate::model::FlagStatus::Accepted).unwrap_or(&0),
            rejected: *counts.get(&crate::model::FlagStatus::Rejected).unwrap_or(&0),
            queued: *counts.get(&crate::model::FlagStatus::Queued).unwrap_or(&0),
        });
        let _ = state.events.send(Event::AnalyticsUpdate);

        return Ok(Json(EnqueueOutcome::Inserted { new, duplicates }));
    }

    let (new, duplicates) = insert_all(
        &state,
        &request.flags,
        crate::model::MANUAL_EXPLOIT,
        &player,
        crate::model::UNKNOWN_TARGET,
        tick,
    )?;
    let _ = state.events.send(Event::Enqueue {
        new: new.len(),
        duplicates: duplicates.len(),
        player,
        target: crate::model::UNKNOWN_TARGET.to_string(),
        exploit: crate::model::MANUAL_EXPLOIT.to_string(),
    });

    Ok(Json(EnqueueOutcome::Inserted { new, duplicates }))
}

/// `POST /vuln-report` (§4.6): a pure event, no state mutation.
pub async fn vuln_report_handler(
    State(state): State<AppState>,
    Json(request): Json<VulnReportRequest>,
) -> Json<serde_json::Value> {
    let _ = state.events.send(Event::VulnerabilityReported {
        exploit: request.exploit,
        target: request.target,
        player: request.player,
    });
    Json(json!({ "message": "reported" }))
}

/// `POST /trigger-submit` (§6): forces a submission round and returns only
/// after it completes.
pub async fn trigger_submit_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    scheduler::submit_now(&state).await?;
    Ok(Json(json!({ "message": "submission complete" })))
}

/// `POST /search` (§6).
pub async fn search_handler(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let all = state.flags.all().map_err(IngestError::from)?;
    let response = super::search::run_search(all, &request)?;
    Ok(Json(response))
}

pub async fn list_webhooks_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::model::Webhook>>, AppError> {
    Ok(Json(state.webhooks.list().map_err(IngestError::from)?))
}

pub async fn create_webhook_handler(
    State(state): State<AppState>,
    Json(request): Json<WebhookRequest>,
) -> Result<Json<crate::model::Webhook>, AppError> {
    let webhook = state
        .webhooks
        .create(request.exploit, request.player)
        .map_err(IngestError::from)?;
    Ok(Json(webhook))
}

pub async fn get_webhook_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<crate::model::Webhook>, AppError> {
    state
        .webhooks
        .get(&id)
        .map_err(IngestError::from)?
        .map(Json)
        .ok_or(AppError::Ingest(IngestError::UnknownWebhook))
}

pub async fn update_webhook_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<WebhookUpdateRequest>,
) -> Result<Json<crate::model::Webhook>, AppError> {
    state
        .webhooks
        .update(&id, request.disabled)
        .map_err(IngestError::from)?
        .map(Json)
        .ok_or(AppError::Ingest(IngestError::UnknownWebhook))
}

/// `ANY /:webhookId` (§4.6): parses flags out of an arbitrary exfiltration
/// body with the server's `flag_format` regex and attributes them to the
/// webhook's `(exploit, player)`.
pub async fn exfiltrate_handler(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
    body: String,
) -> Result<Json<EnqueueOutcome>, AppError> {
    let webhook = state
        .webhooks
        .get(&webhook_id)
        .map_err(IngestError::from)?
        .ok_or(AppError::Ingest(IngestError::UnknownWebhook))?;

    if webhook.disabled {
        return Ok(Json(EnqueueOutcome::Inserted {
            new: vec![],
            duplicates: vec![],
        }));
    }

    let pattern = Regex::new(&state.config.game.flag_format)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    let values: Vec<String> = pattern
        .find_iter(&body)
        .map(|m| m.as_str().to_string())
        .collect();

    let tick = state.clock().current_tick();
    let (new, duplicates) = insert_all(
        &state,
        &values,
        &webhook.exploit,
        &webhook.player,
        crate::model::UNKNOWN_TARGET,
        tick,
    )
    .map_err(AppError::from)?;

    info!(webhook_id, found = values.len(), "exfiltration processed");
    let _ = state.events.send(Event::Enqueue {
        new: new.len(),
        duplicates: duplicates.len(),
        player: webhook.player,
        target: crate::model::UNKNOWN_TARGET.to_string(),
        exploit: webhook.exploit,
    });

    Ok(Json(EnqueueOutcome::Inserted { new, duplicates }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_team_addresses_collects_configured_ips() {
        use crate::config::server_schema::{
            DatabaseConfig, GameConfig, OneOrMany, ServerConfig, ServerHttpConfig, SubmitterConfig,
        };

        let config = ServerConfig {
            game: GameConfig {
                tick_duration: 60.0,
                flag_format: "FLAG\\{.*\\}".into(),
                team_ip: OneOrMany::Many(vec!["10.0.0.1".into(), "10.0.0.2".into()]),
                start: None,
                teams_json_url: None,
            },
            submitter: SubmitterConfig {
                delay: Some(5.0),
                interval: None,
                module: "submitter".into(),
            },
            server: ServerHttpConfig {
                host: "0.0.0.0".into(),
                port: 2023,
                password: None,
            },
            database: DatabaseConfig { path: ".fast/fast.db".into() },
        };

        let addrs: HashSet<String> = config.game.team_ip.clone().into_vec().into_iter().collect();
        assert!(addrs.contains("10.0.0.1"));
        assert_eq!(addrs.len(), 2);
    }
}
