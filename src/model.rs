//! Shared data model (§3). These types cross the client/server HTTP boundary
//! and are also the sled-persisted record shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status lifecycle for a server-side [`Flag`]. Transitions out of `Queued`
/// are one-way and terminal (invariant ii).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagStatus {
    Queued,
    Accepted,
    Rejected,
}

/// The authoritative, server-side flag record (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flag {
    pub value: String,
    pub exploit: String,
    pub player: String,
    pub tick: u64,
    pub target: String,
    pub timestamp: DateTime<Utc>,
    pub status: FlagStatus,
    pub response: Option<String>,
}

impl Flag {
    pub fn new_queued(
        value: String,
        exploit: String,
        player: String,
        target: String,
        tick: u64,
    ) -> Self {
        Self {
            value,
            exploit,
            player,
            tick,
            target,
            timestamp: Utc::now(),
            status: FlagStatus::Queued,
            response: None,
        }
    }
}

/// `exploit` sentinel used for flags inserted via `enqueue-manual`.
pub const MANUAL_EXPLOIT: &str = "manual";
/// `target` sentinel used for flags with no known origin host.
pub const UNKNOWN_TARGET: &str = "unknown";

/// Status lifecycle for a client-side [`FallbackFlag`] (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackStatus {
    Pending,
    Forwarded,
}

/// A flag the client could not deliver to the server immediately; retained
/// locally until `enqueue-fallback` acknowledges it (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackFlag {
    pub value: String,
    pub exploit: String,
    pub target: String,
    pub timestamp: DateTime<Utc>,
    pub status: FallbackStatus,
}

/// A server-side webhook used to attribute out-of-band HTTP submissions to a
/// known `(exploit, player)` pair (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: String,
    pub exploit: String,
    pub player: String,
    pub disabled: bool,
}

/// A `(host, flag_id)` pair already attacked successfully, retained across
/// ticks to avoid repeat work when the environment publishes per-flag hints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attack {
    pub host: String,
    pub flag_id: String,
}

/// Wire shape of `POST /enqueue`.
#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueRequest {
    pub flags: Vec<String>,
    pub exploit: String,
    pub target: String,
    pub player: String,
}

/// Wire shape of one element of `POST /enqueue-fallback`'s body array.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnqueueFallbackItem {
    pub flag: String,
    pub exploit: String,
    pub target: String,
    pub player: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Outcome of an ingestion attempt, discriminated by which branch of §4.6 it
/// took. Serializes to exactly one of the three response shapes the spec
/// describes for `enqueue`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EnqueueOutcome {
    Inserted {
        new: Vec<String>,
        duplicates: Vec<String>,
    },
    Own {
        own: usize,
    },
}

/// Wire shape of `POST /enqueue-manual`.
#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueManualRequest {
    pub flags: Vec<String>,
    #[serde(default)]
    pub player: Option<String>,
    #[serde(default)]
    pub action: Option<ManualAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualAction {
    Enqueue,
    Submit,
}

/// Wire shape of `POST /vuln-report`.
#[derive(Debug, Clone, Deserialize)]
pub struct VulnReportRequest {
    pub exploit: String,
    pub target: String,
    pub player: String,
}

/// Wire shape of the body `POST/PUT /webhooks{,/:id}` accepts.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookRequest {
    pub exploit: String,
    pub player: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookUpdateRequest {
    pub disabled: bool,
}
