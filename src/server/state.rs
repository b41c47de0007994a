//! Shared axum `State`, grounded on the teacher's `api::AppState` shape
//! (an `Arc`-wrapped bundle of stores plus a broadcast sender), generalized
//! from a single analysis store to the Flag Store / Webhook Store / game
//! clock / submitter mode this server needs.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{broadcast, Mutex};

use crate::clock::{GameClock, SubmitterMode};
use crate::config::server_schema::ServerConfig;

use super::events::Event;
use super::flagstore::FlagStore;
use super::webhooks::WebhookStore;

/// Cloneable handle shared by every axum handler. Cloning is cheap: every
/// field is an `Arc` (or itself cheaply cloneable).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub flags: FlagStore,
    pub webhooks: WebhookStore,
    /// Hot-swappable so a future `start` reconfiguration doesn't require a
    /// restart; read on every request, written only by recovery bootstrap.
    pub clock: Arc<ArcSwap<GameClock>>,
    pub submitter_mode: SubmitterMode,
    /// Serializes submission rounds: the scheduler and a manually triggered
    /// `POST /submit` must never run concurrently (§4.8 invariant).
    pub submission_guard: Arc<Mutex<()>>,
    pub events: broadcast::Sender<Event>,
}

impl AppState {
    pub fn clock(&self) -> GameClock {
        **self.clock.load()
    }
}
