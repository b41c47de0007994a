//! Typed shape of `fast.yaml` (§6).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectConfig {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub player: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerConfig {
    pub host: String,
    pub port: u16,
}

/// Locally cached copy of the server's `flag_format`, used to pre-filter
/// exploit output before a round-trip (SPEC_FULL.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalGameConfig {
    pub flag_format: String,
}

/// One or more `{count, wait}` / `{size, wait}` batching strategies (§3, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchSpec {
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub size: Option<usize>,
    pub wait: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExploitDefinitionSpec {
    pub name: String,
    pub targets: Vec<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub run: Option<String>,
    #[serde(default)]
    pub prepare: Option<String>,
    #[serde(default)]
    pub cleanup: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub delay: f64,
    #[serde(default)]
    pub batches: Option<BatchSpec>,
}

fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub connect: ConnectConfig,
    pub listener: ListenerConfig,
    pub config: LocalGameConfig,
    pub exploits: Vec<ExploitDefinitionSpec>,
}

pub const CLIENT_TOP_LEVEL_KEYS: &[&str] = &["connect", "listener", "config", "exploits"];
pub const CONNECT_KEYS: &[&str] = &["protocol", "host", "port", "player", "password"];
pub const LISTENER_KEYS: &[&str] = &["host", "port"];
pub const LOCAL_GAME_KEYS: &[&str] = &["flag_format"];
pub const EXPLOIT_KEYS: &[&str] = &[
    "name", "targets", "module", "run", "prepare", "cleanup", "timeout", "env", "delay", "batches",
];
pub const BATCH_KEYS: &[&str] = &["count", "size", "wait"];
