//! Typed shape of `server.yaml` (§6).

use serde::{Deserialize, Serialize};

/// `team_ip` accepts either a single string or a list (§6); this mirrors the
/// original source's `deep_update` + "wrap single string in a list" handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameConfig {
    pub tick_duration: f64,
    pub flag_format: String,
    pub team_ip: OneOrMany,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub teams_json_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitterConfig {
    #[serde(default)]
    pub delay: Option<f64>,
    #[serde(default)]
    pub interval: Option<f64>,
    pub module: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerHttpConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    ".fast/fast.db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub game: GameConfig,
    pub submitter: SubmitterConfig,
    pub server: ServerHttpConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

pub const SERVER_TOP_LEVEL_KEYS: &[&str] = &["game", "submitter", "server", "database"];
pub const GAME_KEYS: &[&str] = &[
    "tick_duration",
    "flag_format",
    "team_ip",
    "start",
    "teams_json_url",
];
pub const SUBMITTER_KEYS: &[&str] = &["delay", "interval", "module"];
pub const SERVER_HTTP_KEYS: &[&str] = &["host", "port", "password"];
pub const DATABASE_KEYS: &[&str] = &["path"];
