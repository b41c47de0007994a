//! Client -> server HTTP calls. Grounded on the teacher's
//! `fleet::client::FleetClient`: a typed error enum, status-code dispatch,
//! and a reused `reqwest::Client` with a bounded timeout.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::clock::{SubmitterSyncBlock, TickSyncBlock};
use crate::model::EnqueueFallbackItem;

#[derive(Debug, thiserror::Error)]
pub enum ServerClientError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    ServerError {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EnqueueResponse {
    Inserted {
        #[serde(rename = "new")]
        new: Vec<String>,
        duplicates: Vec<String>,
    },
    Own {
        own: usize,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncResponse {
    pub tick: TickSyncBlock,
    pub submitter: SubmitterSyncBlock,
}

pub struct ServerClient {
    http: reqwest::Client,
    base_url: String,
    player: String,
    password: Option<String>,
}

impl ServerClient {
    pub fn new(base_url: String, player: String, password: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url,
            player,
            password,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.password {
            Some(password) => req.basic_auth(&self.player, Some(password)),
            None => req,
        }
    }

    pub async fn enqueue(
        &self,
        flags: &[String],
        exploit: &str,
        target: &str,
    ) -> Result<EnqueueResponse, ServerClientError> {
        let response = self
            .request(reqwest::Method::POST, "/enqueue")
            .json(&json!({
                "flags": flags,
                "exploit": exploit,
                "target": target,
                "player": self.player,
            }))
            .send()
            .await?;
        Self::parse_json(response).await
    }

    pub async fn enqueue_fallback(
        &self,
        items: &[EnqueueFallbackItem],
    ) -> Result<(), ServerClientError> {
        let response = self
            .request(reqwest::Method::POST, "/enqueue-fallback")
            .json(items)
            .send()
            .await?;
        Self::check_ok(response).await
    }

    pub async fn sync(&self) -> Result<SyncResponse, ServerClientError> {
        let response = self.request(reqwest::Method::GET, "/sync").send().await?;
        Self::parse_json(response).await
    }

    pub async fn trigger_submit(&self) -> Result<(), ServerClientError> {
        let response = self
            .request(reqwest::Method::POST, "/trigger-submit")
            .json(&json!({ "player": self.player }))
            .send()
            .await?;
        Self::check_ok(response).await
    }

    async fn check_ok(response: reqwest::Response) -> Result<(), ServerClientError> {
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ServerClientError::ServerError { status, body })
        }
    }

    async fn parse_json<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, ServerClientError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServerClientError::ServerError { status, body });
        }
        Ok(response.json().await?)
    }
}
