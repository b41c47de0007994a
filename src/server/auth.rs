//! HTTP Basic auth middleware (§6: "Auth is HTTP Basic when a password is
//! configured"). Adapted from the `knhk-workflow-engine` `auth_middleware`
//! shape (header extraction + `Result<Response, StatusCode>` short-circuit),
//! generalized from bearer-token checking to HTTP Basic credential
//! comparison against the single shared `server.password`.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use tracing::warn;

use super::state::AppState;

/// When no password is configured, every request passes unauthenticated
/// (§6 implies auth is opt-in, gated on `server.password` being set).
pub async fn require_basic_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = &state.config.server.password else {
        return Ok(next.run(request).await);
    };

    if !credential_matches(&headers, expected) {
        warn!("rejected request with missing or invalid Basic credentials");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

fn credential_matches(headers: &HeaderMap, expected_password: &str) -> bool {
    let Some(header) = headers.get("authorization").and_then(|h| h.to_str().ok()) else {
        return false;
    };
    let Some(encoded) = header.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    // player:password — the player name isn't checked, only the shared secret.
    match decoded.split_once(':') {
        Some((_, password)) => password == expected_password,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_header(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let encoded = base64::engine::general_purpose::STANDARD.encode(value);
        headers.insert(
            "authorization",
            format!("Basic {encoded}").parse().unwrap(),
        );
        headers
    }

    #[test]
    fn matching_password_passes() {
        let headers = basic_header("alice:secret");
        assert!(credential_matches(&headers, "secret"));
    }

    #[test]
    fn wrong_password_fails() {
        let headers = basic_header("alice:wrong");
        assert!(!credential_matches(&headers, "secret"));
    }

    #[test]
    fn missing_header_fails() {
        assert!(!credential_matches(&HeaderMap::new(), "secret"));
    }
}
