//! API middleware.

#![allow(missing_docs)]

use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::debug;
use tunepoll_common::{AppError, Config, verify_slack_signature};
use tunepoll_core::clients::{ChatClient, SlackClient, SpotifyClient};
use tunepoll_core::{InstallationService, PollService, SpotifyInstallationService};

/// Largest Slack request body accepted.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub poll_service: PollService,
    pub installations: InstallationService,
    pub spotify_installations: SpotifyInstallationService,
    pub chat: Arc<dyn ChatClient>,
    pub slack: SlackClient,
    pub spotify: SpotifyClient,
}

/// Reject requests that are not signed with the app's signing secret.
///
/// The body is buffered to compute the signature and handed on unchanged.
pub async fn verify_slack_request(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();

    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let (Some(timestamp), Some(signature)) = (
        header("X-Slack-Request-Timestamp"),
        header("X-Slack-Signature"),
    ) else {
        debug!(path = %parts.uri.path(), "Missing Slack signature headers");
        return AppError::Unauthorized.into_response();
    };

    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return AppError::BadRequest(format!("Failed to read body: {e}")).into_response();
        }
    };

    if let Err(e) = verify_slack_signature(
        &state.config.slack.signing_secret,
        &timestamp,
        &bytes,
        &signature,
        Utc::now().timestamp(),
    ) {
        debug!(path = %parts.uri.path(), error = %e, "Rejected Slack request");
        return e.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
