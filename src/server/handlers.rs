use crate::error::{TokenError, VitalcastError};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Json},
};
use futures::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use super::server::ServerState;

/// Handler for screenshot submissions
pub async fn analyze_handler(
    State(state): State<ServerState>,
    body: Bytes,
) -> impl IntoResponse {
    match state.analyzer.submit_screenshot(&body).await {
        Ok(health_state) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "healthState": health_state,
            })),
        ),
        Err(VitalcastError::Classifier(e)) => {
            warn!("Rejected screenshot: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        }
        Err(e) => {
            error!("Error analyzing screenshot: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Error processing image" })),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(rename = "userName", alias = "user_name")]
    pub user_name: String,
}

/// Handler for viewer command requests
pub async fn command_handler(
    State(state): State<ServerState>,
    Json(request): Json<CommandRequest>,
) -> impl IntoResponse {
    if !state.control_allowed {
        info!(
            user = %request.user_name,
            "Command rejected: dispatch is disabled"
        );
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": "Command emission is disabled" })),
        )
            .into_response();
    }

    let outcome = state
        .dispatcher
        .dispatch(&request.command, &request.user_name)
        .await;

    (StatusCode::OK, Json(outcome)).into_response()
}

/// Live event stream for overlay viewers
pub async fn events_handler(
    State(state): State<ServerState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New overlay viewer connected");

    let mut receiver = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    yield Ok(Event::default()
                        .event(event.topic())
                        .data(event.payload().to_string()));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // A slow viewer missed events; resume from the tail
                    warn!("Viewer stream lagged behind by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Handler for the service status endpoint
pub async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let status = serde_json::json!({
        "status": "healthy",
        "healthState": state.health_state.get(),
        "controlAllowed": state.control_allowed,
        "viewers": state.event_bus.subscriber_count(),
    });

    (StatusCode::OK, Json(status))
}

/// Handler returning the most recently stored Twitch access token
pub async fn twitch_token_handler(State(state): State<ServerState>) -> impl IntoResponse {
    match state.tokens.current_token().await {
        Ok(Some(token)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "access_token": token.access_token,
                "expires_at": token.expires_at,
            })),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "No token stored" })),
        ),
        Err(e) => {
            error!("Error retrieving Twitch token: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Error retrieving token" })),
            )
        }
    }
}

/// Handler exchanging the configured refresh token for a new access token
pub async fn refresh_token_handler(State(state): State<ServerState>) -> impl IntoResponse {
    match state.tokens.refresh().await {
        Ok(token) => (
            StatusCode::OK,
            Json(serde_json::json!({ "access_token": token.access_token })),
        ),
        Err(TokenError::MissingCredentials) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "Twitch credentials not configured" })),
        ),
        Err(e) => {
            error!("Error refreshing token: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": "Error refreshing token" })),
            )
        }
    }
}
