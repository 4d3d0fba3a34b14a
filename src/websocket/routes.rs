//! HTTP surface: session creation, actions, views, health and metrics.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handler::websocket_handler;
use crate::engine::runtime::ActionSubmission;
use crate::protocol::{
    ErrorCode, ErrorResponse, SessionId, StartGameRequest, StartGameResponse, SubmitActionRequest,
    SubmitActionResponse, UserId,
};
use crate::server::GameServer;

/// Build the `/v1` router.
pub fn create_router(cors_origins: &str) -> Router<Arc<GameServer>> {
    let cors = build_cors_layer(cors_origins);

    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/sessions", post(start_game_handler))
        .route("/sessions/{session_id}/actions", post(submit_action_handler))
        .route("/sessions/{session_id}/view", get(view_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn build_cors_layer(cors_origins: &str) -> CorsLayer {
    if cors_origins == "*" {
        return CorsLayer::permissive();
    }
    let origins: Vec<_> = cors_origins
        .split(',')
        .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
        .collect();
    if origins.is_empty() {
        tracing::warn!("No valid CORS origins configured, using permissive CORS");
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// HTTP status for each opaque error code.
pub fn error_status(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidAction
        | ErrorCode::InsufficientPlayers
        | ErrorCode::BadConfig => StatusCode::BAD_REQUEST,
        ErrorCode::PhaseClosed | ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Busy => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Unauthorized | ErrorCode::ResyncTokenInvalid => StatusCode::UNAUTHORIZED,
        ErrorCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(code: ErrorCode) -> Response {
    (error_status(code), Json(ErrorResponse { error_code: code })).into_response()
}

/// The authenticated principal, injected by the deployment edge.
fn principal_from(headers: &HeaderMap) -> Result<UserId, Response> {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<UserId>().ok())
        .ok_or_else(|| error_response(ErrorCode::Unauthorized))
}

/// `POST /v1/sessions`: the lobby's StartGame call.
async fn start_game_handler(
    State(server): State<Arc<GameServer>>,
    Json(request): Json<StartGameRequest>,
) -> Response {
    match server
        .start_game(request.room_id, &request.roster, request.config)
        .await
    {
        Ok(session_id) => (StatusCode::CREATED, Json(StartGameResponse { session_id }))
            .into_response(),
        Err(err) => {
            tracing::warn!(room_id = %request.room_id, error = %err, "StartGame rejected");
            error_response(err.error_code())
        }
    }
}

/// `POST /v1/sessions/{id}/actions`.
async fn submit_action_handler(
    State(server): State<Arc<GameServer>>,
    Path(session_id): Path<SessionId>,
    headers: HeaderMap,
    Json(request): Json<SubmitActionRequest>,
) -> Response {
    let user_id = match principal_from(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let submission = ActionSubmission {
        kind: request.kind,
        target_id: request.target_id,
        payload: request.payload,
    };
    match server.submit_action(user_id, session_id, submission).await {
        Ok(action_id) => Json(SubmitActionResponse { action_id }).into_response(),
        Err(err) => error_response(err.error_code()),
    }
}

/// `GET /v1/sessions/{id}/view`.
async fn view_handler(
    State(server): State<Arc<GameServer>>,
    Path(session_id): Path<SessionId>,
    headers: HeaderMap,
) -> Response {
    let user_id = match principal_from(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    match server.get_session_view(user_id, session_id).await {
        Ok(view) => Json(view).into_response(),
        Err(err) => error_response(err.error_code()),
    }
}

/// `GET /v1/metrics`: JSON snapshot, optionally bearer-protected.
pub async fn metrics_handler(
    State(server): State<Arc<GameServer>>,
    headers: HeaderMap,
) -> Response {
    let security = &server.config().security;
    if security.require_metrics_auth {
        let authorized = security.metrics_auth_token.as_deref().is_some_and(|token| {
            headers
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .is_some_and(|presented| presented == token)
        });
        if !authorized {
            return error_response(ErrorCode::Unauthorized);
        }
    }
    Json(server.metrics().snapshot()).into_response()
}

/// `GET /v1/health`.
async fn health_handler(State(server): State<Arc<GameServer>>) -> Response {
    if server.health_check().await {
        (StatusCode::OK, "ok").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "storage unavailable").into_response()
    }
}
