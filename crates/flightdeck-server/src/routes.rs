//! HTTP surface: login, flight reads, manual status updates, the
//! WebSocket upgrade and a health probe.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    Json, Router,
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use flightdeck_auth::{AuthError, BearerAuth};
use flightdeck_core::{Flight, FlightStatus};
use flightdeck_storage::StorageError;

use crate::gateway;
use crate::server::AppState;

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    NotFound(&'static str),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Auth(e) => e.into_response(),
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "message": message }))).into_response()
            }
            ApiError::Storage(e) => {
                tracing::error!(error = %e, "Storage error in request handler");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "message": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/flights", get(list_flights))
        .route("/flights/{flight_number}", get(get_flight))
        .route("/flights/{id}/status", patch(update_flight_status))
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: LoginUser,
}

#[derive(Debug, Serialize)]
pub struct LoginUser {
    pub username: String,
    pub role: String,
    pub permissions: Vec<String>,
}

/// `POST /auth/login`. Verifies the password and issues a bearer token.
///
/// Unknown username and wrong password are indistinguishable to the
/// caller.
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let invalid = || AuthError::unauthorized("Invalid credentials");

    let user = state
        .users
        .find_by_username(&request.username)
        .await?
        .ok_or_else(invalid)?;

    let parsed_hash = PasswordHash::new(&user.password_hash).map_err(|e| {
        tracing::error!(username = %user.username, error = %e, "Stored password hash is unparseable");
        invalid()
    })?;
    Argon2::default()
        .verify_password(request.password.as_bytes(), &parsed_hash)
        .map_err(|_| invalid())?;

    let token = state.auth.jwt_service.issue(&user)?;
    tracing::info!(username = %user.username, "User logged in");

    Ok(Json(LoginResponse {
        token,
        user: LoginUser {
            username: user.username,
            role: user.role,
            permissions: user.permissions,
        },
    }))
}

/// `GET /flights`. Requires `view_flights`.
async fn list_flights(
    BearerAuth(user): BearerAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<Flight>>, ApiError> {
    user.require_permission("view_flights")?;
    let flights = state.flights.find_all().await?;
    Ok(Json(flights))
}

/// `GET /flights/{flight_number}`. Requires `view_flights`.
async fn get_flight(
    BearerAuth(user): BearerAuth,
    State(state): State<AppState>,
    Path(flight_number): Path<String>,
) -> Result<Json<Flight>, ApiError> {
    user.require_permission("view_flights")?;
    let flight = state
        .flights
        .find_by_number(&flight_number)
        .await?
        .ok_or(ApiError::NotFound("Flight not found"))?;
    Ok(Json(flight))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: FlightStatus,
}

/// `PATCH /flights/{id}/status`. Requires `update_flights`.
///
/// A manual transition only touches the store; scheduler ticks are the
/// event-producing path.
async fn update_flight_status(
    BearerAuth(user): BearerAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Flight>, ApiError> {
    user.require_permission("update_flights")?;

    let updated = state
        .flights
        .update_status(id, request.status)
        .await
        .map_err(|e| match e {
            StorageError::NotFound { .. } => ApiError::NotFound("Flight not found"),
            other => ApiError::Storage(other),
        })?;

    tracing::info!(
        flight_number = %updated.flight_number,
        status = %updated.status,
        username = %user.identity.username,
        "Manual status update"
    );
    Ok(Json(updated))
}

/// `GET /ws`. Upgrades to a push-only WebSocket; no token required to
/// connect.
async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| gateway::handle_socket(hub, socket))
}

/// `GET /health`. Liveness plus backend reachability.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "cache": state.cache.mode(),
        "redis": state.cache.is_redis_available().await,
        "broker": state.broker.is_some(),
        "ws_clients": state.hub.client_count(),
    }))
}
