//! HTTP routes
//!
//! - `POST /login`: run the authentication pipeline, issue a session
//! - `POST /logout`: fire logout hooks, end the session
//! - `GET /me`: the session's user and linked Freemius account
//! - `GET /health`, `GET /metrics`

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::Secret;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use sso::{AuthError, AuthOutcome, AuthPipeline, LoginMediator, codes};
use tracing::{info, warn};
use user_store::UserStore;

use crate::error::ApiError;
use crate::metrics;
use crate::session::{Session, SessionStore};

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AuthPipeline>,
    pub mediator: Arc<LoginMediator>,
    pub store: Arc<dyn UserStore>,
    pub sessions: Arc<SessionStore>,
    pub prometheus: PrometheusHandle,
    pub started_at: Instant,
}

/// Login form, named after the host's `log`/`pwd` fields.
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    log: String,
    #[serde(default)]
    pwd: String,
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/me", get(me_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

fn json_response(status: StatusCode, body: serde_json::Value) -> impl IntoResponse {
    (status, [(CONTENT_TYPE, "application/json")], body.to_string())
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::MissingSession)
}

async fn current_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(String, Session), ApiError> {
    let token = bearer_token(headers)?;
    let session = state
        .sessions
        .resolve(token)
        .await
        .ok_or(ApiError::InvalidSession)?;
    Ok((token.to_owned(), session))
}

async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let start = Instant::now();
    let LoginRequest { log, pwd } = request;
    let password = Secret::new(pwd);

    let outcome = state.pipeline.authenticate(log.trim(), &password).await;
    let elapsed = start.elapsed().as_secs_f64();

    let user = match outcome {
        AuthOutcome::User(user) => user,
        AuthOutcome::Error(e) => {
            metrics::record_login("failure", elapsed);
            warn!(request_id = %request_id, code = %e.code, "login rejected");
            return Err(ApiError::Login(e));
        }
        // The pipeline never returns Empty
        AuthOutcome::Empty => {
            metrics::record_login("failure", elapsed);
            return Err(ApiError::Login(AuthError::new(
                codes::AUTHENTICATION_FAILED,
                "Authentication failed.",
            )));
        }
    };

    metrics::record_login("success", elapsed);
    let token = state.sessions.issue(user.id).await;
    info!(request_id = %request_id, user_id = %user.id, "login succeeded");

    Ok(json_response(
        StatusCode::OK,
        serde_json::json!({
            "session": token,
            "user": user,
        }),
    ))
}

async fn logout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let (token, session) = current_session(&state, &headers).await?;

    state.pipeline.logout(&session).await;
    state.sessions.revoke(&token).await;
    info!(user_id = %session.user_id, "logged out");

    Ok(json_response(
        StatusCode::OK,
        serde_json::json!({ "status": "logged_out" }),
    ))
}

async fn me_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let (_, session) = current_session(&state, &headers).await?;

    let user = state
        .store
        .find_by_id(session.user_id)
        .await
        .ok_or(ApiError::UserGone(session.user_id.0))?;
    let remote_user_id = state.mediator.get_remote_user_id(&session).await;
    let remote_token = state.mediator.get_cached_token(&session).await;

    Ok(json_response(
        StatusCode::OK,
        serde_json::json!({
            "user": user,
            "remote_user_id": remote_user_id,
            "remote_token": remote_token,
        }),
    ))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    json_response(
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "uptime_seconds": state.started_at.elapsed().as_secs(),
            "active_sessions": state.sessions.active().await,
        }),
    )
}

/// Prometheus metrics endpoint, text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}
