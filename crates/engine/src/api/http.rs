//! HTTP routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;

use tavern_domain::{CampaignId, DomainError, JoinCode, PlayerId, RosterEntry};
use tavern_shared::{
    BootstrapSnapshot, PlayerRecord, SessionRecord, StartSessionRequest, UpsertPlayerRequest,
};

use crate::app::App;
use crate::infrastructure::ports::RepoError;
use crate::use_cases::session::{BootstrapError, SessionLifecycleError};

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        .route("/api/sessions", post(start_session))
        .route("/api/sessions/{join_code}", get(get_session))
        .route("/api/sessions/{join_code}/bootstrap", get(get_bootstrap))
        .route("/api/sessions/{join_code}/end", post(end_session))
        .route("/api/sessions/{join_code}/roster", get(get_roster))
        .route(
            "/api/sessions/{join_code}/players/{player_id}",
            put(upsert_player),
        )
}

async fn health() -> &'static str {
    "OK"
}

// =============================================================================
// Sessions
// =============================================================================

async fn start_session(
    State(app): State<Arc<App>>,
    Json(request): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<SessionRecord>), ApiError> {
    let state = app
        .use_cases
        .session
        .start
        .execute(
            &CampaignId::new(request.campaign_id),
            request.join_code.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(SessionRecord::from(&state))))
}

async fn get_session(
    State(app): State<Arc<App>>,
    Path(join_code): Path<String>,
) -> Result<Json<SessionRecord>, ApiError> {
    let join_code = parse_join_code(&join_code)?;
    let state = app.use_cases.session.get.execute(&join_code).await?;
    Ok(Json(SessionRecord::from(&state)))
}

async fn get_bootstrap(
    State(app): State<Arc<App>>,
    Path(join_code): Path<String>,
) -> Result<Json<BootstrapSnapshot>, ApiError> {
    let join_code = parse_join_code(&join_code)?;
    let snapshot = app.use_cases.session.bootstrap.execute(&join_code).await?;
    Ok(Json(snapshot))
}

async fn end_session(
    State(app): State<Arc<App>>,
    Path(join_code): Path<String>,
) -> Result<Json<SessionRecord>, ApiError> {
    let join_code = parse_join_code(&join_code)?;
    let state = app.use_cases.session.end.execute(&join_code).await?;
    Ok(Json(SessionRecord::from(&state)))
}

async fn get_roster(
    State(app): State<Arc<App>>,
    Path(join_code): Path<String>,
) -> Result<Json<Vec<RosterEntry>>, ApiError> {
    let join_code = parse_join_code(&join_code)?;
    Ok(Json(app.roster.list(&join_code)))
}

// =============================================================================
// Players
// =============================================================================

async fn upsert_player(
    State(app): State<Arc<App>>,
    Path((join_code, player_id)): Path<(String, String)>,
    Json(request): Json<UpsertPlayerRequest>,
) -> Result<Json<PlayerRecord>, ApiError> {
    let join_code = parse_join_code(&join_code)?;
    if player_id.trim().is_empty() {
        return Err(ApiError::BadRequest("Player id cannot be empty".to_string()));
    }
    let record = app
        .use_cases
        .session
        .register_player
        .execute(&join_code, PlayerId::new(player_id), request)
        .await?;
    Ok(Json(record))
}

fn parse_join_code(value: &str) -> Result<JoinCode, ApiError> {
    JoinCode::new(value).map_err(ApiError::from)
}

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg).into_response(),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<SessionLifecycleError> for ApiError {
    fn from(e: SessionLifecycleError) -> Self {
        match e {
            SessionLifecycleError::CampaignNotFound(_)
            | SessionLifecycleError::SessionNotFound(_) => ApiError::NotFound,
            SessionLifecycleError::InvalidJoinCode(msg) => ApiError::BadRequest(msg),
            SessionLifecycleError::JoinCodeTaken(_) | SessionLifecycleError::SessionEnded(_) => {
                ApiError::Conflict(e.to_string())
            }
            SessionLifecycleError::Repo(e) => e.into(),
        }
    }
}

impl From<BootstrapError> for ApiError {
    fn from(e: BootstrapError) -> Self {
        match e {
            BootstrapError::SessionNotFound(_) => ApiError::NotFound,
            BootstrapError::Repo(e) => e.into(),
        }
    }
}
