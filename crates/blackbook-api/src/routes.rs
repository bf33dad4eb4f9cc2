use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use blackbook_core::db::{
    ArchiveRepository, Database, ReviewRepository, RunRepository, SettingsRepository,
    SqliteArchiveRepository, SqliteReviewRepository, SqliteRunRepository,
    SqliteSettingsRepository, SqliteSyncLogRepository, SyncLogFilter, SyncLogRepository, SyncRun,
};
use blackbook_core::models::{
    ArchiveId, ArchivedPerson, Person, PersonId, ReviewId, ReviewItem, SyncLogEntry,
    SyncLogStatus, SyncSettings,
};
use blackbook_core::sync::{next_run_times, ArchiveManager, ReviewResolution, SyncEngine, SyncReport};

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub engine: Arc<SyncEngine>,
}

pub fn app_router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/sync/run", post(run_sync))
        .route("/sync/person/{id}", post(sync_person))
        .route("/sync/status", get(sync_status))
        .route("/sync/log", get(sync_log))
        .route("/review", get(list_reviews))
        .route("/review/{id}/resolve", post(resolve_review))
        .route("/review/{id}/dismiss", post(dismiss_review))
        .route("/archive", get(list_archives))
        .route("/archive/purge", post(purge_archives))
        .route("/archive/{id}/restore", post(restore_archive))
        .route("/settings", get(get_settings).put(put_settings));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", v1)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

async fn run_sync(State(state): State<AppState>) -> Result<Json<SyncReport>, ApiError> {
    let report = state.engine.run_full_sync().await?;
    Ok(Json(report))
}

async fn sync_person(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SyncReport>, ApiError> {
    let id: PersonId = id
        .parse()
        .map_err(|_| ApiError::bad_request("invalid person id"))?;
    let report = state.engine.sync_single_person(&id).await?;
    Ok(Json(report))
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    last_run: Option<SyncRun>,
    pending_reviews: u64,
    auto_sync_enabled: bool,
    next_runs: Vec<DateTime<Utc>>,
}

async fn sync_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let (last_run, pending_reviews, settings) = state.db.with_conn(|conn| {
        let last_run = SqliteRunRepository::new(conn).latest()?;
        let pending_reviews = SqliteReviewRepository::new(conn).count_pending()?;
        let settings = SqliteSettingsRepository::new(conn).load()?;
        Ok((last_run, pending_reviews, settings))
    })?;

    let next_runs = if settings.auto_sync_enabled {
        next_run_times(&settings, Utc::now())?
    } else {
        Vec::new()
    };

    Ok(Json(StatusResponse {
        last_run,
        pending_reviews,
        auto_sync_enabled: settings.auto_sync_enabled,
        next_runs,
    }))
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    status: Option<String>,
    person_id: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Serialize)]
struct LogResponse {
    entries: Vec<SyncLogEntry>,
    total: u64,
}

async fn sync_log(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<Json<LogResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<SyncLogStatus>)
        .transpose()
        .map_err(ApiError::bad_request)?;
    let person_id = query
        .person_id
        .as_deref()
        .map(str::parse::<PersonId>)
        .transpose()
        .map_err(|_| ApiError::bad_request("invalid person id"))?;

    let filter = SyncLogFilter { status, person_id };
    let limit = query.limit.unwrap_or(50).min(500);
    let offset = query.offset.unwrap_or(0);

    let (entries, total) = state.db.with_conn(|conn| {
        let repo = SqliteSyncLogRepository::new(conn);
        Ok((repo.list(&filter, limit, offset)?, repo.count(&filter)?))
    })?;

    Ok(Json(LogResponse { entries, total }))
}

async fn list_reviews(State(state): State<AppState>) -> Result<Json<Vec<ReviewItem>>, ApiError> {
    let items = state
        .db
        .with_conn(|conn| SqliteReviewRepository::new(conn).list_pending())?;
    Ok(Json(items))
}

async fn resolve_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(resolution): Json<ReviewResolution>,
) -> Result<Json<ReviewItem>, ApiError> {
    let id: ReviewId = id
        .parse()
        .map_err(|_| ApiError::bad_request("invalid review id"))?;
    let item = state.engine.resolve_review(&id, &resolution)?;
    Ok(Json(item))
}

async fn dismiss_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReviewItem>, ApiError> {
    let id: ReviewId = id
        .parse()
        .map_err(|_| ApiError::bad_request("invalid review id"))?;
    let item = state
        .db
        .with_conn(|conn| SqliteReviewRepository::new(conn).dismiss(&id))?;
    Ok(Json(item))
}

async fn list_archives(
    State(state): State<AppState>,
) -> Result<Json<Vec<ArchivedPerson>>, ApiError> {
    let entries = state
        .db
        .with_conn(|conn| SqliteArchiveRepository::new(conn).list_unrestored())?;
    Ok(Json(entries))
}

async fn restore_archive(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Person>, ApiError> {
    let id: ArchiveId = id
        .parse()
        .map_err(|_| ApiError::bad_request("invalid archive id"))?;
    let person = state
        .db
        .with_conn(|conn| ArchiveManager::new(conn).restore(&id))?;
    Ok(Json(person))
}

#[derive(Debug, Serialize)]
struct PurgeResponse {
    purged: usize,
}

async fn purge_archives(State(state): State<AppState>) -> Result<Json<PurgeResponse>, ApiError> {
    let purged = state
        .db
        .with_conn(|conn| ArchiveManager::new(conn).purge_expired())?;
    Ok(Json(PurgeResponse { purged }))
}

async fn get_settings(State(state): State<AppState>) -> Result<Json<SyncSettings>, ApiError> {
    let settings = state
        .db
        .with_conn(|conn| SqliteSettingsRepository::new(conn).load())?;
    Ok(Json(settings))
}

async fn put_settings(
    State(state): State<AppState>,
    Json(settings): Json<SyncSettings>,
) -> Result<Json<SyncSettings>, ApiError> {
    state
        .db
        .with_conn(|conn| SqliteSettingsRepository::new(conn).save(&settings))?;
    tracing::info!("Sync settings updated");
    Ok(Json(settings))
}
