//! Route handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{ApiError, AppState};
use crate::domain::queue_name_for;
use crate::error::Error;
use crate::model::{Filter, Update, Watcher, WatcherId};
use crate::queue::SubmitResult;
use crate::scheduler::control::{Decision, decide};

type ApiResult = std::result::Result<Response, ApiError>;

fn parse_id(raw: &str) -> std::result::Result<WatcherId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::not_found(format!("invalid watcher id '{raw}': {e}")))
}

fn queue_name(raw: &str) -> std::result::Result<&str, ApiError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::not_found("blank queue name"));
    }
    Ok(name)
}

fn enqueued_body(result: SubmitResult) -> Json<serde_json::Value> {
    Json(json!({ "enqueued": result == SubmitResult::Enqueued }))
}

// ============================================================================
// Index
// ============================================================================

/// `GET /`
pub async fn index() -> impl IntoResponse {
    Json(json!({
        "name": "Pricewatcher API server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============================================================================
// Queues
// ============================================================================

/// `GET /queues`
pub async fn list_queues(State(state): State<AppState>) -> impl IntoResponse {
    let queues: Vec<String> = state.queues.queue_names().into_iter().collect();
    Json(json!({ "queues": queues }))
}

/// `GET /queues/:name`: snapshot, front first.
pub async fn queue_jobs(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult {
    let name = queue_name(&name)?;
    let jobs = state.queues.peek(name)?;
    Ok(Json(json!({ "jobs": jobs })).into_response())
}

/// `GET /queues/:name/next`: pops the front job. An empty queue answers
/// 200 with no body; an unknown queue is a server error.
pub async fn next_job(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult {
    let name = queue_name(&name)?;
    match state.queues.pop(name)? {
        Some(watcher) => Ok(Json(watcher).into_response()),
        None => Ok(StatusCode::OK.into_response()),
    }
}

/// `POST /queues/:name/add` with a watcher as body.
pub async fn add_job(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult {
    let name = queue_name(&name)?;
    let watcher: Watcher = serde_json::from_slice(&body)
        .map_err(|e| ApiError::internal(format!("bad watcher body for '{name}': {e}")))?;

    let result = state.queues.submit(name, watcher)?;
    Ok(enqueued_body(result).into_response())
}

// ============================================================================
// Prices
// ============================================================================

/// `POST /prices/update/:id` with an update as body.
///
/// The body's `id` may be left out. If present it has to agree with the path.
pub async fn update_price(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult {
    let id = parse_id(&id)?;
    let mut update: Update = serde_json::from_slice(&body)
        .map_err(|e| ApiError::not_acceptable(format!("bad update body: {e}")))?;

    if update.id == WatcherId::default() {
        update.id = id;
    } else if update.id != id {
        return Err(ApiError::not_acceptable(format!(
            "update for watcher {} posted to watcher {id}",
            update.id
        )));
    }

    state.store.blocking(move |store| store.update(&update)).await?;
    Ok(StatusCode::OK.into_response())
}

// ============================================================================
// Watchers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct WatcherQuery {
    url: Option<String>,
    domain: Option<String>,
}

impl WatcherQuery {
    fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn domain(&self) -> Option<&str> {
        self.domain.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// `GET /watchers?url=&domain=`
pub async fn list_watchers(
    State(state): State<AppState>,
    Query(query): Query<WatcherQuery>,
) -> ApiResult {
    let mut filter = Filter::new();
    if let Some(url) = query.url() {
        filter.insert("url".to_string(), url.to_string());
    }
    if let Some(domain) = query.domain() {
        filter.insert("domain".to_string(), domain.to_string());
    }

    let watchers = state.store.blocking(move |store| store.list(&filter)).await?;
    Ok(Json(watchers).into_response())
}

/// `GET /watchers/create?url=&domain=`: the domain is guessed from the url
/// when omitted.
pub async fn create_watcher(
    State(state): State<AppState>,
    Query(query): Query<WatcherQuery>,
) -> ApiResult {
    let url = query
        .url()
        .ok_or_else(|| ApiError::not_acceptable("missing url"))?
        .to_string();
    let domain = state
        .store
        .registry()
        .resolve(&url, query.domain())
        .map_err(ApiError::not_acceptable)?;

    let id = state
        .store
        .blocking(move |store| store.create(&domain, &url))
        .await
        .map_err(|e| match e {
            Error::Validation(_) => ApiError::not_acceptable(e),
            e => ApiError::internal(e),
        })?;

    info!(%id, "watcher created");
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))).into_response())
}

/// `GET /watchers/delete/:id`
pub async fn delete_watcher(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    let removed = state.store.blocking(move |store| store.remove(id)).await?;
    Ok(Json(json!({ "removed": removed })).into_response())
}

/// `GET /watchers/run`: one sweep into the local queues.
pub async fn run_all(State(state): State<AppState>) -> ApiResult {
    let report = state.scheduler.sweep().await?;
    Ok(Json(report).into_response())
}

/// `GET /watchers/run/:id`: queue one watcher if it is due. A fresh or
/// in-flight watcher answers `{"enqueued": false}`.
pub async fn run_one(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = parse_id(&id)?;
    let watcher = state
        .store
        .blocking(move |store| store.get(id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("watcher {id}")))?;

    let threshold = state.scheduler.config().staleness_threshold();
    let decision = decide(&watcher, Utc::now(), threshold);
    if decision != Decision::Due {
        info!(%id, ?decision, "watcher not due, not queued");
        return Ok(Json(json!({ "enqueued": false })).into_response());
    }

    let result = state
        .queues
        .submit(&queue_name_for(&watcher.domain), watcher.clone())?;
    state
        .store
        .blocking(move |store| store.mark_checking(&watcher))
        .await?;

    Ok(enqueued_body(result).into_response())
}
