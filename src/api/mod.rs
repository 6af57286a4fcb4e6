//! HTTP surface for workers and clients.
//!
//! Workers poll `/queues/*` for jobs and post prices to `/prices/update/:id`.
//! The `/watchers/*` routes manage watchers for a frontend.
//!
//! ## Routes
//!
//! - `GET  /`                       server name and version
//! - `GET  /queues`                 `{ "queues": [name, ...] }`
//! - `GET  /queues/:name`           `{ "jobs": [Watcher, ...] }`, non-destructive
//! - `GET  /queues/:name/next`      pop one watcher; empty body when the queue is empty
//! - `POST /queues/:name/add`       enqueue a watcher (deduplicated by id)
//! - `POST /prices/update/:id`      append a price to a watcher
//! - `GET  /watchers?url=&domain=`  list watchers
//! - `GET  /watchers/create?url=&domain=`
//! - `GET  /watchers/delete/:id`
//! - `GET  /watchers/run`           queue every stale watcher
//! - `GET  /watchers/run/:id`       queue one watcher now

mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::queue::QueueManager;
use crate::scheduler::{LocalSubmitter, Scheduler, SchedulerConfig};
use crate::storage::WatcherStore;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: WatcherStore,
    pub queues: Arc<QueueManager>,
    /// Sweeps into `queues` directly, for the `/watchers/run` route.
    pub scheduler: Scheduler,
}

impl AppState {
    pub fn new(store: WatcherStore, queues: Arc<QueueManager>, config: SchedulerConfig) -> Self {
        let submitter = Arc::new(LocalSubmitter::new(Arc::clone(&queues)));
        let scheduler = Scheduler::new(store.clone(), submitter, config);
        Self {
            store,
            queues,
            scheduler,
        }
    }
}

/// Build the router with request tracing and permissive CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::index))
        .route("/queues", get(handlers::list_queues))
        .route("/queues/:name", get(handlers::queue_jobs))
        .route("/queues/:name/next", get(handlers::next_job))
        .route("/queues/:name/add", post(handlers::add_job))
        .route("/prices/update/:id", post(handlers::update_price))
        .route("/watchers", get(handlers::list_watchers))
        .route("/watchers/create", get(handlers::create_watcher))
        .route("/watchers/delete/:id", get(handlers::delete_watcher))
        .route("/watchers/run", get(handlers::run_all))
        .route("/watchers/run/:id", get(handlers::run_one))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    addr: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(address = %listener.local_addr()?, "webserver listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// A failed request: the status to answer with and what to log.
///
/// The body is only the status text; the detail goes to the log.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl std::fmt::Display) -> Self {
        Self {
            status,
            detail: detail.to_string(),
        }
    }

    pub fn internal(detail: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }

    pub fn not_found(detail: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn not_acceptable(detail: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::NOT_ACCEPTABLE, detail)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self::internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, "{}", self.detail);
        } else {
            info!(status = %self.status, "{}", self.detail);
        }
        let text = self.status.canonical_reason().unwrap_or("error");
        (self.status, text).into_response()
    }
}
