//! HTTP dispatch server.
//!
//! Routes `/{engine}/search` and `/{engine}/image` to the named engine in a
//! registry that is built once and only read afterwards. Every engine error
//! becomes a JSON error body; no request can take the process down.
//!
//! Lifecycle: `Created -> Listening -> ShuttingDown -> Stopped`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query as QueryParams, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::page::Navigator;
use crate::result::{apply_limit, deduplicate};
use crate::{DateInterval, Engine, EngineRegistry, Query, Result, SearchError, SearchResult};

/// Lifecycle of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Listening,
    ShuttingDown,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Web,
    Image,
}

/// Query string accepted by the search endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub text: Option<String>,
    pub page: Option<u32>,
    pub site: Option<String>,
    pub file: Option<String>,
    /// `YYYYMMDD..YYYYMMDD`
    pub date: Option<String>,
    pub limit: Option<usize>,
}

impl SearchParams {
    fn into_query(self) -> Result<Query> {
        let mut query = Query::new(self.text.unwrap_or_default()).with_page(self.page.unwrap_or(1));
        if let Some(site) = self.site.filter(|s| !s.trim().is_empty()) {
            query = query.with_site(site.trim());
        }
        if let Some(file) = self.file.filter(|s| !s.trim().is_empty()) {
            query = query.with_filetype(file.trim());
        }
        if let Some(date) = self.date.filter(|s| !s.trim().is_empty()) {
            query = query.with_date_interval(DateInterval::parse(&date)?);
        }
        if let Some(limit) = self.limit {
            query = query.with_limit(limit);
        }
        Ok(query)
    }
}

/// JSON error body: `{"engine", "kind", "error"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub engine: String,
    pub kind: String,
    pub error: String,
}

/// An error on its way to the client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(engine: &str, err: &SearchError) -> Self {
        Self {
            status: StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body: ErrorBody {
                engine: engine.to_string(),
                kind: err.kind().to_string(),
                error: err.to_string(),
            },
        }
    }

    fn internal(engine: &str, message: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody {
                engine: engine.to_string(),
                kind: "internal".to_string(),
                error: message,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Clone)]
struct AppState {
    registry: Arc<EngineRegistry>,
}

#[derive(Debug, Serialize)]
struct EngineInfo<'a> {
    name: &'a str,
    initialized: bool,
}

/// Builds the HTTP routes over a registry.
pub fn router(registry: Arc<EngineRegistry>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/engines", get(list_engines))
        .route("/:engine/search", get(web_search))
        .route("/:engine/image", get(image_search))
        .with_state(AppState { registry })
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_engines(State(state): State<AppState>) -> Response {
    let engines: Vec<EngineInfo<'_>> = state
        .registry
        .names()
        .into_iter()
        .filter_map(|name| {
            state.registry.get(name).map(|engine| EngineInfo {
                name,
                initialized: engine.is_initialized(),
            })
        })
        .collect();
    Json(engines).into_response()
}

async fn web_search(
    State(state): State<AppState>,
    Path(engine): Path<String>,
    params: std::result::Result<QueryParams<SearchParams>, QueryRejection>,
) -> std::result::Result<Json<Vec<SearchResult>>, ApiError> {
    dispatch(state, engine, params, Mode::Web).await
}

async fn image_search(
    State(state): State<AppState>,
    Path(engine): Path<String>,
    params: std::result::Result<QueryParams<SearchParams>, QueryRejection>,
) -> std::result::Result<Json<Vec<SearchResult>>, ApiError> {
    dispatch(state, engine, params, Mode::Image).await
}

async fn dispatch(
    state: AppState,
    name: String,
    params: std::result::Result<QueryParams<SearchParams>, QueryRejection>,
    mode: Mode,
) -> std::result::Result<Json<Vec<SearchResult>>, ApiError> {
    let engine = state
        .registry
        .get(&name)
        .cloned()
        .ok_or_else(|| ApiError::new(&name, &SearchError::UnknownEngine(name.clone())))?;
    let QueryParams(params) = params
        .map_err(|e| ApiError::new(&name, &SearchError::InvalidRequest(e.body_text())))?;
    let query = params.into_query().map_err(|e| ApiError::new(&name, &e))?;
    if query.composed_text().is_empty() {
        return Err(ApiError::new(&name, &SearchError::EmptyQuery));
    }
    if !engine.is_initialized() {
        return Err(ApiError::new(&name, &SearchError::NotInitialized(name.clone())));
    }

    debug!(engine = %name, mode = ?mode, text = %query.text, page = query.page, "Dispatching search");

    // Run detached so a client disconnect cannot interrupt page cleanup.
    let task = tokio::spawn(run_search(engine, query, mode));
    match task.await {
        Ok(Ok(results)) => Ok(Json(results)),
        Ok(Err(err)) => {
            warn!(engine = %name, kind = err.kind(), "Search failed: {}", err);
            Err(ApiError::new(&name, &err))
        }
        Err(join) => {
            error!(engine = %name, "Search task failed: {}", join);
            Err(ApiError::internal(&name, "search task failed".to_string()))
        }
    }
}

async fn run_search(engine: Arc<dyn Engine>, query: Query, mode: Mode) -> Result<Vec<SearchResult>> {
    engine.rate_limiter().acquire().await;
    let results = match mode {
        Mode::Web => engine.search(&query).await?,
        Mode::Image => engine.search_image(&query).await?,
    };
    let results = apply_limit(deduplicate(results), query.limit);
    if results.is_empty() {
        info!(engine = engine.name(), "No results");
    }
    Ok(results)
}

/// Dispatch server with coordinated shutdown.
///
/// [`shutdown`](Self::shutdown) may be called from any number of tasks; the
/// first caller stops the listener and releases the browser, the others wait
/// for it to finish.
pub struct Server {
    registry: Arc<EngineRegistry>,
    navigator: Option<Arc<dyn Navigator>>,
    grace: Duration,
    state: watch::Sender<ServerState>,
    stop: watch::Sender<bool>,
    serving: watch::Sender<bool>,
}

impl Server {
    pub fn new(
        registry: Arc<EngineRegistry>,
        navigator: Option<Arc<dyn Navigator>>,
        grace: Duration,
    ) -> Self {
        Self {
            registry,
            navigator,
            grace,
            state: watch::channel(ServerState::Created).0,
            stop: watch::channel(false).0,
            serving: watch::channel(false).0,
        }
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Subscribes to lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Binds `addr` and serves until shutdown.
    pub async fn listen(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener until shutdown.
    ///
    /// Fails if the server was already started or shut down.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        // `serving` goes up before anyone can observe `Listening`, so a
        // shutdown racing the start still waits for the listener to drain.
        let started = self.state.send_if_modified(|state| {
            if *state == ServerState::Created {
                self.serving.send_replace(true);
                *state = ServerState::Listening;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(SearchError::Config(format!(
                "server cannot listen in state {:?}",
                self.state()
            )));
        }

        if let Ok(addr) = listener.local_addr() {
            info!("Listening on http://{}", addr);
        }

        let mut stop = self.stop.subscribe();
        let app = router(Arc::clone(&self.registry));
        let outcome = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.wait_for(|stopped| *stopped).await;
                debug!("Listener stopping");
            })
            .await;

        self.serving.send_replace(false);
        outcome.map_err(SearchError::from)
    }

    /// Stops accepting connections, waits up to the grace period for
    /// in-flight requests, then releases the browser.
    pub async fn shutdown(&self) {
        let first = self.state.send_if_modified(|state| match *state {
            ServerState::Created | ServerState::Listening => {
                *state = ServerState::ShuttingDown;
                true
            }
            _ => false,
        });
        if !first {
            let mut state = self.state.subscribe();
            let _ = state.wait_for(|s| *s == ServerState::Stopped).await;
            return;
        }

        info!("Shutting down");
        self.stop.send_replace(true);

        let mut serving = self.serving.subscribe();
        if tokio::time::timeout(self.grace, serving.wait_for(|s| !*s))
            .await
            .is_err()
        {
            warn!(grace = ?self.grace, "In-flight requests still running after grace period");
        }

        if let Some(navigator) = &self.navigator {
            navigator.release().await;
        }

        self.state.send_replace(ServerState::Stopped);
        info!("Shutdown complete");
    }
}
