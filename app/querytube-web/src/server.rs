//! HTTP front end: the search page, a fragment endpoint for partial refreshes
//! and a JSON API over the same ranking service.

use axum::{
    extract::{Query, State as AxumState},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use querytube::presentation::{render_fragment, render_page, PageView, ResultCard, STATUS_WAITING};
use querytube::{SearchError, SearchOutcome, SearchService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    service: Arc<SearchService>,
}

impl AppState {
    pub fn new(service: Arc<SearchService>) -> Self {
        Self { service }
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiSearchRequest {
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ApiSearchResponse {
    query: String,
    count: usize,
    results: Vec<ResultCard>,
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    indexed: usize,
    dimension: usize,
    model: String,
}

fn status_for(error: &SearchError) -> StatusCode {
    match error {
        SearchError::EmptyQuery => StatusCode::BAD_REQUEST,
        SearchError::EmbeddingUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        SearchError::Initialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// JSON error body with the status code mapped from the search error.
struct ApiFailure(SearchError);

impl From<SearchError> for ApiFailure {
    fn from(error: SearchError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let body = Json(ApiError {
            error: self.0.user_message().to_string(),
        });
        (status_for(&self.0), body).into_response()
    }
}

/// Run one submission off the async runtime; embedding is CPU-bound.
async fn respond(service: Arc<SearchService>, query: String) -> SearchOutcome {
    match tokio::task::spawn_blocking(move || service.respond(&query)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "Search task failed");
            let error = SearchError::EmbeddingUnavailable(e.to_string());
            SearchOutcome {
                status: error.user_message().to_string(),
                results_html: String::new(),
                cards: Vec::new(),
                error: Some(error),
            }
        }
    }
}

async fn index_page(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<SearchParams>,
) -> Html<String> {
    let config = state.service.config();
    let query = params.q.unwrap_or_default();

    let outcome = if query.is_empty() {
        None
    } else {
        Some(respond(state.service.clone(), query.clone()).await)
    };
    let (status, results_html) = match &outcome {
        Some(outcome) => (outcome.status.as_str(), outcome.results_html.as_str()),
        None => (STATUS_WAITING, ""),
    };

    Html(render_page(&PageView {
        query: &query,
        status,
        results_html,
        channel_name: &config.catalog.channel_name,
        example_queries: &config.search.example_queries,
    }))
}

async fn search_fragment(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<SearchParams>,
) -> (StatusCode, Html<String>) {
    let outcome = respond(state.service.clone(), params.q.unwrap_or_default()).await;
    let code = outcome.error.as_ref().map(status_for).unwrap_or(StatusCode::OK);
    (
        code,
        Html(render_fragment(&outcome.status, &outcome.results_html)),
    )
}

async fn api_search(
    AxumState(state): AxumState<AppState>,
    Json(payload): Json<ApiSearchRequest>,
) -> Result<Json<ApiSearchResponse>, ApiFailure> {
    let service = state.service.clone();
    let query = payload.query.trim().to_string();
    let k = payload.k;

    let ranked = {
        let query = query.clone();
        tokio::task::spawn_blocking(move || {
            service
                .search(&query, k)
                .map(|results| service.cards(&results))
        })
        .await
        .map_err(|e| SearchError::EmbeddingUnavailable(e.to_string()))?
    };

    let results = ranked.map_err(|e| {
        if !matches!(e, SearchError::EmptyQuery) {
            tracing::warn!(query = %query, error = %e, "API search failed");
        }
        e
    })?;

    Ok(Json(ApiSearchResponse {
        query,
        count: results.len(),
        results,
    }))
}

async fn health_check(AxumState(state): AxumState<AppState>) -> Json<HealthResponse> {
    let stats = state.service.stats();
    Json(HealthResponse {
        status: "ok",
        indexed: stats.indexed,
        dimension: stats.dimension,
        model: stats.model,
    })
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_page))
        .route("/search", get(search_fragment))
        .route("/api/search", post(api_search))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(service: Arc<SearchService>, bind: &str) -> anyhow::Result<()> {
    let app = router(AppState::new(service));

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("QueryTube listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
