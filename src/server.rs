//! HTTP server.
//!
//! Exposes search with highlighted results and the facet lists that drive
//! the front-end's filter dropdowns.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/search` | Filtered search; form fields `query`, `file_type`, `size`, `date_range`, `uploaded_by`, `category` |
//! | `GET`  | `/filetypes` | Distinct `file_type` values |
//! | `GET`  | `/uploaders` | Distinct `uploaded_by` values |
//! | `GET`  | `/categories` | Distinct `Category` values |
//! | `GET`  | `/health` | Health check (returns version, no auth) |
//!
//! Every endpoint except `/health` requires HTTP Basic credentials.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "search_error", "message": "Search service error" } }
//! ```
//!
//! Error codes: `unauthorized` (401), `search_error` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::assemble::ResultAssembler;
use crate::auth::{CredentialTable, Identity};
use crate::blob::BlobStore;
use crate::cache::ArtifactCache;
use crate::config::Config;
use crate::filter::SearchFilters;
use crate::grant::S3Presigner;
use crate::models::EnrichedHit;
use crate::query::Query;
use crate::s3::{S3BlobStore, S3Location};
use crate::search::{AzureSearchClient, FacetField, SearchService};
use crate::sigv4::Credentials;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    search: Arc<dyn SearchService>,
    assembler: Arc<ResultAssembler>,
    credentials: Arc<CredentialTable>,
}

impl AppState {
    pub fn new(
        search: Arc<dyn SearchService>,
        assembler: ResultAssembler,
        credentials: CredentialTable,
    ) -> Self {
        Self {
            search,
            assembler: Arc::new(assembler),
            credentials: Arc::new(credentials),
        }
    }

    /// Wire up the production collaborators from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let search = AzureSearchClient::from_config(&config.search)?;
        let creds = Credentials::from_env()?;
        let location = S3Location::from_config(&config.storage);
        let store: Arc<dyn BlobStore> =
            Arc::new(S3BlobStore::new(location.clone(), creds.clone())?);
        let issuer = Arc::new(S3Presigner::new(location, creds, config.storage.url_ttl_secs));
        let cache = ArtifactCache::new(store.clone(), config.storage.artifact_naming);
        let credentials = CredentialTable::from_config(&config.auth)?;
        if credentials.is_empty() {
            tracing::warn!("no users configured; every authenticated request will be rejected");
        }
        Ok(Self::new(
            Arc::new(search),
            ResultAssembler::new(store, cache, issuer),
            credentials,
        ))
    }
}

impl FromRef<AppState> for Arc<CredentialTable> {
    fn from_ref(state: &AppState) -> Self {
        state.credentials.clone()
    }
}

/// Builds the router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", post(handle_search))
        .route("/filetypes", get(handle_filetypes))
        .route("/uploaders", get(handle_uploaders))
        .route("/categories", get(handle_categories))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "docmark listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"search_error"`).
    code: String,
    message: String,
}

/// Builds a JSON error response in the shared error shape.
pub fn error_response(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: code.into(),
            message: message.into(),
        },
    };
    (status, Json(body)).into_response()
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error_response(self.status, self.code, self.message)
    }
}

/// 500 for a failed search call. Details are logged, not returned.
fn search_error() -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "search_error",
        message: "Search service error".to_string(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /search ============

/// Search form submission.
#[derive(Debug, Deserialize, Default)]
pub struct SearchForm {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub date_range: String,
    #[serde(default)]
    pub uploaded_by: String,
    #[serde(default)]
    pub category: String,
}

impl SearchForm {
    fn filters(&self) -> SearchFilters {
        SearchFilters {
            file_type: self.file_type.clone(),
            size: self.size.clone(),
            date_range: self.date_range.clone(),
            uploaded_by: self.uploaded_by.clone(),
            category: self.category.clone(),
        }
    }
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<EnrichedHit>,
}

async fn handle_search(
    State(state): State<AppState>,
    identity: Identity,
    Form(form): Form<SearchForm>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = Query::parse(&form.query);
    let filter = form.filters().to_filter(&identity, Utc::now());
    tracing::debug!(user = %identity, filter = %filter, "search");

    let hits = state
        .search
        .search(&form.query, &filter)
        .await
        .map_err(|e| {
            tracing::error!(user = %identity, error = %format!("{:#}", e), "search failure");
            search_error()
        })?;

    let results = state.assembler.assemble(&identity, hits, &query).await;
    tracing::info!(user = %identity, results = results.len(), "search served");
    Ok(Json(SearchResponse { results }))
}

// ============ Facets ============

#[derive(Serialize)]
struct FileTypesResponse {
    file_types: Vec<String>,
}

#[derive(Serialize)]
struct UploadersResponse {
    uploaders: Vec<String>,
}

#[derive(Serialize)]
struct CategoriesResponse {
    categories: Vec<String>,
}

/// Facet values, or an empty list when the search service fails.
async fn facet_values(state: &AppState, field: FacetField) -> Vec<String> {
    match state.search.facet(field).await {
        Ok(values) => values,
        Err(e) => {
            tracing::error!(facet = field.field(), error = %format!("{:#}", e), "facet error");
            Vec::new()
        }
    }
}

async fn handle_filetypes(State(state): State<AppState>, _: Identity) -> Json<FileTypesResponse> {
    Json(FileTypesResponse {
        file_types: facet_values(&state, FacetField::FileType).await,
    })
}

async fn handle_uploaders(State(state): State<AppState>, _: Identity) -> Json<UploadersResponse> {
    Json(UploadersResponse {
        uploaders: facet_values(&state, FacetField::UploadedBy).await,
    })
}

async fn handle_categories(
    State(state): State<AppState>,
    _: Identity,
) -> Json<CategoriesResponse> {
    Json(CategoriesResponse {
        categories: facet_values(&state, FacetField::Category).await,
    })
}
