//! HTTP surface.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Search form |
//! | `POST` | `/search` | Title search (form field `query`), JSON array of hits |
//! | `GET`  | `/process-data` | Ingest one batch from each source |
//! | `GET`  | `/similarity-score` | Abstract similarity for `?doi=` or the default DOI |
//! | `GET`  | `/health` | Health check |
//!
//! Errors are returned as `{ "error": { "code": ..., "message": ... } }`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::app::App;
use crate::index::SearchHit;
use crate::ingest::{IngestError, IngestReport};
use crate::similarity::{SimilarityError, SimilarityReport};

const INDEX_PAGE: &str = r#"<!doctype html>
<html>
  <head><title>Paper search</title></head>
  <body>
    <form action="/search" method="post">
      <input type="text" name="query" placeholder="Search titles">
      <button type="submit">Search</button>
    </form>
  </body>
</html>
"#;

/// Start the HTTP server on the configured bind address.
pub async fn run_server(app: App) -> anyhow::Result<()> {
    let bind = app.config.bind.clone();
    let router = router(app);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("HTTP server listening on http://{}", bind);
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn router(app: App) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/search", post(handle_search))
        .route("/process-data", get(handle_process_data))
        .route("/similarity-score", get(handle_similarity))
        .route("/health", get(handle_health))
        .with_state(app)
}

// ============ Errors ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

fn upstream(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "upstream",
        message: message.into(),
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Io { .. } => AppError {
                status: StatusCode::NOT_FOUND,
                code: "not_found",
                message: err.to_string(),
            },
            IngestError::Misaligned { .. } | IngestError::Record(_) => AppError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                code: "bad_input",
                message: err.to_string(),
            },
            IngestError::Index(_) => upstream(err.to_string()),
        }
    }
}

impl From<SimilarityError> for AppError {
    fn from(err: SimilarityError) -> Self {
        upstream(err.to_string())
    }
}

// ============ Handlers ============

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

#[derive(Deserialize)]
struct SearchForm {
    #[serde(default)]
    query: String,
}

async fn handle_search(
    State(app): State<App>,
    Form(form): Form<SearchForm>,
) -> Result<Json<Vec<SearchHit>>, AppError> {
    let hits = app
        .gateway
        .search(&form.query)
        .await
        .map_err(|e| upstream(format!("{:#}", e)))?;
    Ok(Json(hits))
}

async fn handle_process_data(State(app): State<App>) -> Result<Json<Vec<IngestReport>>, AppError> {
    let reports = app
        .pipeline
        .process_data(&app.config.files, app.config.batch_size)
        .await?;
    Ok(Json(reports))
}

#[derive(Deserialize)]
struct SimilarityQuery {
    doi: Option<String>,
}

async fn handle_similarity(
    State(app): State<App>,
    Query(query): Query<SimilarityQuery>,
) -> Result<Json<Option<SimilarityReport>>, AppError> {
    let doi = query
        .doi
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| app.config.default_doi.clone());
    let report = app.similarity.score_doi(doi.trim()).await?;
    if report.is_none() {
        tracing::info!("No similarity score for {}", doi);
    }
    Ok(Json(report))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    index: String,
}

async fn handle_health(State(app): State<App>) -> Result<Json<HealthResponse>, AppError> {
    let index = app.gateway.index_name().to_string();
    app.gateway
        .ping()
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        index,
    }))
}
