// src/api.rs
//! Read-only feed server over the persisted document.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::category::Category;
use crate::document::NewsDocument;
use crate::ingest::NormalizePolicy;
use crate::item::Item;
use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub document: Arc<PathBuf>,
}

impl AppState {
    pub fn new(document: impl Into<PathBuf>) -> Self {
        Self {
            document: Arc::new(document.into()),
        }
    }

    fn load(&self) -> Result<NewsDocument, ApiError> {
        let policy = NormalizePolicy::new(Utc::now());
        NewsDocument::load(&self.document, &policy)
            .map(|(doc, _)| doc)
            .map_err(|e| {
                tracing::error!(error = %e, "serving document failed");
                ApiError::Unavailable(e.to_string())
            })
    }
}

#[derive(Debug)]
pub enum ApiError {
    UnknownCategory(String),
    Unavailable(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::UnknownCategory(c) => (StatusCode::NOT_FOUND, format!("unknown category `{c}`")),
            Self::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/news.json", get(news))
        .route("/news/{category}", get(news_by_category))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Feed routes plus `/metrics`.
pub fn router(state: AppState, metrics: &Metrics) -> Router {
    create_router(state).merge(metrics.router())
}

async fn news(State(state): State<AppState>) -> Result<Json<NewsDocument>, ApiError> {
    state.load().map(Json)
}

#[derive(Serialize)]
struct CategoryFeed {
    category: Category,
    label: &'static str,
    items: Vec<Item>,
}

async fn news_by_category(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<CategoryFeed>, ApiError> {
    let category = Category::parse(&raw).ok_or(ApiError::UnknownCategory(raw))?;
    let doc = state.load()?;
    Ok(Json(CategoryFeed {
        category,
        label: category.label(),
        items: doc.items.into_iter().filter(|i| i.category == category).collect(),
    }))
}
