use anyhow::Result;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use reviewrank_core::tokenizer::tokenize;
use reviewrank_core::{IndexError, IndexReader, Searcher};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    /// "vector" (default) or "lm"
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Mixture weight for mode=lm
    #[serde(default = "default_lambda")]
    pub lambda: f64,
}
fn default_k() -> usize { 10 }
fn default_mode() -> String { "vector".to_string() }
fn default_lambda() -> f64 { 0.5 }

#[derive(Deserialize)]
pub struct ProductParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<ReviewHit>,
}

#[derive(Serialize)]
pub struct ReviewHit {
    pub review_id: u32,
    pub score: f64,
    pub product_id: String,
    pub review_score: u8,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub query: String,
    pub took_s: f64,
    pub products: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub reader: Arc<IndexReader>,
}

pub fn build_app(index_dir: &Path) -> Result<Router> {
    // Load the whole index header at startup; queries only touch posting blobs
    let reader = Arc::new(IndexReader::open(index_dir)?);
    let state = AppState { reader };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/products", get(products_handler))
        .route("/review/:review_id", get(review_handler))
        .with_state(state)
        .layer(cors);
    Ok(app)
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> std::result::Result<Json<SearchResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    let terms = tokenize(&params.q);
    let searcher = Searcher::new(&state.reader);
    let k = params.k.clamp(1, 100);

    let ranked = match params.mode.as_str() {
        "lm" => searcher.language_model_search(&terms, params.lambda, k),
        "vector" => searcher.vector_space_search(&terms, k),
        other => return Err((StatusCode::BAD_REQUEST, format!("unknown mode {other:?}"))),
    }
    .map_err(internal)?;

    let mut results = Vec::with_capacity(ranked.len());
    for (review_id, score) in ranked {
        let meta = state.reader.review_metadata(review_id).map_err(internal)?;
        results.push(ReviewHit {
            review_id,
            score,
            product_id: meta.product_id,
            review_score: meta.score,
        });
    }
    Ok(Json(SearchResponse {
        query: params.q,
        took_s: start.elapsed().as_secs_f64(),
        total_hits: results.len(),
        results,
    }))
}

pub async fn products_handler(
    State(state): State<AppState>,
    Query(params): Query<ProductParams>,
) -> std::result::Result<Json<ProductResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    let terms = tokenize(&params.q);
    let searcher = Searcher::new(&state.reader);
    let k = params.k.clamp(1, 100);
    let products = searcher.product_search(&terms, k).map_err(internal)?;
    Ok(Json(ProductResponse {
        query: params.q,
        took_s: start.elapsed().as_secs_f64(),
        products,
    }))
}

pub async fn review_handler(
    State(state): State<AppState>,
    UrlPath(review_id): UrlPath<u32>,
) -> std::result::Result<Json<serde_json::Value>, (StatusCode, String)> {
    match state.reader.review_metadata(review_id) {
        Ok(meta) => Ok(Json(serde_json::json!({
            "review_id": review_id,
            "product_id": meta.product_id,
            "score": meta.score,
            "helpfulness": format!("{}/{}", meta.helpfulness_numerator, meta.helpfulness_denominator),
            "length": meta.length,
        }))),
        Err(IndexError::ReviewOutOfRange(_)) => {
            Err((StatusCode::NOT_FOUND, format!("review {review_id} not found")))
        }
        Err(e) => Err(internal(e)),
    }
}

fn internal(e: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
