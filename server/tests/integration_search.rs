use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use reviewrank_core::writer::IndexWriter;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use tower::ServiceExt;

fn build_tiny_index(dir: &Path) -> PathBuf {
    let corpus = dir.join("corpus.txt");
    fs::write(
        &corpus,
        "product/productId: B0001\n\
         review/helpfulness: 1/1\n\
         review/score: 5.0\n\
         review/text: rust is great rust\n\
         product/productId: B0002\n\
         review/helpfulness: 2/3\n\
         review/score: 3.0\n\
         review/text: learning rust slowly\n",
    )
    .unwrap();
    let index = dir.join("index");
    IndexWriter::new().write(&corpus, &index).unwrap();
    index
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let resp = app
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let dir = tempdir().unwrap();
    let index = build_tiny_index(dir.path());
    let app = reviewrank_server::build_app(&index).unwrap();

    let (status, json) = get(app, "/search?q=rust&k=2").await;
    assert_eq!(status, StatusCode::OK);
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    // review 0 mentions rust twice and outranks review 1
    assert_eq!(results[0]["review_id"], 0);
    assert_eq!(results[0]["product_id"], "B0001");
    assert_eq!(results[1]["review_id"], 1);
}

#[tokio::test]
async fn language_model_mode_ranks_by_likelihood() {
    let dir = tempdir().unwrap();
    let index = build_tiny_index(dir.path());
    let app = reviewrank_server::build_app(&index).unwrap();

    let (status, json) = get(app, "/search?q=rust&k=2&mode=lm&lambda=1.0").await;
    assert_eq!(status, StatusCode::OK);
    let results = json["results"].as_array().unwrap();
    // tf/len: 2/4 for review 0, 1/3 for review 1
    assert_eq!(results[0]["review_id"], 0);
    assert_eq!(results[1]["review_id"], 1);
}

#[tokio::test]
async fn product_search_returns_product_ids() {
    let dir = tempdir().unwrap();
    let index = build_tiny_index(dir.path());
    let app = reviewrank_server::build_app(&index).unwrap();

    let (status, json) = get(app, "/products?q=rust&k=5").await;
    assert_eq!(status, StatusCode::OK);
    let products = json["products"].as_array().unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(products[0], "B0001");
}

#[tokio::test]
async fn review_lookup_distinguishes_missing_from_present() {
    let dir = tempdir().unwrap();
    let index = build_tiny_index(dir.path());

    let app = reviewrank_server::build_app(&index).unwrap();
    let (status, json) = get(app, "/review/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["product_id"], "B0002");
    assert_eq!(json["helpfulness"], "2/3");

    let app = reviewrank_server::build_app(&index).unwrap();
    let (status, _) = get(app, "/review/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
