mod common;

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use imretrieval::config::{ConfDir, SearchOptions};
use imretrieval::embed::{Embedder, ThumbnailEmbedder};
use imretrieval::index::FlatIndex;
use imretrieval::server::{API_KEY_HEADER, AppState, create_app};
use imretrieval::store::{CatalogStore, IndexEntry};
use imretrieval::{IMDB, SearchService};
use rstest::*;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "imretrieval-test-boundary";
const KEY: &str = "secret";

fn embedder() -> Box<dyn Embedder> {
    Box::new(ThumbnailEmbedder::new(4))
}

/// 每个商品两张图片，共三个商品
fn imdb() -> IMDB {
    let embedder = ThumbnailEmbedder::new(4);
    let mut vectors = vec![];
    let mut entries = vec![];
    for p in 0..3 {
        for i in 0..2 {
            let image = image::DynamicImage::ImageRgb8(common::solid_image(common::PALETTE[p], i));
            vectors.push(embedder.embed(&image).unwrap());
            entries.push(IndexEntry {
                image_id: (p * 2) as i64 + i as i64,
                product_id: p as i64 + 1,
                image_url: common::image_name(p, i as usize),
            });
        }
    }
    IMDB::from_parts(FlatIndex::build(&vectors).unwrap(), CatalogStore::new(entries)).unwrap()
}

fn app(service: SearchService<Box<dyn Embedder>>, conf_dir: &TempDir) -> Router {
    let search = SearchOptions { top_k: 50, limit: 10, max_top_k: 100 };
    let state = AppState::new(service, ConfDir::new(conf_dir.path()), Some(KEY.to_string()), search);
    create_app(state)
}

#[fixture]
fn conf_dir() -> TempDir {
    tempfile::tempdir().unwrap()
}

fn multipart(content_type: &str, data: &[u8], fields: &[(&str, &str)]) -> Body {
    let mut body = vec![];
    for (name, value) in fields {
        let part = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        );
        body.extend_from_slice(part.as_bytes());
    }
    let file_part = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"query.png\"\r\nContent-Type: {content_type}\r\n\r\n"
    );
    body.extend_from_slice(file_part.as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

fn search_request(key: Option<&str>, content_type: &str, data: &[u8]) -> Request<Body> {
    search_request_with(key, content_type, data, &[])
}

fn search_request_with(
    key: Option<&str>,
    content_type: &str,
    data: &[u8],
    fields: &[(&str, &str)],
) -> Request<Body> {
    let mut builder = Request::post("/search")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"));
    if let Some(key) = key {
        builder = builder.header(API_KEY_HEADER, key);
    }
    builder.body(multipart(content_type, data, fields)).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn query_png() -> Vec<u8> {
    common::png_bytes(common::solid_image(common::PALETTE[1], 0))
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_without_index(conf_dir: TempDir) {
    let app = app(SearchService::new(embedder()), &conf_dir);
    let response = app.oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], false);
    assert_eq!(body["indexed_images"], 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn search_without_index_is_unavailable(conf_dir: TempDir) {
    let app = app(SearchService::new(embedder()), &conf_dir);
    let response =
        app.oneshot(search_request(Some(KEY), "image/png", &query_png())).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn search_requires_api_key(conf_dir: TempDir) {
    let app = app(SearchService::with_index(embedder(), imdb()), &conf_dir);
    let response = app
        .clone()
        .oneshot(search_request(None, "image/png", &query_png()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response =
        app.oneshot(search_request(Some("wrong"), "image/png", &query_png())).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn search_returns_deduplicated_products(conf_dir: TempDir) {
    let app = app(SearchService::with_index(embedder(), imdb()), &conf_dir);
    let response =
        app.oneshot(search_request(Some(KEY), "image/png", &query_png())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["product_id"], 2);
    assert_eq!(results[0]["image_url"], common::image_name(1, 0));
    assert_eq!(results[0]["similarity_score"], 1.0);
    assert!(results[0].get("image_id").is_none());
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn search_rejects_bad_uploads(conf_dir: TempDir) {
    let app = app(SearchService::with_index(embedder(), imdb()), &conf_dir);
    let response = app
        .clone()
        .oneshot(search_request(Some(KEY), "image/png", b"not an image"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response =
        app.oneshot(search_request(Some(KEY), "text/plain", &query_png())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[rstest]
#[case("top_k", "18446744073709551615")]
#[case("top_k", "1099511627776")]
#[case("top_k", "101")]
#[case("limit", "101")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn search_rejects_oversized_params(
    conf_dir: TempDir,
    #[case] name: &str,
    #[case] value: &str,
) {
    let app = app(SearchService::with_index(embedder(), imdb()), &conf_dir);
    let request = search_request_with(Some(KEY), "image/png", &query_png(), &[(name, value)]);
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // 服务仍可正常处理后续请求
    let fields = [("top_k", "100"), ("limit", "2")];
    let request = search_request_with(Some(KEY), "image/png", &query_png(), &fields);
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reload_failure_keeps_current_index(conf_dir: TempDir) {
    let app = app(SearchService::with_index(embedder(), imdb()), &conf_dir);
    let request = Request::post("/reload").header(API_KEY_HEADER, KEY).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = app.oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["indexed_images"], 6);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reload_installs_new_index(conf_dir: TempDir) {
    imdb().save(&ConfDir::new(conf_dir.path())).unwrap();
    let app = app(SearchService::new(embedder()), &conf_dir);
    let request = Request::post("/reload").header(API_KEY_HEADER, KEY).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["indexed_images"], 6);

    let response =
        app.oneshot(search_request(Some(KEY), "image/png", &query_png())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn public_endpoints(conf_dir: TempDir) {
    let app = app(SearchService::new(embedder()), &conf_dir);
    for uri in ["/", "/metrics", "/api-docs/openapi.json"] {
        let response =
            app.clone().oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
    }
}
