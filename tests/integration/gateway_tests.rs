//! Integration tests for the dispatch gateway and the parser service
//!
//! Routers are driven in-process with `tower::ServiceExt::oneshot`; the gateway
//! talks to either a wiremock stand-in or a real parser service bound to an
//! ephemeral port.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use pagetide::config::{FetcherConfig, GatewayConfig};
use pagetide::gateway::{self, DownstreamClient, ServiceState};
use pagetide::pipeline::Fetcher;
use pagetide::queue::{JobQueue, QueueOptions, SqliteJobQueue};
use pagetide::state::JobStatus;
use pagetide::storage::{open_pool, PageStore, SqlitePageStore};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Service {
    _dir: TempDir,
    store: Arc<SqlitePageStore>,
    queue: Arc<SqliteJobQueue>,
    router: Router,
}

fn parser_service() -> Service {
    let dir = TempDir::new().unwrap();
    let pool = open_pool(&dir.path().join("pagetide.db"), Duration::from_secs(5)).unwrap();
    let store = Arc::new(SqlitePageStore::from_pool(pool.clone()));
    let queue = Arc::new(SqliteJobQueue::from_pool(pool, QueueOptions::default()));
    let fetcher = Fetcher::new(&FetcherConfig {
        timeout_ms: 2_000,
        ..FetcherConfig::default()
    })
    .unwrap();

    let router = gateway::service_router(ServiceState::new(fetcher, store.clone(), queue.clone()));
    Service {
        _dir: dir,
        store,
        queue,
        router,
    }
}

fn gateway_for(parser_url: String) -> Router {
    let config = GatewayConfig {
        parser_url,
        request_timeout_ms: 5_000,
        ..GatewayConfig::default()
    };
    gateway::router(
        DownstreamClient::new(&config).unwrap(),
        &config.allowed_origins,
    )
}

fn encode(url: &str) -> String {
    url::form_urlencoded::byte_serialize(url.as_bytes()).collect()
}

fn post(uri: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn get(uri: String) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn site() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hello"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><title> Hello\n  World </title></html>"),
        )
        .mount(&server)
        .await;
    server
}

/// Serves `router` on an ephemeral port and returns its base address
async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_parser_service_parses_inline() {
    let site = site().await;
    let service = parser_service();
    let url = format!("{}/hello", site.uri());

    let (status, body) = call(&service.router, post(format!("/parse?url={}", encode(&url)))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Hello World");
    assert_eq!(service.store.get(&url).unwrap().unwrap().title, "Hello World");
}

#[tokio::test]
async fn test_parser_service_reports_fetch_failure() {
    let service = parser_service();

    let (status, body) = call(
        &service.router,
        post(format!("/parse?url={}", encode("http://127.0.0.1:1/"))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["detail"].as_str().unwrap().contains("Connection refused"));
    assert_eq!(service.store.count().unwrap(), 0);
}

#[tokio::test]
async fn test_parser_service_rejects_bad_url() {
    let service = parser_service();

    let (status, body) = call(
        &service.router,
        post(format!("/parse_celery?url={}", encode("ftp://example.com/"))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().starts_with("Invalid URL"));
    assert!(service.queue.counts().unwrap().is_empty());
}

#[tokio::test]
async fn test_parser_service_enqueues_and_reports_job() {
    let service = parser_service();

    let (status, body) = call(
        &service.router,
        post(format!("/parse_celery?url={}", encode("https://example.com/"))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Task started");
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let (status, job) = call(&service.router, get(format!("/jobs/{}", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["url"], "https://example.com/");
    assert_eq!(job["status"], "pending");
    assert_eq!(job["attempt_count"], 0);

    assert_eq!(
        service.queue.counts().unwrap().get(&JobStatus::Pending),
        Some(&1)
    );
}

#[tokio::test]
async fn test_parser_service_unknown_job() {
    let service = parser_service();

    let (status, _) = call(
        &service.router,
        get(format!("/jobs/{}", pagetide::queue::JobId::new())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&service.router, get("/jobs/not-a-job".to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_gateway_passes_downstream_failure_through() {
    let downstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/parse"))
        .and(query_param("url", "https://example.com/x"))
        .respond_with(ResponseTemplate::new(422).set_body_string("bad page"))
        .mount(&downstream)
        .await;

    let router = gateway_for(downstream.uri());
    let (status, body) = call(
        &router,
        post(format!("/parse?url={}", encode("https://example.com/x"))),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"], "Parser error: bad page");
}

#[tokio::test]
async fn test_gateway_transport_failure_is_500() {
    let router = gateway_for("http://127.0.0.1:1".to_string());

    let (status, body) = call(
        &router,
        post(format!("/parse?url={}", encode("https://example.com/"))),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Parser request failed:"));
}

#[tokio::test]
async fn test_gateway_rejects_malformed_job_id_without_forwarding() {
    let downstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "ok" })))
        .expect(0)
        .mount(&downstream)
        .await;

    let router = gateway_for(downstream.uri());
    for id in ["..%2Fhealth", "not-a-job"] {
        let (status, body) = call(&router, get(format!("/jobs/{}", id))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", id);
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .starts_with("Invalid job id:"));
    }

    downstream.verify().await;
}

#[tokio::test]
async fn test_gateway_end_to_end_with_parser_service() {
    let site = site().await;
    let service = parser_service();
    let parser_url = spawn_server(service.router.clone()).await;
    let router = gateway_for(parser_url);
    let url = format!("{}/hello", site.uri());

    // Synchronous path: the record exists once the gateway answers
    let (status, body) = call(&router, post(format!("/parse?url={}", encode(&url)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "message": "Parser completed" }));
    assert_eq!(service.store.get(&url).unwrap().unwrap().title, "Hello World");

    // Asynchronous path: only a job handle comes back
    let (status, body) = call(&router, post(format!("/parse_celery?url={}", encode(&url)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Task started");
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let (status, job) = call(&router, get(format!("/jobs/{}", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "pending");
}

#[tokio::test]
async fn test_gateway_cors_allows_configured_origin_only() {
    let router = gateway_for("http://127.0.0.1:1".to_string());

    let request = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "http://localhost:8000")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:8000"
    );
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .unwrap(),
        "true"
    );

    let request = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "http://evil.example")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
