//! Integration tests for the gateway HTTP surface, driven through the full
//! middleware stack with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use gateway::config::Config;
use gateway::test_util::{MemoryPublisher, MockBackend, MockBehavior};
use gateway::AppState;
use modelmesh_common::{JobRecord, JobStatus, JobStore, SqliteJobStore};

const DEV_TOKEN: &str = "demo-token";

struct TestApp {
    state: Arc<AppState>,
    publisher: Arc<MemoryPublisher>,
    store: Arc<SqliteJobStore>,
}

fn test_app(throttle_limit: u32) -> TestApp {
    let mut config = Config::default();
    config.auth.dev_token = Some(DEV_TOKEN.to_string());
    config.throttle.limit = throttle_limit;

    let publisher = Arc::new(MemoryPublisher::new());
    let store = Arc::new(SqliteJobStore::in_memory().unwrap());
    let state = Arc::new(AppState::new(config, publisher.clone(), store.clone()));

    TestApp {
        state,
        publisher,
        store,
    }
}

fn authed_json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", DEV_TOKEN))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = gateway::app(test_app(60).state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], json!("ok"));
}

#[tokio::test]
async fn test_metrics_endpoint_is_prometheus_text() {
    let test = test_app(60);
    let app = gateway::app(test.state.clone());
    test.state
        .metrics
        .record_inference("m", "1", "realtime", "ok", 0.01);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("modelmesh_inference_requests_total"));
}

#[tokio::test]
async fn test_infer_happy_path() {
    let backend = MockBackend::start(MockBehavior::Fixed(
        200,
        json!({"prediction": [0.9]}),
    ))
    .await;

    let test = test_app(60);
    test.state.registry.register("m", "1", &backend.url()).await;
    let app = gateway::app(test.state);

    let response = app
        .oneshot(authed_json_request(
            "POST",
            "/v1/infer",
            json!({"model": "m", "version": "1", "input": {"data": [1.0]}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-trace-id"));
    assert_eq!(
        response.headers().get("x-ratelimit-limit").unwrap(),
        "60"
    );
    assert!(response.headers().contains_key("x-ratelimit-remaining"));
    assert!(response.headers().contains_key("x-ratelimit-reset"));

    let body = body_json(response).await;
    assert_eq!(body["model"], json!("m"));
    assert_eq!(body["version"], json!("1"));
    assert_eq!(body["prediction"], json!({"prediction": [0.9]}));
    assert!(body["latency_ms"].as_u64().is_some());
    assert!(!body["request_id"].as_str().unwrap().is_empty());
    assert_eq!(backend.hits(), 1);
}

#[tokio::test]
async fn test_trace_id_matches_response_request_id() {
    let backend = MockBackend::start(MockBehavior::Echo).await;
    let test = test_app(60);
    test.state.registry.register("m", "v1", &backend.url()).await;
    let app = gateway::app(test.state);

    let response = app
        .oneshot(authed_json_request(
            "POST",
            "/v1/infer",
            json!({"model": "m", "input": {"data": [1]}}),
        ))
        .await
        .unwrap();

    let trace_id = response
        .headers()
        .get("x-trace-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body = body_json(response).await;
    assert_eq!(body["request_id"], json!(trace_id));
}

#[tokio::test]
async fn test_client_request_id_is_echoed() {
    let app = gateway::app(test_app(60).state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "client-ref-7")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "client-ref-7"
    );
    assert!(response.headers().contains_key("x-trace-id"));
}

#[tokio::test]
async fn test_infer_unknown_model_returns_404() {
    let app = gateway::app(test_app(60).state);

    let response = app
        .oneshot(authed_json_request(
            "POST",
            "/v1/infer",
            json!({"model": "nope", "input": {"data": [1]}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], json!("model not found"));
}

#[tokio::test]
async fn test_infer_unauthenticated_returns_401() {
    let app = gateway::app(test_app(60).state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/infer")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"model": "m", "input": {}}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_infer_missing_model_returns_400() {
    let app = gateway::app(test_app(60).state);

    let response = app
        .oneshot(authed_json_request(
            "POST",
            "/v1/infer",
            json!({"input": {"data": [1]}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], json!("invalid request"));
}

#[tokio::test]
async fn test_throttle_rejects_above_limit() {
    let backend = MockBackend::start(MockBehavior::Echo).await;
    let test = test_app(3);
    test.state.registry.register("m", "v1", &backend.url()).await;
    let app = gateway::app(test.state);

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(authed_json_request(
                "POST",
                "/v1/infer",
                json!({"model": "m", "input": {"data": [1]}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(authed_json_request(
            "POST",
            "/v1/infer",
            json!({"model": "m", "input": {"data": [1]}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.headers().get("x-ratelimit-remaining").unwrap(),
        "0"
    );
    let reset: i64 = response
        .headers()
        .get("x-ratelimit-reset")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(reset > Utc::now().timestamp() - 1);
    // The throttled request never reached the backend.
    assert_eq!(backend.hits(), 3);
}

#[tokio::test]
async fn test_breaker_trips_and_fails_fast() {
    let backend = MockBackend::start(MockBehavior::Fixed(500, json!({"error": "boom"}))).await;
    let test = test_app(60);
    test.state.registry.register("m", "1", &backend.url()).await;
    let app = gateway::app(test.state);

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(authed_json_request(
                "POST",
                "/v1/infer",
                json!({"model": "m", "version": "1", "input": {"data": [1]}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
    let hits_when_tripped = backend.hits();

    let response = app
        .oneshot(authed_json_request(
            "POST",
            "/v1/infer",
            json!({"model": "m", "version": "1", "input": {"data": [1]}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    // Fail-fast: no backend I/O once the breaker opened.
    assert_eq!(backend.hits(), hits_when_tripped);
}

#[tokio::test]
async fn test_batch_submit_publishes_descriptor() {
    let test = test_app(60);
    let app = gateway::app(test.state);

    let response = app
        .oneshot(authed_json_request(
            "POST",
            "/v1/batch",
            json!({"model": "m", "version": "1", "inputs": [{"data": [1]}, {"data": [2]}, {"data": [3]}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], json!("pending"));
    let job_id = body["job_id"].as_str().unwrap().to_string();
    assert!(!job_id.is_empty());
    assert!(body["created_at"].as_str().is_some());

    let published = test.publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].job_id, job_id);
    assert_eq!(published[0].model, "m");
    assert_eq!(published[0].inputs.len(), 3);
}

#[tokio::test]
async fn test_resubmission_yields_distinct_job_ids() {
    let test = test_app(60);
    let app = gateway::app(test.state);
    let body = json!({"model": "m", "inputs": [{"data": [1]}]});

    let first = body_json(
        app.clone()
            .oneshot(authed_json_request("POST", "/v1/batch", body.clone()))
            .await
            .unwrap(),
    )
    .await;
    let second = body_json(
        app.oneshot(authed_json_request("POST", "/v1/batch", body))
            .await
            .unwrap(),
    )
    .await;

    assert_ne!(first["job_id"], second["job_id"]);
    assert_eq!(test.publisher.published().len(), 2);
}

#[tokio::test]
async fn test_batch_with_zero_inputs_rejected() {
    let test = test_app(60);
    let app = gateway::app(test.state);

    let response = app
        .oneshot(authed_json_request(
            "POST",
            "/v1/batch",
            json!({"model": "m", "inputs": []}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(test.publisher.published().is_empty());
}

#[tokio::test]
async fn test_batch_status_proxies_job_store() {
    let test = test_app(60);

    let record = JobRecord::pending(
        "job-7",
        "m",
        "1",
        vec![json!({"data": [1]}), json!({"data": [2]})],
        Utc::now(),
    );
    test.store.create(&record).await.unwrap();
    test.store
        .update_status("job-7", JobStatus::Processing, None, None)
        .await
        .unwrap();
    test.store.update_progress("job-7", 1, 0.5).await.unwrap();

    let app = gateway::app(test.state);
    let response = app
        .oneshot(authed_json_request("GET", "/v1/batch/job-7", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["job_id"], json!("job-7"));
    assert_eq!(body["status"], json!("processing"));
    assert_eq!(body["total_items"], json!(2));
    assert_eq!(body["completed"], json!(1));
    assert!((body["progress"].as_f64().unwrap() - 0.5).abs() < 1e-9);
    assert!(body.get("result_url").is_none());
}

#[tokio::test]
async fn test_batch_status_unknown_job_returns_404() {
    let app = gateway::app(test_app(60).state);

    let response = app
        .oneshot(authed_json_request("GET", "/v1/batch/missing", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], json!("job not found"));
}

#[tokio::test]
async fn test_internal_route_returns_raw_backend_payload() {
    let backend = MockBackend::start(MockBehavior::Fixed(
        200,
        json!({"prediction": [0.5], "model_ms": 3}),
    ))
    .await;
    let test = test_app(60);
    test.state.registry.register("m", "1", &backend.url()).await;
    let app = gateway::app(test.state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/route")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "request_id": "req-9",
                        "model": "m",
                        "version": "1",
                        "input": {"data": [1]}
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, json!({"prediction": [0.5], "model_ms": 3}));
}

#[tokio::test]
async fn test_admin_register_and_list() {
    let backend = MockBackend::start(MockBehavior::Echo).await;
    let test = test_app(60);
    let app = gateway::app(test.state);

    let response = app
        .clone()
        .oneshot(authed_json_request(
            "POST",
            "/admin/backends",
            json!({"model": "m", "version": "1", "url": backend.url()}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["registered"], json!(true));

    let response = app
        .oneshot(authed_json_request("GET", "/admin/backends", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let listing = body.as_array().unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0]["model"], json!("m"));
    assert_eq!(listing[0]["breaker_state"], json!("closed"));
}
