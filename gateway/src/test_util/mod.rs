//! Test helpers: a scriptable mock model backend and an in-memory job
//! publisher. Used by unit and integration tests; never by production code.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use modelmesh_common::JobDescriptor;

use crate::publish::{JobPublisher, PublishError};

/// How the mock backend answers `POST /v1/infer`.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Always the given status and body.
    Fixed(u16, Value),
    /// Echo the request input back as `{"prediction": <input>}`.
    Echo,
    /// Alternate 200 / 500 by call index (even calls succeed).
    AlternateFailures,
}

struct MockState {
    behavior: MockBehavior,
    hits: AtomicUsize,
}

/// A mock model-serving backend bound to an ephemeral local port.
pub struct MockBackend {
    addr: SocketAddr,
    state: Arc<MockState>,
}

async fn infer_handler(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let hit = state.hits.fetch_add(1, Ordering::SeqCst);
    match &state.behavior {
        MockBehavior::Fixed(status, value) => (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(value.clone()),
        ),
        MockBehavior::Echo => {
            let input = body.get("input").cloned().unwrap_or(Value::Null);
            (StatusCode::OK, Json(json!({"prediction": input})))
        }
        MockBehavior::AlternateFailures => {
            if hit % 2 == 0 {
                (StatusCode::OK, Json(json!({"prediction": [1.0]})))
            } else {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "simulated failure"})),
                )
            }
        }
    }
}

impl MockBackend {
    pub async fn start(behavior: MockBehavior) -> Self {
        let state = Arc::new(MockState {
            behavior,
            hits: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/v1/infer", post(infer_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock backend");
        let addr = listener.local_addr().expect("mock backend has no address");

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of `POST /v1/infer` calls received so far.
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }
}

/// Job publisher that records descriptors instead of producing to Kafka.
#[derive(Default)]
pub struct MemoryPublisher {
    published: Mutex<Vec<JobDescriptor>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<JobDescriptor> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl JobPublisher for MemoryPublisher {
    async fn publish(&self, descriptor: &JobDescriptor) -> Result<(), PublishError> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(descriptor.clone());
        Ok(())
    }
}
