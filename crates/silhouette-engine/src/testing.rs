//! Test doubles shared by the engine's unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use silhouette_contracts::jobs::{GenerationRequest, Job, JobStatus};
use silhouette_contracts::models::{ModelRegistry, PollPolicy};

use crate::client::PredictionApi;
use crate::credential::Credential;
use crate::error::{JobError, Result};

pub(crate) fn running(id: &str) -> Job {
    Job::new(id, JobStatus::Running)
}

/// Default model table with every poll interval shortened for real-time tests.
pub(crate) fn fast_registry() -> ModelRegistry {
    let mut registry = ModelRegistry::default();
    for spec in registry.list_mut() {
        spec.poll = PollPolicy::new(Duration::from_millis(5), spec.poll.max_attempts);
    }
    registry
}

enum CreateReply {
    Job(Job),
    Reject { status: u16, body: String },
}

/// In-memory `PredictionApi`: creations are answered in order, status
/// lookups per id. The last status scripted for an id repeats forever.
#[derive(Default)]
pub(crate) struct ScriptedApi {
    creates: Mutex<VecDeque<CreateReply>>,
    statuses: Mutex<HashMap<String, VecDeque<Job>>>,
    submitted: Mutex<Vec<GenerationRequest>>,
    create_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn with_created(self, job: Job) -> Self {
        self.creates.lock().unwrap().push_back(CreateReply::Job(job));
        self
    }

    pub fn with_rejected_create(self, status: u16, body: &str) -> Self {
        self.creates.lock().unwrap().push_back(CreateReply::Reject {
            status,
            body: body.to_string(),
        });
        self
    }

    pub fn with_statuses(self, id: &str, jobs: Vec<Job>) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .insert(id.to_string(), jobs.into_iter().collect());
        self
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<GenerationRequest> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl PredictionApi for ScriptedApi {
    async fn create(
        &self,
        _credential: &Credential,
        request: &GenerationRequest,
        _prefer_wait: bool,
    ) -> Result<Job> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(request.clone());
        match self.creates.lock().unwrap().pop_front() {
            Some(CreateReply::Job(job)) => Ok(job),
            Some(CreateReply::Reject { status, body }) => Err(JobError::UpstreamRequest {
                provider: "Replicate".to_string(),
                status,
                body,
            }),
            None => Err(JobError::UpstreamRequest {
                provider: "Replicate".to_string(),
                status: 500,
                body: "no scripted creation".to_string(),
            }),
        }
    }

    async fn get(&self, _credential: &Credential, id: &str) -> Result<Job> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.statuses.lock().unwrap();
        let next = match statuses.get_mut(id) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        next.ok_or_else(|| JobError::UpstreamRequest {
            provider: "Replicate".to_string(),
            status: 404,
            body: format!("{{\"detail\":\"prediction {id} not found\"}}"),
        })
    }
}

/// Recorded traffic and scripted replies of [`spawn_fake_provider`].
#[derive(Default)]
pub(crate) struct FakeProvider {
    pub requests: AtomicUsize,
    pub creates: Mutex<VecDeque<(u16, Value)>>,
    pub statuses: Mutex<HashMap<String, VecDeque<Value>>>,
    pub authorization: Mutex<Vec<String>>,
    pub prefer: Mutex<Vec<Option<String>>>,
    pub bodies: Mutex<Vec<Value>>,
    pub bria_tokens: Mutex<Vec<String>>,
    pub remove_bg_keys: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn reply_to_create(&self, status: u16, body: Value) {
        self.creates.lock().unwrap().push_back((status, body));
    }

    pub fn reply_to_status(&self, id: &str, bodies: Vec<Value>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(id.to_string(), bodies.into_iter().collect());
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Serves a Replicate-shaped API plus BRIA, Remove.bg and a static image
/// host on an ephemeral local port. Returns the base URL.
pub(crate) async fn spawn_fake_provider(state: Arc<FakeProvider>) -> anyhow::Result<String> {
    let app = Router::new()
        .route("/v1/predictions", post(create_prediction))
        .route("/v1/predictions/{id}", get(prediction_status))
        .route("/images/{name}", get(static_image))
        .route("/bria/remove", post(bria_remove))
        .route("/removebg", post(remove_bg))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

fn status_code(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn create_prediction(
    State(state): State<Arc<FakeProvider>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state
        .authorization
        .lock()
        .unwrap()
        .push(header_text(&headers, "authorization").unwrap_or_default());
    state.prefer.lock().unwrap().push(header_text(&headers, "prefer"));
    state.bodies.lock().unwrap().push(body);
    let (code, reply) = state
        .creates
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((500, json!({"detail": "no scripted creation"})));
    (status_code(code), Json(reply))
}

async fn prediction_status(
    State(state): State<Arc<FakeProvider>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let mut statuses = state.statuses.lock().unwrap();
    let next = match statuses.get_mut(&id) {
        Some(queue) if queue.len() > 1 => queue.pop_front(),
        Some(queue) => queue.front().cloned(),
        None => None,
    };
    match next {
        Some(body) => (StatusCode::OK, Json(body)),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Not found."})),
        ),
    }
}

async fn static_image(Path(_name): Path<String>) -> ([(header::HeaderName, &'static str); 1], Bytes) {
    (
        [(header::CONTENT_TYPE, "image/png")],
        Bytes::from_static(b"\x89PNG fake image"),
    )
}

async fn bria_remove(
    State(state): State<Arc<FakeProvider>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state
        .bria_tokens
        .lock()
        .unwrap()
        .push(header_text(&headers, "api_token").unwrap_or_default());
    let has_file = body
        .get("file")
        .and_then(Value::as_str)
        .is_some_and(|file| !file.is_empty());
    if !has_file {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "file is required"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"result_url": "https://bria.example/cutout.png"})),
    )
}

async fn remove_bg(
    State(state): State<Arc<FakeProvider>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], Bytes) {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state
        .remove_bg_keys
        .lock()
        .unwrap()
        .push(header_text(&headers, "x-api-key").unwrap_or_default());
    let form = String::from_utf8_lossy(&body);
    if !form.contains("image_url") {
        return (
            StatusCode::BAD_REQUEST,
            [(header::CONTENT_TYPE, "application/json")],
            Bytes::from_static(b"{\"errors\":[{\"title\":\"No image given\"}]}"),
        );
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/png")],
        Bytes::from_static(b"PNGDATA"),
    )
}
