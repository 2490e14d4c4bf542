#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use folio_api::config::ServerConfig;
use folio_api::router::build_app_router;
use folio_api::state::AppState;
use folio_events::EventBus;
use folio_pipeline::config::OrchestratorConfig;
use folio_pipeline::dispatcher::WorkerClient;
use folio_pipeline::memory::{
    MemoryFileStore, MemoryProgressStore, MemoryReportStore, MemoryWorkflowStore,
};
use folio_pipeline::{Orchestrator, Stores};
use folio_worker::api::WorkerApiError;
use folio_worker::request::DispatchRequest;
use http_body_util::BodyExt;
use tokio::sync::Mutex;
use tower::ServiceExt;

pub const USER: i64 = 7;

/// Worker double that accepts every job.
#[derive(Default)]
pub struct AcceptingWorker {
    pub requests: Mutex<Vec<DispatchRequest>>,
}

#[async_trait]
impl WorkerClient for AcceptingWorker {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), WorkerApiError> {
        self.requests.lock().await.push(request.clone());
        Ok(())
    }
}

/// Build a test `ServerConfig` with safe defaults and no database.
pub fn test_config() -> ServerConfig {
    let mut orchestrator = OrchestratorConfig::default();
    orchestrator.advance_delay = Duration::from_millis(10);
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        database_url: None,
        worker_url: "http://worker.test".to_string(),
        worker_timeout_secs: 5,
        orchestrator,
    }
}

/// Application over in-memory stores, with typed handles to seed them.
pub struct TestApp {
    pub router: Router,
    pub files: Arc<MemoryFileStore>,
    pub reports: Arc<MemoryReportStore>,
    pub progress: Arc<MemoryProgressStore>,
    pub worker: Arc<AcceptingWorker>,
}

impl TestApp {
    pub fn new() -> Self {
        let config = test_config();
        let files = Arc::new(MemoryFileStore::new());
        let reports = Arc::new(MemoryReportStore::new());
        let progress = Arc::new(MemoryProgressStore::new());
        let worker = Arc::new(AcceptingWorker::default());

        let stores = Stores {
            progress: progress.clone(),
            workflow: Arc::new(MemoryWorkflowStore::new()),
            reports: reports.clone(),
            files: files.clone(),
        };
        let orchestrator = Orchestrator::new(
            stores,
            worker.clone(),
            Arc::new(EventBus::default()),
            config.orchestrator.clone(),
        );
        let state = AppState {
            pool: None,
            config: Arc::new(config.clone()),
            orchestrator: Arc::new(orchestrator),
        };

        Self {
            router: build_app_router(state, &config),
            files,
            reports,
            progress,
            worker,
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        user: Option<i64>,
        body: Option<serde_json::Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user.to_string());
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Method::GET, uri, Some(USER), None).await
    }

    pub async fn post(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.send(Method::POST, uri, Some(USER), Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.send(Method::PUT, uri, Some(USER), Some(body)).await
    }

    /// Status and parsed JSON body of a response.
    pub async fn json(&self, response: Response<Body>) -> (StatusCode, serde_json::Value) {
        let status = response.status();
        (status, body_json(response).await)
    }
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
