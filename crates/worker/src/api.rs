//! HTTP client for the worker's dispatch endpoints.
//!
//! One `POST` per job. The response only acknowledges receipt; the job
//! result arrives later as progress records.

use std::time::Duration;

use folio_core::job::JobKind;

use crate::request::DispatchRequest;

/// HTTP client for one worker deployment.
pub struct WorkerApi {
    client: reqwest::Client,
    base_url: String,
}

/// Errors from the worker REST layer.
#[derive(Debug, thiserror::Error)]
pub enum WorkerApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The worker returned a non-2xx status code.
    #[error("Worker rejected dispatch ({status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl WorkerApi {
    /// Create a client whose requests fail after `timeout`.
    ///
    /// * `base_url` - e.g. `http://worker:8700`.
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, WorkerApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Endpoint path for a job kind.
    pub fn endpoint(kind: JobKind) -> &'static str {
        match kind {
            JobKind::FileAnalysis => "/analyze",
            JobKind::ReportGeneration => "/generate",
        }
    }

    /// Hand a job to the worker and wait only for the acknowledgement.
    pub async fn dispatch(&self, request: &DispatchRequest) -> Result<(), WorkerApiError> {
        let url = format!("{}{}", self.base_url, Self::endpoint(request.kind));

        let response = self.client.post(&url).json(request).send().await?;
        Self::ensure_success(response).await?;

        tracing::info!(
            job_id = %request.job,
            kind = request.kind.as_str(),
            project_id = request.project_id,
            "Worker accepted dispatch",
        );
        Ok(())
    }

    // ---- private helpers ----

    /// Turn a non-2xx response into [`WorkerApiError::Rejected`].
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, WorkerApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(WorkerApiError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use folio_core::job::JobTarget;
    use folio_core::types::JobId;

    async fn spawn_worker(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn request(kind: JobKind) -> DispatchRequest {
        let target = JobTarget {
            project_id: 1,
            report_id: Some(2),
            file_ids: vec![],
            name: "Survey".into(),
        };
        DispatchRequest::new(kind, &target, JobId::from("J1"), "http://cb".into())
    }

    #[test]
    fn endpoints_per_kind() {
        assert_eq!(WorkerApi::endpoint(JobKind::FileAnalysis), "/analyze");
        assert_eq!(WorkerApi::endpoint(JobKind::ReportGeneration), "/generate");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let api = WorkerApi::with_client(reqwest::Client::new(), "http://w:1/".into());
        assert_eq!(api.base_url(), "http://w:1");
    }

    #[tokio::test]
    async fn dispatch_succeeds_on_acknowledgement() {
        let router = Router::new().route(
            "/generate",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["job"], "J1");
                StatusCode::ACCEPTED
            }),
        );
        let url = spawn_worker(router).await;
        let api = WorkerApi::new(url, Duration::from_secs(5)).unwrap();

        api.dispatch(&request(JobKind::ReportGeneration)).await.unwrap();
    }

    #[tokio::test]
    async fn dispatch_surfaces_rejection() {
        let router = Router::new().route(
            "/analyze",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        );
        let url = spawn_worker(router).await;
        let api = WorkerApi::new(url, Duration::from_secs(5)).unwrap();

        match api.dispatch(&request(JobKind::FileAnalysis)).await {
            Err(WorkerApiError::Rejected { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "busy");
            }
            other => panic!("Expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatch_fails_when_unreachable() {
        let api = WorkerApi::new("http://127.0.0.1:9".into(), Duration::from_secs(2)).unwrap();
        assert!(matches!(
            api.dispatch(&request(JobKind::FileAnalysis)).await,
            Err(WorkerApiError::Request(_))
        ));
    }
}
