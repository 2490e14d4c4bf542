use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use folio_core::error::CoreError;
use folio_pipeline::controller::ControllerError;
use folio_pipeline::coordinator::CoordinatorError;
use folio_pipeline::store::StoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps the orchestrator's error types and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    /// The caller could not be identified.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

type Classified = (StatusCode, &'static str, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core(core),
            AppError::Store(store) => classify_store(store),
            AppError::Controller(ControllerError::Core(core)) => classify_core(core),
            AppError::Controller(ControllerError::Store(store)) => classify_store(store),
            AppError::Coordinator(err) => classify_coordinator(err),
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn classify_core(err: &CoreError) -> Classified {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
    }
}

fn classify_store(err: &StoreError) -> Classified {
    match err {
        StoreError::Database(sqlx::Error::RowNotFound) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        StoreError::Core(core) => classify_core(core),
        other => {
            tracing::error!(error = %other, "Store error");
            internal()
        }
    }
}

fn classify_coordinator(err: &CoordinatorError) -> Classified {
    match err {
        CoordinatorError::Uncoordinated(_) => {
            (StatusCode::BAD_REQUEST, "BAD_REQUEST", err.to_string())
        }
        CoordinatorError::NotMounted => (StatusCode::CONFLICT, "NOT_MOUNTED", err.to_string()),
        CoordinatorError::Precondition(msg) => {
            (StatusCode::CONFLICT, "PRECONDITION_FAILED", msg.clone())
        }
        CoordinatorError::Core(core) => classify_core(core),
        CoordinatorError::Controller(ControllerError::Core(core)) => classify_core(core),
        CoordinatorError::Controller(ControllerError::Store(store)) | CoordinatorError::Store(store) => {
            classify_store(store)
        }
    }
}

fn internal() -> Classified {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
