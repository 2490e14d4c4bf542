use axum::routing::get;
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /{job}/progress            -> get_progress
/// POST   /{job}/progress            -> post_progress (worker callback)
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/{job}/progress",
        get(jobs::get_progress).post(jobs::post_progress),
    )
}
