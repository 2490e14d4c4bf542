pub mod health;
pub mod jobs;
pub mod workflow;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /workflow/resume                                 resume point of the acting user
///
/// /projects/{id}/workflow                          current step (GET), set step (PUT)
/// /projects/{id}/workflow/exit                     leave the workflow
/// /projects/{id}/steps/{step}                      coordinator view
/// /projects/{id}/steps/{step}/start                mount and start the step
/// /projects/{id}/steps/{step}/retry                retry a failed job
/// /projects/{id}/steps/{step}/next                 next step (or finish on step 6)
/// /projects/{id}/steps/{step}/back                 previous step
/// /projects/{id}/navigation                        guard a navigation attempt
/// /projects/{id}/navigation/confirm                leave and navigate
/// /projects/{id}/navigation/cancel                 stay
///
/// /jobs/{job}/progress                             latest progress (GET), worker callback (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/workflow", workflow::router())
        .nest("/projects/{id}", workflow::project_router())
        .nest("/jobs", jobs::router())
}
