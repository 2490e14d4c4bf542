use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{navigation, steps, workflow};
use crate::state::AppState;

/// Routes mounted at `/projects/{id}`.
///
/// ```text
/// GET    /workflow                  -> get_workflow
/// PUT    /workflow                  -> advance_workflow
/// POST   /workflow/exit             -> exit_workflow
/// GET    /steps/{step}              -> get_step
/// POST   /steps/{step}/start        -> start_step
/// POST   /steps/{step}/retry        -> retry_step
/// POST   /steps/{step}/next         -> next_step
/// POST   /steps/{step}/back         -> back_step
/// POST   /navigation                -> intercept
/// POST   /navigation/confirm        -> confirm
/// POST   /navigation/cancel         -> cancel
/// ```
pub fn project_router() -> Router<AppState> {
    Router::new()
        .route(
            "/workflow",
            get(workflow::get_workflow).put(workflow::advance_workflow),
        )
        .route("/workflow/exit", post(workflow::exit_workflow))
        .route("/steps/{step}", get(steps::get_step))
        .route("/steps/{step}/start", post(steps::start_step))
        .route("/steps/{step}/retry", post(steps::retry_step))
        .route("/steps/{step}/next", post(steps::next_step))
        .route("/steps/{step}/back", post(steps::back_step))
        .route("/navigation", post(navigation::intercept))
        .route("/navigation/confirm", post(navigation::confirm))
        .route("/navigation/cancel", post(navigation::cancel))
}

/// Routes mounted at `/workflow`.
///
/// ```text
/// GET    /resume                    -> resume
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/resume", get(workflow::resume))
}
