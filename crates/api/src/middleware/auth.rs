//! Acting-user extractor.
//!
//! Requests arrive through a gateway that authenticates the user and
//! forwards their id in the `X-User-Id` header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use folio_core::types::DbId;

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The user a request acts for.
///
/// ```ignore
/// async fn my_handler(user: ActingUser) -> AppResult<Json<()>> {
///     tracing::info!(user_id = user.user_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ActingUser {
    pub user_id: DbId,
}

impl<S: Send + Sync> FromRequestParts<S> for ActingUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing X-User-Id header".into()))?;

        let user_id = raw
            .trim()
            .parse::<DbId>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| AppError::Unauthorized("Invalid X-User-Id header".into()))?;

        Ok(ActingUser { user_id })
    }
}
