// HTTP middleware

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use livecast_core::models::UserId;

use super::AppError;

/// Header set by the upstream authentication proxy
pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity established by the authentication collaborator in front of us
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
}

fn user_from_parts(parts: &Parts) -> Result<Option<AuthUser>, AppError> {
    let Some(value) = parts.headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    let user_id = value
        .to_str()
        .map_err(|_| AppError::unauthorized("Invalid user id header"))?
        .trim();
    if user_id.is_empty() {
        return Err(AppError::unauthorized("Invalid user id header"));
    }
    Ok(Some(AuthUser {
        user_id: UserId::from(user_id),
    }))
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_from_parts(parts)?.ok_or_else(|| AppError::unauthorized("Missing user id header"))
    }
}

impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Option<Self>, Self::Rejection> {
        user_from_parts(parts)
    }
}
