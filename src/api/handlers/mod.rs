pub mod auth;
pub mod health;
pub mod session;

use crate::{auth::AuthError, store::Role};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub username: String,
}

/// Generic status body shared by the auth endpoints.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub msg: String,
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyResponse {
    pub ok: bool,
    pub username: String,
    pub admin: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub username: String,
    pub email: String,
    pub roles: Vec<Role>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UsernameResponse {
    pub ok: bool,
}

pub(crate) fn status_response(status: StatusCode, msg: &str, ok: bool) -> Response {
    (
        status,
        Json(StatusResponse {
            msg: msg.to_string(),
            ok,
        }),
    )
        .into_response()
}

/// Map engine errors to responses. Token failure reasons are never exposed.
pub(crate) fn error_response(err: &AuthError) -> Response {
    let (status, msg) = match err {
        AuthError::Unauthorized => (StatusCode::FORBIDDEN, "unauthorized request, cannot proceed"),
        AuthError::VerifierExpired => (
            StatusCode::GONE,
            "verification link expired, request a new one",
        ),
        AuthError::RateLimited => (
            StatusCode::TOO_MANY_REQUESTS,
            "too many auth requests/emails, wait a bit and try again",
        ),
        AuthError::InvalidDetails => (
            StatusCode::UNAUTHORIZED,
            "invalid details, could not authorize user",
        ),
        AuthError::Storage(_) | AuthError::Token(_) => {
            error!("Auth request failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server error, could not complete your request",
            )
        }
    };
    status_response(status, msg, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn error_statuses() {
        let cases = [
            (AuthError::Unauthorized, StatusCode::FORBIDDEN),
            (AuthError::VerifierExpired, StatusCode::GONE),
            (AuthError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (AuthError::InvalidDetails, StatusCode::UNAUTHORIZED),
            (
                AuthError::Storage(StoreError::Corrupt("x".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(error_response(&err).status(), status, "{err}");
        }
    }
}
