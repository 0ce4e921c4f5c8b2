//! Login and verifier endpoints.

use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{debug, error};

use super::{
    LoginRequest, StatusResponse, UsernameResponse, VerifyResponse, error_response,
    session::{extract_session_token, session_cookie},
    status_response,
};
use crate::{
    auth::{AuthState, utils::valid_username},
    store::{Role, StoreError, UniqueField},
};

#[utoipa::path(
    post,
    path = "/auth",
    request_body = LoginRequest,
    responses(
        (status = 203, description = "Verifier issued and emailed, or already logged in", body = StatusResponse),
        (status = 400, description = "Malformed request body", body = StatusResponse),
        (status = 401, description = "Invalid username or email", body = StatusResponse),
        (status = 429, description = "Too many verifier requests for this address", body = StatusResponse),
        (status = 500, description = "Server error", body = StatusResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> impl IntoResponse {
    if let Some(token) = extract_session_token(&headers) {
        if auth_state.sessions().validate(&token).await.is_ok() {
            return status_response(
                StatusCode::NON_AUTHORITATIVE_INFORMATION,
                "You're already logged in",
                true,
            );
        }
    }

    let request = match payload {
        Ok(Json(request)) => request,
        Err(err) => {
            debug!("Rejected login body: {err}");
            return status_response(StatusCode::BAD_REQUEST, "bad request", false);
        }
    };

    match auth_state
        .verification()
        .login(&request.username, &request.email)
        .await
    {
        Ok(outcome) => status_response(
            StatusCode::NON_AUTHORITATIVE_INFORMATION,
            &outcome.message,
            true,
        ),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/auth/{verifier}",
    params(
        ("verifier" = String, Path, description = "Single-use verifier from the emailed link")
    ),
    responses(
        (status = 200, description = "Verifier consumed, session cookie set", body = VerifyResponse),
        (status = 403, description = "Invalid, superseded or used verifier", body = StatusResponse),
        (status = 410, description = "Verifier expired", body = StatusResponse)
    ),
    tag = "auth"
)]
pub async fn verify(
    Path(verifier): Path<String>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let identity = match auth_state.verification().consume(&verifier).await {
        Ok(identity) => identity,
        Err(err) => return error_response(&err),
    };

    let token = match auth_state.sessions().issue(&identity, false).await {
        Ok(token) => token,
        Err(err) => return error_response(&err),
    };

    let mut headers = HeaderMap::new();
    match session_cookie(auth_state.config(), &token) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return status_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server error, could not complete your request",
                false,
            );
        }
    }

    let body = VerifyResponse {
        ok: true,
        admin: identity.has_role(Role::Admin),
        username: identity.name,
    };
    (StatusCode::OK, headers, Json(body)).into_response()
}

#[utoipa::path(
    get,
    path = "/auth/check-username/{username}",
    params(
        ("username" = String, Path, description = "Username to check")
    ),
    responses(
        (status = 200, description = "Whether the username is valid and free", body = UsernameResponse),
        (status = 500, description = "Server error", body = StatusResponse)
    ),
    tag = "auth"
)]
pub async fn check_username(
    Path(username): Path<String>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if !valid_username(&username) {
        return Json(UsernameResponse { ok: false }).into_response();
    }

    match auth_state
        .store()
        .load_by_unique_field(UniqueField::Name, &username)
        .await
    {
        Ok(_) => Json(UsernameResponse { ok: false }).into_response(),
        Err(StoreError::NotFound) => Json(UsernameResponse { ok: true }).into_response(),
        Err(err) => {
            error!("Failed to check username: {err}");
            status_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server error, could not complete your request",
                false,
            )
        }
    }
}
