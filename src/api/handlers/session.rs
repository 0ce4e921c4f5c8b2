//! Session endpoints for cookie and bearer auth.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderName, HeaderValue, StatusCode,
        header::{AUTHORIZATION, COOKIE, InvalidHeaderValue, SET_COOKIE},
    },
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;

use super::{SessionResponse, error_response};
use crate::auth::{AuthConfig, AuthState};

pub(crate) const SESSION_COOKIE_NAME: &str = "Auth";
pub(crate) const RENEWED_TOKEN_HEADER: &str = "x-renewed-token";

#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 403, description = "Missing, invalid or revoked session")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    let Some(token) = extract_session_token(&headers) else {
        return error_response(&crate::auth::AuthError::Unauthorized);
    };

    let authenticated = match auth_state.sessions().authenticate(&token).await {
        Ok(authenticated) => authenticated,
        Err(err) => return error_response(&err),
    };

    let mut response_headers = HeaderMap::new();
    if let Some(renewed) = &authenticated.renewed {
        match (
            session_cookie(auth_state.config(), renewed),
            HeaderValue::from_str(renewed),
        ) {
            (Ok(cookie), Ok(value)) => {
                response_headers.insert(SET_COOKIE, cookie);
                response_headers.insert(HeaderName::from_static(RENEWED_TOKEN_HEADER), value);
            }
            _ => error!("Failed to build renewed session headers"),
        }
    }

    let identity = authenticated.identity;
    let body = SessionResponse {
        username: identity.name,
        email: identity.email,
        roles: identity.roles,
    };
    (StatusCode::OK, response_headers, Json(body)).into_response()
}

#[utoipa::path(
    get,
    path = "/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    if let Some(token) = extract_session_token(&headers) {
        let auth_state = Arc::clone(&auth_state);
        tokio::spawn(async move {
            auth_state.sessions().revoke(&token).await;
        });
    }

    // Always clear the cookie, even if there was no session to revoke.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    response_headers.insert(
        HeaderName::from_static("clear-site-data"),
        HeaderValue::from_static("\"cookies\""),
    );
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Build a secure `HttpOnly` cookie for the session token.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Bearer header first, then the session cookie.
pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let value = headers.get(COOKIE)?.to_str().ok()?;
    value.split(';').find_map(|pair| {
        let (key, val) = pair.trim().split_once('=')?;
        (key.trim() == SESSION_COOKIE_NAME && !val.trim().is_empty())
            .then(|| val.trim().to_string())
    })
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(COOKIE, HeaderValue::from_static("Auth=def"));
        assert_eq!(extract_session_token(&headers), Some("abc".to_string()));
    }

    #[test]
    fn cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; Auth=def; lang=en"));
        assert_eq!(extract_session_token(&headers), Some("def".to_string()));
    }

    #[test]
    fn missing_or_empty_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_session_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        headers.insert(COOKIE, HeaderValue::from_static("Auth="));
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn cookie_flags() -> Result<(), InvalidHeaderValue> {
        let https = AuthConfig::new("https://tessera.dev".to_string());
        let cookie = session_cookie(&https, "tok")?;
        assert_eq!(
            cookie.to_str().ok(),
            Some("Auth=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age=604800; Secure")
        );

        let http = AuthConfig::new("http://localhost:5173".to_string());
        let cleared = clear_session_cookie(&http)?;
        assert_eq!(
            cleared.to_str().ok(),
            Some("Auth=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
        );
        Ok(())
    }
}
