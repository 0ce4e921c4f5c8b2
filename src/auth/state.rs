//! Auth configuration, signing keys and the assembled engines.

use anyhow::{Result, anyhow};
use base64ct::{Base64, Encoding};
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use std::sync::Arc;

use super::{
    clock::Clock, error::AuthError, rate_limit::RateLimiter, session::SessionEngine,
    verification::VerificationEngine,
};
use crate::{
    codec::{TokenCodec, token::KEY_LEN},
    email::EmailSender,
    store::{IdentityStore, RateLimitStore},
};

const DEFAULT_APP_NAME: &str = "Tessera";
const DEFAULT_SESSION_TTL_SECONDS: u32 = 7 * 24 * 60 * 60;
const DEFAULT_SESSION_WINDOW_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_SESSION_REFRESH_SECONDS: i64 = 48 * 60 * 60;
const DEFAULT_VERIFIER_TTL_SECONDS: u32 = 925;
const DEFAULT_RATE_LIMIT_MAX: i64 = 3;
const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: i64 = 5 * 60;
const DEFAULT_RATE_LIMIT_BACKOFF_SECONDS: i64 = 5 * 60;
const DEFAULT_RATE_LIMIT_MAX_BACKOFF_SECONDS: i64 = 60 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_count: i64,
    pub window_seconds: i64,
    pub backoff_seconds: i64,
    /// Ceiling on how far past `now` the window start may be pushed.
    pub max_backoff_seconds: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_count: DEFAULT_RATE_LIMIT_MAX,
            window_seconds: DEFAULT_RATE_LIMIT_WINDOW_SECONDS,
            backoff_seconds: DEFAULT_RATE_LIMIT_BACKOFF_SECONDS,
            max_backoff_seconds: DEFAULT_RATE_LIMIT_MAX_BACKOFF_SECONDS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    app_name: String,
    session_ttl_seconds: u32,
    session_window_seconds: i64,
    session_refresh_seconds: i64,
    verifier_ttl_seconds: u32,
    rate_limit: RateLimitConfig,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url: frontend_base_url.trim_end_matches('/').to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            session_window_seconds: DEFAULT_SESSION_WINDOW_SECONDS,
            session_refresh_seconds: DEFAULT_SESSION_REFRESH_SECONDS,
            verifier_ttl_seconds: DEFAULT_VERIFIER_TTL_SECONDS,
            rate_limit: RateLimitConfig::default(),
        }
    }

    #[must_use]
    pub fn with_app_name(mut self, app_name: String) -> Self {
        self.app_name = app_name;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u32) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_window_seconds(mut self, seconds: i64) -> Self {
        self.session_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_refresh_seconds(mut self, seconds: i64) -> Self {
        self.session_refresh_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verifier_ttl_seconds(mut self, seconds: u32) -> Self {
        self.verifier_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> u32 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn session_window_seconds(&self) -> i64 {
        self.session_window_seconds
    }

    #[must_use]
    pub fn session_refresh_seconds(&self) -> i64 {
        self.session_refresh_seconds
    }

    #[must_use]
    pub fn verifier_ttl_seconds(&self) -> u32 {
        self.verifier_ttl_seconds
    }

    #[must_use]
    pub fn rate_limit(&self) -> RateLimitConfig {
        self.rate_limit
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// The two 32-byte symmetric keys, one per token kind.
pub struct AuthKeys {
    session: SecretSlice<u8>,
    verifier: SecretSlice<u8>,
}

impl std::fmt::Debug for AuthKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthKeys([REDACTED])")
    }
}

impl AuthKeys {
    #[must_use]
    pub fn new(session: [u8; KEY_LEN], verifier: [u8; KEY_LEN]) -> Self {
        Self {
            session: SecretSlice::from(session.to_vec()),
            verifier: SecretSlice::from(verifier.to_vec()),
        }
    }

    /// Decode base64 keys, checking each is exactly 32 bytes.
    ///
    /// # Errors
    /// Returns an error if a key is not valid base64 or has the wrong length.
    pub fn from_base64(session: &SecretString, verifier: &SecretString) -> Result<Self> {
        Ok(Self {
            session: decode_key("session", session)?,
            verifier: decode_key("verifier", verifier)?,
        })
    }
}

fn decode_key(name: &str, encoded: &SecretString) -> Result<SecretSlice<u8>> {
    let bytes = Base64::decode_vec(encoded.expose_secret().trim())
        .map_err(|_| anyhow!("{name} key is not valid base64"))?;
    if bytes.len() != KEY_LEN {
        return Err(anyhow!(
            "{name} key must be {KEY_LEN} bytes, got {}",
            bytes.len()
        ));
    }
    Ok(SecretSlice::from(bytes))
}

/// Engines shared by every request.
pub struct AuthState {
    config: AuthConfig,
    store: Arc<dyn IdentityStore>,
    sessions: SessionEngine,
    verification: VerificationEngine,
}

impl AuthState {
    /// # Errors
    /// Returns an error if a key cannot build a token codec.
    pub fn new(
        config: AuthConfig,
        keys: &AuthKeys,
        store: Arc<dyn IdentityStore>,
        rate_limits: Arc<dyn RateLimitStore>,
        email: Arc<dyn EmailSender>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        let session_codec = TokenCodec::new(keys.session.expose_secret())?
            .with_ttl(config.session_ttl_seconds());
        let verifier_codec = TokenCodec::new(keys.verifier.expose_secret())?
            .with_ttl(config.verifier_ttl_seconds());

        let sessions = SessionEngine::new(
            session_codec,
            store.clone(),
            clock.clone(),
            config.session_window_seconds(),
            config.session_refresh_seconds(),
        );
        let limiter = RateLimiter::new(rate_limits, clock.clone(), config.rate_limit());
        let verification = VerificationEngine::new(
            verifier_codec,
            store.clone(),
            limiter,
            email,
            clock,
            &config,
        );

        Ok(Self {
            config,
            store,
            sessions,
            verification,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionEngine {
        &self.sessions
    }

    #[must_use]
    pub fn verification(&self) -> &VerificationEngine {
        &self.verification
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = AuthConfig::new("https://tessera.dev/".to_string());
        assert_eq!(config.frontend_base_url(), "https://tessera.dev");
        assert_eq!(config.session_ttl_seconds(), 604_800);
        assert_eq!(config.session_window_seconds(), 604_800);
        assert_eq!(config.session_refresh_seconds(), 172_800);
        assert_eq!(config.verifier_ttl_seconds(), 925);
        assert_eq!(config.rate_limit().max_count, 3);
        assert!(config.session_cookie_secure());
        assert!(!AuthConfig::new("http://localhost:5173".to_string()).session_cookie_secure());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn keys_from_base64() {
        let good = SecretString::from(Base64::encode_string(&[7u8; 32]));
        let short = SecretString::from(Base64::encode_string(&[7u8; 16]));
        let garbage = SecretString::from("not base64!".to_string());

        assert!(AuthKeys::from_base64(&good, &good).is_ok());
        let err = AuthKeys::from_base64(&good, &short).map(|_| ()).unwrap_err();
        assert!(err.to_string().contains("verifier key must be 32 bytes"));
        assert!(AuthKeys::from_base64(&garbage, &good).is_err());
    }

    #[test]
    fn keys_debug_is_redacted() {
        let keys = AuthKeys::new([1u8; 32], [2u8; 32]);
        assert_eq!(format!("{keys:?}"), "AuthKeys([REDACTED])");
    }
}
