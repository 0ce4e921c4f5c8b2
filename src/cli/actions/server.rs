use crate::{
    api,
    auth::{AuthConfig, AuthKeys, AuthState, RateLimitConfig, SystemClock},
    cli::telemetry,
    email::LogEmailSender,
    store::{IdentityStore, MemoryStore, PgStore, RateLimitStore},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub session_key: SecretString,
    pub verifier_key: SecretString,
    pub frontend_base_url: String,
    pub app_name: String,
    pub session_ttl_seconds: u32,
    pub session_window_seconds: i64,
    pub session_refresh_seconds: i64,
    pub verifier_ttl_seconds: u32,
    pub rate_limit: RateLimitConfig,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("port", &self.port)
            .field("dsn", &self.dsn.as_ref().map(|_| "***"))
            .field("session_key", &"***")
            .field("verifier_key", &"***")
            .field("frontend_base_url", &self.frontend_base_url)
            .field("app_name", &self.app_name)
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .field("session_window_seconds", &self.session_window_seconds)
            .field("session_refresh_seconds", &self.session_refresh_seconds)
            .field("verifier_ttl_seconds", &self.verifier_ttl_seconds)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the keys are invalid, the database is unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let keys = AuthKeys::from_base64(&args.session_key, &args.verifier_key)?;

    let (store, rate_limits): (Arc<dyn IdentityStore>, Arc<dyn RateLimitStore>) =
        if let Some(dsn) = &args.dsn {
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(dsn)
                .await
                .context("Failed to connect to database")?;
            let store = Arc::new(PgStore::new(pool));
            let rate_limits: Arc<dyn RateLimitStore> = store.clone();
            let identities: Arc<dyn IdentityStore> = store;
            (identities, rate_limits)
        } else {
            warn!("No DSN configured, identities are kept in memory");
            let store = Arc::new(MemoryStore::new());
            let rate_limits: Arc<dyn RateLimitStore> = store.clone();
            let identities: Arc<dyn IdentityStore> = store;
            (identities, rate_limits)
        };

    let config = AuthConfig::new(args.frontend_base_url)
        .with_app_name(args.app_name)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_session_window_seconds(args.session_window_seconds)
        .with_session_refresh_seconds(args.session_refresh_seconds)
        .with_verifier_ttl_seconds(args.verifier_ttl_seconds)
        .with_rate_limit(args.rate_limit);

    let auth_state = AuthState::new(
        config,
        &keys,
        store,
        rate_limits,
        Arc::new(LogEmailSender),
        Arc::new(SystemClock),
    )?;

    info!("Starting tessera on port {}", args.port);

    let result = api::new(args.port, Arc::new(auth_state)).await;

    telemetry::shutdown_tracer();

    result
}
