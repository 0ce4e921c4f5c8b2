//! End-to-end engine flow against the in-memory store with a frozen clock.

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use tessera::{
    auth::{AuthConfig, AuthError, AuthKeys, AuthState, ManualClock, RateLimitConfig},
    email::{EmailMessage, EmailSender},
    store::{IdentityStore, MemoryStore, Role, UniqueField},
};

const START: i64 = 1_700_000_000;

#[derive(Default)]
struct Outbox(Mutex<Vec<EmailMessage>>);

impl EmailSender for Outbox {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        if let Ok(mut sent) = self.0.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}

struct Harness {
    state: AuthState,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

fn harness(rate_limit: RateLimitConfig) -> Result<Harness> {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(START));
    let config = AuthConfig::new("https://tessera.dev".to_string()).with_rate_limit(rate_limit);
    let state = AuthState::new(
        config,
        &AuthKeys::new([7; 32], [9; 32]),
        store.clone(),
        store.clone(),
        Arc::new(Outbox::default()),
        clock.clone(),
    )?;
    Ok(Harness {
        state,
        store,
        clock,
    })
}

async fn pending_verifier(store: &MemoryStore, email: &str) -> Result<String> {
    store
        .load_by_unique_field(UniqueField::Email, email)
        .await?
        .verifier
        .context("no pending verifier")
}

#[tokio::test]
async fn login_verify_session_logout() -> Result<()> {
    let h = harness(RateLimitConfig::default())?;

    let outcome = h
        .state
        .verification()
        .login("alice", "Alice@Example.com")
        .await?;
    assert!(outcome.message.contains("alice"));
    assert!(outcome.identity.has_role(Role::Unverified));
    assert_eq!(outcome.identity.email, "alice@example.com");

    let verifier = pending_verifier(&h.store, "alice@example.com").await?;
    let identity = h.state.verification().consume(&verifier).await?;
    assert!(identity.has_role(Role::Verified));
    assert!(!identity.has_role(Role::Unverified));
    assert!(identity.verifier.is_none());

    assert!(matches!(
        h.state.verification().consume(&verifier).await,
        Err(AuthError::Unauthorized)
    ));

    let token = h.state.sessions().issue(&identity, false).await?;
    let session = h.state.sessions().validate(&token).await?;
    assert_eq!(session.identity.name, "alice");
    assert_eq!(session.identity.sessions, vec![START]);
    assert_eq!(session.identity.logins, vec![START]);

    h.state.sessions().revoke(&token).await;
    assert!(matches!(
        h.state.sessions().validate(&token).await,
        Err(AuthError::Unauthorized)
    ));
    Ok(())
}

#[tokio::test]
async fn returning_user_must_match_name() -> Result<()> {
    let h = harness(RateLimitConfig::default())?;

    h.state.verification().login("alice", "alice@example.com").await?;
    assert!(matches!(
        h.state.verification().login("mallory", "alice@example.com").await,
        Err(AuthError::InvalidDetails)
    ));
    assert!(matches!(
        h.state.verification().login("alice", "other@example.com").await,
        Err(AuthError::InvalidDetails)
    ));
    assert!(matches!(
        h.state.verification().login("a", "alice@example.com").await,
        Err(AuthError::InvalidDetails)
    ));
    Ok(())
}

#[tokio::test]
async fn newer_verifier_supersedes_older() -> Result<()> {
    let h = harness(RateLimitConfig::default())?;

    h.state.verification().login("alice", "alice@example.com").await?;
    let first = pending_verifier(&h.store, "alice@example.com").await?;
    h.clock.advance(1);
    h.state.verification().login("alice", "alice@example.com").await?;
    let second = pending_verifier(&h.store, "alice@example.com").await?;
    assert_ne!(first, second);

    assert!(matches!(
        h.state.verification().consume(&first).await,
        Err(AuthError::Unauthorized)
    ));
    h.state.verification().consume(&second).await?;
    Ok(())
}

#[tokio::test]
async fn verifier_expires_after_ttl() -> Result<()> {
    let h = harness(RateLimitConfig::default())?;

    h.state.verification().login("bob", "bob@example.com").await?;
    let verifier = pending_verifier(&h.store, "bob@example.com").await?;

    h.clock.advance(926);
    assert!(matches!(
        h.state.verification().consume(&verifier).await,
        Err(AuthError::VerifierExpired)
    ));
    Ok(())
}

#[tokio::test]
async fn session_renews_near_expiry() -> Result<()> {
    let h = harness(RateLimitConfig::default())?;

    h.state.verification().login("carol", "carol@example.com").await?;
    let verifier = pending_verifier(&h.store, "carol@example.com").await?;
    let identity = h.state.verification().consume(&verifier).await?;
    let token = h.state.sessions().issue(&identity, false).await?;

    let fresh = h.state.sessions().authenticate(&token).await?;
    assert!(fresh.renewed.is_none());

    // Just past five days the token has less than 48 hours left.
    let renewed_at = START + 5 * 24 * 60 * 60 + 1;
    h.clock.set(renewed_at);
    let near_expiry = h.state.sessions().authenticate(&token).await?;
    let renewed = near_expiry.renewed.context("expected a renewed token")?;

    let session = h.state.sessions().validate(&renewed).await?;
    assert_eq!(session.token.issued_at, renewed_at);
    assert_eq!(session.identity.logins.len(), 1);

    // The original token stays valid until it expires.
    h.state.sessions().validate(&token).await?;
    h.clock.advance(2 * 24 * 60 * 60 + 1);
    assert!(h.state.sessions().validate(&token).await.is_err());
    h.state.sessions().validate(&renewed).await?;
    Ok(())
}

#[tokio::test]
async fn verifier_emails_are_rate_limited() -> Result<()> {
    let h = harness(RateLimitConfig::default())?;

    for _ in 0..3 {
        h.state.verification().login("dave", "dave@example.com").await?;
    }
    assert!(matches!(
        h.state.verification().login("dave", "dave@example.com").await,
        Err(AuthError::RateLimited)
    ));

    // Other addresses are unaffected.
    h.state.verification().login("erin", "erin@example.com").await?;
    Ok(())
}

#[tokio::test]
async fn rate_limit_recovers_after_window() -> Result<()> {
    let h = harness(RateLimitConfig {
        max_count: 2,
        window_seconds: 60,
        backoff_seconds: 0,
        max_backoff_seconds: 0,
    })?;

    h.state.verification().login("frank", "frank@example.com").await?;
    h.state.verification().login("frank", "frank@example.com").await?;
    assert!(matches!(
        h.state.verification().login("frank", "frank@example.com").await,
        Err(AuthError::RateLimited)
    ));

    h.clock.advance(61);
    h.state.verification().login("frank", "frank@example.com").await?;
    Ok(())
}
