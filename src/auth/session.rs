//! Session tokens: issue, validate, silent renewal and revocation.
//!
//! A session token carries the identity's storage key and its issue time. The
//! identity record keeps the issue times of live sessions; a token is valid only
//! while its exact timestamp is still in that list and inside the sliding window.

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::{clock::Clock, error::AuthError};
use crate::{
    codec::{Token, TokenCodec},
    store::{Identity, IdentityStore, SessionUpdate},
};

/// A token that passed validation, with the freshly pruned identity.
#[derive(Clone, Debug)]
pub struct ValidSession {
    pub identity: Identity,
    pub token: Token,
}

/// Result of validating a bearer token, with a replacement when it was renewed.
#[derive(Clone, Debug)]
pub struct Authenticated {
    pub identity: Identity,
    pub token: Token,
    pub renewed: Option<String>,
}

pub struct SessionEngine {
    codec: TokenCodec,
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
    window_seconds: i64,
    refresh_seconds: i64,
}

impl SessionEngine {
    #[must_use]
    pub fn new(
        codec: TokenCodec,
        store: Arc<dyn IdentityStore>,
        clock: Arc<dyn Clock>,
        window_seconds: i64,
        refresh_seconds: i64,
    ) -> Self {
        Self {
            codec,
            store,
            clock,
            window_seconds,
            refresh_seconds,
        }
    }

    fn prune_before(&self, now: i64) -> i64 {
        now - self.window_seconds
    }

    /// Issue a session token and record it on the identity.
    ///
    /// `renew` marks a silent refresh, which is not added to the login history.
    ///
    /// # Errors
    /// Returns `AuthError::Unauthorized` if the identity no longer exists.
    #[instrument(skip(self, identity), fields(identity = %identity.key))]
    pub async fn issue(&self, identity: &Identity, renew: bool) -> Result<String, AuthError> {
        let now = self.clock.now();
        let token = self.codec.encode(&identity.key, now)?;

        let update = SessionUpdate {
            prune_before: self.prune_before(now),
            push: Some(now),
            remove: None,
            login: (!renew).then_some(now),
        };
        self.store
            .update_sessions(&identity.key, update)
            .await
            .map_err(AuthError::from_lookup)?;

        Ok(token)
    }

    /// Validate a session token.
    ///
    /// Expired entries are pruned from the identity whatever the outcome.
    ///
    /// # Errors
    /// Returns `AuthError::Unauthorized` for any invalid, expired or revoked token.
    #[instrument(skip_all)]
    pub async fn validate(&self, text: &str) -> Result<ValidSession, AuthError> {
        let now = self.clock.now();
        let token = self.codec.decode_at(text, now).map_err(|err| {
            debug!("Rejected session token: {err}");
            AuthError::Unauthorized
        })?;

        let identity = self
            .store
            .load_by_key(&token.payload)
            .await
            .map_err(AuthError::from_lookup)?;

        // No recorded sessions means nothing can match.
        if identity.sessions.is_empty() {
            debug!(identity = %identity.key, "No live sessions");
            return Err(AuthError::Unauthorized);
        }

        let identity = self
            .store
            .update_sessions(&identity.key, SessionUpdate::prune(self.prune_before(now)))
            .await
            .map_err(AuthError::from_lookup)?;

        if !identity.sessions.contains(&token.issued_at) {
            debug!(identity = %identity.key, "Session revoked or outside window");
            return Err(AuthError::Unauthorized);
        }

        Ok(ValidSession { identity, token })
    }

    /// Issue a replacement when the token expires within the refresh threshold.
    pub async fn maybe_renew(&self, session: &ValidSession) -> Option<String> {
        let now = self.clock.now();
        if !session.token.expires_before(now + self.refresh_seconds) {
            return None;
        }

        match self.issue(&session.identity, true).await {
            Ok(token) => {
                debug!(identity = %session.identity.key, "Session renewed");
                Some(token)
            }
            Err(err) => {
                warn!("Failed to renew session: {err}");
                None
            }
        }
    }

    /// Validate a bearer token and renew it if it is close to expiry.
    ///
    /// # Errors
    /// Same as [`SessionEngine::validate`].
    pub async fn authenticate(&self, text: &str) -> Result<Authenticated, AuthError> {
        let session = self.validate(text).await?;
        let renewed = self.maybe_renew(&session).await;
        Ok(Authenticated {
            identity: session.identity,
            token: session.token,
            renewed,
        })
    }

    /// Remove the session a token refers to. Failures are only logged.
    #[instrument(skip_all)]
    pub async fn revoke(&self, text: &str) {
        let now = self.clock.now();
        let token = match self.codec.decode_at(text, now) {
            Ok(token) => token,
            Err(err) => {
                debug!("Ignoring revoke for undecodable token: {err}");
                return;
            }
        };

        let update = SessionUpdate {
            prune_before: self.prune_before(now),
            remove: Some(token.issued_at),
            ..SessionUpdate::default()
        };
        if let Err(err) = self.store.update_sessions(&token.payload, update).await {
            debug!("Failed to revoke session: {err}");
        }
    }
}
