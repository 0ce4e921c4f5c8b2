//! Login entry point and single-use verifier tokens.
//!
//! Flow Overview:
//! 1) `login` finds the identity by email (creating it as `unverified` on first
//!    contact), applies the per-address rate limit and issues a verifier.
//! 2) The verifier is stored on the identity, replacing any pending one, and
//!    mailed as a link. Delivery never blocks the request.
//! 3) `consume` accepts the link once: the presented text must equal the stored
//!    verifier, which is cleared in the same guarded update that promotes
//!    `unverified` identities to `verified`.

use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::{
    clock::Clock,
    error::AuthError,
    rate_limit::{RateLimitDecision, RateLimiter},
    state::AuthConfig,
    utils::{build_verify_url, normalize_email, valid_email, valid_username},
};
use crate::{
    codec::{self, TokenCodec},
    email::{self, EmailMessage, EmailSender},
    store::{Identity, IdentityStore, IdentityUpdate, NewIdentity, Role, StoreError, UniqueField},
};

#[derive(Clone, Debug)]
pub struct LoginOutcome {
    pub identity: Identity,
    pub message: String,
}

pub struct VerificationEngine {
    codec: TokenCodec,
    store: Arc<dyn IdentityStore>,
    limiter: RateLimiter,
    email: Arc<dyn EmailSender>,
    clock: Arc<dyn Clock>,
    frontend_base_url: String,
    app_name: String,
}

impl VerificationEngine {
    #[must_use]
    pub fn new(
        codec: TokenCodec,
        store: Arc<dyn IdentityStore>,
        limiter: RateLimiter,
        email: Arc<dyn EmailSender>,
        clock: Arc<dyn Clock>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            codec,
            store,
            limiter,
            email,
            clock,
            frontend_base_url: config.frontend_base_url().to_string(),
            app_name: config.app_name().to_string(),
        }
    }

    /// Start a login for `name`/`email` and mail a verifier link.
    ///
    /// # Errors
    /// `InvalidDetails` for malformed input or a name that does not match the
    /// stored identity, `RateLimited` when the address is over quota.
    #[instrument(skip(self))]
    pub async fn login(&self, name: &str, email: &str) -> Result<LoginOutcome, AuthError> {
        let name = name.trim();
        let email = normalize_email(email);
        if !valid_username(name) || !valid_email(&email) {
            return Err(AuthError::InvalidDetails);
        }

        let identity = match self
            .store
            .load_by_unique_field(UniqueField::Email, &email)
            .await
        {
            Ok(identity) if identity.name == name => identity,
            Ok(_) => {
                debug!("Name does not match the stored identity");
                return Err(AuthError::InvalidDetails);
            }
            Err(StoreError::NotFound) => self.create_identity(name, &email).await?,
            Err(err) => return Err(err.into()),
        };

        if self.limiter.check(&email).await == RateLimitDecision::Limited {
            return Err(AuthError::RateLimited);
        }

        self.issue_verifier(&identity).await?;

        Ok(LoginOutcome {
            message: format!("Thanks {name}, we sent you an authentication email."),
            identity,
        })
    }

    async fn create_identity(&self, name: &str, email: &str) -> Result<Identity, AuthError> {
        let key = self
            .store
            .create(NewIdentity {
                name: name.to_string(),
                email: email.to_string(),
                roles: vec![Role::Unverified],
                created_at: self.clock.now(),
            })
            .await
            .map_err(|err| match err {
                StoreError::Conflict(field) => {
                    debug!("Cannot create identity, {field} already taken");
                    AuthError::InvalidDetails
                }
                other => AuthError::Storage(other),
            })?;
        info!(identity = %key, "Created identity");

        Ok(self.store.load_by_key(&key).await?)
    }

    /// Issue a verifier for `identity`, replacing any pending one, and mail it.
    ///
    /// # Errors
    /// Returns an error if the verifier cannot be encoded or stored.
    #[instrument(skip(self, identity), fields(identity = %identity.key))]
    pub async fn issue_verifier(&self, identity: &Identity) -> Result<String, AuthError> {
        let token = self.codec.encode(&identity.key, self.clock.now())?;
        self.store
            .update_fields(
                &identity.key,
                IdentityUpdate {
                    verifier: Some(Some(token.clone())),
                    ..IdentityUpdate::default()
                },
            )
            .await
            .map_err(AuthError::from_lookup)?;

        email::dispatch(self.email.clone(), self.verifier_message(identity, &token));

        Ok(token)
    }

    fn verifier_message(&self, identity: &Identity, token: &str) -> EmailMessage {
        let app = &self.app_name;
        let url = build_verify_url(&self.frontend_base_url, token);
        let minutes = self.codec.ttl_seconds().div_ceil(60);

        let (subject, intro) = if identity.has_role(Role::Unverified) {
            (
                format!("Welcome to {app}"),
                format!("Welcome to {app}, {}! Confirm your email to finish signing up.", identity.name),
            )
        } else {
            (
                format!("Login to {app}"),
                format!("Hi {}, use the link below to log in to {app}.", identity.name),
            )
        };

        EmailMessage {
            to_email: identity.email.clone(),
            subject,
            html_body: format!(
                "<p>{intro}</p><p><a href=\"{url}\">{url}</a></p><p>The link expires in {minutes} minutes and can only be used once.</p>"
            ),
            text_body: format!(
                "{intro}\n\n{url}\n\nThe link expires in {minutes} minutes and can only be used once."
            ),
        }
    }

    /// Consume a verifier and return the updated identity.
    ///
    /// # Errors
    /// `VerifierExpired` when the link is past its TTL, `Unauthorized` for any
    /// other invalid, superseded or already used verifier.
    #[instrument(skip_all)]
    pub async fn consume(&self, text: &str) -> Result<Identity, AuthError> {
        let token = self
            .codec
            .decode_at(text, self.clock.now())
            .map_err(|err| match err {
                codec::Error::Expired => AuthError::VerifierExpired,
                other => {
                    debug!("Rejected verifier: {other}");
                    AuthError::Unauthorized
                }
            })?;

        let identity = self
            .store
            .load_by_key(&token.payload)
            .await
            .map_err(AuthError::from_lookup)?;
        if identity.verifier.as_deref() != Some(text) {
            debug!(identity = %identity.key, "Verifier does not match the pending one");
            return Err(AuthError::Unauthorized);
        }

        let roles = identity.has_role(Role::Unverified).then(|| {
            let mut roles: Vec<Role> = identity
                .roles
                .iter()
                .copied()
                .filter(|role| *role != Role::Unverified)
                .collect();
            if !roles.contains(&Role::Verified) {
                roles.push(Role::Verified);
            }
            roles
        });

        let identity = self
            .store
            .update_fields(
                &identity.key,
                IdentityUpdate {
                    verifier: Some(None),
                    roles,
                    expect_verifier: Some(text.to_string()),
                },
            )
            .await
            .map_err(AuthError::from_lookup)?;

        Ok(identity)
    }
}
