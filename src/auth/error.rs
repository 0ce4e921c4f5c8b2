use crate::{codec, store::StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unauthorized request")]
    Unauthorized,
    #[error("verifier expired")]
    VerifierExpired,
    #[error("too many verifier requests")]
    RateLimited,
    #[error("invalid details")]
    InvalidDetails,
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("token error: {0}")]
    Token(#[from] codec::Error),
}

impl AuthError {
    /// Lookups of unknown or concurrently changed identities are plain auth failures.
    pub(crate) fn from_lookup(err: StoreError) -> Self {
        match err {
            StoreError::NotFound | StoreError::Stale => Self::Unauthorized,
            other => Self::Storage(other),
        }
    }
}
