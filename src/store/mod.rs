//! Persistence for identity records and issuance rate limits.
//!
//! Every mutation the engines rely on for correctness is a single store call:
//! session lists are pruned, appended and trimmed by [`IdentityStore::update_sessions`]
//! in one step, and verifier consumption is a guarded [`IdentityStore::update_fields`].
//! Implementations must apply each call atomically.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use utoipa::ToSchema;

pub use self::memory::MemoryStore;
pub use self::postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("{0} already taken")]
    Conflict(&'static str),
    #[error("record changed concurrently")]
    Stale,
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Unverified,
    Verified,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Verified => "verified",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "unverified" => Ok(Self::Unverified),
            "verified" => Ok(Self::Verified),
            "admin" => Ok(Self::Admin),
            other => Err(StoreError::Corrupt(format!("unknown role {other}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub key: String,
    pub name: String,
    pub email: String,
    pub roles: Vec<Role>,
    /// Issue timestamps of live sessions, unix seconds.
    pub sessions: Vec<i64>,
    /// Login history, unix seconds.
    pub logins: Vec<i64>,
    pub verifier: Option<String>,
    pub created_at: i64,
}

impl Identity {
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Clone, Debug)]
pub struct NewIdentity {
    pub name: String,
    pub email: String,
    pub roles: Vec<Role>,
    pub created_at: i64,
}

/// Fields with a uniqueness constraint that identities can be looked up by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniqueField {
    Name,
    Email,
}

impl UniqueField {
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
        }
    }
}

/// Partial update: `None` keeps a field, `Some(None)` clears an optional one.
#[derive(Clone, Debug, Default)]
pub struct IdentityUpdate {
    pub verifier: Option<Option<String>>,
    pub roles: Option<Vec<Role>>,
    /// Apply only while the stored verifier still equals this value.
    pub expect_verifier: Option<String>,
}

/// One atomic edit of the session list.
///
/// Applied in order: drop entries older than `prune_before`, remove one entry
/// equal to `remove`, append `push`. `login` is appended to the login history.
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionUpdate {
    pub prune_before: i64,
    pub push: Option<i64>,
    pub remove: Option<i64>,
    pub login: Option<i64>,
}

impl SessionUpdate {
    #[must_use]
    pub fn prune(prune_before: i64) -> Self {
        Self {
            prune_before,
            ..Self::default()
        }
    }

    pub(crate) fn apply(&self, identity: &mut Identity) {
        identity.sessions.retain(|&issued| issued >= self.prune_before);
        if let Some(remove) = self.remove {
            if let Some(position) = identity.sessions.iter().position(|&issued| issued == remove) {
                identity.sessions.remove(position);
            }
        }
        if let Some(push) = self.push {
            identity.sessions.push(push);
        }
        if let Some(login) = self.login {
            identity.logins.push(login);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub key: String,
    pub window_start: i64,
    pub count: i64,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn load_by_key(&self, key: &str) -> Result<Identity, StoreError>;

    async fn load_by_unique_field(
        &self,
        field: UniqueField,
        value: &str,
    ) -> Result<Identity, StoreError>;

    /// Insert a new identity and return its storage key.
    async fn create(&self, identity: NewIdentity) -> Result<String, StoreError>;

    async fn update_fields(&self, key: &str, update: IdentityUpdate)
    -> Result<Identity, StoreError>;

    async fn update_sessions(
        &self,
        key: &str,
        update: SessionUpdate,
    ) -> Result<Identity, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Record one attempt, creating the record with `count = 1` at `now` if absent.
    async fn hit(&self, key: &str, now: i64) -> Result<RateLimitRecord, StoreError>;

    async fn reset(&self, key: &str) -> Result<(), StoreError>;

    async fn set_window_start(&self, key: &str, window_start: i64) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(sessions: Vec<i64>) -> Identity {
        Identity {
            key: "01HZX".to_string(),
            name: "alice".to_string(),
            email: "alice@example.com".to_string(),
            roles: vec![Role::Verified],
            sessions,
            logins: Vec::new(),
            verifier: None,
            created_at: 0,
        }
    }

    #[test]
    fn role_round_trip() -> Result<(), StoreError> {
        for role in [Role::Unverified, Role::Verified, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>()?, role);
        }
        assert!("root".parse::<Role>().is_err());
        Ok(())
    }

    #[test]
    fn session_update_prunes_removes_and_pushes() {
        let mut identity = identity(vec![10, 20, 30, 30]);
        SessionUpdate {
            prune_before: 15,
            push: Some(40),
            remove: Some(30),
            login: Some(40),
        }
        .apply(&mut identity);
        assert_eq!(identity.sessions, vec![20, 30, 40]);
        assert_eq!(identity.logins, vec![40]);
    }

    #[test]
    fn prune_keeps_boundary_entry() {
        let mut identity = identity(vec![99, 100, 101]);
        SessionUpdate::prune(100).apply(&mut identity);
        assert_eq!(identity.sessions, vec![100, 101]);
    }
}
