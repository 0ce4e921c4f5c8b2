//! In-process store used when no database is configured, and by tests.

use super::{
    Identity, IdentityStore, IdentityUpdate, NewIdentity, RateLimitRecord, RateLimitStore,
    SessionUpdate, StoreError, UniqueField,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use ulid::Ulid;

#[derive(Debug, Default)]
pub struct MemoryStore {
    identities: Mutex<HashMap<String, Identity>>,
    rate_limits: Mutex<HashMap<String, RateLimitRecord>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current rate-limit record for `key`, if any.
    pub async fn rate_limit(&self, key: &str) -> Option<RateLimitRecord> {
        self.rate_limits.lock().await.get(key).cloned()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn load_by_key(&self, key: &str) -> Result<Identity, StoreError> {
        self.identities
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn load_by_unique_field(
        &self,
        field: UniqueField,
        value: &str,
    ) -> Result<Identity, StoreError> {
        let identities = self.identities.lock().await;
        identities
            .values()
            .find(|identity| match field {
                UniqueField::Name => identity.name == value,
                UniqueField::Email => identity.email == value,
            })
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create(&self, identity: NewIdentity) -> Result<String, StoreError> {
        let mut identities = self.identities.lock().await;
        for existing in identities.values() {
            if existing.name == identity.name {
                return Err(StoreError::Conflict(UniqueField::Name.column()));
            }
            if existing.email == identity.email {
                return Err(StoreError::Conflict(UniqueField::Email.column()));
            }
        }

        let key = Ulid::new().to_string();
        identities.insert(
            key.clone(),
            Identity {
                key: key.clone(),
                name: identity.name,
                email: identity.email,
                roles: identity.roles,
                sessions: Vec::new(),
                logins: Vec::new(),
                verifier: None,
                created_at: identity.created_at,
            },
        );
        Ok(key)
    }

    async fn update_fields(
        &self,
        key: &str,
        update: IdentityUpdate,
    ) -> Result<Identity, StoreError> {
        let mut identities = self.identities.lock().await;
        let identity = identities.get_mut(key).ok_or(StoreError::NotFound)?;

        if let Some(expected) = &update.expect_verifier {
            if identity.verifier.as_ref() != Some(expected) {
                return Err(StoreError::Stale);
            }
        }
        if let Some(verifier) = update.verifier {
            identity.verifier = verifier;
        }
        if let Some(roles) = update.roles {
            identity.roles = roles;
        }
        Ok(identity.clone())
    }

    async fn update_sessions(
        &self,
        key: &str,
        update: SessionUpdate,
    ) -> Result<Identity, StoreError> {
        let mut identities = self.identities.lock().await;
        let identity = identities.get_mut(key).ok_or(StoreError::NotFound)?;
        update.apply(identity);
        Ok(identity.clone())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn hit(&self, key: &str, now: i64) -> Result<RateLimitRecord, StoreError> {
        let mut records = self.rate_limits.lock().await;
        let record = records
            .entry(key.to_string())
            .and_modify(|record| record.count += 1)
            .or_insert_with(|| RateLimitRecord {
                key: key.to_string(),
                window_start: now,
                count: 1,
            });
        Ok(record.clone())
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.rate_limits.lock().await.remove(key);
        Ok(())
    }

    async fn set_window_start(&self, key: &str, window_start: i64) -> Result<(), StoreError> {
        if let Some(record) = self.rate_limits.lock().await.get_mut(key) {
            record.window_start = window_start;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Role;

    fn new_identity(name: &str, email: &str) -> NewIdentity {
        NewIdentity {
            name: name.to_string(),
            email: email.to_string(),
            roles: vec![Role::Unverified],
            created_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn create_and_load() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let key = store.create(new_identity("alice", "alice@example.com")).await?;

        let by_key = store.load_by_key(&key).await?;
        let by_email = store
            .load_by_unique_field(UniqueField::Email, "alice@example.com")
            .await?;
        let by_name = store.load_by_unique_field(UniqueField::Name, "alice").await?;
        assert_eq!(by_key, by_email);
        assert_eq!(by_key, by_name);
        assert!(by_key.sessions.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn unique_fields_conflict() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        store.create(new_identity("alice", "alice@example.com")).await?;

        let name = store.create(new_identity("alice", "other@example.com")).await;
        assert!(matches!(name, Err(StoreError::Conflict("name"))));
        let email = store.create(new_identity("bob", "alice@example.com")).await;
        assert!(matches!(email, Err(StoreError::Conflict("email"))));
        Ok(())
    }

    #[tokio::test]
    async fn missing_identity() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.load_by_key("nope").await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.update_sessions("nope", SessionUpdate::prune(0)).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn guarded_update() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let key = store.create(new_identity("alice", "alice@example.com")).await?;
        store
            .update_fields(
                &key,
                IdentityUpdate {
                    verifier: Some(Some("v1".to_string())),
                    ..IdentityUpdate::default()
                },
            )
            .await?;

        let stale = store
            .update_fields(
                &key,
                IdentityUpdate {
                    verifier: Some(None),
                    expect_verifier: Some("v0".to_string()),
                    ..IdentityUpdate::default()
                },
            )
            .await;
        assert!(matches!(stale, Err(StoreError::Stale)));

        let cleared = store
            .update_fields(
                &key,
                IdentityUpdate {
                    verifier: Some(None),
                    roles: Some(vec![Role::Verified]),
                    expect_verifier: Some("v1".to_string()),
                },
            )
            .await?;
        assert_eq!(cleared.verifier, None);
        assert_eq!(cleared.roles, vec![Role::Verified]);
        Ok(())
    }

    #[tokio::test]
    async fn rate_limit_hits() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        assert_eq!(store.hit("a@b.c", 100).await?.count, 1);
        let second = store.hit("a@b.c", 150).await?;
        assert_eq!(second.count, 2);
        assert_eq!(second.window_start, 100);

        store.set_window_start("a@b.c", 400).await?;
        assert_eq!(store.rate_limit("a@b.c").await.map(|r| r.window_start), Some(400));

        store.reset("a@b.c").await?;
        assert_eq!(store.rate_limit("a@b.c").await, None);
        Ok(())
    }
}
