//! PostgreSQL store. Each operation is a single statement so concurrent
//! requests never interleave a read-modify-write of the same row.

use super::{
    Identity, IdentityStore, IdentityUpdate, NewIdentity, RateLimitRecord, RateLimitStore, Role,
    SessionUpdate, StoreError, UniqueField,
};
use async_trait::async_trait;
use sqlx::{Connection, PgPool, Row, postgres::PgRow};
use tracing::{Instrument, info_span};
use ulid::Ulid;

const IDENTITY_COLUMNS: &str = "key, name, email, roles, sessions, logins, verifier, created_at";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn identity_from_row(row: &PgRow) -> Result<Identity, StoreError> {
    let roles = row
        .try_get::<Vec<String>, _>("roles")?
        .iter()
        .map(|role| role.parse::<Role>())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Identity {
        key: row.try_get("key")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        roles,
        sessions: row.try_get("sessions")?,
        logins: row.try_get("logins")?,
        verifier: row.try_get("verifier")?,
        created_at: row.try_get("created_at")?,
    })
}

fn role_names(roles: &[Role]) -> Vec<String> {
    roles.iter().map(|role| role.as_str().to_string()).collect()
}

fn unique_violation(err: &sqlx::Error) -> Option<&'static str> {
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };
    if db_err.code().is_none_or(|code| code.as_ref() != "23505") {
        return None;
    }
    match db_err.constraint() {
        Some(constraint) if constraint.contains("email") => Some(UniqueField::Email.column()),
        _ => Some(UniqueField::Name.column()),
    }
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn load_by_key(&self, key: &str) -> Result<Identity, StoreError> {
        let query = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE key = $1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        row.as_ref()
            .map_or(Err(StoreError::NotFound), identity_from_row)
    }

    async fn load_by_unique_field(
        &self,
        field: UniqueField,
        value: &str,
    ) -> Result<Identity, StoreError> {
        let query = format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE {} = $1",
            field.column()
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        row.as_ref()
            .map_or(Err(StoreError::NotFound), identity_from_row)
    }

    async fn create(&self, identity: NewIdentity) -> Result<String, StoreError> {
        let query = r"
            INSERT INTO identities (key, name, email, roles, created_at)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let key = Ulid::new().to_string();
        let result = sqlx::query(query)
            .bind(&key)
            .bind(&identity.name)
            .bind(&identity.email)
            .bind(role_names(&identity.roles))
            .bind(identity.created_at)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(key),
            Err(err) => match unique_violation(&err) {
                Some(field) => Err(StoreError::Conflict(field)),
                None => Err(err.into()),
            },
        }
    }

    async fn update_fields(
        &self,
        key: &str,
        update: IdentityUpdate,
    ) -> Result<Identity, StoreError> {
        let query = format!(
            r"
            UPDATE identities SET
                verifier = CASE WHEN $2 THEN $3 ELSE verifier END,
                roles = COALESCE($4, roles)
            WHERE key = $1 AND ($5::TEXT IS NULL OR verifier = $5)
            RETURNING {IDENTITY_COLUMNS}
            "
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        let guarded = update.expect_verifier.is_some();
        let row = sqlx::query(&query)
            .bind(key)
            .bind(update.verifier.is_some())
            .bind(update.verifier.flatten())
            .bind(update.roles.as_deref().map(role_names))
            .bind(update.expect_verifier)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        match row {
            Some(row) => identity_from_row(&row),
            None if guarded => Err(StoreError::Stale),
            None => Err(StoreError::NotFound),
        }
    }

    async fn update_sessions(
        &self,
        key: &str,
        update: SessionUpdate,
    ) -> Result<Identity, StoreError> {
        // Prune, drop the first entry equal to $4, then append $3. NULL appends are removed.
        let query = format!(
            r"
            UPDATE identities SET
                sessions = array_remove(array_append(ARRAY(
                    SELECT s FROM unnest(sessions) WITH ORDINALITY AS t(s, i)
                    WHERE s >= $2 AND i <> COALESCE((
                        SELECT r.i FROM unnest(sessions) WITH ORDINALITY AS r(s, i)
                        WHERE r.s >= $2 AND r.s = $4::BIGINT
                        ORDER BY r.i LIMIT 1
                    ), 0)
                    ORDER BY i
                ), $3::BIGINT), NULL),
                logins = array_remove(array_append(logins, $5::BIGINT), NULL)
            WHERE key = $1
            RETURNING {IDENTITY_COLUMNS}
            "
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(key)
            .bind(update.prune_before)
            .bind(update.push)
            .bind(update.remove)
            .bind(update.login)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        row.as_ref()
            .map_or(Err(StoreError::NotFound), identity_from_row)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }
}

#[async_trait]
impl RateLimitStore for PgStore {
    async fn hit(&self, key: &str, now: i64) -> Result<RateLimitRecord, StoreError> {
        let query = r"
            INSERT INTO rate_limits (key, window_start, count)
            VALUES ($1, $2, 1)
            ON CONFLICT (key) DO UPDATE SET count = rate_limits.count + 1
            RETURNING key, window_start, count
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(key)
            .bind(now)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;

        Ok(RateLimitRecord {
            key: row.try_get("key")?,
            window_start: row.try_get("window_start")?,
            count: row.try_get("count")?,
        })
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        let query = "DELETE FROM rate_limits WHERE key = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(key)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn set_window_start(&self, key: &str, window_start: i64) -> Result<(), StoreError> {
        let query = "UPDATE rate_limits SET window_start = $2 WHERE key = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(key)
            .bind(window_start)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }
}
