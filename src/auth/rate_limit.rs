//! Per-address rate limiting for verifier issuance.
//!
//! Flow Overview:
//! 1) Every attempt increments the record for the key (created at `count = 1`).
//! 2) Once the window has elapsed the record is dropped and the attempt allowed.
//! 3) Inside the window, attempts up to `max_count` are allowed.
//! 4) Past that the window start is pushed forward by the backoff, capped at
//!    `now + max_backoff`, so persistent callers stay locked out longer.
//!
//! Store failures fail closed.

use std::sync::Arc;
use tracing::{debug, error, instrument};

use super::{clock::Clock, state::RateLimitConfig};
use crate::store::RateLimitStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

impl RateLimitDecision {
    #[must_use]
    pub fn is_allowed(self) -> bool {
        self == Self::Allowed
    }
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl RateLimiter {
    #[must_use]
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
        config: RateLimitConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Check against the configured quota.
    pub async fn check(&self, key: &str) -> RateLimitDecision {
        self.allow(key, self.config.max_count, self.config.window_seconds)
            .await
    }

    /// Register an attempt for `key` and decide whether it may proceed.
    #[instrument(skip(self))]
    pub async fn allow(&self, key: &str, max_count: i64, window_seconds: i64) -> RateLimitDecision {
        let now = self.clock.now();

        let record = match self.store.hit(key, now).await {
            Ok(record) => record,
            Err(err) => {
                error!("Failed to record rate limit attempt: {err}");
                return RateLimitDecision::Limited;
            }
        };

        if now > record.window_start + window_seconds {
            if let Err(err) = self.store.reset(key).await {
                error!("Failed to reset rate limit record: {err}");
                return RateLimitDecision::Limited;
            }
            return RateLimitDecision::Allowed;
        }

        if record.count <= max_count {
            return RateLimitDecision::Allowed;
        }

        let window_start = (record.window_start + self.config.backoff_seconds)
            .min(now + self.config.max_backoff_seconds);
        debug!(
            count = record.count,
            window_start, "rate limit exceeded, extending window"
        );
        if let Err(err) = self.store.set_window_start(key, window_start).await {
            error!("Failed to extend rate limit window: {err}");
        }

        RateLimitDecision::Limited
    }
}
