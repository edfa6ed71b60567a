//! Fixed-window rate limiting persisted on client records.
//!
//! The counters live on the [`ClientRecord`](moada_core::ClientRecord), not
//! in process memory, so limits survive restarts. Identities without a record
//! are not limited.

use super::error::{LifecycleError, LifecycleResult};
use moada_core::config::RateLimitConfig;
use moada_core::{Clock, ClientIdentity};
use moada_metadata::MetadataStore;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Outcome of a rate-limit evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Allowed; persist these counters.
    Allow {
        api_calls: u32,
        last_call_at: OffsetDateTime,
    },
    /// Rejected; counters stay untouched.
    Reject,
}

/// Fixed-window policy.
#[derive(Clone, Copy, Debug)]
pub struct FixedWindow {
    max_calls: u32,
    window: Duration,
}

impl FixedWindow {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self { max_calls, window }
    }

    /// Decide whether a call at `now` is allowed given the stored counters.
    pub fn evaluate(
        &self,
        api_calls: u32,
        last_call_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Decision {
        let calls = if now - last_call_at > self.window {
            0
        } else {
            api_calls
        };

        if calls >= self.max_calls {
            return Decision::Reject;
        }
        Decision::Allow {
            api_calls: calls + 1,
            last_call_at: now,
        }
    }
}

/// Rate limiter backed by the client record store.
pub struct RateLimiter {
    metadata: Arc<dyn MetadataStore>,
    clock: Arc<dyn Clock>,
    policy: Option<FixedWindow>,
}

impl RateLimiter {
    pub fn new(
        config: &RateLimitConfig,
        metadata: Arc<dyn MetadataStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let policy = config
            .enabled
            .then(|| FixedWindow::new(config.max_calls, config.window()));
        Self {
            metadata,
            clock,
            policy,
        }
    }

    /// Count a call for `identity`, failing with `RateLimited` when over
    /// the limit.
    #[tracing::instrument(skip(self), fields(identity = %identity))]
    pub async fn check(&self, identity: &ClientIdentity) -> LifecycleResult<()> {
        let Some(policy) = self.policy else {
            return Ok(());
        };
        let Some(client) = self.metadata.get_client(identity.as_str()).await? else {
            return Ok(());
        };

        let api_calls = u32::try_from(client.api_calls).unwrap_or(u32::MAX);
        match policy.evaluate(api_calls, client.last_call_at, self.clock.now()) {
            Decision::Reject => {
                tracing::info!(api_calls, "Rate limit exceeded");
                Err(LifecycleError::RateLimited)
            }
            Decision::Allow {
                api_calls,
                last_call_at,
            } => {
                self.metadata
                    .update_client_calls(identity.as_str(), i64::from(api_calls), last_call_at)
                    .await?;
                Ok(())
            }
        }
    }
}
