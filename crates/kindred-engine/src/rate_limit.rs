use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::store::SubmissionStore;

/// Outcome of the cooldown check. Rejections carry the prior submission's id
/// and timestamp so the client can resume polling it instead of treating the
/// rejection as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected {
        last_submission_id: Uuid,
        last_submission_time: DateTime<Utc>,
    },
}

/// One submission per identity per fixed window, anchored to the identity's
/// most recent submission. Read-then-decide only: two near-simultaneous
/// submissions from one identity can both pass, which is acceptable for
/// best-effort abuse deterrence.
pub struct RateLimiter {
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Token-less clients are treated as having no prior submission.
    pub fn check(
        &self,
        store: &dyn SubmissionStore,
        identity_token: Option<&str>,
    ) -> Result<Admission> {
        self.check_at(store, identity_token, Utc::now())
    }

    fn check_at(
        &self,
        store: &dyn SubmissionStore,
        identity_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Admission> {
        let Some(token) = identity_token else {
            return Ok(Admission::Admitted);
        };

        match store.latest_for_identity(token)? {
            Some(last) if now - last.created_at < self.window => {
                debug!(
                    "Identity {} rejected: last submission {} at {}",
                    token, last.id, last.created_at
                );
                Ok(Admission::Rejected {
                    last_submission_id: last.id,
                    last_submission_time: last.created_at,
                })
            }
            _ => Ok(Admission::Admitted),
        }
    }
}
