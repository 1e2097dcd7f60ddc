use std::sync::Mutex;

use anyhow::Result;
use uuid::Uuid;

use kindred_types::models::{Submission, SubmissionStatus};

/// Storage capability the pairing logic runs against.
///
/// The contract that matters is `pair_or_enqueue`: claiming a candidate and
/// persisting the new submission happen in one indivisible step, so a
/// candidate can never be handed to two concurrent submitters and a claimed
/// candidate always points at a durably saved partner.
pub trait SubmissionStore: Send + Sync {
    /// Atomically pair `submission` with the most recent unmatched submission
    /// that has a different identity token and at least one tag in common,
    /// or persist it as unmatched when no candidate qualifies.
    ///
    /// Returns the claimed candidate (already flipped to matched and pointing
    /// back at `submission.id`) or `None` when the submission was enqueued.
    fn pair_or_enqueue(&self, submission: &Submission) -> Result<Option<Submission>>;

    /// Look up a submission by id.
    fn find(&self, id: Uuid) -> Result<Option<Submission>>;

    /// The most recent submission for an identity token, if any.
    fn latest_for_identity(&self, identity_token: &str) -> Result<Option<Submission>>;
}

/// Mutex-guarded in-memory store. The lock makes `pair_or_enqueue` a single
/// indivisible step, mirroring the SQL implementation's transaction. Used by
/// engine tests; not durable.
#[derive(Default)]
pub struct MemoryStore {
    submissions: Mutex<Vec<Submission>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a submission directly, bypassing pairing. Lets tests control
    /// `created_at` and pre-populate the waiting pool.
    pub fn insert(&self, submission: Submission) {
        self.submissions
            .lock()
            .expect("store lock poisoned")
            .push(submission);
    }

    pub fn len(&self) -> usize {
        self.submissions.lock().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SubmissionStore for MemoryStore {
    fn pair_or_enqueue(&self, submission: &Submission) -> Result<Option<Submission>> {
        let mut subs = self
            .submissions
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?;

        // Most recent qualifying candidate wins.
        let candidate_idx = subs
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                s.status == SubmissionStatus::Unmatched
                    && s.identity_token != submission.identity_token
                    && s.tags_intersect(submission)
            })
            .max_by_key(|(idx, s)| (s.created_at, *idx))
            .map(|(idx, _)| idx);

        match candidate_idx {
            Some(idx) => {
                subs[idx].pair_with(submission.id);
                let candidate = subs[idx].clone();

                let mut own = submission.clone();
                own.pair_with(candidate.id);
                subs.push(own);

                Ok(Some(candidate))
            }
            None => {
                subs.push(submission.clone());
                Ok(None)
            }
        }
    }

    fn find(&self, id: Uuid) -> Result<Option<Submission>> {
        let subs = self
            .submissions
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?;
        Ok(subs.iter().find(|s| s.id == id).cloned())
    }

    fn latest_for_identity(&self, identity_token: &str) -> Result<Option<Submission>> {
        let subs = self
            .submissions
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?;
        Ok(subs
            .iter()
            .filter(|s| s.identity_token == identity_token)
            .max_by_key(|s| s.created_at)
            .cloned())
    }
}
