use anyhow::Result;
use tracing::info;

use kindred_types::models::Submission;

use crate::store::SubmissionStore;

/// Best-effort single pairing per submission. The engine delegates the
/// claim-and-persist to the store's atomic `pair_or_enqueue`; under
/// concurrent attempts the store guarantees a candidate is claimed at most
/// once, but not which requester wins.
pub struct MatchEngine;

impl MatchEngine {
    /// Pair `submission` with a compatible waiting submission, or enqueue it.
    ///
    /// The submission must already carry its emotional tags; a tagless
    /// submission cannot intersect anything and is enqueued directly.
    pub fn try_pair(
        store: &dyn SubmissionStore,
        submission: &Submission,
    ) -> Result<Option<Submission>> {
        let claimed = store.pair_or_enqueue(submission)?;

        match &claimed {
            Some(candidate) => info!(
                "Submission {} matched with {} (tags: {:?})",
                submission.id, candidate.id, submission.emotional_tags
            ),
            None => info!(
                "Submission {} enqueued unmatched (tags: {:?})",
                submission.id, submission.emotional_tags
            ),
        }

        Ok(claimed)
    }
}
