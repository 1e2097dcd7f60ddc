use anyhow::Result;
use uuid::Uuid;

use kindred_engine::store::SubmissionStore;
use kindred_types::models::Submission;

use crate::Database;

impl SubmissionStore for Database {
    fn pair_or_enqueue(&self, submission: &Submission) -> Result<Option<Submission>> {
        Database::pair_or_enqueue(self, submission)
    }

    fn find(&self, id: Uuid) -> Result<Option<Submission>> {
        self.get_submission(id)
    }

    fn latest_for_identity(&self, identity_token: &str) -> Result<Option<Submission>> {
        self.latest_submission_for_identity(identity_token)
    }
}
