use anyhow::Result;
use chrono::SecondsFormat;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

use kindred_types::models::Submission;

use crate::Database;
use crate::models::SubmissionRow;

pub(crate) const SUBMISSION_COLUMNS: &str =
    "id, content_type, content, emotional_tags, status, matched_with, identity_token, created_at";

impl Database {
    pub fn insert_submission(&self, submission: &Submission) -> Result<()> {
        self.with_conn(|conn| insert_submission(conn, submission))
    }

    pub fn get_submission(&self, id: Uuid) -> Result<Option<Submission>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM submissions WHERE id = ?1",
                SUBMISSION_COLUMNS
            );
            let row = conn
                .query_row(&sql, [id.to_string()], SubmissionRow::from_row)
                .optional()?;
            row.map(SubmissionRow::into_submission).transpose()
        })
    }

    pub fn latest_submission_for_identity(&self, token: &str) -> Result<Option<Submission>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM submissions WHERE identity_token = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                SUBMISSION_COLUMNS
            );
            let row = conn
                .query_row(&sql, [token], SubmissionRow::from_row)
                .optional()?;
            row.map(SubmissionRow::into_submission).transpose()
        })
    }

    /// The atomic pairing step: persist `submission` and, in the same
    /// transaction, claim the most recent compatible unmatched candidate.
    ///
    /// The candidate flip is a single conditional `UPDATE … RETURNING`, so
    /// concurrent pairing attempts can never claim the same candidate twice.
    /// Widening the transaction to cover the new row means a crash can't
    /// leave a candidate pointing at a submission that was never saved.
    pub fn pair_or_enqueue(&self, submission: &Submission) -> Result<Option<Submission>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            insert_submission(&tx, submission)?;
            let claimed = claim_candidate(&tx, submission)?;

            if let Some(candidate) = &claimed {
                tx.execute(
                    "UPDATE submissions SET status = 'matched', matched_with = ?1 WHERE id = ?2",
                    [candidate.id.to_string(), submission.id.to_string()],
                )?;
            }

            tx.commit()?;
            Ok(claimed)
        })
    }
}

fn insert_submission(conn: &Connection, submission: &Submission) -> Result<()> {
    conn.execute(
        "INSERT INTO submissions
            (id, content_type, content, emotional_tags, status, matched_with, identity_token, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            submission.id.to_string(),
            submission.content_type.as_str(),
            submission.content,
            serde_json::to_string(&submission.emotional_tags)?,
            submission.status.as_str(),
            submission.matched_with.map(|m| m.to_string()),
            submission.identity_token,
            // Fixed-width RFC 3339 so string ordering equals time ordering.
            submission
                .created_at
                .to_rfc3339_opts(SecondsFormat::Nanos, true),
        ],
    )?;
    Ok(())
}

/// Find-and-claim in one statement. The subquery picks the most recent
/// unmatched submission with a different identity token whose JSON tag array
/// intersects the claimer's tags; the UPDATE flips it in the same step.
fn claim_candidate(conn: &Connection, claimer: &Submission) -> Result<Option<Submission>> {
    // Nothing intersects an empty tag set.
    if claimer.emotional_tags.is_empty() {
        return Ok(None);
    }

    let placeholders: Vec<String> = (0..claimer.emotional_tags.len())
        .map(|i| format!("?{}", i + 3))
        .collect();
    let sql = format!(
        "UPDATE submissions
         SET status = 'matched', matched_with = ?1
         WHERE id = (
             SELECT s.id FROM submissions s
             WHERE s.status = 'unmatched'
               AND s.identity_token <> ?2
               AND EXISTS (
                   SELECT 1 FROM json_each(s.emotional_tags)
                   WHERE json_each.value IN ({})
               )
             ORDER BY s.created_at DESC, s.rowid DESC
             LIMIT 1
         )
         RETURNING {}",
        placeholders.join(", "),
        SUBMISSION_COLUMNS
    );

    let claimer_id = claimer.id.to_string();
    let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&claimer_id, &claimer.identity_token];
    for tag in &claimer.emotional_tags {
        params.push(tag);
    }

    let mut stmt = conn.prepare(&sql)?;
    let row = stmt
        .query_row(params.as_slice(), SubmissionRow::from_row)
        .optional()?;
    row.map(SubmissionRow::into_submission).transpose()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use kindred_types::models::{ContentType, SubmissionStatus};

    use super::*;

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("kindred.db")).unwrap();
        (dir, db)
    }

    fn sub(identity: &str, tags: &[&str]) -> Submission {
        let mut s = Submission::new(ContentType::Text, "content".into(), identity.into());
        s.emotional_tags = tags.iter().map(|t| t.to_string()).collect();
        s
    }

    #[test]
    fn test_insert_and_get_round_trip() {
        let (_dir, db) = open_db();
        let s = sub("tok", &["hopeful", "serene"]);
        db.insert_submission(&s).unwrap();

        let loaded = db.get_submission(s.id).unwrap().unwrap();
        assert_eq!(loaded.id, s.id);
        assert_eq!(loaded.emotional_tags, vec!["hopeful", "serene"]);
        assert_eq!(loaded.status, SubmissionStatus::Unmatched);
        assert!(loaded.matched_with.is_none());
        assert_eq!(loaded.created_at, s.created_at);

        assert!(db.get_submission(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_pair_claims_most_recent_compatible() {
        let (_dir, db) = open_db();
        let mut older = sub("a", &["hopeful", "serene"]);
        older.created_at = Utc::now() - Duration::hours(3);
        let newer = sub("b", &["hopeful"]);
        db.insert_submission(&older).unwrap();
        db.insert_submission(&newer).unwrap();

        let new = sub("c", &["hopeful", "joyful"]);
        let claimed = db.pair_or_enqueue(&new).unwrap().unwrap();
        assert_eq!(claimed.id, newer.id);
        assert_eq!(claimed.status, SubmissionStatus::Matched);
        assert_eq!(claimed.matched_with, Some(new.id));

        // Both sides persisted mutually.
        let ours = db.get_submission(new.id).unwrap().unwrap();
        assert_eq!(ours.status, SubmissionStatus::Matched);
        assert_eq!(ours.matched_with, Some(newer.id));

        // The older candidate still waits.
        let older = db.get_submission(older.id).unwrap().unwrap();
        assert_eq!(older.status, SubmissionStatus::Unmatched);
    }

    #[test]
    fn test_no_intersection_enqueues() {
        let (_dir, db) = open_db();
        db.insert_submission(&sub("a", &["chaotic", "tense"])).unwrap();

        let new = sub("b", &["serene"]);
        assert!(db.pair_or_enqueue(&new).unwrap().is_none());

        let stored = db.get_submission(new.id).unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::Unmatched);
    }

    #[test]
    fn test_same_identity_never_pairs() {
        let (_dir, db) = open_db();
        db.insert_submission(&sub("a", &["hopeful"])).unwrap();

        assert!(db.pair_or_enqueue(&sub("a", &["hopeful"])).unwrap().is_none());
    }

    #[test]
    fn test_empty_tags_enqueue_without_claim() {
        let (_dir, db) = open_db();
        db.insert_submission(&sub("a", &["hopeful"])).unwrap();

        let new = Submission::new(ContentType::Text, "hi".into(), "b".into());
        assert!(db.pair_or_enqueue(&new).unwrap().is_none());
    }

    #[test]
    fn test_matched_candidate_is_out_of_the_pool() {
        let (_dir, db) = open_db();
        let waiting = sub("a", &["hopeful"]);
        db.insert_submission(&waiting).unwrap();

        assert!(db.pair_or_enqueue(&sub("b", &["hopeful"])).unwrap().is_some());
        // waiting and b are both matched now; c finds nothing.
        assert!(db.pair_or_enqueue(&sub("c", &["hopeful"])).unwrap().is_none());
    }

    #[test]
    fn test_latest_for_identity_orders_by_time() {
        let (_dir, db) = open_db();
        let mut first = sub("tok", &["calm"]);
        first.created_at = Utc::now() - Duration::hours(30);
        let second = sub("tok", &["tense"]);
        db.insert_submission(&first).unwrap();
        db.insert_submission(&second).unwrap();

        let latest = db.latest_submission_for_identity("tok").unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert!(db.latest_submission_for_identity("none").unwrap().is_none());
    }

    /// Concurrent pairing attempts against one shared-tag pool: every matched
    /// pair must be mutual and the pre-seeded candidate claimed exactly once.
    #[test]
    fn test_concurrent_claims_are_exactly_once() {
        let (_dir, db) = open_db();
        let db = Arc::new(db);

        let candidate = sub("seed", &["hopeful"]);
        let candidate_id = candidate.id;
        db.insert_submission(&candidate).unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let db = db.clone();
            handles.push(std::thread::spawn(move || {
                let new = sub(&format!("identity-{}", i), &["hopeful"]);
                db.pair_or_enqueue(&new).unwrap();
                new.id
            }));
        }
        let ids: Vec<Uuid> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Exactly one submission claimed the seeded candidate.
        let claimers: Vec<Uuid> = ids
            .iter()
            .chain(std::iter::once(&candidate_id))
            .filter(|id| {
                db.get_submission(**id).unwrap().unwrap().matched_with == Some(candidate_id)
            })
            .copied()
            .collect();
        assert_eq!(claimers.len(), 1);

        // All matched pairs are mutual; 9 submissions total means exactly one
        // is still waiting.
        let mut unmatched = 0;
        for id in ids.iter().chain(std::iter::once(&candidate_id)) {
            let s = db.get_submission(*id).unwrap().unwrap();
            match s.matched_with {
                Some(partner) => {
                    let p = db.get_submission(partner).unwrap().unwrap();
                    assert_eq!(p.matched_with, Some(s.id));
                    assert_eq!(s.status, SubmissionStatus::Matched);
                }
                None => unmatched += 1,
            }
        }
        assert_eq!(unmatched, 1);
    }
}
