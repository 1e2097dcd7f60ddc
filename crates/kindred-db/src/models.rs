//! Database row types — raw TEXT columns as they come out of SQLite,
//! converted into `kindred_types` domain values in one place.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use kindred_types::models::Submission;

pub struct SubmissionRow {
    pub id: String,
    pub content_type: String,
    pub content: String,
    pub emotional_tags: String,
    pub status: String,
    pub matched_with: Option<String>,
    pub identity_token: String,
    pub created_at: String,
}

impl SubmissionRow {
    /// Column order matches `queries::SUBMISSION_COLUMNS`.
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            content_type: row.get(1)?,
            content: row.get(2)?,
            emotional_tags: row.get(3)?,
            status: row.get(4)?,
            matched_with: row.get(5)?,
            identity_token: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    pub fn into_submission(self) -> Result<Submission> {
        let id: Uuid = self
            .id
            .parse()
            .with_context(|| format!("corrupt submission id '{}'", self.id))?;
        let matched_with = self
            .matched_with
            .map(|m| {
                m.parse::<Uuid>()
                    .with_context(|| format!("corrupt matched_with '{}' on {}", m, id))
            })
            .transpose()?;
        let emotional_tags: Vec<String> = serde_json::from_str(&self.emotional_tags)
            .with_context(|| format!("corrupt tags on {}", id))?;
        let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&self.created_at)
            .with_context(|| format!("corrupt created_at '{}' on {}", self.created_at, id))?
            .with_timezone(&Utc);

        Ok(Submission {
            id,
            content_type: self
                .content_type
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?,
            content: self.content,
            emotional_tags,
            status: self.status.parse().map_err(|e: String| anyhow::anyhow!(e))?,
            matched_with,
            identity_token: self.identity_token,
            created_at,
        })
    }
}
