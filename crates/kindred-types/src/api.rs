use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ContentType;

// -- Submit --

/// The paired submission's content as returned to the other side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchData {
    pub content_type: ContentType,
    pub content: String,
}

/// 200 response for POST /api/submit. `status` is "matched" when a partner
/// was claimed immediately, otherwise "waiting" and the client polls
/// GET /api/check/{id} with `submission_id`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAccepted {
    pub status: String,
    pub submission_id: Uuid,
    pub identity_token: String,
    pub submission_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_data: Option<MatchData>,
}

/// 429 body: enough for the client to resume polling its prior submission.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimited {
    pub msg: String,
    pub last_submission_time: DateTime<Utc>,
    pub last_submission_id: Uuid,
}

// -- Check --

/// Polled status of a submission. Matched is terminal and deterministic
/// regardless of which side of the pair is queried.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum CheckResponse {
    #[serde(rename = "waiting")]
    Waiting,
    #[serde(rename = "matched", rename_all = "camelCase")]
    Matched { match_data: MatchData },
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub msg: String,
}
