use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of content a submission carries. For image and audio the
/// submission's `content` is a stored-media path, not the bytes themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Image,
    Audio,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Image => "image",
            ContentType::Audio => "audio",
        }
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ContentType::Text),
            "image" => Ok(ContentType::Image),
            "audio" => Ok(ContentType::Audio),
            other => Err(format!("unknown content type: {}", other)),
        }
    }
}

/// Two-state lifecycle. A submission never leaves `Matched` once it gets there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Unmatched,
    Matched,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Unmatched => "unmatched",
            SubmissionStatus::Matched => "matched",
        }
    }
}

impl std::str::FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unmatched" => Ok(SubmissionStatus::Unmatched),
            "matched" => Ok(SubmissionStatus::Matched),
            other => Err(format!("unknown submission status: {}", other)),
        }
    }
}

/// One user-contributed piece of content awaiting or having completed pairing.
///
/// `emotional_tags` is semantically a set, but the classifier's insertion
/// order is preserved for display and debugging. `matched_with` is `Some`
/// iff `status` is `Matched`, and pairing is always mutual.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub content_type: ContentType,
    pub content: String,
    pub emotional_tags: Vec<String>,
    pub status: SubmissionStatus,
    pub matched_with: Option<Uuid>,
    pub identity_token: String,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    /// A fresh submission: unmatched, tags empty until classification runs.
    pub fn new(content_type: ContentType, content: String, identity_token: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_type,
            content,
            emotional_tags: Vec::new(),
            status: SubmissionStatus::Unmatched,
            matched_with: None,
            identity_token,
            created_at: Utc::now(),
        }
    }

    /// Returns true if this submission shares at least one tag with `other`.
    pub fn tags_intersect(&self, other: &Submission) -> bool {
        self.emotional_tags
            .iter()
            .any(|t| other.emotional_tags.contains(t))
    }

    /// Mark this submission as the matched half of a pair.
    pub fn pair_with(&mut self, other_id: Uuid) {
        self.status = SubmissionStatus::Matched;
        self.matched_with = Some(other_id);
    }
}
