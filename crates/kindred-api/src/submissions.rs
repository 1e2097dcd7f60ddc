use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use rand::RngCore;
use tracing::{error, info, warn};
use uuid::Uuid;

use kindred_engine::{Admission, MatchEngine};
use kindred_types::api::{CheckResponse, ErrorBody, MatchData, RateLimited, SubmitAccepted};
use kindred_types::models::{ContentType, Submission};

use crate::AppState;

// ── Handlers ────────────────────────────────────────────────────────────

/// POST /api/submit — accept a text or file submission, classify it, and
/// attempt an immediate pairing.
///
/// Multipart fields: `text` OR `file`, plus an optional `identityToken`.
/// 400 when neither content field is present, 429 inside the cooldown
/// window, otherwise 200 with either a match or a waiting handle.
pub async fn submit(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, StatusCode> {
    let mut text: Option<String> = None;
    let mut file: Option<(String, String, Bytes)> = None;
    let mut identity_token: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        match field.name() {
            Some("text") => {
                let value = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                if !value.trim().is_empty() {
                    text = Some(value);
                }
            }
            Some("identityToken") => {
                let value = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                if !value.is_empty() {
                    identity_token = Some(value);
                }
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                file = Some((filename, mime, bytes));
            }
            _ => {}
        }
    }

    if text.is_none() && file.is_none() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                msg: "No content submitted.".into(),
            }),
        )
            .into_response());
    }

    // Cooldown check: read-then-decide against the identity's last submission.
    {
        let st = state.clone();
        let token = identity_token.clone();
        let admission = tokio::task::spawn_blocking(move || {
            st.rate_limiter.check(&*st.db, token.as_deref())
        })
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Rate limit check failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

        if let Admission::Rejected {
            last_submission_id,
            last_submission_time,
        } = admission
        {
            return Ok((
                StatusCode::TOO_MANY_REQUESTS,
                Json(RateLimited {
                    msg: "You can only submit once every 24 hours.".into(),
                    last_submission_time,
                    last_submission_id,
                }),
            )
                .into_response());
        }
    }

    let token = identity_token.unwrap_or_else(new_identity_token);

    // Materialize the submission: text inline, media written to disk first.
    let mut submission = match (text, file) {
        (Some(text), _) => Submission::new(ContentType::Text, text, token.clone()),
        (None, Some((filename, mime, bytes))) => {
            let kind = if mime.starts_with("image") {
                ContentType::Image
            } else {
                ContentType::Audio
            };
            let path = state.media.save(&filename, &bytes).await.map_err(|e| {
                error!("Failed to store upload: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
            Submission::new(kind, path, token.clone())
        }
        (None, None) => unreachable!("content presence checked above"),
    };

    // Tags are populated synchronously before any matching decision; the
    // classifier degrades to sentinel tags rather than failing the request.
    submission.emotional_tags = state
        .classifier
        .classify(submission.content_type, &submission.content)
        .await;

    let claimed = {
        let st = state.clone();
        let sub = submission.clone();
        tokio::task::spawn_blocking(move || MatchEngine::try_pair(&*st.db, &sub))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?
            .map_err(|e| {
                error!("Pairing failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?
    };

    let (status, match_data) = match claimed {
        Some(candidate) => {
            info!("Submission {} matched with {}", submission.id, candidate.id);
            (
                "matched",
                Some(MatchData {
                    content_type: candidate.content_type,
                    content: candidate.content,
                }),
            )
        }
        None => ("waiting", None),
    };

    Ok(Json(SubmitAccepted {
        status: status.into(),
        submission_id: submission.id,
        identity_token: token,
        submission_time: submission.created_at,
        match_data,
    })
    .into_response())
}

/// GET /api/check/{id} — poll a submission's pairing status.
pub async fn check_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, StatusCode> {
    let st = state.clone();
    let submission = tokio::task::spawn_blocking(move || st.db.get_submission(id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Submission lookup failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let Some(submission) = submission else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                msg: "Submission not found".into(),
            }),
        )
            .into_response());
    };

    let Some(partner_id) = submission.matched_with else {
        return Ok(Json(CheckResponse::Waiting).into_response());
    };

    let st = state.clone();
    let partner = tokio::task::spawn_blocking(move || st.db.get_submission(partner_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Partner lookup failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or_else(|| {
            // Pairing is written transactionally, so a dangling partner
            // points at store corruption rather than a race.
            warn!("Submission {} matched with missing {}", id, partner_id);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(CheckResponse::Matched {
        match_data: MatchData {
            content_type: partner.content_type,
            content: partner.content,
        },
    })
    .into_response())
}

/// GET /health — liveness check (no auth).
pub async fn health() -> &'static str {
    "ok"
}

// ── Helpers ─────────────────────────────────────────────────────────────

/// Fresh opaque identity token for first-time clients: 16 random bytes, hex.
fn new_identity_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
