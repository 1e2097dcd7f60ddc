pub mod storage;
pub mod submissions;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use kindred_classifier::Classifier;
use kindred_db::Database;
use kindred_engine::RateLimiter;

use crate::storage::MediaStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub media: MediaStore,
    pub classifier: Classifier,
    pub rate_limiter: RateLimiter,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/submit", post(submissions::submit))
        .route("/api/check/{id}", get(submissions::check_status))
        .route("/health", get(submissions::health))
        .with_state(state)
}
