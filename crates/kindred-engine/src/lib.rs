pub mod matcher;
pub mod rate_limit;
pub mod store;

pub use matcher::MatchEngine;
pub use rate_limit::{Admission, RateLimiter};
pub use store::{MemoryStore, SubmissionStore};
