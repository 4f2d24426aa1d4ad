pub mod error;
pub mod limiter;
pub mod quota;
pub mod stats;

pub use error::{AdmissionError, Result};
pub use limiter::{Outcome, RateLimiter};
pub use quota::{QuotaOutcome, QuotaPolicy, QuotaTracker};
pub use stats::RateLimiterStats;
