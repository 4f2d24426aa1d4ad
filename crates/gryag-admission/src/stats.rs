/// Read-only snapshot for the admin stats endpoint. Additive observability,
/// not part of the admission decision path itself.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RateLimiterStats {
    pub chat_buckets_active: u64,
    pub user_buckets_active: u64,
    pub locks_held: u64,
}
