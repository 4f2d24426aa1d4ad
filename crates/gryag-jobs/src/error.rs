use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobsError {
    #[error("lock store error: {0}")]
    Lock(#[from] redis::RedisError),

    #[error("persistence error: {0}")]
    Persistence(#[from] gryag_persistence::PersistenceError),

    #[error("llm provider error: {0}")]
    Provider(#[from] gryag_agent::AgentError),
}

pub type Result<T> = std::result::Result<T, JobsError>;
