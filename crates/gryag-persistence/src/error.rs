use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("message not found: chat={chat_id} external_id={external_message_id}")]
    MessageNotFound {
        chat_id: i64,
        external_message_id: i64,
    },

    #[error("user fact not found: id={id}")]
    FactNotFound { id: i64 },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<PersistenceError> for gryag_core::CoreError {
    fn from(err: PersistenceError) -> Self {
        gryag_core::CoreError::PersistenceUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
