//! Error types shared by the storage engine, forwarding engine and API layer.

use hyper::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BasketError>;

#[derive(Debug, Error)]
pub enum BasketError {
    #[error("basket with name '{0}' already exists")]
    NameConflict(String),

    #[error("invalid basket name '{0}'")]
    InvalidName(String),

    #[error("basket name '{0}' is reserved")]
    ReservedName(String),

    #[error("{0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forwarding failed: {0}")]
    Upstream(String),

    #[error("Error in template: {0}")]
    Render(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "redis-backend")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl BasketError {
    /// HTTP status the API layer reports for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            BasketError::NameConflict(_) => StatusCode::CONFLICT,
            BasketError::InvalidName(_) => StatusCode::BAD_REQUEST,
            BasketError::ReservedName(_) => StatusCode::FORBIDDEN,
            BasketError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BasketError::Unauthorized => StatusCode::UNAUTHORIZED,
            BasketError::Upstream(_)
            | BasketError::Render(_)
            | BasketError::Storage(_)
            | BasketError::Io(_)
            | BasketError::Json(_)
            | BasketError::Sqlite(_) => StatusCode::INTERNAL_SERVER_ERROR,
            #[cfg(feature = "redis-backend")]
            BasketError::Redis(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for failures of the backing store rather than of the caller's input.
    pub fn is_internal(&self) -> bool {
        self.status() == StatusCode::INTERNAL_SERVER_ERROR
    }

    pub fn storage(message: impl std::fmt::Display) -> Self {
        BasketError::Storage(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_conflict_mentions_name() {
        let err = BasketError::NameConflict("demo".to_string());
        assert!(err.to_string().contains("'demo'"));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            BasketError::ReservedName("api".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            BasketError::Validation("bad".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert!(BasketError::storage("disk full").is_internal());
        assert!(!BasketError::Unauthorized.is_internal());
    }

    #[test]
    fn test_render_message_prefix() {
        let err = BasketError::Render("unexpected end".into());
        assert_eq!(err.to_string(), "Error in template: unexpected end");
    }
}
