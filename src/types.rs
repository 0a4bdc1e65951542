//! Shared error type for Rollcall

use hyper::StatusCode;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, BoardError>;

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// Upstream cluster API failed or returned an unexpected response
    #[error("Cluster error: {0}")]
    Cluster(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The hub control loop is gone
    #[error("Hub closed: {0}")]
    HubClosed(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BoardError {
    /// HTTP status used when this error ends a request
    pub fn status_code(&self) -> StatusCode {
        match self {
            BoardError::NotFound(_) => StatusCode::NOT_FOUND,
            BoardError::BadRequest(_) | BoardError::Json(_) => StatusCode::BAD_REQUEST,
            BoardError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            BoardError::Cluster(_) | BoardError::Http(_) => StatusCode::BAD_GATEWAY,
            BoardError::HubClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
            BoardError::Io(_) | BoardError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for BoardError {
    fn from(err: reqwest::Error) -> Self {
        BoardError::Http(err.to_string())
    }
}
