/// Shared error type used across all Porter crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("session is no longer active: {0}")]
    TerminalSession(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether a client may retry the failed request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ServiceUnavailable(_) | Error::Http(_))
    }
}
