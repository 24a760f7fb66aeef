use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The model declined to answer.
    #[error("model refused: {0}")]
    Refused(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("model unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::InvalidResponse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
