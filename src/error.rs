use thiserror::Error;

/// Failures on the completion path. None of these are retried.
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed completion chunk: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stream: {0}")]
    Stream(String),
}

pub type Result<T> = std::result::Result<T, AdvisorError>;
