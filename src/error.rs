use thiserror::Error;

#[derive(Error, Debug)]
pub enum IllustratorError {
    #[error("Input not found: {0}")]
    NotFound(String),

    #[error("Invalid input document: {0}")]
    DataFormat(String),

    #[error("Missing credential: {0} is not set")]
    MissingCredential(&'static str),

    #[error("Upstream API error: {0}")]
    Upstream(String),

    #[error("Failed to download {url} (HTTP {status})")]
    Fetch { status: u16, url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IllustratorError>;
