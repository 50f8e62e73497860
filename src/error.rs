use thiserror::Error;

/// Failures of a single call to the model service.
///
/// The conversation view collapses every variant into one fixed error text;
/// the variants exist so the log says what actually went wrong.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("no API key configured")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("stream ended unexpectedly")]
    StreamClosed,
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::MalformedResponse(err.to_string())
    }
}
