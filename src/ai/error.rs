//! Error types for collaborator calls.

use thiserror::Error;

/// Errors that can occur while talking to the AI service.
#[derive(Debug, Error)]
pub enum AiError {
    /// No API key in the environment.
    #[error("API key not found. Set the {env_var} environment variable.")]
    ApiKeyMissing { env_var: String },

    /// Transport-level failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the service.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The service answered without the content we asked for.
    #[error("Service returned no {0}")]
    EmptyResponse(&'static str),

    /// Content did not match the expected schema.
    #[error("Unexpected response shape: {0}")]
    InvalidResponseShape(String),
}
