//! Errors raised by the HTTP collaborator clients.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The HTTP request failed or returned a non-success status.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response could not be interpreted.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
    /// The frame could not be turned into an image for upload.
    #[error("Image encoding failed: {0}")]
    Encode(String),
}
