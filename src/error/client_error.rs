use thiserror::Error;

/// HTTP transport and connection errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The underlying HTTP call failed (network, TLS, timeout).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// A URL or header could not be constructed.
    #[error("connection error: {0}")]
    Connection(String),
}
