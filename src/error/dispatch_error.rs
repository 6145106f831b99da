use serde_json::Value;
use thiserror::Error;

/// Response dispatch errors: the response did not fit the operation's
/// contract.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The status code matched no contract entry and no default entry exists.
    #[error("unexpected response status code ({0})")]
    UnexpectedStatus(u16),

    /// The status matched an entry but the content type matched none.
    #[error("unexpected response content type ({0})")]
    UnexpectedContentType(String),

    /// The body could not be decoded into the declared shape.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The body claimed to be XML but could not be parsed as such.
    #[error("failed to decode XML response: {0}")]
    Xml(String),

    /// The body claimed to be text but is not valid UTF-8.
    #[error("response body is not valid UTF-8 text")]
    NotText,
}

/// The server answered with a declared error status while the raise-on-error
/// policy was enabled. Carries the decoded error outcome.
#[derive(Debug, Error)]
#[error("server returned error status {status}")]
pub struct ResponseError {
    /// The HTTP status code of the response.
    pub status: u16,
    /// The decoded response body, `Value::Null` for empty-bodied outcomes.
    pub body: Value,
}
