use std::fmt;

use thiserror::Error;

/// A single failed attempt to encode a payload for one candidate
/// content type.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The payload is not (or does not serialize to) well-formed JSON.
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is not (or does not serialize to) well-formed XML.
    #[error("payload is not valid XML: {0}")]
    Xml(String),

    /// The payload bytes are not valid UTF-8 text.
    #[error("payload is not valid UTF-8 text")]
    NotText,

    /// The payload's runtime shape has no representation in the format.
    #[error("a {payload} payload cannot be encoded as {format}")]
    Unrepresentable {
        format: &'static str,
        payload: &'static str,
    },

    /// No wire format covers the candidate content type at all.
    #[error("no encoder for content type '{0}'")]
    NoEncoder(String),

    /// An explicit `Content-Type` header excluded every declared type.
    #[error("explicit Content-Type '{0}' matches no declared request type")]
    ExcludedByHeader(String),
}

/// No allowed content type could encode the caller's payload.
///
/// Aggregates one [`EncodeError`] per candidate content type, in the order
/// the candidates were tried.
#[derive(Debug)]
pub struct PayloadError {
    /// `(content type, failure)` for every candidate tried.
    pub attempts: Vec<(String, EncodeError)>,
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no allowed content type could encode the payload")?;
        for (content_type, err) in &self.attempts {
            write!(f, "; {content_type}: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for PayloadError {}
