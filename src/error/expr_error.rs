use thiserror::Error;

/// Runtime expression failures.
///
/// Raised for grammar errors at parse time and for lookup or write failures
/// at evaluation time. Pagination correctness depends on these surfacing, so
/// callers never swallow them.
#[derive(Debug, Error)]
pub enum ExprError {
    /// The string is not a valid runtime expression.
    #[error("invalid runtime expression '{0}'")]
    InvalidExpression(String),

    /// The expression reads a location that cannot be written.
    #[error("expression '{0}' cannot modify a request")]
    NotWritable(String),

    /// No binding exists for the named path parameter.
    #[error("path parameter '{0}' not found")]
    UnknownPathParameter(String),

    /// The request URL carries no query parameter with the given name.
    #[error("query parameter '{0}' not found")]
    QueryParameterNotFound(String),

    /// A pointer segment named a key the body does not contain.
    #[error("key '{0}' not found")]
    KeyNotFound(String),

    /// A pointer segment indexed past the end of an array.
    #[error("index '{0}' out of range")]
    IndexOutOfRange(String),

    /// A pointer segment landed on a scalar where a container was needed.
    #[error("cannot traverse {found} value at '{segment}'")]
    NotAContainer {
        segment: String,
        found: &'static str,
    },

    /// The addressed body is not valid JSON.
    #[error("body is not valid JSON: {0}")]
    Body(#[from] serde_json::Error),

    /// A raw parameter value could not be cast to its declared type.
    #[error("'{value}' is not a valid {target}")]
    Cast {
        value: String,
        target: &'static str,
    },

    /// A value written to a header is not a legal header value.
    #[error("invalid header value for '{0}'")]
    InvalidHeader(String),

    /// A value written to `$url` is not a valid URL.
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    /// A value written to `$method` is not an HTTP method.
    #[error("invalid method '{0}'")]
    InvalidMethod(String),
}
