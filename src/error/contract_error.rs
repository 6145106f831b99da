use thiserror::Error;

use super::ExprError;

/// Contract configuration errors, raised when a contract is loaded rather
/// than when an operation runs.
#[derive(Debug, Error)]
pub enum ContractError {
    /// A media-type string in the contract could not be parsed.
    #[error("invalid media type '{0}'")]
    InvalidMediaType(String),

    /// The pagination description is structurally invalid.
    #[error("invalid pagination description: {0}")]
    Pagination(String),

    /// A pagination modifier declares an unsupported operation.
    #[error("unsupported pagination modifier op '{0}'")]
    ModifierOp(String),

    /// An expression embedded in the contract failed to parse.
    #[error("invalid expression in contract: {0}")]
    Expression(#[from] ExprError),
}
