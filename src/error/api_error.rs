use thiserror::Error;

use super::{
    AuthError, ClientError, ContractError, DispatchError, ExprError, PayloadError, ResponseError,
};

/// Top-level error type for all contract-engine operations.
///
/// Every fallible public entry point returns this; the variants preserve the
/// originating layer so callers can match on the concern that failed.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP transport failure.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Security strategy failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The request payload could not be encoded for any allowed type.
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// The response did not fit the operation's contract.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The server answered with a declared error status.
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// A runtime expression failed to parse, evaluate or apply.
    #[error("runtime expression failed: {0}")]
    Expression(#[from] ExprError),

    /// The contract itself is invalid.
    #[error(transparent)]
    Contract(#[from] ContractError),
}
