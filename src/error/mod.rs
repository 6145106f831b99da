//! Layered error types for the contract engine.
//!
//! The error hierarchy is structured for actionable diagnostics:
//! - [`ApiError`] - Top-level error type for all operations
//! - [`ClientError`] - HTTP transport and connection errors
//! - [`PayloadError`] / [`EncodeError`] - Request payload encoding errors
//! - [`DispatchError`] / [`ResponseError`] - Response dispatch errors
//! - [`ExprError`] - Runtime expression evaluation and mutation errors
//! - [`AuthError`] - Security strategy errors
//! - [`ContractError`] - Contract configuration errors

mod api_error;
mod auth_error;
mod client_error;
mod contract_error;
mod dispatch_error;
mod expr_error;
mod payload_error;

pub use api_error::ApiError;
pub use auth_error::AuthError;
pub use client_error::ClientError;
pub use contract_error::ContractError;
pub use dispatch_error::{DispatchError, ResponseError};
pub use expr_error::ExprError;
pub use payload_error::{EncodeError, PayloadError};
