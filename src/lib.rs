//! Contract-driven execution engine for HTTP API operations.
//!
//! This library executes a single logical API operation and resolves its
//! outcome against a declarative contract: an ordered table of
//! `(status, content type, shape)` entries describes every legal response,
//! and a table of allowed content types describes every legal request body.
//! A small expression language ("runtime expressions") lets a contract
//! point into the HTTP exchange to read values or to rewrite a follow-up
//! request, which is what powers cursor-based lazy pagination.
//!
//! ## Core Types
//!
//! - [`ApiClient`] - Blocking HTTP client executing [`ApiRequest`]s
//! - [`Operation`] - One API call: path, payload, contract, pagination
//! - [`ResponseRule`] / [`Dispatcher`] - The response contract and its matcher
//! - [`Outcome`] - The decoded, typed result of one dispatched response
//! - [`Paginator`] - Buffered page items plus the lazy continuation
//!
//! ## Content Negotiation
//!
//! - [`MediaType`] - Parsed media types with `matches`/`compatible` semantics
//! - [`WireFormat`] - The supported encodings (JSON, XML, plain text)
//! - [`Payload`] / [`DecodedBody`] - Payloads before and after the wire
//!
//! ## Runtime Expressions
//!
//! - [`Expr`] / [`Template`] - The parsed expression grammar
//! - [`evaluate`] / [`apply`] - Read from an exchange, write into a request
//!
//! ## Security
//!
//! - [`Security`] - Strategy trait decorating outgoing requests
//! - [`BearerToken`] / [`OAuth2ClientCredentials`] - Provided strategies

pub mod error;

mod auth;
mod client;
mod codec;
mod dispatch;
mod expr;
mod media_type;
mod operation;
mod pagination;
mod payload;
mod request;

pub use auth::{BearerToken, OAuth2ClientCredentials, Security};
pub use client::{ApiClient, ApiClientBuilder, Exchange};
pub use codec::{decode_body, DecodedBody, Payload, WireFormat};
pub use dispatch::{Dispatcher, Outcome, ResponseRule, StatusMatch};
pub use error::ApiError;
pub use expr::{
    apply, evaluate, evaluate_expr, evaluate_template, pointer_get, pointer_set, Expr,
    ExprContext, ParamType, Pointer, Segment, Template,
};
pub use media_type::MediaType;
pub use operation::Operation;
pub use pagination::{PageIter, PaginationDescription, PaginationModifier, Paginator};
pub use payload::resolve_payload;
pub use request::{ApiRequest, Method, ResourcePath};
