//! Response dispatch against a multi-outcome contract.
//!
//! An operation declares an ordered table of [`ResponseRule`]s - one
//! `(status, content type, shape)` entry per legal response. The
//! [`Dispatcher`] matches the received exchange against that table, decodes
//! the body into the matched entry's shape, attaches a pagination cursor
//! when the contract declares one, and enforces the raise-on-error policy.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::client::{ApiClient, Exchange};
use crate::codec::{decode_body, DecodedBody};
use crate::error::{ApiError, DispatchError, ResponseError};
use crate::expr::ParamType;
use crate::media_type::MediaType;
use crate::pagination::{build_paginator, PaginationDescription, Paginator};

/// The status-code side of a contract entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMatch {
    /// Matches exactly one status code.
    Code(u16),
    /// Matches any status not covered by another entry. Default entries are
    /// stably moved to the end of the table before matching, so specific
    /// entries always win ties.
    Default,
}

impl StatusMatch {
    fn covers(&self, status: u16) -> bool {
        match self {
            Self::Code(code) => *code == status,
            Self::Default => true,
        }
    }

    fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

impl From<u16> for StatusMatch {
    fn from(code: u16) -> Self {
        Self::Code(code)
    }
}

type DecodeFn<T> = Arc<dyn Fn(&DecodedBody) -> Result<T, DispatchError> + Send + Sync>;

/// One `(status, content type, shape)` entry of an operation's response
/// contract.
///
/// The shape is captured as a decode closure producing the operation's
/// outcome type `T`, so one table can decode different payload shapes for
/// different statuses.
///
/// ## Examples
///
/// ```rust,ignore
/// enum ThingOutcome { Ok(ThingList), NotFound, Error(ApiProblem) }
///
/// let rules = vec![
///     ResponseRule::json(200, ThingOutcome::Ok),
///     ResponseRule::empty(404, || ThingOutcome::NotFound),
///     ResponseRule::default_json(ThingOutcome::Error),
/// ];
/// ```
pub struct ResponseRule<T> {
    status: StatusMatch,
    media_type: Option<MediaType>,
    decode: DecodeFn<T>,
}

impl<T> Clone for ResponseRule<T> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            media_type: self.media_type.clone(),
            decode: Arc::clone(&self.decode),
        }
    }
}

impl<T> fmt::Debug for ResponseRule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseRule")
            .field("status", &self.status)
            .field("media_type", &self.media_type)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> ResponseRule<T> {
    /// An entry decoding a JSON body into shape `S` and mapping it into the
    /// outcome type.
    pub fn json<S, F>(status: impl Into<StatusMatch>, map: F) -> Self
    where
        S: DeserializeOwned,
        F: Fn(S) -> T + Send + Sync + 'static,
    {
        Self::shaped(status, MediaType::from_parts("application", "json"), map)
    }

    /// A default-status entry decoding a JSON body; matches any status not
    /// covered by another entry.
    pub fn default_json<S, F>(map: F) -> Self
    where
        S: DeserializeOwned,
        F: Fn(S) -> T + Send + Sync + 'static,
    {
        Self::shaped(StatusMatch::Default, MediaType::from_parts("application", "json"), map)
    }

    /// An entry with an explicit content type, decoding the structured body
    /// into shape `S`.
    pub fn with_content_type<S, F>(
        status: impl Into<StatusMatch>,
        content_type: MediaType,
        map: F,
    ) -> Self
    where
        S: DeserializeOwned,
        F: Fn(S) -> T + Send + Sync + 'static,
    {
        Self::shaped(status, content_type, map)
    }

    /// An entry with no body: a pure status signal producing an outcome
    /// from nothing.
    pub fn empty<F>(status: impl Into<StatusMatch>, make: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            status: status.into(),
            media_type: None,
            decode: Arc::new(move |_| Ok(make())),
        }
    }

    fn shaped<S, F>(status: impl Into<StatusMatch>, media_type: MediaType, map: F) -> Self
    where
        S: DeserializeOwned,
        F: Fn(S) -> T + Send + Sync + 'static,
    {
        Self {
            status: status.into(),
            media_type: Some(media_type),
            decode: Arc::new(move |body: &DecodedBody| {
                let shape: S = serde_json::from_value(body.to_value())?;
                Ok(map(shape))
            }),
        }
    }
}

/// The decoded, typed result of dispatching one HTTP response.
pub struct Outcome<T> {
    payload: T,
    status: StatusCode,
    headers: HeaderMap,
    pages: Option<Paginator>,
}

impl<T> Outcome<T> {
    /// The decoded payload.
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Consumes the outcome, returning the decoded payload.
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// The HTTP status of the response this outcome was decoded from.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether a pagination continuation is currently attached.
    pub fn has_more(&self) -> bool {
        self.pages.as_ref().is_some_and(Paginator::has_more)
    }

    /// The pagination cursor, present only for outcomes whose contract
    /// declares pagination.
    pub fn pages(&mut self) -> Option<&mut Paginator> {
        self.pages.as_mut()
    }

    /// Detaches the pagination cursor from the outcome.
    pub fn take_pages(&mut self) -> Option<Paginator> {
        self.pages.take()
    }
}

impl<T: fmt::Debug> fmt::Debug for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outcome")
            .field("payload", &self.payload)
            .field("status", &self.status)
            .field("has_more", &self.has_more())
            .finish_non_exhaustive()
    }
}

/// Matches responses against a rule table and produces outcomes.
///
/// The dispatcher owns everything a pagination continuation needs to
/// re-enter it: the client handle, the rule table, the pagination
/// description and the parameter maps. Cloning shares all of it.
pub struct Dispatcher<T> {
    pub(crate) client: ApiClient,
    pub(crate) rules: Arc<[ResponseRule<T>]>,
    pub(crate) pagination: Option<Arc<PaginationDescription>>,
    pub(crate) path_values: HashMap<String, String>,
    pub(crate) query_types: HashMap<String, ParamType>,
    pub(crate) header_types: HashMap<String, ParamType>,
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            rules: Arc::clone(&self.rules),
            pagination: self.pagination.clone(),
            path_values: self.path_values.clone(),
            query_types: self.query_types.clone(),
            header_types: self.header_types.clone(),
        }
    }
}

impl<T: 'static> Dispatcher<T> {
    /// Creates a dispatcher for a rule table.
    pub fn new(client: ApiClient, rules: Vec<ResponseRule<T>>) -> Self {
        Self {
            client,
            rules: rules.into(),
            pagination: None,
            path_values: HashMap::new(),
            query_types: HashMap::new(),
            header_types: HashMap::new(),
        }
    }

    /// Declares pagination support for this operation's outcomes.
    pub fn with_pagination(mut self, description: PaginationDescription) -> Self {
        self.pagination = Some(Arc::new(description));
        self
    }

    /// Supplies the path-parameter bindings of the originating request.
    pub fn with_path_values(mut self, values: HashMap<String, String>) -> Self {
        self.path_values = values;
        self
    }

    /// Supplies declared query-parameter types for expression casts.
    pub fn with_query_types(mut self, types: HashMap<String, ParamType>) -> Self {
        self.query_types = types;
        self
    }

    /// Supplies declared header-parameter types for expression casts.
    pub fn with_header_types(mut self, types: HashMap<String, ParamType>) -> Self {
        self.header_types = types;
        self
    }

    /// Dispatches an exchange against the rule table.
    ///
    /// Entries are walked in declaration order with default-status entries
    /// stably moved last; the first entry whose status and content type both
    /// match decodes the body. Outcomes of paginated operations get their
    /// cursor attached before the raise-on-error policy is applied.
    ///
    /// ## Errors
    ///
    /// - [`DispatchError::UnexpectedStatus`] if no entry covers the status.
    /// - [`DispatchError::UnexpectedContentType`] if the status matched but
    ///   no entry's content type did.
    /// - [`ResponseError`] if the raise-on-error policy is on and the
    ///   status is an HTTP error.
    /// - Decode and expression failures from the matched entry.
    pub fn dispatch(&self, exchange: Exchange) -> Result<Outcome<T>, ApiError> {
        let status = exchange.status.as_u16();

        if !self.rules.iter().any(|r| r.status.covers(status)) {
            return Err(DispatchError::UnexpectedStatus(status).into());
        }

        let response_type = exchange.content_type();
        let ordered = self
            .rules
            .iter()
            .filter(|r| !r.status.is_default())
            .chain(self.rules.iter().filter(|r| r.status.is_default()));

        for rule in ordered {
            if !rule.status.covers(status) {
                continue;
            }
            let Some(rule_type) = &rule.media_type else {
                debug!(status, "response matched an empty-bodied contract entry");
                return self.finish(rule, DecodedBody::Empty, exchange);
            };
            let Some(response_type) = &response_type else {
                continue;
            };
            if rule_type.matches(response_type) {
                debug!(status, content_type = %rule_type, "response matched contract entry");
                let decoded = decode_body(Some(response_type), &exchange.body)?;
                return self.finish(rule, decoded, exchange);
            }
        }

        let received = response_type
            .map(|t| t.to_string())
            .unwrap_or_else(|| "none".to_string());
        Err(DispatchError::UnexpectedContentType(received).into())
    }

    fn finish(
        &self,
        rule: &ResponseRule<T>,
        decoded: DecodedBody,
        exchange: Exchange,
    ) -> Result<Outcome<T>, ApiError> {
        let payload = (rule.decode)(&decoded)?;

        let pages = match &self.pagination {
            Some(description) => Some(build_paginator(
                self,
                description,
                &exchange,
                &decoded.to_value(),
            )?),
            None => None,
        };

        if self.client.raises_on_error()
            && (exchange.status.is_client_error() || exchange.status.is_server_error())
        {
            return Err(ResponseError {
                status: exchange.status.as_u16(),
                body: decoded.to_value(),
            }
            .into());
        }

        Ok(Outcome {
            payload,
            status: exchange.status,
            headers: exchange.headers,
            pages,
        })
    }
}
