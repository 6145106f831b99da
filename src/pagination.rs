//! Cursor-based lazy pagination.
//!
//! A [`PaginationDescription`] is the declarative contract a paginated
//! operation loads once: where the page items live in the decoded body
//! (`result`), how to detect that more exist (`has-more`), and how to build
//! the next request (reuse the previous one or start fresh, then apply
//! modifiers through the expression mutator).
//!
//! The engine turns a freshly dispatched outcome into a [`Paginator`]: an
//! owned item buffer plus an optional one-shot continuation. Iterating past
//! the buffer invokes the continuation, which executes the next request and
//! re-enters the dispatcher with the same rule table; the new outcome's
//! cursor becomes the next continuation. Cursors chain one at a time and
//! are never pre-fetched.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::client::Exchange;
use crate::dispatch::Dispatcher;
use crate::error::{ApiError, ContractError, ExprError};
use crate::expr::{
    apply, evaluate, is_truthy, pointer_get, value_kind, value_to_string, Expr, ExprContext,
    Pointer, Template,
};
use crate::request::{ApiRequest, Method};

/// The declarative pagination contract of an operation.
///
/// Deserializes from the kebab-case schema used in contract documents:
///
/// ```json
/// { "reuse-previous-request": true,
///   "modifiers": [
///     {"op": "set", "param": "$request.query.next_cursor",
///      "value": "$response.body#/paging/next_cursor"}
///   ],
///   "result": "data",
///   "has-more": "$response.body#/paging/next_cursor" }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationDescription {
    /// Start the next request from a clone of the previous one.
    #[serde(
        default,
        rename = "reuse-previous-request",
        alias = "reuse_previous_request"
    )]
    pub reuse_previous_request: bool,

    /// Method of a fresh next request; may be a runtime expression.
    /// Required when `reuse_previous_request` is false.
    #[serde(default)]
    pub method: String,

    /// URL of a fresh next request; may be a runtime expression.
    /// Required when `reuse_previous_request` is false.
    #[serde(default)]
    pub url: String,

    /// Rewrites applied to the next request, in declaration order.
    #[serde(default)]
    pub modifiers: Vec<PaginationModifier>,

    /// Pointer to the field of the decoded body holding the page's items.
    pub result: String,

    /// Expression evaluated against the received response to decide whether
    /// a continuation exists.
    #[serde(rename = "has-more", alias = "has_more")]
    pub has_more: String,
}

/// One rewrite of the next request: the target expression and the value
/// expression evaluated against the response that triggered the
/// continuation.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationModifier {
    /// The modifier operation; only `set` is supported.
    #[serde(default = "default_op")]
    pub op: String,
    /// Target expression addressing the part of the request to rewrite.
    pub param: String,
    /// Value expression, evaluated against the triggering response.
    pub value: String,
}

fn default_op() -> String {
    "set".to_string()
}

impl PaginationDescription {
    /// A description that re-issues the previous request.
    pub fn reuse_previous(result: impl Into<String>, has_more: impl Into<String>) -> Self {
        Self {
            reuse_previous_request: true,
            method: String::new(),
            url: String::new(),
            modifiers: Vec::new(),
            result: result.into(),
            has_more: has_more.into(),
        }
    }

    /// A description that builds a fresh next request.
    pub fn fresh(
        method: impl Into<String>,
        url: impl Into<String>,
        result: impl Into<String>,
        has_more: impl Into<String>,
    ) -> Self {
        Self {
            reuse_previous_request: false,
            method: method.into(),
            url: url.into(),
            modifiers: Vec::new(),
            result: result.into(),
            has_more: has_more.into(),
        }
    }

    /// Appends a `set` modifier.
    pub fn with_modifier(mut self, param: impl Into<String>, value: impl Into<String>) -> Self {
        self.modifiers.push(PaginationModifier {
            op: default_op(),
            param: param.into(),
            value: value.into(),
        });
        self
    }

    /// Loads and validates a description from a contract document value.
    ///
    /// ## Errors
    ///
    /// Returns [`ContractError`] if the value does not deserialize or fails
    /// [`validate`](Self::validate).
    pub fn from_value(value: &Value) -> Result<Self, ContractError> {
        let description: Self = serde_json::from_value(value.clone())
            .map_err(|e| ContractError::Pagination(e.to_string()))?;
        description.validate()?;
        Ok(description)
    }

    /// Checks the structural invariants at load time: `method` and `url`
    /// are required unless the previous request is reused, `result` must be
    /// non-empty, every embedded expression must parse, and modifier ops
    /// must be `set`.
    ///
    /// ## Errors
    ///
    /// Returns the first violated invariant as a [`ContractError`].
    pub fn validate(&self) -> Result<(), ContractError> {
        if !self.reuse_previous_request {
            for (name, value) in [("method", &self.method), ("url", &self.url)] {
                if value.is_empty() {
                    return Err(ContractError::Pagination(format!(
                        "the field '{name}' is required when 'reuse-previous-request' is false"
                    )));
                }
            }
        }
        if self.result.is_empty() {
            return Err(ContractError::Pagination(
                "the field 'result' must name the page items field".to_string(),
            ));
        }
        Template::parse(&self.has_more)?;
        if is_expression(&self.url) {
            Template::parse(&self.url)?;
        }
        if is_expression(&self.method) {
            Template::parse(&self.method)?;
        } else if !self.method.is_empty() && self.method.parse::<Method>().is_err() {
            return Err(ContractError::Pagination(format!(
                "invalid method '{}'",
                self.method
            )));
        }
        for modifier in &self.modifiers {
            if modifier.op != "set" {
                return Err(ContractError::ModifierOp(modifier.op.clone()));
            }
            Expr::parse(&modifier.param)?;
            Template::parse(&modifier.value)?;
        }
        Ok(())
    }
}

pub(crate) type Continuation = Box<dyn FnOnce() -> Result<Paginator, ApiError> + Send>;

/// The cursor attached to a paginated outcome: buffered items, the fetch
/// index, and the optional continuation that fetches the next page.
///
/// Stepping past the buffer invokes the continuation exactly once, appends
/// the fetched page's items and adopts its continuation. Iteration
/// terminates when the buffer is exhausted and no continuation remains. A
/// failed fetch surfaces its error and leaves the already-buffered items
/// usable.
pub struct Paginator {
    items: Vec<Value>,
    fetch_index: usize,
    continuation: Option<Continuation>,
}

impl Default for Paginator {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            fetch_index: 0,
            continuation: None,
        }
    }
}

impl fmt::Debug for Paginator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Paginator")
            .field("buffered", &self.items.len())
            .field("fetch_index", &self.fetch_index)
            .field("has_more", &self.has_more())
            .finish()
    }
}

impl Paginator {
    pub(crate) fn new(items: Vec<Value>, continuation: Option<Continuation>) -> Self {
        Self {
            items,
            fetch_index: 0,
            continuation,
        }
    }

    /// The items buffered so far, across all fetched pages.
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    /// Whether a continuation is currently attached.
    pub fn has_more(&self) -> bool {
        self.continuation.is_some()
    }

    /// Yields the next item, fetching the next page first if the buffer is
    /// exhausted and a continuation exists.
    ///
    /// ## Errors
    ///
    /// Propagates any error of the page fetch. The continuation is consumed
    /// by the attempt; buffered items remain steppable.
    pub fn next_item(&mut self) -> Result<Option<Value>, ApiError> {
        if self.fetch_index >= self.items.len() {
            if let Some(continuation) = self.continuation.take() {
                let next = continuation()?;
                self.items.extend(next.items);
                self.continuation = next.continuation;
            }
        }
        if self.fetch_index >= self.items.len() {
            return Ok(None);
        }
        let item = self.items[self.fetch_index].clone();
        self.fetch_index += 1;
        Ok(Some(item))
    }

    /// Iterates over all items, starting over from the first buffered item
    /// and fetching further pages as needed.
    pub fn iter(&mut self) -> PageIter<'_> {
        self.fetch_index = 0;
        PageIter {
            paginator: self,
            failed: false,
        }
    }
}

/// Iterator over a [`Paginator`], yielding `Result` items: page-fetch
/// failures appear as one `Err` item, after which iteration stops.
pub struct PageIter<'a> {
    paginator: &'a mut Paginator,
    failed: bool,
}

impl Iterator for PageIter<'_> {
    type Item = Result<Value, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.paginator.next_item() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Builds the cursor for a freshly dispatched outcome.
pub(crate) fn build_paginator<T: 'static>(
    dispatcher: &Dispatcher<T>,
    description: &Arc<PaginationDescription>,
    exchange: &Exchange,
    body: &Value,
) -> Result<Paginator, ApiError> {
    let items = extract_items(body, &description.result)?;
    let ctx = ExprContext {
        exchange,
        path_values: &dispatcher.path_values,
        query_types: &dispatcher.query_types,
        header_types: &dispatcher.header_types,
    };

    let has_more = evaluate(&description.has_more, &ctx)?;
    if !is_truthy(&has_more) {
        debug!(buffered = items.len(), "page is final, no continuation");
        return Ok(Paginator::new(items, None));
    }

    let request = build_next_request(description, &ctx)?;
    let dispatcher = dispatcher.clone();
    let continuation: Continuation = Box::new(move || {
        debug!(url = %request.url, "fetching next page");
        let exchange = dispatcher.client.execute(request)?;
        let mut outcome = dispatcher.dispatch(exchange)?;
        Ok(outcome.take_pages().unwrap_or_default())
    });

    debug!(buffered = items.len(), "continuation attached");
    Ok(Paginator::new(items, Some(continuation)))
}

/// Builds the request the continuation will execute: the previous request
/// or a fresh one from the evaluated `method`/`url`, with every modifier
/// applied in declared order.
pub(crate) fn build_next_request(
    description: &PaginationDescription,
    ctx: &ExprContext<'_>,
) -> Result<ApiRequest, ApiError> {
    let url_override = if description.url.is_empty() {
        None
    } else {
        let raw = eval_literal_or_expr(&description.url, ctx)?;
        Some(Url::parse(&raw).map_err(|_| ExprError::InvalidUrl(raw))?)
    };
    let method_override = if description.method.is_empty() {
        None
    } else {
        let raw = eval_literal_or_expr(&description.method, ctx)?;
        Some(
            raw.parse::<Method>()
                .map_err(|_| ExprError::InvalidMethod(raw))?,
        )
    };

    let mut request = if description.reuse_previous_request {
        let mut request = ctx.exchange.request.clone();
        if let Some(url) = url_override {
            request.url = url;
        }
        if let Some(method) = method_override {
            request.method = method;
        }
        request
    } else {
        let (Some(url), Some(method)) = (url_override, method_override) else {
            return Err(ContractError::Pagination(
                "'method' and 'url' are required when 'reuse-previous-request' is false"
                    .to_string(),
            )
            .into());
        };
        ApiRequest::new(method, url)
    };

    for modifier in &description.modifiers {
        let target = Expr::parse(&modifier.param)?;
        let value = evaluate(&modifier.value, ctx)?;
        apply(&mut request, &target, value)?;
    }
    Ok(request)
}

/// `method`/`url` strings are runtime expressions only when they look like
/// one; a plain `POST` or absolute URL stays literal.
fn is_expression(s: &str) -> bool {
    s.starts_with('$') || s.contains('{')
}

fn eval_literal_or_expr(raw: &str, ctx: &ExprContext<'_>) -> Result<String, ApiError> {
    if is_expression(raw) {
        Ok(value_to_string(&evaluate(raw, ctx)?))
    } else {
        Ok(raw.to_string())
    }
}

fn extract_items(body: &Value, result: &str) -> Result<Vec<Value>, ApiError> {
    let pointer = result_pointer(result);
    match pointer_get(body, &pointer)? {
        Value::Array(items) => Ok(items),
        other => Err(ContractError::Pagination(format!(
            "result field '{result}' is not an array (got {})",
            value_kind(&other)
        ))
        .into()),
    }
}

fn result_pointer(result: &str) -> Pointer {
    let trimmed = result.trim_start_matches('/');
    if trimmed.contains('/') {
        Pointer::slash(trimmed)
    } else {
        Pointer::dotted(trimmed)
    }
}
