//! Runtime expressions: the small grammar that addresses pieces of an HTTP
//! exchange.
//!
//! An expression points into a request/response pair - the URL, the method,
//! the status code, a named query/path/header parameter, or a body field
//! addressed by a pointer - and can be read ([`evaluate`]) or, for
//! request-side locations, written ([`apply`]) when a continuation request
//! is being built.
//!
//! Expressions are parsed once into an [`Expr`] AST and evaluated by a
//! single exhaustive match. Three surface forms exist:
//!
//! - a bare `$`-expression: `$response.body#/paging/next_cursor`
//! - a literal string with `{$...}` substitutions: `{$url}&page=2`
//! - a bare dot path, read directly against the response body: `paging.next_cursor`

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::client::Exchange;
use crate::error::ExprError;
use crate::request::ApiRequest;

/// Declared type of a query or header parameter, used to cast the raw
/// string value when an expression reads it. Lookups without a declared
/// type stay strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    /// Casts a raw parameter string to this type.
    ///
    /// ## Errors
    ///
    /// Returns [`ExprError::Cast`] if the raw value does not parse.
    pub fn cast(&self, raw: &str) -> Result<Value, ExprError> {
        match self {
            Self::String => Ok(Value::String(raw.to_string())),
            Self::Integer => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| ExprError::Cast {
                    value: raw.to_string(),
                    target: "integer",
                }),
            Self::Number => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| ExprError::Cast {
                    value: raw.to_string(),
                    target: "number",
                }),
            Self::Boolean => match raw {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(ExprError::Cast {
                    value: raw.to_string(),
                    target: "boolean",
                }),
            },
        }
    }
}

/// A path into a structured body: `/`-separated for the `#/` pointer forms,
/// `.`-separated for the bare form. Integer segments index arrays; on the
/// write path the segment `-` appends a new array element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    segments: Vec<String>,
}

impl Pointer {
    /// Parses a `/`-separated pointer, as used after `#/`.
    pub fn slash(path: &str) -> Self {
        Self::split(path, '/')
    }

    /// Parses a `.`-separated pointer, the bare response-body form.
    pub fn dotted(path: &str) -> Self {
        Self::split(path, '.')
    }

    fn split(path: &str, separator: char) -> Self {
        Self {
            segments: path.trim().split(separator).map(str::to_string).collect(),
        }
    }

    /// The pointer segments in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// A parsed runtime expression.
///
/// Expressions beginning with `$` address the exchange; the bare-path form
/// ([`Expr::BodyPath`]) addresses the response body directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// `$url` - the request URL.
    Url,
    /// `$method` - the request method.
    Method,
    /// `$statusCode` - the response status code.
    StatusCode,
    /// `$request.query.<name>` - a query parameter of the request URL.
    RequestQuery(String),
    /// `$request.path.<name>` - a path parameter binding of the request.
    RequestPath(String),
    /// `$request.header.<name>` - a request header.
    RequestHeader(String),
    /// `$request.body` - the whole request body as text.
    RequestBody,
    /// `$request.body#/<pointer>` - a field of the JSON request body.
    RequestBodyPointer(Pointer),
    /// `$response.header.<name>` - a response header.
    ResponseHeader(String),
    /// `$response.body` - the whole response body as text.
    ResponseBody,
    /// `$response.body#/<pointer>` - a field of the decoded response body.
    ResponseBodyPointer(Pointer),
    /// A bare dot path, read against the decoded response body.
    BodyPath(Pointer),
}

impl Expr {
    /// Parses a single expression. Strings not beginning with `$` parse as
    /// the bare-path form.
    ///
    /// ## Errors
    ///
    /// Returns [`ExprError::InvalidExpression`] for empty input and for
    /// `$`-strings outside the grammar.
    pub fn parse(s: &str) -> Result<Self, ExprError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ExprError::InvalidExpression(s.to_string()));
        }
        if !s.starts_with('$') {
            return Ok(Self::BodyPath(Pointer::dotted(s)));
        }

        let named = |name: &str, make: fn(String) -> Self| {
            if name.is_empty() {
                Err(ExprError::InvalidExpression(s.to_string()))
            } else {
                Ok(make(name.to_string()))
            }
        };

        match s {
            "$url" => Ok(Self::Url),
            "$method" => Ok(Self::Method),
            "$statusCode" => Ok(Self::StatusCode),
            "$request.body" => Ok(Self::RequestBody),
            "$response.body" => Ok(Self::ResponseBody),
            _ => {
                if let Some(path) = s.strip_prefix("$request.body#/") {
                    Ok(Self::RequestBodyPointer(Pointer::slash(path)))
                } else if let Some(path) = s.strip_prefix("$response.body#/") {
                    Ok(Self::ResponseBodyPointer(Pointer::slash(path)))
                } else if let Some(name) = s.strip_prefix("$request.query.") {
                    named(name, Self::RequestQuery)
                } else if let Some(name) = s.strip_prefix("$request.path.") {
                    named(name, Self::RequestPath)
                } else if let Some(name) = s.strip_prefix("$request.header.") {
                    named(name, Self::RequestHeader)
                } else if let Some(name) = s.strip_prefix("$response.header.") {
                    named(name, Self::ResponseHeader)
                } else {
                    Err(ExprError::InvalidExpression(s.to_string()))
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url => write!(f, "$url"),
            Self::Method => write!(f, "$method"),
            Self::StatusCode => write!(f, "$statusCode"),
            Self::RequestQuery(n) => write!(f, "$request.query.{n}"),
            Self::RequestPath(n) => write!(f, "$request.path.{n}"),
            Self::RequestHeader(n) => write!(f, "$request.header.{n}"),
            Self::RequestBody => write!(f, "$request.body"),
            Self::RequestBodyPointer(p) => write!(f, "$request.body#/{p}"),
            Self::ResponseHeader(n) => write!(f, "$response.header.{n}"),
            Self::ResponseBody => write!(f, "$response.body"),
            Self::ResponseBodyPointer(p) => write!(f, "$response.body#/{p}"),
            Self::BodyPath(p) => write!(f, "{}", p.segments().join(".")),
        }
    }
}

/// A contract-side expression string: either one bare expression or a
/// literal with embedded `{$...}` substitutions.
#[derive(Debug, Clone)]
pub enum Template {
    /// A single expression; evaluates to its value.
    Expr(Expr),
    /// Literal text with substitutions; evaluates to a string.
    Text(Vec<Segment>),
}

/// One piece of a [`Template::Text`].
#[derive(Debug, Clone)]
pub enum Segment {
    /// Literal text, emitted verbatim.
    Lit(String),
    /// A `{$...}` substitution, evaluated and stringified.
    Sub(Expr),
}

impl Template {
    /// Parses a template. Strings containing `{$...}` spans become literal
    /// templates; braces not followed by `$` stay literal characters.
    ///
    /// ## Errors
    ///
    /// Propagates the parse error of any embedded expression.
    pub fn parse(s: &str) -> Result<Self, ExprError> {
        let s = s.trim();
        if !s.contains('{') {
            return Ok(Self::Expr(Expr::parse(s)?));
        }

        let mut segments = Vec::new();
        let mut lit = String::new();
        let mut rest = s;
        while let Some(open) = rest.find("{$") {
            let (before, tail) = rest.split_at(open);
            lit.push_str(before);
            match tail[1..].find('}') {
                Some(close) => {
                    let inner = &tail[1..1 + close];
                    if !lit.is_empty() {
                        segments.push(Segment::Lit(std::mem::take(&mut lit)));
                    }
                    segments.push(Segment::Sub(Expr::parse(inner)?));
                    rest = &tail[close + 2..];
                }
                None => {
                    lit.push('{');
                    rest = &tail[1..];
                }
            }
        }
        lit.push_str(rest);
        if !lit.is_empty() {
            segments.push(Segment::Lit(lit));
        }
        Ok(Self::Text(segments))
    }
}

/// Everything an expression may be evaluated against: the exchange plus the
/// caller-supplied path-parameter bindings and parameter type maps.
#[derive(Debug, Clone, Copy)]
pub struct ExprContext<'a> {
    /// The request/response pair the expression addresses.
    pub exchange: &'a Exchange,
    /// Path-parameter bindings captured when the original URL was built.
    pub path_values: &'a HashMap<String, String>,
    /// Declared query-parameter types, for casting.
    pub query_types: &'a HashMap<String, ParamType>,
    /// Declared header-parameter types, for casting.
    pub header_types: &'a HashMap<String, ParamType>,
}

/// Parses and evaluates an expression string against an exchange.
///
/// Convenience wrapper over [`Template::parse`] and [`evaluate_template`].
pub fn evaluate(expression: &str, ctx: &ExprContext<'_>) -> Result<Value, ExprError> {
    evaluate_template(&Template::parse(expression)?, ctx)
}

/// Evaluates a parsed template.
pub fn evaluate_template(template: &Template, ctx: &ExprContext<'_>) -> Result<Value, ExprError> {
    match template {
        Template::Expr(expr) => evaluate_expr(expr, ctx),
        Template::Text(segments) => {
            let mut out = String::new();
            for segment in segments {
                match segment {
                    Segment::Lit(lit) => out.push_str(lit),
                    Segment::Sub(expr) => out.push_str(&value_to_string(&evaluate_expr(expr, ctx)?)),
                }
            }
            Ok(Value::String(out))
        }
    }
}

/// Evaluates a parsed expression.
pub fn evaluate_expr(expr: &Expr, ctx: &ExprContext<'_>) -> Result<Value, ExprError> {
    let request = &ctx.exchange.request;
    match expr {
        Expr::Url => Ok(Value::String(request.url.to_string())),
        Expr::Method => Ok(Value::String(request.method.to_string())),
        Expr::StatusCode => Ok(Value::from(ctx.exchange.status.as_u16())),
        Expr::RequestQuery(name) => {
            let raw = request.query_values(name);
            if raw.is_empty() {
                return Err(ExprError::QueryParameterNotFound(name.clone()));
            }
            let ty = lookup_type(ctx.query_types, name);
            let mut cast: Vec<Value> = Vec::with_capacity(raw.len());
            for v in &raw {
                cast.push(ty.cast(v)?);
            }
            if cast.len() == 1 {
                Ok(cast.remove(0))
            } else {
                Ok(Value::Array(cast))
            }
        }
        Expr::RequestPath(name) => ctx
            .path_values
            .get(name)
            .map(|v| Value::String(v.clone()))
            .ok_or_else(|| ExprError::UnknownPathParameter(name.clone())),
        Expr::RequestHeader(name) => match request.header_str(name) {
            Some(raw) => lookup_type(ctx.header_types, name).cast(raw),
            None => Ok(Value::Null),
        },
        Expr::RequestBody => Ok(Value::String(request.body_text())),
        Expr::RequestBodyPointer(pointer) => {
            let body: Value = serde_json::from_str(&request.body_text())?;
            pointer_get(&body, pointer)
        }
        Expr::ResponseHeader(name) => Ok(ctx
            .exchange
            .header_str(name)
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null)),
        Expr::ResponseBody => Ok(Value::String(ctx.exchange.body_text())),
        Expr::ResponseBodyPointer(pointer) | Expr::BodyPath(pointer) => {
            pointer_get(&ctx.exchange.body_json()?, pointer)
        }
    }
}

/// Writes a value into a request at the location an expression addresses.
///
/// `$url` and `$method` replace their fields; `$request.query.<name>`
/// merges into the existing query string; `$request.header.<name>` sets the
/// header; `$request.body` replaces the body; `$request.body#/<pointer>`
/// and bare pointers walk (and create) containers along the path and set
/// the leaf, with the array segment `-` appending a new element.
///
/// ## Errors
///
/// Response-side and read-only expressions return
/// [`ExprError::NotWritable`]; pointer and body failures surface as their
/// respective [`ExprError`] variants.
pub fn apply(request: &mut ApiRequest, expr: &Expr, value: Value) -> Result<(), ExprError> {
    match expr {
        Expr::Url => {
            let raw = value_to_string(&value);
            request.url = url::Url::parse(&raw).map_err(|_| ExprError::InvalidUrl(raw))?;
            Ok(())
        }
        Expr::Method => {
            let raw = value_to_string(&value);
            request.method = raw.parse().map_err(|_| ExprError::InvalidMethod(raw))?;
            Ok(())
        }
        Expr::RequestQuery(name) => {
            let values = match value {
                Value::Array(items) => items.iter().map(value_to_string).collect(),
                other => vec![value_to_string(&other)],
            };
            request.set_query_values(name, &values);
            Ok(())
        }
        Expr::RequestHeader(name) => request
            .set_header(name, &value_to_string(&value))
            .map_err(|_| ExprError::InvalidHeader(name.clone())),
        Expr::RequestBody => set_json_body(request, &value),
        Expr::RequestBodyPointer(pointer) | Expr::BodyPath(pointer) => {
            let mut body = match &request.body {
                Some(bytes) if !bytes.is_empty() => serde_json::from_slice(bytes)?,
                _ => Value::Object(Map::new()),
            };
            pointer_set(&mut body, pointer, value)?;
            set_json_body(request, &body)
        }
        Expr::StatusCode
        | Expr::RequestPath(_)
        | Expr::ResponseHeader(_)
        | Expr::ResponseBody
        | Expr::ResponseBodyPointer(_) => Err(ExprError::NotWritable(expr.to_string())),
    }
}

fn set_json_body(request: &mut ApiRequest, body: &Value) -> Result<(), ExprError> {
    request.body = Some(bytes::Bytes::from(serde_json::to_vec(body)?));
    if !request.headers.contains_key(reqwest::header::CONTENT_TYPE) {
        request.headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
    }
    Ok(())
}

fn lookup_type(types: &HashMap<String, ParamType>, name: &str) -> ParamType {
    types
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, ty)| *ty)
        .unwrap_or(ParamType::String)
}

/// Reads the value a pointer addresses inside a structured body.
pub fn pointer_get(body: &Value, pointer: &Pointer) -> Result<Value, ExprError> {
    let mut current = body;
    for segment in pointer.segments() {
        current = match current {
            Value::Object(map) => map
                .get(segment)
                .ok_or_else(|| ExprError::KeyNotFound(pointer.to_string()))?,
            Value::Array(items) => {
                let index = parse_index(segment)?;
                items
                    .get(index)
                    .ok_or_else(|| ExprError::IndexOutOfRange(pointer.to_string()))?
            }
            other => {
                return Err(ExprError::NotAContainer {
                    segment: segment.clone(),
                    found: value_kind(other),
                })
            }
        };
    }
    Ok(current.clone())
}

/// Writes a value at a pointer, creating intermediate objects along the
/// way. Array segments must name an existing index, or `-` to append.
pub fn pointer_set(body: &mut Value, pointer: &Pointer, value: Value) -> Result<(), ExprError> {
    let segments = pointer.segments();
    let Some((last, intermediate)) = segments.split_last() else {
        return Err(ExprError::InvalidExpression(pointer.to_string()));
    };

    let mut current = body;
    for segment in intermediate {
        current = match current {
            Value::Object(map) => {
                let slot = map
                    .entry(segment.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() && !slot.is_array() {
                    *slot = Value::Object(Map::new());
                }
                slot
            }
            Value::Array(items) => {
                if segment == "-" {
                    items.push(Value::Object(Map::new()));
                    items.last_mut().ok_or_else(|| {
                        ExprError::IndexOutOfRange(pointer.to_string())
                    })?
                } else {
                    let index = parse_index(segment)?;
                    let slot = items
                        .get_mut(index)
                        .ok_or_else(|| ExprError::IndexOutOfRange(pointer.to_string()))?;
                    if !slot.is_object() && !slot.is_array() {
                        *slot = Value::Object(Map::new());
                    }
                    slot
                }
            }
            other => {
                return Err(ExprError::NotAContainer {
                    segment: segment.clone(),
                    found: value_kind(other),
                })
            }
        };
    }

    match current {
        Value::Object(map) => {
            map.insert(last.clone(), value);
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
            } else {
                let index = parse_index(last)?;
                let slot = items
                    .get_mut(index)
                    .ok_or_else(|| ExprError::IndexOutOfRange(pointer.to_string()))?;
                *slot = value;
            }
        }
        other => {
            return Err(ExprError::NotAContainer {
                segment: last.clone(),
                found: value_kind(other),
            })
        }
    }
    Ok(())
}

fn parse_index(segment: &str) -> Result<usize, ExprError> {
    segment.parse::<usize>().map_err(|_| ExprError::Cast {
        value: segment.to_string(),
        target: "array index",
    })
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Stringifies an evaluated value for substitution into a template, a query
/// parameter or a header. Strings pass through, null becomes empty,
/// containers render as compact JSON.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Truthiness used by the pagination `has-more` decision: null, `false`,
/// zero, and empty strings/arrays/objects are falsy.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
