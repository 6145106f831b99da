//! The malleable request model.
//!
//! [`ApiRequest`] is the request representation the engine owns end to end:
//! the payload resolver fills its body and headers, the expression mutator
//! rewrites it when building pagination continuations, and the client hands
//! it to the transport. [`ResourcePath`] carries the URL path of a call
//! chain as explicit segments plus named path-parameter bindings, so
//! parameter lookup is a plain scan rather than anything reflective.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue};
use strum::{Display, EnumString};
use url::Url;

/// HTTP methods the engine issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    /// Converts to the equivalent `reqwest::Method`.
    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
            Self::Head => reqwest::Method::HEAD,
            Self::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        method.to_reqwest()
    }
}

/// A fully-addressed HTTP request owned by the engine.
///
/// Unlike a transport-level request this stays mutable until the moment it
/// is sent, which is what lets runtime expressions rewrite the URL, query
/// string, headers and body of a continuation request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// The HTTP method.
    pub method: Method,
    /// The absolute URL, query string included.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// The encoded request body, if any.
    pub body: Option<Bytes>,
}

impl ApiRequest {
    /// Creates a bodiless request.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// All values of the named query parameter, in URL order.
    pub fn query_values(&self, name: &str) -> Vec<String> {
        self.url
            .query_pairs()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .collect()
    }

    /// Replaces every occurrence of the named query parameter with the given
    /// values, keeping all other parameters in place.
    pub fn set_query_values(&mut self, name: &str, values: &[String]) {
        let kept: Vec<(String, String)> = self
            .url
            .query_pairs()
            .filter(|(k, _)| k != name)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        self.url.set_query(None);
        if kept.is_empty() && values.is_empty() {
            return;
        }
        let mut pairs = self.url.query_pairs_mut();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        for v in values {
            pairs.append_pair(name, v);
        }
    }

    /// The named header as text, if present and valid UTF-8.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Sets a header from text.
    ///
    /// ## Errors
    ///
    /// Returns a message if the name or value is not a legal header token.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), String> {
        let name = reqwest::header::HeaderName::try_from(name)
            .map_err(|e| format!("invalid header name: {e}"))?;
        let value = HeaderValue::try_from(value).map_err(|e| format!("invalid header value: {e}"))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// The body as UTF-8 text, or an empty string when absent or binary.
    pub fn body_text(&self) -> String {
        self.body
            .as_deref()
            .and_then(|b| std::str::from_utf8(b).ok())
            .unwrap_or_default()
            .to_string()
    }
}

/// The URL path of a call chain: ordered segments plus explicit
/// path-parameter bindings.
///
/// Each builder step in a call chain contributes its literal segments with
/// [`segment`](Self::segment) and its parameter values with
/// [`param`](Self::param), which both appends the value as a segment and
/// records the `(name, value)` binding. When the same name is bound twice,
/// the binding closest to the leaf wins.
///
/// ## Examples
///
/// ```
/// use api_contract::ResourcePath;
///
/// let path = ResourcePath::new()
///     .segment("spaces")
///     .param("space_id", "factory")
///     .segment("things")
///     .param("thing_id", "01H2");
/// assert_eq!(path.path(), "/spaces/factory/things/01H2");
/// assert_eq!(path.value("space_id"), Some("factory"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResourcePath {
    segments: Vec<String>,
    bindings: Vec<(String, String)>,
}

impl ResourcePath {
    /// Creates an empty path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a literal path segment.
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Appends a path-parameter value as a segment and records the binding.
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let value = value.to_string();
        self.segments.push(value.clone());
        self.bindings.push((name.into(), value));
        self
    }

    /// Records a binding without contributing a segment. Useful when a
    /// parameter is embedded inside a larger segment.
    pub fn bind(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.bindings.push((name.into(), value.to_string()));
        self
    }

    /// The rendered path, with a leading `/`.
    pub fn path(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            out.push_str(segment);
        }
        out
    }

    /// Looks up a path-parameter binding. The binding recorded last (closest
    /// to the leaf of the call chain) wins.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All bindings in recording order.
    pub fn bindings(&self) -> &[(String, String)] {
        &self.bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse_and_display() {
        assert_eq!("GET".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("patch".parse::<Method>().unwrap(), Method::Patch);
        assert_eq!(Method::Delete.to_string(), "DELETE");
        assert!("YEET".parse::<Method>().is_err());
    }

    #[test]
    fn test_query_round_trip() {
        let url = Url::parse("https://api.example.com/things?limit=10&tag=a&tag=b").unwrap();
        let mut req = ApiRequest::new(Method::Get, url);

        assert_eq!(req.query_values("tag"), vec!["a", "b"]);
        assert_eq!(req.query_values("missing"), Vec::<String>::new());

        req.set_query_values("tag", &["c".to_string()]);
        assert_eq!(req.query_values("tag"), vec!["c"]);
        assert_eq!(req.query_values("limit"), vec!["10"]);
    }

    #[test]
    fn test_set_query_clears_when_empty() {
        let url = Url::parse("https://api.example.com/things?limit=10").unwrap();
        let mut req = ApiRequest::new(Method::Get, url);
        req.set_query_values("limit", &[]);
        assert_eq!(req.url.query(), None);
    }

    #[test]
    fn test_resource_path_build() {
        let path = ResourcePath::new()
            .segment("categories")
            .param("category_name", "motors")
            .segment("things");
        assert_eq!(path.path(), "/categories/motors/things");
        assert_eq!(path.value("category_name"), Some("motors"));
        assert_eq!(path.value("nope"), None);
    }

    #[test]
    fn test_innermost_binding_wins() {
        let path = ResourcePath::new()
            .param("id", "outer")
            .segment("children")
            .param("id", "inner");
        assert_eq!(path.value("id"), Some("inner"));
    }
}
