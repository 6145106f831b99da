//! One logical API operation, from contract to outcome.
//!
//! An [`Operation`] bundles everything a single call needs: the method and
//! resource path, query parameters and headers, the caller payload with its
//! allowed request types, the response rule table, and the optional
//! pagination description. [`Operation::send`] runs the full control flow:
//! payload resolution, transport execution, and response dispatch.

use std::collections::HashMap;

use reqwest::header::HeaderMap;

use crate::client::ApiClient;
use crate::codec::Payload;
use crate::dispatch::{Dispatcher, Outcome, ResponseRule};
use crate::error::{ApiError, ClientError};
use crate::expr::ParamType;
use crate::media_type::MediaType;
use crate::pagination::PaginationDescription;
use crate::payload::resolve_payload;
use crate::request::{ApiRequest, Method, ResourcePath};

/// A single API operation ready to execute.
///
/// ## Examples
///
/// ```rust,ignore
/// let outcome = Operation::new(Method::Get, ResourcePath::new().segment("things"))
///     .query("limit", 50)
///     .response(ResponseRule::json(200, ThingOutcome::Ok))
///     .response(ResponseRule::default_json(ThingOutcome::Error))
///     .send(&client)?;
/// ```
#[derive(Debug)]
pub struct Operation<T> {
    method: Method,
    path: ResourcePath,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    payload: Option<Payload>,
    request_types: Vec<MediaType>,
    rules: Vec<ResponseRule<T>>,
    pagination: Option<PaginationDescription>,
    query_types: HashMap<String, ParamType>,
    header_types: HashMap<String, ParamType>,
}

impl<T: 'static> Operation<T> {
    /// Creates an operation for a method and resource path.
    pub fn new(method: Method, path: ResourcePath) -> Self {
        Self {
            method,
            path,
            query: Vec::new(),
            headers: HeaderMap::new(),
            payload: None,
            request_types: Vec::new(),
            rules: Vec::new(),
            pagination: None,
            query_types: HashMap::new(),
            header_types: HashMap::new(),
        }
    }

    /// Appends a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Sets a request header.
    ///
    /// ## Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, ApiError> {
        let name = reqwest::header::HeaderName::try_from(name.as_ref())
            .map_err(|e| ClientError::Connection(format!("invalid header name: {e}")))?;
        let value = reqwest::header::HeaderValue::try_from(value.as_ref())
            .map_err(|e| ClientError::Connection(format!("invalid header value: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Sets the request payload.
    pub fn payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Declares an allowed request content type. Declaration order is the
    /// preference order for encoding.
    ///
    /// ## Errors
    ///
    /// Returns [`crate::error::ContractError::InvalidMediaType`] on
    /// malformed input.
    pub fn request_type(mut self, content_type: &str) -> Result<Self, ApiError> {
        self.request_types.push(MediaType::parse(content_type)?);
        Ok(self)
    }

    /// Appends a response rule to the contract table.
    pub fn response(mut self, rule: ResponseRule<T>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Replaces the whole response rule table.
    pub fn responses(mut self, rules: Vec<ResponseRule<T>>) -> Self {
        self.rules = rules;
        self
    }

    /// Declares pagination support, validating the description.
    ///
    /// ## Errors
    ///
    /// Returns [`crate::error::ContractError`] if the description violates
    /// its load-time
    /// invariants.
    pub fn paginated(mut self, description: PaginationDescription) -> Result<Self, ApiError> {
        description.validate()?;
        self.pagination = Some(description);
        Ok(self)
    }

    /// Declares the type of a query parameter for expression casts.
    pub fn query_type(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.query_types.insert(name.into(), ty);
        self
    }

    /// Declares the type of a header parameter for expression casts.
    pub fn header_type(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.header_types.insert(name.into(), ty);
        self
    }

    /// Executes the operation against a client and dispatches the response.
    ///
    /// ## Errors
    ///
    /// Surfaces payload, transport, dispatch, pagination and policy errors
    /// as [`ApiError`].
    pub fn send(self, client: &ApiClient) -> Result<Outcome<T>, ApiError> {
        let mut url = client.endpoint_url(&self.path.path())?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.query {
                pairs.append_pair(name, value);
            }
        }

        let mut request = ApiRequest::new(self.method, url);
        request.headers = self.headers;

        if let Some(payload) = &self.payload {
            let body = resolve_payload(payload, &self.request_types, &mut request.headers)?;
            request.body = Some(body);
        }

        let path_values: HashMap<String, String> =
            self.path.bindings().iter().cloned().collect();

        let mut dispatcher = Dispatcher::new(client.clone(), self.rules)
            .with_path_values(path_values)
            .with_query_types(self.query_types)
            .with_header_types(self.header_types);
        if let Some(description) = self.pagination {
            dispatcher = dispatcher.with_pagination(description);
        }

        let exchange = client.execute(request)?;
        dispatcher.dispatch(exchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::{json, Value};
    use url::Url;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Created {
        id: String,
    }

    #[derive(Debug, PartialEq)]
    enum Out {
        Ok(Created),
        Error(Value),
    }

    fn start_server() -> (tokio::runtime::Runtime, MockServer) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let server = runtime.block_on(MockServer::start());
        (runtime, server)
    }

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(Url::parse(&server.uri()).unwrap()).unwrap()
    }

    #[test]
    fn test_get_with_query_parameters() {
        let (runtime, server) = start_server();
        runtime.block_on(
            Mock::given(method("GET"))
                .and(path("/spaces/factory/things"))
                .and(query_param("limit", "5"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-type", "application/json")
                        .set_body_json(json!({"id": "t-1"})),
                )
                .mount(&server),
        );

        let outcome = Operation::new(
            Method::Get,
            ResourcePath::new()
                .segment("spaces")
                .param("space_id", "factory")
                .segment("things"),
        )
        .query("limit", 5)
        .response(ResponseRule::json(200, Out::Ok))
        .send(&client(&server))
        .unwrap();

        assert_eq!(outcome.payload(), &Out::Ok(Created { id: "t-1".into() }));
        assert_eq!(outcome.status().as_u16(), 200);
    }

    #[test]
    fn test_post_encodes_payload_and_sets_content_type() {
        let (runtime, server) = start_server();
        runtime.block_on(
            Mock::given(method("POST"))
                .and(path("/things"))
                .and(header("content-type", "application/json"))
                .and(body_json(json!({"name": "sensor"})))
                .respond_with(
                    ResponseTemplate::new(201)
                        .insert_header("content-type", "application/json")
                        .set_body_json(json!({"id": "t-2"})),
                )
                .mount(&server),
        );

        let outcome = Operation::new(Method::Post, ResourcePath::new().segment("things"))
            .payload(json!({"name": "sensor"}))
            .request_type("application/json")
            .unwrap()
            .response(ResponseRule::json(201, Out::Ok))
            .send(&client(&server))
            .unwrap();

        assert_eq!(outcome.payload(), &Out::Ok(Created { id: "t-2".into() }));
    }

    #[test]
    fn test_error_outcome_with_policy_disabled() {
        let (runtime, server) = start_server();
        runtime.block_on(
            Mock::given(method("GET"))
                .and(path("/things"))
                .respond_with(
                    ResponseTemplate::new(404)
                        .insert_header("content-type", "application/json")
                        .set_body_json(json!({"message": "no such thing"})),
                )
                .mount(&server),
        );

        let client = ApiClient::builder(Url::parse(&server.uri()).unwrap())
            .raise_on_error(false)
            .build()
            .unwrap();

        let outcome = Operation::new(Method::Get, ResourcePath::new().segment("things"))
            .response(ResponseRule::json(200, Out::Ok))
            .response(ResponseRule::json(404, Out::Error))
            .send(&client)
            .unwrap();

        assert_eq!(
            outcome.payload(),
            &Out::Error(json!({"message": "no such thing"}))
        );
    }

    #[test]
    fn test_unsupported_payload_surfaces_before_any_call() {
        let (_runtime, server) = start_server();

        let err = Operation::new(Method::Post, ResourcePath::new().segment("things"))
            .payload(json!({"name": "sensor"}))
            .header("Content-Type", "application/xml")
            .unwrap()
            .request_type("application/json")
            .unwrap()
            .response(ResponseRule::json(201, Out::Ok))
            .send(&client(&server))
            .unwrap_err();

        assert!(matches!(err, ApiError::Payload(_)));
    }
}
