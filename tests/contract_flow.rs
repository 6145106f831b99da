//! End-to-end contract flows against a mock server: multi-outcome dispatch,
//! default entries, XML decoding, and cursor pagination.

use api_contract::{
    ApiClient, BearerToken, Method, Operation, PaginationDescription, ResourcePath, ResponseRule,
};
use api_contract::error::{ApiError, DispatchError};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize, PartialEq)]
struct ThingPage {
    data: Vec<Value>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Problem {
    message: String,
}

#[derive(Debug, PartialEq)]
enum ThingOutcome {
    Ok(ThingPage),
    Error(Problem),
}

fn start_server() -> (tokio::runtime::Runtime, MockServer) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime.block_on(MockServer::start());
    (runtime, server)
}

fn contract() -> Vec<ResponseRule<ThingOutcome>> {
    vec![
        ResponseRule::json(200, ThingOutcome::Ok),
        ResponseRule::json(404, ThingOutcome::Error),
        ResponseRule::default_json(ThingOutcome::Error),
    ]
}

fn things_operation() -> Operation<ThingOutcome> {
    Operation::new(Method::Get, ResourcePath::new().segment("things")).responses(contract())
}

fn lenient_client(server: &MockServer) -> ApiClient {
    ApiClient::builder(Url::parse(&server.uri()).unwrap())
        .raise_on_error(false)
        .build()
        .unwrap()
}

#[test]
fn declared_error_status_decodes_into_its_shape() {
    let (runtime, server) = start_server();
    runtime.block_on(
        Mock::given(method("GET"))
            .and(path("/things"))
            .respond_with(
                ResponseTemplate::new(404)
                    .insert_header("content-type", "application/json")
                    .set_body_json(json!({"message": "not found"})),
            )
            .mount(&server),
    );

    let outcome = things_operation().send(&lenient_client(&server)).unwrap();
    assert_eq!(
        outcome.payload(),
        &ThingOutcome::Error(Problem {
            message: "not found".into()
        })
    );
    assert_eq!(outcome.status().as_u16(), 404);
}

#[test]
fn default_entry_covers_unlisted_statuses() {
    let (runtime, server) = start_server();
    runtime.block_on(
        Mock::given(method("GET"))
            .and(path("/things"))
            .respond_with(
                ResponseTemplate::new(500)
                    .insert_header("content-type", "application/json")
                    .set_body_json(json!({"message": "server exploded"})),
            )
            .mount(&server),
    );

    // A 500 is not listed explicitly; the default entry decodes it and
    // UnexpectedStatus is never raised.
    let outcome = things_operation().send(&lenient_client(&server)).unwrap();
    assert_eq!(
        outcome.payload(),
        &ThingOutcome::Error(Problem {
            message: "server exploded".into()
        })
    );
}

#[test]
fn uncovered_status_is_rejected() {
    let (runtime, server) = start_server();
    runtime.block_on(
        Mock::given(method("GET"))
            .and(path("/things"))
            .respond_with(
                ResponseTemplate::new(503)
                    .insert_header("content-type", "application/json")
                    .set_body_json(json!({})),
            )
            .mount(&server),
    );

    let operation = Operation::new(Method::Get, ResourcePath::new().segment("things"))
        .response(ResponseRule::json(200, ThingOutcome::Ok));
    let err = operation.send(&lenient_client(&server)).unwrap_err();
    assert!(matches!(
        err,
        ApiError::Dispatch(DispatchError::UnexpectedStatus(503))
    ));
}

#[test]
fn xml_response_decodes_through_the_synthetic_root() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Report {
        name: String,
    }

    let (runtime, server) = start_server();
    runtime.block_on(
        Mock::given(method("GET"))
            .and(path("/report"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/xml")
                    .set_body_string("<root><name>weekly</name></root>"),
            )
            .mount(&server),
    );

    let outcome = Operation::new(Method::Get, ResourcePath::new().segment("report"))
        .response(ResponseRule::with_content_type(
            200,
            "application/xml".parse().unwrap(),
            |r: Report| r,
        ))
        .send(&lenient_client(&server))
        .unwrap();

    assert_eq!(outcome.payload(), &Report { name: "weekly".into() });
}

#[tracing_test::traced_test]
#[test]
fn cursor_pagination_concatenates_pages_lazily() {
    let (runtime, server) = start_server();
    runtime.block_on(async {
        Mock::given(method("GET"))
            .and(path("/things"))
            .and(query_param_is_missing("next_cursor"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_json(json!({
                        "paging": {"next_cursor": "X"},
                        "data": [1, 2, 3],
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/things"))
            .and(query_param("next_cursor", "X"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_json(json!({
                        "paging": {"next_cursor": ""},
                        "data": [4, 5],
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;
    });

    let description = PaginationDescription::reuse_previous(
        "data",
        "$response.body#/paging/next_cursor",
    )
    .with_modifier(
        "$request.query.next_cursor",
        "$response.body#/paging/next_cursor",
    );

    let mut outcome = things_operation()
        .paginated(description)
        .unwrap()
        .send(&lenient_client(&server))
        .unwrap();

    // Only the first page has been fetched so far.
    assert!(outcome.has_more());
    let pages = outcome.pages().unwrap();
    assert_eq!(pages.items(), &[json!(1), json!(2), json!(3)]);

    let all: Vec<Value> = pages.iter().map(Result::unwrap).collect();
    assert_eq!(all, vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);
    assert!(!outcome.has_more());
    assert!(logs_contain("fetching next page"));
}

#[test]
fn pagination_stops_immediately_when_has_more_is_falsy() {
    let (runtime, server) = start_server();
    runtime.block_on(
        Mock::given(method("GET"))
            .and(path("/things"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_json(json!({
                        "paging": {"next_cursor": ""},
                        "data": [1, 2],
                    })),
            )
            .expect(1)
            .mount(&server),
    );

    let description = PaginationDescription::reuse_previous(
        "data",
        "$response.body#/paging/next_cursor",
    )
    .with_modifier(
        "$request.query.next_cursor",
        "$response.body#/paging/next_cursor",
    );

    let mut outcome = things_operation()
        .paginated(description)
        .unwrap()
        .send(&lenient_client(&server))
        .unwrap();

    assert!(!outcome.has_more());
    let all: Vec<Value> = outcome.pages().unwrap().iter().map(Result::unwrap).collect();
    assert_eq!(all, vec![json!(1), json!(2)]);
}

#[test]
fn continuation_requests_keep_auth_and_headers() {
    let (runtime, server) = start_server();
    runtime.block_on(async {
        Mock::given(method("GET"))
            .and(path("/things"))
            .and(header("authorization", "Bearer tok-9"))
            .and(query_param_is_missing("cursor"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_json(json!({"next": "c2", "data": ["a"]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/things"))
            .and(header("authorization", "Bearer tok-9"))
            .and(query_param("cursor", "c2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_json(json!({"next": null, "data": ["b"]})),
            )
            .expect(1)
            .mount(&server)
            .await;
    });

    let client = ApiClient::builder(Url::parse(&server.uri()).unwrap())
        .security(BearerToken::new("tok-9"))
        .raise_on_error(false)
        .build()
        .unwrap();

    let description = PaginationDescription::reuse_previous("data", "$response.body#/next")
        .with_modifier("$request.query.cursor", "$response.body#/next");

    let mut outcome = things_operation()
        .paginated(description)
        .unwrap()
        .send(&client)
        .unwrap();

    let all: Vec<Value> = outcome.pages().unwrap().iter().map(Result::unwrap).collect();
    assert_eq!(all, vec![json!("a"), json!("b")]);
}

#[test]
fn failing_page_fetch_surfaces_and_keeps_prior_pages() {
    let (runtime, server) = start_server();
    runtime.block_on(async {
        Mock::given(method("GET"))
            .and(path("/things"))
            .and(query_param_is_missing("next_cursor"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_json(json!({
                        "paging": {"next_cursor": "X"},
                        "data": [1],
                    })),
            )
            .mount(&server)
            .await;

        // The follow-up page answers with an uncovered status.
        Mock::given(method("GET"))
            .and(path("/things"))
            .and(query_param("next_cursor", "X"))
            .respond_with(ResponseTemplate::new(418))
            .mount(&server)
            .await;
    });

    let description = PaginationDescription::reuse_previous(
        "data",
        "$response.body#/paging/next_cursor",
    )
    .with_modifier(
        "$request.query.next_cursor",
        "$response.body#/paging/next_cursor",
    );

    let operation = Operation::new(Method::Get, ResourcePath::new().segment("things"))
        .response(ResponseRule::json(200, ThingOutcome::Ok))
        .paginated(description)
        .unwrap();

    let mut outcome = operation.send(&lenient_client(&server)).unwrap();
    let results: Vec<Result<Value, ApiError>> =
        outcome.pages().unwrap().iter().collect();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap(), &json!(1));
    assert!(matches!(
        results[1],
        Err(ApiError::Dispatch(DispatchError::UnexpectedStatus(418)))
    ));

    // The buffered first page is still usable after the failure.
    let buffered: Vec<Value> = outcome.pages().unwrap().iter().map(Result::unwrap).collect();
    assert_eq!(buffered, vec![json!(1)]);
}
