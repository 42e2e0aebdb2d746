use axum::{body::Body, http::Request};
use graphql_observability::{
    metrics::{
        ERRORS_TOTAL, FIELD_RESOLUTION_DURATION_SECONDS, QUERY_COMPLEXITY, QUERY_DEPTH, REQUESTS_BY_USER_TOTAL,
        REQUESTS_TOTAL, REQUEST_DURATION_SECONDS,
    },
    ObservabilityConfig,
};
use indoc::indoc;
use serde_json::json;

use crate::server::{send, TestServer};

fn logging() -> ObservabilityConfig {
    ObservabilityConfig {
        query_logging_enabled: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn named_query() {
    let server = TestServer::new(ObservabilityConfig::default());

    let query = indoc! {r#"
        query GetDevices {
          devices { name location { name } }
        }
    "#};

    let response = server.graphql("/api/graphql/", json!({ "query": query }), Some("alice")).await;

    insta::assert_json_snapshot!(response.json(), @r#"
    {
      "data": {
        "devices": [
          {
            "name": "edge-01",
            "location": {
              "name": "ams"
            }
          },
          {
            "name": "edge-02",
            "location": {
              "name": "ams"
            }
          }
        ]
      }
    }
    "#);

    let operation = [("operation_type", "query"), ("operation_name", "GetDevices")];

    assert_eq!(server.counter(REQUESTS_TOTAL, &[operation[0], operation[1], ("status", "success")]), 1);
    assert_eq!(server.counter(ERRORS_TOTAL, &[]), 0);
    // once by the resolver layer, once by the transport layer
    assert_eq!(server.observations(REQUEST_DURATION_SECONDS, &operation), 2);
    assert_eq!(server.observed_sum(QUERY_DEPTH, &[("operation_name", "GetDevices")]), 3);
    assert_eq!(server.observed_sum(QUERY_COMPLEXITY, &[("operation_name", "GetDevices")]), 4);
    assert_eq!(server.counter(REQUESTS_BY_USER_TOTAL, &[("user", "alice")]), 1);
    assert_eq!(server.observations(FIELD_RESOLUTION_DURATION_SECONDS, &[]), 0);
    assert!(server.logs().is_empty());
}

#[tokio::test]
async fn unnamed_query() {
    let server = TestServer::new(ObservabilityConfig::default());

    server
        .graphql("/graphql/", json!({ "query": "{ locations { name } devices { name } }" }), None)
        .await;

    assert_eq!(
        server.counter(REQUESTS_TOTAL, &[("operation_name", "devices,locations")]),
        2
    );
    assert_eq!(
        server.counter(REQUESTS_BY_USER_TOTAL, &[("user", "anonymous"), ("operation_name", "devices,locations")]),
        2
    );
    // the transport layer observes the request once
    assert_eq!(
        server.observations(REQUEST_DURATION_SECONDS, &[("operation_name", "devices,locations")]),
        3
    );
}

#[tokio::test]
async fn mutation() {
    let server = TestServer::new(ObservabilityConfig::default());

    let response = server
        .graphql(
            "/graphql/",
            json!({
                "query": "mutation CreateDevice($name: String!) { createDevice(name: $name) { name } }",
                "variables": { "name": "edge-03" },
            }),
            None,
        )
        .await;

    assert_eq!(response.json()["data"]["createDevice"]["name"], "edge-03");
    assert_eq!(
        server.counter(
            REQUESTS_TOTAL,
            &[("operation_type", "mutation"), ("operation_name", "CreateDevice")]
        ),
        1
    );
}

#[tokio::test]
async fn resolver_error() {
    let server = TestServer::new(logging());

    let response = server
        .graphql(
            "/graphql/",
            json!({ "query": r#"query Missing { device(name: "edge-99") { name } }"# }),
            None,
        )
        .await;

    assert!(response.status.is_success());
    insta::assert_json_snapshot!(response.json(), @r#"
    {
      "data": null,
      "errors": [
        {
          "message": "no device named edge-99",
          "locations": [
            {
              "line": 1,
              "column": 17
            }
          ],
          "path": [
            "device"
          ],
          "extensions": {
            "code": "NotFound"
          }
        }
      ]
    }
    "#);

    assert_eq!(
        server.counter(REQUESTS_TOTAL, &[("operation_name", "Missing"), ("status", "error")]),
        1
    );
    assert_eq!(
        server.counter(ERRORS_TOTAL, &[("operation_name", "Missing"), ("error_type", "NotFound")]),
        1
    );

    let logs = server.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["status"], "error");
}

#[tokio::test]
async fn query_log() {
    let server = TestServer::new(ObservabilityConfig {
        log_query_body: true,
        log_query_variables: true,
        ..logging()
    });

    let query = "query GetDevices($first: Int) { devices(first: $first) { name } }";

    let response = server
        .graphql(
            "/api/graphql/",
            json!({ "query": query, "variables": { "first": 1 } }),
            None,
        )
        .await;

    assert_eq!(response.json()["data"]["devices"].as_array().map(Vec::len), Some(1));

    let logs = server.logs();
    assert_eq!(logs.len(), 1);

    insta::assert_json_snapshot!(logs[0], { ".duration_ms" => "[duration]" }, @r#"
    {
      "operation_type": "query",
      "operation_name": "GetDevices",
      "status": "success",
      "duration_ms": "[duration]",
      "query": "query GetDevices($first: Int) { devices(first: $first) { name } }",
      "variables": {
        "first": 1
      }
    }
    "#);
}

#[tokio::test]
async fn query_log_without_body() {
    let server = TestServer::new(logging());

    server
        .graphql(
            "/graphql/",
            json!({ "query": "query GetDevices($first: Int) { devices(first: $first) { name } }", "variables": { "first": 1 } }),
            None,
        )
        .await;

    let logs = server.logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].get("query").is_none());
    assert!(logs[0].get("variables").is_none());
    assert!(logs[0]["duration_ms"].as_f64().is_some());
}

#[tokio::test]
async fn field_resolution() {
    let server = TestServer::new(ObservabilityConfig {
        track_field_resolution: true,
        ..Default::default()
    });

    server
        .graphql("/graphql/", json!({ "query": "{ devices { name location { name } } }" }), None)
        .await;

    assert_eq!(
        server.observations(
            FIELD_RESOLUTION_DURATION_SECONDS,
            &[("type_name", "Device"), ("field_name", "name")]
        ),
        2
    );
    assert_eq!(
        server.observations(
            FIELD_RESOLUTION_DURATION_SECONDS,
            &[("type_name", "Location"), ("field_name", "name")]
        ),
        2
    );
    assert_eq!(
        server.observations(FIELD_RESOLUTION_DURATION_SECONDS, &[("type_name", "Query")]),
        0
    );
}

#[tokio::test]
async fn unrecognized_path_is_forwarded_untouched() {
    let server = TestServer::new(logging());

    let request = || Request::get("/health").body(Body::empty()).unwrap();

    let instrumented = server.send(request()).await;
    let bare = send(TestServer::bare(), request()).await;

    assert_eq!(instrumented.status, bare.status);
    assert_eq!(instrumented.body, bare.body);
    assert_eq!(instrumented.body, "ok");
    assert!(server.is_silent());
}

#[tokio::test]
async fn parse_failure() {
    let server = TestServer::new(logging());

    let response = server.graphql("/graphql/", json!({ "query": "{ devices { " }), None).await;

    assert_eq!(response.json()["errors"].as_array().map(Vec::len), Some(1));
    assert!(server.is_silent());
}

#[tokio::test]
async fn metrics_disabled() {
    let server = TestServer::new(ObservabilityConfig {
        graphql_metrics_enabled: false,
        ..logging()
    });

    server
        .graphql("/graphql/", json!({ "query": "query GetDevices { devices { name } }" }), None)
        .await;

    assert_eq!(server.counter(REQUESTS_TOTAL, &[]), 0);
    assert_eq!(server.observations(REQUEST_DURATION_SECONDS, &[]), 0);
    assert_eq!(server.logs().len(), 1);
}
