use std::sync::Arc;

use async_graphql::{EmptySubscription, ErrorExtensions, Object, Schema, SimpleObject};
use axum::{
    body::Body,
    extract::State,
    http::{Extensions, HeaderMap, Request, StatusCode},
    routing::{get, post},
    Json, Router,
};
use graphql_observability::{
    attach_observation,
    test_utils::{RecordingSink, TestMeter},
    AuthenticatedUser, Observability, ObservabilityConfig,
};
use tower::ServiceExt;

#[derive(SimpleObject, Clone)]
struct Location {
    name: String,
}

#[derive(SimpleObject, Clone)]
struct Device {
    name: String,
    location: Location,
}

fn inventory() -> Vec<Device> {
    ["edge-01", "edge-02"]
        .into_iter()
        .map(|name| Device {
            name: name.to_string(),
            location: Location {
                name: "ams".to_string(),
            },
        })
        .collect()
}

pub struct Query;

#[Object]
impl Query {
    async fn devices(&self, first: Option<usize>) -> Vec<Device> {
        inventory().into_iter().take(first.unwrap_or(usize::MAX)).collect()
    }

    async fn device(&self, name: String) -> async_graphql::Result<Device> {
        inventory()
            .into_iter()
            .find(|device| device.name == name)
            .ok_or_else(|| {
                async_graphql::Error::new(format!("no device named {name}"))
                    .extend_with(|_, extensions| extensions.set("code", "NotFound"))
            })
    }

    async fn locations(&self) -> Vec<Location> {
        vec![Location {
            name: "ams".to_string(),
        }]
    }
}

pub struct Mutation;

#[Object]
impl Mutation {
    async fn create_device(&self, name: String) -> Device {
        Device {
            name,
            location: Location {
                name: "ams".to_string(),
            },
        }
    }
}

type DeviceSchema = Schema<Query, Mutation, EmptySubscription>;

async fn graphql(
    State(schema): State<DeviceSchema>,
    headers: HeaderMap,
    extensions: Extensions,
    Json(request): Json<async_graphql::Request>,
) -> Json<async_graphql::Response> {
    let mut request = attach_observation(request, &extensions);

    if let Some(user) = headers.get("x-user").and_then(|value| value.to_str().ok()) {
        request = request.data(AuthenticatedUser(user.to_string()));
    }

    Json(schema.execute(request).await)
}

fn router(schema: DeviceSchema) -> Router {
    Router::new()
        .route("/api/graphql/", post(graphql))
        .route("/graphql/", post(graphql))
        .route("/health", get(|| async { "ok" }))
        .with_state(schema)
}

pub struct Response {
    pub status: StatusCode,
    pub body: String,
}

impl Response {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// The device inventory schema served by axum, behind the transport layer.
pub struct TestServer {
    router: Router,
    meter: TestMeter,
    logs: Arc<RecordingSink>,
}

impl TestServer {
    pub fn new(config: ObservabilityConfig) -> Self {
        let meter = TestMeter::new();
        let logs = Arc::new(RecordingSink::default());

        let observability = Observability::builder(config)
            .meter(meter.meter())
            .log_sink(logs.clone())
            .build();

        let schema = Schema::build(Query, Mutation, EmptySubscription)
            .extension(observability.extension())
            .finish();

        Self {
            router: router(schema).layer(observability.layer()),
            meter,
            logs,
        }
    }

    /// The same application without any instrumentation.
    pub fn bare() -> Router {
        router(Schema::build(Query, Mutation, EmptySubscription).finish())
    }

    pub async fn graphql(&self, path: &str, body: serde_json::Value, user: Option<&str>) -> Response {
        let mut request = Request::post(path).header("content-type", "application/json");

        if let Some(user) = user {
            request = request.header("x-user", user);
        }

        self.send(request.body(Body::from(body.to_string())).unwrap()).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        send(self.router.clone(), request).await
    }

    pub fn logs(&self) -> Vec<serde_json::Value> {
        self.logs.entries()
    }

    pub fn counter(&self, name: &str, attributes: &[(&str, &str)]) -> u64 {
        self.meter.counter(name, attributes)
    }

    pub fn observations(&self, name: &str, attributes: &[(&str, &str)]) -> u64 {
        self.meter.histogram_count(name, attributes)
    }

    pub fn observed_sum(&self, name: &str, attributes: &[(&str, &str)]) -> u64 {
        self.meter.histogram_sum(name, attributes)
    }

    /// No metric and no log line was recorded.
    pub fn is_silent(&self) -> bool {
        self.meter.is_empty() && self.logs().is_empty()
    }
}

pub async fn send(router: Router, request: Request<Body>) -> Response {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();

    Response {
        status,
        body: String::from_utf8(body.to_vec()).unwrap(),
    }
}
