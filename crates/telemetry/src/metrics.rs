use std::{fmt, time::Duration};

use opentelemetry::{
    metrics::{Counter, Histogram, Meter, MeterProvider},
    InstrumentationScope, KeyValue,
};

use crate::operation::OperationType;

pub const REQUESTS_TOTAL: &str = "graphql_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "graphql_request_duration_seconds";
pub const ERRORS_TOTAL: &str = "graphql_errors_total";
pub const FIELD_RESOLUTION_DURATION_SECONDS: &str = "graphql_field_resolution_duration_seconds";
pub const QUERY_DEPTH: &str = "graphql_query_depth";
pub const QUERY_COMPLEXITY: &str = "graphql_query_complexity";
pub const REQUESTS_BY_USER_TOTAL: &str = "graphql_requests_by_user_total";

const DURATION_BOUNDARIES: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0];
const DEPTH_BOUNDARIES: &[f64] = &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0, 12.0, 15.0, 20.0];
const COMPLEXITY_BOUNDARIES: &[f64] = &[
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];

pub fn meter_from_global_provider() -> Meter {
    meter(&*opentelemetry::global::meter_provider())
}

pub fn meter(provider: &dyn MeterProvider) -> Meter {
    provider.meter_with_scope(
        InstrumentationScope::builder(crate::SCOPE)
            .with_version(crate::SCOPE_VERSION)
            .build(),
    )
}

/// Outcome of a root resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Success,
    Error,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Success => "success",
            OperationStatus::Error => "error",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OperationAttributes<'a> {
    pub ty: OperationType,
    pub name: &'a str,
}

impl OperationAttributes<'_> {
    fn key_values(&self) -> [KeyValue; 2] {
        [
            KeyValue::new("operation_type", self.ty.as_str()),
            KeyValue::new("operation_name", self.name.to_string()),
        ]
    }
}

/// The catalog of GraphQL series. Every instrument is safe to update concurrently from any
/// number of in-flight requests.
#[derive(Clone)]
pub struct GraphqlMetrics {
    requests: Counter<u64>,
    request_duration: Histogram<f64>,
    errors: Counter<u64>,
    field_resolution_duration: Histogram<f64>,
    query_depth: Histogram<u64>,
    query_complexity: Histogram<u64>,
    requests_by_user: Counter<u64>,
}

impl GraphqlMetrics {
    pub fn build(meter: &Meter) -> Self {
        Self {
            requests: meter
                .u64_counter(REQUESTS_TOTAL)
                .with_description("Total number of GraphQL requests")
                .build(),
            request_duration: meter
                .f64_histogram(REQUEST_DURATION_SECONDS)
                .with_description("Duration of GraphQL requests in seconds")
                .with_unit("s")
                .with_boundaries(DURATION_BOUNDARIES.to_vec())
                .build(),
            errors: meter
                .u64_counter(ERRORS_TOTAL)
                .with_description("Total number of GraphQL errors")
                .build(),
            field_resolution_duration: meter
                .f64_histogram(FIELD_RESOLUTION_DURATION_SECONDS)
                .with_description("Duration of individual field resolutions in seconds")
                .with_unit("s")
                .with_boundaries(DURATION_BOUNDARIES.to_vec())
                .build(),
            query_depth: meter
                .u64_histogram(QUERY_DEPTH)
                .with_description("Nesting depth of GraphQL queries")
                .with_boundaries(DEPTH_BOUNDARIES.to_vec())
                .build(),
            query_complexity: meter
                .u64_histogram(QUERY_COMPLEXITY)
                .with_description("Number of fields selected by GraphQL queries")
                .with_boundaries(COMPLEXITY_BOUNDARIES.to_vec())
                .build(),
            requests_by_user: meter
                .u64_counter(REQUESTS_BY_USER_TOTAL)
                .with_description("Total number of GraphQL requests per user")
                .build(),
        }
    }

    pub fn record_request(&self, operation: OperationAttributes<'_>, status: OperationStatus) {
        let [ty, name] = operation.key_values();
        self.requests
            .add(1, &[ty, name, KeyValue::new("status", status.as_str())]);
    }

    pub fn record_request_duration(&self, operation: OperationAttributes<'_>, duration: Duration) {
        self.request_duration
            .record(duration.as_secs_f64(), &operation.key_values());
    }

    pub fn record_error(&self, operation: OperationAttributes<'_>, error_type: &str) {
        let [ty, name] = operation.key_values();
        self.errors
            .add(1, &[ty, name, KeyValue::new("error_type", error_type.to_string())]);
    }

    pub fn record_field_resolution(&self, type_name: &str, field_name: &str, duration: Duration) {
        self.field_resolution_duration.record(
            duration.as_secs_f64(),
            &[
                KeyValue::new("type_name", type_name.to_string()),
                KeyValue::new("field_name", field_name.to_string()),
            ],
        );
    }

    pub fn record_query_depth(&self, operation_name: &str, depth: u64) {
        self.query_depth
            .record(depth, &[KeyValue::new("operation_name", operation_name.to_string())]);
    }

    pub fn record_query_complexity(&self, operation_name: &str, complexity: u64) {
        self.query_complexity
            .record(complexity, &[KeyValue::new("operation_name", operation_name.to_string())]);
    }

    pub fn record_request_by_user(&self, user: &str, operation: OperationAttributes<'_>) {
        let [ty, name] = operation.key_values();
        self.requests_by_user
            .add(1, &[KeyValue::new("user", user.to_string()), ty, name]);
    }
}
