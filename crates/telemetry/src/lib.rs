//! Operation and field level metrics for GraphQL servers.
//!
//! Two layers cooperate on every request: an async-graphql extension that intercepts field
//! resolution, and a [tower](https://docs.rs/tower/latest/tower/) layer that times the whole
//! HTTP exchange. The former leaves what it learned about the operation in a per-request
//! [`RequestObservation`], which the latter reads once the response is produced.

pub use graphql_observability_config::{self as config, ObservabilityConfig};

pub use self::{
    correlation::{OperationRecord, QueryLogRecord, RequestObservation},
    extension::{attach_observation, AuthenticatedUser, ObservabilityExtension},
    metrics::{GraphqlMetrics, OperationStatus},
    observability::{Observability, ObservabilityBuilder},
    operation::{OperationIdentity, OperationType},
    query_log::{QueryLogEntry, QueryLogError, QueryLogSink, TracingQueryLogSink},
    tower::{ObservabilityLayer, ObservabilityService},
};

pub mod correlation;
/// async-graphql integration
pub mod extension;
pub mod labels;
pub mod metrics;
pub mod operation;
pub mod query_log;
pub mod resolver;
/// Depth and complexity of operations
pub mod shape;
/// [Tower](https://docs.rs/tower/latest/tower/) integration
pub mod tower;

mod observability;
/// Reading back recorded metrics and query logs in tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

/// Target of the crate's diagnostic events.
pub const OBSERVABILITY_TARGET: &str = "graphql_observability";

pub(crate) const SCOPE: &str = "graphql-observability";
pub(crate) const SCOPE_VERSION: &str = env!("CARGO_PKG_VERSION");
