//! Field resolution interception.
//!
//! The engine hands every field resolution to [`ResolverInstrumentation::resolve`] together with
//! the continuation that actually resolves it. Root fields are timed and counted as operations,
//! nested fields are only timed when field tracking is enabled.

use std::{borrow::Cow, future::Future, sync::Arc, time::Instant};

use async_graphql_parser::types::SelectionSet;
use graphql_observability_config::ObservabilityConfig;

use crate::{
    correlation::{OperationRecord, QueryLogRecord, RequestObservation},
    labels::LabelPolicy,
    metrics::{GraphqlMetrics, OperationAttributes, OperationStatus},
    operation::{OperationIdentity, OperationType},
    shape::{self, Fragments, ShapeLimits},
    OBSERVABILITY_TARGET,
};

/// Reported as the user of requests without an authenticated identity.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Reported as the error type of root resolutions abandoned before completion.
pub const CANCELLED_ERROR: &str = "Cancelled";

/// Label value identifying the kind of a resolution failure.
pub trait ErrorType {
    fn error_type(&self) -> Cow<'_, str>;
}

/// Last path segment of a type name, `ServerError` for `async_graphql::error::ServerError`.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let name = std::any::type_name::<T>();
    let path = name.split('<').next().unwrap_or(name);

    match path.rsplit("::").next() {
        Some(short) if !short.is_empty() => short,
        _ => name,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPosition {
    /// No parent value exists yet, the field is one of the operation's root fields.
    Root,
    Nested,
}

/// What the engine knows about the executed operation.
#[derive(Debug, Clone, Copy)]
pub struct OperationView<'a> {
    pub ty: OperationType,
    pub explicit_name: Option<&'a str>,
    pub selection_set: Option<&'a SelectionSet>,
    pub fragments: Option<&'a Fragments>,
    pub query: Option<&'a str>,
    pub variables: Option<&'a serde_json::Value>,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolveInfo<'a> {
    pub position: FieldPosition,
    pub field_name: &'a str,
    pub parent_type: &'a str,
    pub operation: OperationView<'a>,
    pub user: Option<&'a str>,
    pub observation: Option<&'a RequestObservation>,
}

pub struct ResolverInstrumentation {
    config: Arc<ObservabilityConfig>,
    metrics: Option<GraphqlMetrics>,
    labels: LabelPolicy,
    limits: ShapeLimits,
}

impl ResolverInstrumentation {
    pub fn new(config: Arc<ObservabilityConfig>, metrics: GraphqlMetrics) -> Self {
        Self {
            metrics: config.graphql_metrics_enabled.then_some(metrics),
            labels: LabelPolicy::from_config(&config.labels),
            limits: config.analysis.into(),
            config,
        }
    }

    pub fn config(&self) -> &ObservabilityConfig {
        &self.config
    }

    pub(crate) fn shared_config(&self) -> Arc<ObservabilityConfig> {
        self.config.clone()
    }

    pub(crate) fn metrics(&self) -> Option<&GraphqlMetrics> {
        self.metrics.as_ref()
    }

    /// Resolves a field through `next`. The result is returned untouched, errors included.
    pub async fn resolve<T, E, F>(&self, info: ResolveInfo<'_>, next: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: ErrorType,
    {
        match info.position {
            FieldPosition::Root if self.config.is_enabled() => {
                let mut resolution = RootResolution::start(self, info);
                let result = next.await;

                resolution.complete(match &result {
                    Ok(_) => Ok(()),
                    Err(error) => Err(self.labels.value(&error.error_type()).into_owned()),
                });

                result
            }
            FieldPosition::Nested if self.config.track_field_resolution => match &self.metrics {
                Some(metrics) => {
                    let _timer = FieldTimer {
                        metrics,
                        parent_type: info.parent_type,
                        field_name: info.field_name,
                        start: Instant::now(),
                    };

                    next.await
                }
                None => next.await,
            },
            FieldPosition::Root | FieldPosition::Nested => next.await,
        }
    }

    fn record_root(&self, info: &ResolveInfo<'_>, identity: &OperationIdentity, outcome: &Outcome, start: Instant) {
        let status = match outcome {
            Ok(()) => OperationStatus::Success,
            Err(_) => OperationStatus::Error,
        };

        let operation_name = self.labels.operation_name(&identity.name);

        if let Some(metrics) = &self.metrics {
            let attributes = OperationAttributes {
                ty: identity.ty,
                name: &operation_name,
            };

            metrics.record_request(attributes, status);
            metrics.record_request_duration(attributes, start.elapsed());

            if let Err(error_type) = outcome {
                metrics.record_error(attributes, error_type);
            }

            self.record_shape(metrics, info.operation, &operation_name);

            if self.config.track_per_user {
                let user = self.labels.value(info.user.unwrap_or(ANONYMOUS_USER));
                metrics.record_request_by_user(&user, attributes);
            }
        }

        let Some(observation) = info.observation else {
            return;
        };

        observation.put_operation(OperationRecord {
            ty: identity.ty,
            name: operation_name.into_owned(),
            status,
        });

        if self.config.query_logging_enabled {
            let operation = info.operation;

            observation.put_query_log(QueryLogRecord {
                ty: identity.ty,
                name: identity.name.clone(),
                status,
                query: operation
                    .query
                    .filter(|_| self.config.log_query_body)
                    .map(str::to_string),
                variables: operation
                    .variables
                    .filter(|_| self.config.log_query_variables)
                    .cloned(),
            });
        }
    }

    fn record_shape(&self, metrics: &GraphqlMetrics, operation: OperationView<'_>, operation_name: &str) {
        if self.config.track_query_depth {
            let depth = shape::depth_with_limits(operation.selection_set, operation.fragments, self.limits);

            if let Some(limit) = depth.saturation() {
                tracing::debug!(target: OBSERVABILITY_TARGET, "query depth of {operation_name} saturated: {limit:?}");
            }

            metrics.record_query_depth(operation_name, depth.value());
        }

        if self.config.track_query_complexity {
            let complexity = shape::complexity_with_limits(operation.selection_set, operation.fragments, self.limits);

            if let Some(limit) = complexity.saturation() {
                tracing::debug!(target: OBSERVABILITY_TARGET, "query complexity of {operation_name} saturated: {limit:?}");
            }

            metrics.record_query_complexity(operation_name, complexity.value());
        }
    }
}

/// `Err` holds the error type label.
type Outcome = Result<(), String>;

/// Records the root resolution when dropped, so that abandoned resolutions are recorded too.
struct RootResolution<'a> {
    instrumentation: &'a ResolverInstrumentation,
    info: ResolveInfo<'a>,
    identity: OperationIdentity,
    start: Instant,
    outcome: Option<Outcome>,
}

impl<'a> RootResolution<'a> {
    fn start(instrumentation: &'a ResolverInstrumentation, info: ResolveInfo<'a>) -> Self {
        let operation = info.operation;

        Self {
            instrumentation,
            info,
            identity: OperationIdentity::derive(operation.ty, operation.explicit_name, operation.selection_set),
            start: Instant::now(),
            outcome: None,
        }
    }

    fn complete(&mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for RootResolution<'_> {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or_else(|| {
            tracing::debug!(
                target: OBSERVABILITY_TARGET,
                "root field {} of {} abandoned before completion",
                self.info.field_name,
                self.identity.name
            );

            Err(CANCELLED_ERROR.to_string())
        });

        self.instrumentation
            .record_root(&self.info, &self.identity, &outcome, self.start);
    }
}

struct FieldTimer<'a> {
    metrics: &'a GraphqlMetrics,
    parent_type: &'a str,
    field_name: &'a str,
    start: Instant,
}

impl Drop for FieldTimer<'_> {
    fn drop(&mut self) {
        self.metrics
            .record_field_resolution(self.parent_type, self.field_name, self.start.elapsed());
    }
}
