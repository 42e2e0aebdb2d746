use std::sync::Arc;

use graphql_observability_config::ObservabilityConfig;
use opentelemetry::metrics::Meter;

use crate::{
    extension::ObservabilityExtension,
    metrics::{meter_from_global_provider, GraphqlMetrics},
    query_log::{QueryLogSink, TracingQueryLogSink},
    resolver::ResolverInstrumentation,
    tower::ObservabilityLayer,
};

/// Both interception layers of one server, sharing the same configuration and metric series.
///
/// ```no_run
/// # use graphql_observability::{Observability, ObservabilityConfig};
/// let observability = Observability::builder(ObservabilityConfig::default()).build();
///
/// // schema builder: .extension(observability.extension())
/// // http router:    .layer(observability.layer())
/// ```
#[derive(Clone)]
pub struct Observability {
    instrumentation: Arc<ResolverInstrumentation>,
    log_sink: Arc<dyn QueryLogSink>,
}

impl Observability {
    pub fn builder(config: ObservabilityConfig) -> ObservabilityBuilder {
        ObservabilityBuilder {
            config,
            meter: None,
            log_sink: None,
        }
    }

    pub fn config(&self) -> &ObservabilityConfig {
        self.instrumentation.config()
    }

    /// The transport layer, to wrap the HTTP service serving the GraphQL endpoints.
    pub fn layer(&self) -> ObservabilityLayer {
        ObservabilityLayer::new(
            self.instrumentation.shared_config(),
            self.instrumentation.metrics().cloned(),
            self.log_sink.clone(),
        )
    }

    /// The resolver layer, to register on the schema.
    pub fn extension(&self) -> ObservabilityExtension {
        ObservabilityExtension::new(self.instrumentation.clone())
    }
}

pub struct ObservabilityBuilder {
    config: ObservabilityConfig,
    meter: Option<Meter>,
    log_sink: Option<Arc<dyn QueryLogSink>>,
}

impl ObservabilityBuilder {
    /// Defaults to a meter of the global provider.
    pub fn meter(mut self, meter: Meter) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Defaults to [TracingQueryLogSink].
    pub fn log_sink(mut self, sink: impl QueryLogSink) -> Self {
        self.log_sink = Some(Arc::new(sink));
        self
    }

    pub fn build(self) -> Observability {
        let meter = self.meter.unwrap_or_else(meter_from_global_provider);
        let metrics = GraphqlMetrics::build(&meter);

        Observability {
            instrumentation: Arc::new(ResolverInstrumentation::new(Arc::new(self.config), metrics)),
            log_sink: self.log_sink.unwrap_or_else(|| Arc::new(TracingQueryLogSink)),
        }
    }
}
