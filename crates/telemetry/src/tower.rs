use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{ready, Context, Poll},
    time::Instant,
};

use ::tower::{Layer, Service};
use graphql_observability_config::ObservabilityConfig;
use http::{Request, Response};
use pin_project_lite::pin_project;

use crate::{
    correlation::RequestObservation,
    metrics::{GraphqlMetrics, OperationAttributes},
    query_log::{self, QueryLogEntry, QueryLogSink},
    OBSERVABILITY_TARGET,
};

/// Times requests to the GraphQL endpoints and, once the response is produced, reports what the
/// resolver layer recorded for them.
#[derive(Clone)]
pub struct ObservabilityLayer {
    config: Arc<ObservabilityConfig>,
    metrics: Option<GraphqlMetrics>,
    log_sink: Arc<dyn QueryLogSink>,
}

impl ObservabilityLayer {
    pub(crate) fn new(
        config: Arc<ObservabilityConfig>,
        metrics: Option<GraphqlMetrics>,
        log_sink: Arc<dyn QueryLogSink>,
    ) -> Self {
        Self {
            config,
            metrics,
            log_sink,
        }
    }
}

impl<S> Layer<S> for ObservabilityLayer {
    type Service = ObservabilityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ObservabilityService {
            inner,
            layer: self.clone(),
        }
    }
}

/// See [ObservabilityLayer]. Requests to other paths are forwarded untouched.
#[derive(Clone)]
pub struct ObservabilityService<S> {
    inner: S,
    layer: ObservabilityLayer,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ObservabilityService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = Response<ResBody>;

    type Error = S::Error;

    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let config = &self.layer.config;

        if !config.is_enabled() || !config.is_query_path(req.uri().path()) {
            return ResponseFuture {
                inner: self.inner.call(req),
                observed: None,
            };
        }

        let observation = RequestObservation::new();
        req.extensions_mut().insert(observation.clone());

        let observed = Observed {
            observation,
            layer: self.layer.clone(),
            start: Instant::now(),
        };

        ResponseFuture {
            inner: self.inner.call(req),
            observed: Some(observed),
        }
    }
}

pin_project! {
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        observed: Option<Observed>,
    }
}

impl<F, ResBody, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = Result<Response<ResBody>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.inner.poll(cx));

        if let Some(observed) = this.observed.take() {
            observed.record();
        }

        Poll::Ready(result)
    }
}

struct Observed {
    observation: RequestObservation,
    layer: ObservabilityLayer,
    start: Instant,
}

impl Observed {
    fn record(self) {
        let duration = self.start.elapsed();

        if self.observation.is_empty() {
            tracing::debug!(target: OBSERVABILITY_TARGET, "no operation was resolved for this request");
            return;
        }

        if let (Some(metrics), Some(operation)) = (&self.layer.metrics, self.observation.operation()) {
            metrics.record_request_duration(
                OperationAttributes {
                    ty: operation.ty,
                    name: &operation.name,
                },
                duration,
            );
        }

        if !self.layer.config.query_logging_enabled {
            return;
        }

        if let Some(record) = self.observation.query_log() {
            let entry = QueryLogEntry::new(record, duration.as_secs_f64() * 1000.0);
            query_log::emit(&*self.layer.log_sink, &entry);
        }
    }
}
