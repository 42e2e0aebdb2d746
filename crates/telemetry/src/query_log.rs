use std::sync::Arc;

use crate::{correlation::QueryLogRecord, OBSERVABILITY_TARGET};

/// Target of the query log events, so that hosts can route them apart from diagnostics.
pub const QUERY_LOG_TARGET: &str = "graphql_observability::query_log";

/// One completed request on a query endpoint.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct QueryLogEntry<'a> {
    pub operation_type: &'static str,
    pub operation_name: &'a str,
    pub status: &'static str,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<&'a serde_json::Value>,
}

impl<'a> QueryLogEntry<'a> {
    pub fn new(record: &'a QueryLogRecord, duration_ms: f64) -> Self {
        Self {
            operation_type: record.ty.as_str(),
            operation_name: &record.name,
            status: record.status.as_str(),
            duration_ms,
            query: record.query.as_deref(),
            variables: record.variables.as_ref(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueryLogError {
    #[error("could not encode the query variables: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("query log sink unavailable: {0}")]
    Unavailable(String),
}

/// Receives one entry per completed request on a query endpoint. Failures are reported by the
/// caller at debug level and otherwise ignored, they never affect the response.
pub trait QueryLogSink: Send + Sync + 'static {
    fn emit(&self, entry: &QueryLogEntry<'_>) -> Result<(), QueryLogError>;
}

impl<T: QueryLogSink + ?Sized> QueryLogSink for Arc<T> {
    fn emit(&self, entry: &QueryLogEntry<'_>) -> Result<(), QueryLogError> {
        (**self).emit(entry)
    }
}

/// Writes entries as structured `tracing` events on [`QUERY_LOG_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingQueryLogSink;

impl QueryLogSink for TracingQueryLogSink {
    fn emit(&self, entry: &QueryLogEntry<'_>) -> Result<(), QueryLogError> {
        let variables = entry.variables.map(serde_json::to_string).transpose()?;

        tracing::info!(
            target: QUERY_LOG_TARGET,
            operation_type = entry.operation_type,
            operation_name = entry.operation_name,
            status = entry.status,
            duration_ms = entry.duration_ms,
            query = entry.query,
            variables = variables.as_deref(),
            "graphql query"
        );

        Ok(())
    }
}

pub(crate) fn emit(sink: &dyn QueryLogSink, entry: &QueryLogEntry<'_>) {
    if let Err(error) = sink.emit(entry) {
        tracing::debug!(target: OBSERVABILITY_TARGET, "dropping query log entry: {error}");
    }
}
