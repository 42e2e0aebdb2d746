//! Per-request hand-off between the resolver layer and the transport layer.
//!
//! The transport layer creates a [`RequestObservation`] for every request on a query path and
//! places it in the request extensions. The host forwards it into the engine's request data,
//! where the resolver layer fills it. Once the inner service has produced a response, the
//! transport layer reads whatever was written. Each slot accepts a single write.

use std::sync::{Arc, OnceLock};

use crate::{metrics::OperationStatus, operation::OperationType};

/// Operation metadata consumed by the transport layer for its duration observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRecord {
    pub ty: OperationType,
    pub name: String,
    pub status: OperationStatus,
}

/// Metadata for the query log line, query text and variables are only present when their
/// logging is enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryLogRecord {
    pub ty: OperationType,
    pub name: String,
    pub status: OperationStatus,
    pub query: Option<String>,
    pub variables: Option<serde_json::Value>,
}

#[derive(Debug, Default)]
struct Slots {
    operation: OnceLock<OperationRecord>,
    query_log: OnceLock<QueryLogRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct RequestObservation(Arc<Slots>);

impl RequestObservation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if a record was already present, in which case it is kept.
    pub fn put_operation(&self, record: OperationRecord) -> bool {
        self.0.operation.set(record).is_ok()
    }

    pub fn operation(&self) -> Option<&OperationRecord> {
        self.0.operation.get()
    }

    /// Returns `false` if a record was already present, in which case it is kept.
    pub fn put_query_log(&self, record: QueryLogRecord) -> bool {
        self.0.query_log.set(record).is_ok()
    }

    pub fn query_log(&self) -> Option<&QueryLogRecord> {
        self.0.query_log.get()
    }

    pub fn is_empty(&self) -> bool {
        self.operation().is_none() && self.query_log().is_none()
    }
}
