use std::{
    borrow::Cow,
    sync::{Arc, OnceLock},
};

use async_graphql::{
    extensions::{
        Extension, ExtensionContext, ExtensionFactory, NextParseQuery, NextPrepareRequest, NextResolve,
        ResolveInfo as EngineResolveInfo,
    },
    parser::types::{ExecutableDocument, SelectionSet},
    ServerError, ServerResult, Value, Variables,
};

use crate::{
    correlation::RequestObservation,
    operation::{find_operation, OperationType},
    resolver::{short_type_name, ErrorType, FieldPosition, OperationView, ResolveInfo, ResolverInstrumentation},
    shape::Fragments,
    OBSERVABILITY_TARGET,
};

/// Identity of the caller, inserted into the request data by the host's authentication layer.
/// Requests without one are attributed to `anonymous`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Makes the request's correlation handle, if the transport layer created one, available to
/// the resolver layer.
pub fn attach_observation(request: async_graphql::Request, extensions: &http::Extensions) -> async_graphql::Request {
    match extensions.get::<RequestObservation>() {
        Some(observation) => request.data(observation.clone()),
        None => request,
    }
}

/// The `code` error extension when there is one, the error type name otherwise.
impl ErrorType for ServerError {
    fn error_type(&self) -> Cow<'_, str> {
        let code = self.extensions.as_ref().and_then(|extensions| extensions.get("code"));

        match code {
            Some(Value::String(code)) => Cow::Borrowed(code.as_str()),
            Some(Value::Enum(code)) => Cow::Borrowed(code.as_str()),
            _ => Cow::Borrowed(short_type_name::<ServerError>()),
        }
    }
}

/// Registers the resolver layer on an async-graphql schema.
#[derive(Clone)]
pub struct ObservabilityExtension {
    instrumentation: Arc<ResolverInstrumentation>,
}

impl ObservabilityExtension {
    pub(crate) fn new(instrumentation: Arc<ResolverInstrumentation>) -> Self {
        Self { instrumentation }
    }
}

impl ExtensionFactory for ObservabilityExtension {
    fn create(&self) -> Arc<dyn Extension> {
        Arc::new(RequestExtension::new(self.instrumentation.clone()))
    }
}

/// The parts of the executed operation the resolver layer reads.
struct CapturedOperation {
    ty: OperationType,
    explicit_name: Option<String>,
    selection_set: SelectionSet,
    // only kept when depth or complexity is measured
    fragments: Option<Fragments>,
    query: Option<String>,
    variables: Option<serde_json::Value>,
}

/// One instance per request.
struct RequestExtension {
    instrumentation: Arc<ResolverInstrumentation>,
    operation_name: OnceLock<Option<String>>,
    operation: OnceLock<CapturedOperation>,
}

impl RequestExtension {
    fn new(instrumentation: Arc<ResolverInstrumentation>) -> Self {
        Self {
            instrumentation,
            operation_name: OnceLock::new(),
            operation: OnceLock::new(),
        }
    }

    fn capture(&self, document: &ExecutableDocument, query: &str, variables: &Variables) {
        let config = self.instrumentation.config();

        if !config.is_enabled() {
            return;
        }

        let operation_name = self.operation_name.get().and_then(Option::as_deref);

        // the engine rejects the request on its own
        let Some((explicit_name, operation)) = find_operation(document, operation_name) else {
            return;
        };

        let measures_shape = self.instrumentation.metrics().is_some()
            && (config.track_query_depth || config.track_query_complexity);

        let logging = config.query_logging_enabled;

        let variables = if logging && config.log_query_variables {
            serde_json::to_value(variables)
                .map_err(|error| tracing::debug!(target: OBSERVABILITY_TARGET, "could not capture variables: {error}"))
                .ok()
        } else {
            None
        };

        let captured = CapturedOperation {
            ty: operation.ty.into(),
            explicit_name: explicit_name.map(str::to_string),
            selection_set: operation.selection_set.node.clone(),
            fragments: measures_shape.then(|| document.fragments.clone()),
            query: (logging && config.log_query_body).then(|| query.to_string()),
            variables,
        };

        // a request is parsed once
        let _ = self.operation.set(captured);
    }
}

#[async_trait::async_trait]
impl Extension for RequestExtension {
    async fn prepare_request(
        &self,
        ctx: &ExtensionContext<'_>,
        request: async_graphql::Request,
        next: NextPrepareRequest<'_>,
    ) -> ServerResult<async_graphql::Request> {
        let request = next.run(ctx, request).await?;
        let _ = self.operation_name.set(request.operation_name.clone());

        Ok(request)
    }

    async fn parse_query(
        &self,
        ctx: &ExtensionContext<'_>,
        query: &str,
        variables: &Variables,
        next: NextParseQuery<'_>,
    ) -> ServerResult<ExecutableDocument> {
        let document = next.run(ctx, query, variables).await?;
        self.capture(&document, query, variables);

        Ok(document)
    }

    async fn resolve(
        &self,
        ctx: &ExtensionContext<'_>,
        info: EngineResolveInfo<'_>,
        next: NextResolve<'_>,
    ) -> ServerResult<Option<Value>> {
        let root = info.path_node.parent.is_none();

        if !root && !self.instrumentation.config().track_field_resolution {
            return next.run(ctx, info).await;
        }

        let Some(operation) = self.operation.get() else {
            return next.run(ctx, info).await;
        };

        let resolve_info = ResolveInfo {
            position: if root { FieldPosition::Root } else { FieldPosition::Nested },
            field_name: info.name,
            parent_type: info.parent_type,
            operation: OperationView {
                ty: operation.ty,
                explicit_name: operation.explicit_name.as_deref(),
                selection_set: Some(&operation.selection_set),
                fragments: operation.fragments.as_ref(),
                query: operation.query.as_deref(),
                variables: operation.variables.as_ref(),
            },
            // only root resolutions are attributed and correlated
            user: root
                .then(|| ctx.data_opt::<AuthenticatedUser>())
                .flatten()
                .map(|user| user.0.as_str()),
            observation: root.then(|| ctx.data_opt::<RequestObservation>()).flatten(),
        };

        self.instrumentation.resolve(resolve_info, next.run(ctx, info)).await
    }
}
