use std::fmt;

use async_graphql_parser::types::{DocumentOperations, ExecutableDocument, OperationDefinition, Selection, SelectionSet};

/// Name reported for operations without an explicit name and without any root field.
pub const ANONYMOUS_OPERATION: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Query => "query",
            OperationType::Mutation => "mutation",
            OperationType::Subscription => "subscription",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<async_graphql_parser::types::OperationType> for OperationType {
    fn from(ty: async_graphql_parser::types::OperationType) -> Self {
        match ty {
            async_graphql_parser::types::OperationType::Query => OperationType::Query,
            async_graphql_parser::types::OperationType::Mutation => OperationType::Mutation,
            async_graphql_parser::types::OperationType::Subscription => OperationType::Subscription,
        }
    }
}

/// Type and name under which an operation is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationIdentity {
    pub ty: OperationType,
    pub name: String,
}

impl OperationIdentity {
    pub fn derive(ty: OperationType, explicit_name: Option<&str>, selection_set: Option<&SelectionSet>) -> Self {
        Self {
            ty,
            name: operation_name(explicit_name, selection_set),
        }
    }
}

/// The explicit operation name when there is one. Otherwise the root field names, sorted and
/// comma separated, so that `{ devices locations }` is reported as `devices,locations`.
pub fn operation_name(explicit_name: Option<&str>, selection_set: Option<&SelectionSet>) -> String {
    if let Some(name) = explicit_name.filter(|name| !name.is_empty()) {
        return name.to_string();
    }

    let mut root_fields = selection_set
        .into_iter()
        .flat_map(|selection_set| selection_set.items.iter())
        .filter_map(|selection| match &selection.node {
            Selection::Field(field) => Some(field.node.name.node.as_str()),
            Selection::FragmentSpread(_) | Selection::InlineFragment(_) => None,
        })
        .collect::<Vec<_>>();

    if root_fields.is_empty() {
        return ANONYMOUS_OPERATION.to_string();
    }

    root_fields.sort_unstable();
    root_fields.join(",")
}

/// The operation of `document` the engine executes for `operation_name`, along with its
/// explicit name if it has one.
pub fn find_operation<'a>(
    document: &'a ExecutableDocument,
    operation_name: Option<&str>,
) -> Option<(Option<&'a str>, &'a OperationDefinition)> {
    match (&document.operations, operation_name) {
        (DocumentOperations::Single(operation), None) => Some((None, &operation.node)),
        (DocumentOperations::Single(_), Some(_)) => None,
        (DocumentOperations::Multiple(operations), Some(name)) => operations
            .get_key_value(name)
            .map(|(name, operation)| (Some(name.as_str()), &operation.node)),
        (DocumentOperations::Multiple(operations), None) if operations.len() == 1 => operations
            .iter()
            .next()
            .map(|(name, operation)| (Some(name.as_str()), &operation.node)),
        (DocumentOperations::Multiple(_), None) => None,
    }
}
