//! Error handling for SQL to GraphQL compilation
//!
//! Two classes of errors exist. [`Error`] covers structural problems: input
//! data that departs from its documented format, or schema skew between the
//! benchmark and the target API. These abort the unit being processed.
//! [`Unsupported`] covers the SQL constructs GraphQL cannot express. These are
//! expected outcomes, attached to the failing example while the batch goes on.

use std::fmt;
use thiserror::Error;

use crate::sql::SetOperator;

/// Result type for structural operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for the compilation pipeline
pub type CompileResult<T> = std::result::Result<T, CompileError>;

/// Structural errors
#[derive(Debug, Error)]
pub enum Error {
    /// The SQL AST JSON does not match any expected shape at `path`
    #[error("SQL AST decode error at {path}: {message}")]
    Decode { path: String, message: String },

    /// A table or column referenced by the SQL AST has no schema counterpart
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The target schema uses a scalar type the coercion rules do not know
    #[error("no coercion rule for field '{field}' of scalar type '{type_name}'")]
    UnknownScalar { field: String, type_name: String },

    /// The encoder produced text that does not parse as GraphQL
    #[error("produced GraphQL does not parse: {0}")]
    InvalidOutput(String),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Malformed JSON document
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error reading an input document
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds a decode error for a JSON position
    pub(crate) fn decode(path: &str, message: impl Into<String>) -> Self {
        Error::Decode {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// SQL constructs the translation deliberately does not cover
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unsupported {
    #[error("GROUP BY is not supported")]
    GroupBy,

    #[error("HAVING is not supported")]
    Having,

    #[error("{0} is not supported")]
    SetOperation(SetOperator),

    #[error("nested query used as a filter value is not supported")]
    NestedQueryAsValue,

    #[error("nested query in FROM is not supported")]
    NestedQueryInFrom,

    #[error("table '{0}' is joined with itself")]
    SelfJoin(String),

    #[error("join of '{left}' and '{right}' is not a key join")]
    NonKeyJoin { left: String, right: String },

    #[error("arithmetic between two columns is not supported")]
    UnitOperation,

    #[error("DISTINCT over columns of several tables is not supported")]
    DistinctOnMultipleTables,

    #[error("DISTINCT over several columns is not supported")]
    DistinctOnMultipleColumns,

    #[error("field '{0}' is selected more than once")]
    NonUniqueSelectFields(String),

    #[error("column used as a filter value is not supported")]
    ColumnAsFilterValue,

    #[error("operation '{0}' is not supported")]
    Operation(String),

    #[error("aggregate inside WHERE is not supported")]
    AggregateFilter,

    #[error("aggregate inside ORDER BY is not supported")]
    AggregateOrder,

    #[error("aggregate '{0}' over the wildcard column is not supported")]
    WildcardAggregate(String),

    #[error("no fields left to select")]
    EmptySelection,

    #[error("relation path from '{parent}' to '{child}' needs more nesting hops than allowed")]
    NestingDepth { parent: String, child: String },

    #[error("relation from '{parent}' to '{child}' needs a manual choice among [{}]", .candidates.join(", "))]
    ManualRelationEntryNeeded {
        parent: String,
        child: String,
        candidates: Vec<String>,
    },

    #[error("no relation path from '{parent}' to '{child}'")]
    RelationPathUnresolvable { parent: String, child: String },
}

impl Unsupported {
    /// Stable key used to bucket failures in reports
    pub fn reason(&self) -> &'static str {
        match self {
            Unsupported::GroupBy => "group_by",
            Unsupported::Having => "having",
            Unsupported::SetOperation(_) => "set_operation",
            Unsupported::NestedQueryAsValue => "nested_query_as_value",
            Unsupported::NestedQueryInFrom => "nested_query_in_from",
            Unsupported::SelfJoin(_) => "self_join",
            Unsupported::NonKeyJoin { .. } => "non_key_join",
            Unsupported::UnitOperation => "unit_operation",
            Unsupported::DistinctOnMultipleTables => "distinct_on_multiple_tables",
            Unsupported::DistinctOnMultipleColumns => "distinct_on_multiple_columns",
            Unsupported::NonUniqueSelectFields(_) => "non_unique_select_fields",
            Unsupported::ColumnAsFilterValue => "column_as_filter_value",
            Unsupported::Operation(_) => "unsupported_operation",
            Unsupported::AggregateFilter => "aggregate_filter",
            Unsupported::AggregateOrder => "aggregate_order",
            Unsupported::WildcardAggregate(_) => "wildcard_aggregate",
            Unsupported::EmptySelection => "empty_selection",
            Unsupported::NestingDepth { .. } => "nesting_depth",
            Unsupported::ManualRelationEntryNeeded { .. } => "manual_relation_entry_needed",
            Unsupported::RelationPathUnresolvable { .. } => "relation_path_unresolvable",
        }
    }

    /// Whether a retry with manual relation resolution can succeed
    pub fn is_manual_entry(&self) -> bool {
        matches!(self, Unsupported::ManualRelationEntryNeeded { .. })
    }
}

/// Any failure of the compilation pipeline
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Structural(#[from] Error),

    #[error(transparent)]
    Unsupported(#[from] Unsupported),
}

impl CompileError {
    /// Returns the capability error if this is one
    pub fn unsupported(&self) -> Option<&Unsupported> {
        match self {
            CompileError::Unsupported(reason) => Some(reason),
            CompileError::Structural(_) => None,
        }
    }
}

impl fmt::Display for SetOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetOperator::Intersect => write!(f, "INTERSECT"),
            SetOperator::Union => write!(f, "UNION"),
            SetOperator::Except => write!(f, "EXCEPT"),
        }
    }
}
