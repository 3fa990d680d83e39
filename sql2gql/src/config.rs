//! Configuration module for sql2gql
//!
//! This module defines the configuration structure used by the compiler and
//! the batch driver: naming conventions of the generated GraphQL API,
//! nesting limits, cache sizing and driver behavior.
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Compiler and batch driver configuration
///
/// The defaults match the naming conventions of a Hasura v1 auto-generated
/// API over a Postgres database.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Field name suffix for aggregate root and relation fields
    pub aggregate_field_suffix: String,

    /// Field name for the records inside an aggregate field
    pub aggregate_nodes_field_name: String,

    /// Field name for the aggregate values inside an aggregate field
    pub aggregate_field_name: String,

    /// Argument carrying the boolean filter expression
    pub where_argument_name: String,

    /// Argument carrying the ordering
    pub order_by_argument_name: String,

    /// Argument carrying the row limit
    pub limit_argument_name: String,

    /// Argument selecting the distinct column
    pub distinct_argument_name: String,

    /// Maximum depth of a resolved relation path, root included
    pub max_nesting_depth: usize,

    /// Maximum number of compiled queries kept in the cache
    pub query_cache_max_size: u64,

    /// Time-to-live for cached queries in seconds
    pub query_cache_ttl_seconds: u64,

    /// Retry examples needing a manual relation choice with the console prompt
    pub interactive: bool,

    /// Check that every produced query parses as GraphQL
    pub validate_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            aggregate_field_suffix: "_aggregate".to_string(),
            aggregate_nodes_field_name: "nodes".to_string(),
            aggregate_field_name: "aggregate".to_string(),
            where_argument_name: "where".to_string(),
            order_by_argument_name: "order_by".to_string(),
            limit_argument_name: "limit".to_string(),
            distinct_argument_name: "distinct_on".to_string(),
            max_nesting_depth: 3,
            query_cache_max_size: 10_000,
            query_cache_ttl_seconds: 3_600,
            interactive: false,
            validate_output: true,
        }
    }
}

impl Config {
    /// Loads a configuration from a JSON file.
    ///
    /// Keys missing from the file keep their default value.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Name of the aggregate variant of a type or relation field
    #[inline(always)]
    pub fn aggregate_name(&self, base: &str) -> String {
        format!("{}{}", base, self.aggregate_field_suffix)
    }

    /// Rejects configurations the compiler cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.max_nesting_depth == 0 {
            return Err(Error::Config(
                "max_nesting_depth must be at least 1".to_string(),
            ));
        }
        if self.aggregate_field_suffix.is_empty() {
            return Err(Error::Config(
                "aggregate_field_suffix cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
