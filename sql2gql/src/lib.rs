/// sql2gql - Spider SQL to GraphQL compiler
///
/// sql2gql turns the SQL ASTs of the Spider text-to-SQL benchmark into
/// GraphQL queries against a Hasura-style auto-generated API for the same
/// database. Each example is decoded, translated clause by clause, assembled
/// into a nested query tree following the schema's relation fields, coerced
/// to the schema's scalar types and encoded as query text.
///
/// SQL constructs GraphQL cannot express are reported as [`Unsupported`]
/// outcomes so a batch can count them and move on.
// Module declarations
pub mod assemble;
pub mod batch;
mod cache;
pub mod coerce;
pub mod compile;
mod config;
pub mod dataset;
pub mod encoder;
pub mod error;
pub mod prompt;
pub mod query;
pub mod relational;
pub mod sql;
pub mod target;
pub mod translate;

// Re-exports for public API
pub use assemble::{NonInteractive, RelationRequest, RelationResolver};
pub use batch::{BatchDriver, BatchReport, FailedExample, RunSummary};
pub use cache::{CachedOutcome, CompileCache};
pub use compile::CompileContext;
pub use config::Config;
pub use dataset::{
    DatasetExample, GraphQLDatasetExample, ModelRegistry, SchemaDirectory, SchemaSource,
};
pub use error::{CompileError, CompileResult, Error, Result, Unsupported};
pub use prompt::ConsolePrompt;
pub use relational::RelationalSchema;
pub use sql::SqlQuery;
pub use target::TargetTypeGraph;
