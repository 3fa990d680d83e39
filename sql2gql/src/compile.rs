//! Per-example compilation pipeline
//!
//! decode -> FROM / SELECT / WHERE / ORDER BY -> assemble -> coerce -> encode
use serde_json::Value;

use crate::assemble::{assemble, RelationResolver};
use crate::coerce::coerce_tree;
use crate::config::Config;
use crate::encoder::{encode, validate};
use crate::error::{CompileResult, Unsupported};
use crate::relational::RelationalSchema;
use crate::sql::SqlQuery;
use crate::target::TargetTypeGraph;
use crate::translate::{
    translate_filter, translate_from, translate_order, translate_select, Schemas,
};

/// Everything needed to compile the examples of one database
#[derive(Clone, Copy)]
pub struct CompileContext<'a> {
    schemas: Schemas<'a>,
    resolver: &'a dyn RelationResolver,
}

impl<'a> CompileContext<'a> {
    pub fn new(
        relational: &'a RelationalSchema,
        target: &'a TargetTypeGraph,
        config: &'a Config,
        resolver: &'a dyn RelationResolver,
    ) -> Self {
        CompileContext {
            schemas: Schemas::new(relational, target, config),
            resolver,
        }
    }

    /// The same context deciding ambiguities with another resolver
    pub fn with_resolver(self, resolver: &'a dyn RelationResolver) -> Self {
        CompileContext { resolver, ..self }
    }

    /// Decodes and compiles the `sql` member of a dataset example
    pub fn compile_value(&self, sql: &Value) -> CompileResult<String> {
        let query = SqlQuery::decode(sql)?;
        self.compile(&query)
    }

    /// Compiles a decoded query into GraphQL text
    pub fn compile(&self, query: &SqlQuery) -> CompileResult<String> {
        if !query.group_by.is_empty() {
            return Err(Unsupported::GroupBy.into());
        }
        if !query.having.is_empty() {
            return Err(Unsupported::Having.into());
        }
        if let Some((operator, _)) = &query.set_operation {
            return Err(Unsupported::SetOperation(*operator).into());
        }

        let schemas = &self.schemas;
        let from = translate_from(&query.from, schemas)?;
        let selection = translate_select(&query.select, &from, schemas)?;
        let filter = translate_filter(&query.filter, schemas)?;
        let ordering = translate_order(query.order_by.as_ref(), query.limit, schemas)?;

        let mut tree = assemble(
            self.schemas,
            &from,
            &selection,
            filter,
            ordering,
            self.resolver,
        )?;
        coerce_tree(&mut tree, schemas.target)?;

        let text = encode(&tree)?;
        if schemas.config.validate_output {
            validate(&text)?;
        }
        Ok(text)
    }
}
