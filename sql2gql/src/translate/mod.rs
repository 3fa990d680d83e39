//! Clause translators
//!
//! Each translator turns one SQL clause into a clause-scoped structure the
//! assembler can place: the FROM table set, the per-table selections, the
//! reduced WHERE condition tree, the ordering and limit arguments.

pub mod filter;
pub mod from;
pub mod order;
pub mod select;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::query::{Argument, ArgumentName, ArgumentValue};
use crate::relational::{RelationalColumn, RelationalSchema};
use crate::target::TargetTypeGraph;

pub use filter::{translate_filter, ConditionReducer, ConditionTree};
pub use from::{translate_from, FromTables};
pub use order::{translate_order, Ordering};
pub use select::{translate_select, Selection, TableSelection};

/// The read-only models a translation runs against
#[derive(Debug, Clone, Copy)]
pub struct Schemas<'a> {
    pub relational: &'a RelationalSchema,
    pub target: &'a TargetTypeGraph,
    pub config: &'a Config,
}

impl<'a> Schemas<'a> {
    pub fn new(
        relational: &'a RelationalSchema,
        target: &'a TargetTypeGraph,
        config: &'a Config,
    ) -> Self {
        Schemas {
            relational,
            target,
            config,
        }
    }

    /// A column owned by a table, rejecting the wildcard
    pub fn table_column(&self, id: usize) -> Result<&'a RelationalColumn> {
        let column = self.relational.column(id)?;
        if column.is_wildcard() {
            return Err(Error::SchemaMismatch(format!(
                "wildcard column used where database '{}' needs a table column",
                self.relational.db_id()
            )));
        }
        Ok(column)
    }

    /// Target type name of a relational table
    pub fn type_name(&self, table: usize) -> Result<&'a str> {
        let table = self.relational.table(table)?;
        self.target
            .type_named(&table.name)
            .map(|target_type| target_type.name.as_str())
            .ok_or_else(|| Error::SchemaMismatch(format!("no type for table '{}'", table.name)))
    }

    /// Target field name of a relational column
    pub fn field_name(&self, column: &RelationalColumn) -> Result<&'a str> {
        let field = self.target.field_for(&column.table_name, &column.name)?;
        Ok(field.name.as_str())
    }

    /// Column argument naming `column` through its table's type
    pub fn column_argument(
        &self,
        column: &RelationalColumn,
        value: ArgumentValue,
    ) -> Result<Argument> {
        let table = column.table_index.map(|index| self.type_name(index)).transpose()?;
        Ok(Argument::new(
            ArgumentName::Column {
                table: table.unwrap_or(column.table_name.as_str()).to_string(),
                name: column.name.clone(),
            },
            value,
        ))
    }
}

/// A clause argument bound to the table owning its column
#[derive(Debug, Clone, PartialEq)]
pub struct TableLeaf {
    pub table: usize,
    pub argument: Argument,
}
