//! FROM clause translation
use smallvec::SmallVec;

use crate::error::{CompileResult, Unsupported};
use crate::sql::{FilterValue, FromClause, TableUnit, UnitOp, WhereOp};
use crate::translate::Schemas;

/// Tables taking part in a query, in order of first mention
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FromTables {
    tables: SmallVec<[usize; 4]>,
}

impl FromTables {
    fn push(&mut self, table: usize) {
        if !self.tables.contains(&table) {
            self.tables.push(table);
        }
    }

    pub fn first(&self) -> Option<usize> {
        self.tables.first().copied()
    }

    pub fn contains(&self, table: usize) -> bool {
        self.tables.contains(&table)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.tables.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Collects the FROM tables, plus the tables named by its join conditions
///
/// Join conditions must be equalities along keys. A table listed twice is a
/// self join, which has no nesting to express it; nested queries in FROM are
/// rejected as well.
pub fn translate_from(from: &FromClause, schemas: &Schemas<'_>) -> CompileResult<FromTables> {
    let mut tables = FromTables::default();

    for unit in &from.table_units {
        match unit {
            TableUnit::Table(index) => {
                let table = schemas.relational.table(*index)?;
                if tables.contains(*index) {
                    return Err(Unsupported::SelfJoin(table.name.clone()).into());
                }
                tables.push(*index);
            }
            TableUnit::Sql(_) => return Err(Unsupported::NestedQueryInFrom.into()),
        }
    }

    for condition in from.conds.units() {
        if condition.negated {
            return Err(Unsupported::Operation("not in join condition".to_string()).into());
        }
        if condition.op != WhereOp::Eq || condition.second.is_some() {
            return Err(Unsupported::Operation(format!(
                "{} in join condition",
                condition.op.sql()
            ))
            .into());
        }
        if condition.value.op != UnitOp::None {
            return Err(Unsupported::UnitOperation.into());
        }

        let right = match &condition.first {
            FilterValue::Column(unit) => unit.column_id,
            FilterValue::Sql(_) => return Err(Unsupported::NestedQueryAsValue.into()),
            _ => {
                return Err(
                    Unsupported::Operation("literal in join condition".to_string()).into(),
                )
            }
        };

        let left = condition.value.left.column_id;
        for id in [left, right] {
            let column = schemas.table_column(id)?;
            if let Some(index) = column.table_index {
                tables.push(index);
            }
        }
        if !schemas.relational.is_key_join(left, right)? {
            return Err(Unsupported::NonKeyJoin {
                left: qualified(schemas, left)?,
                right: qualified(schemas, right)?,
            }
            .into());
        }
    }

    Ok(tables)
}

fn qualified(schemas: &Schemas<'_>, id: usize) -> CompileResult<String> {
    let column = schemas.relational.column(id)?;
    Ok(format!("{}.{}", column.table_name, column.name))
}
