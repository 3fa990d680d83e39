//! SELECT clause translation
//!
//! Groups the selected columns by owning table. Plain columns become scalar
//! fields; aggregated columns become aggregate fields, merged per function in
//! order of first appearance (`max(a), max(b)` gives `max { a b }`).
use crate::error::{CompileResult, Error, Unsupported};
use crate::query::{Argument, ArgumentValue, Field};
use crate::sql::{AggregateOp, SelectClause, UnitOp};
use crate::translate::{FromTables, Schemas, TableLeaf};

/// Fields selected from one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSelection {
    pub table: usize,
    pub fields: Vec<Field>,
}

impl TableSelection {
    pub fn has_aggregates(&self) -> bool {
        self.fields
            .iter()
            .any(|field| matches!(field, Field::Aggregate { .. }))
    }
}

/// Per-table selections in order of first appearance
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    pub tables: Vec<TableSelection>,
    /// The `distinct_on` argument and the table it belongs to
    pub distinct: Option<TableLeaf>,
}

impl Selection {
    fn entry(&mut self, table: usize) -> &mut TableSelection {
        match self.tables.iter().position(|selection| selection.table == table) {
            Some(position) => &mut self.tables[position],
            None => {
                self.tables.push(TableSelection {
                    table,
                    fields: Vec::new(),
                });
                let last = self.tables.len() - 1;
                &mut self.tables[last]
            }
        }
    }

    fn add_scalar(&mut self, table: usize, name: &str) -> CompileResult<()> {
        let entry = self.entry(table);
        if entry
            .fields
            .iter()
            .any(|field| matches!(field, Field::Scalar(existing) if existing == name))
        {
            return Err(Unsupported::NonUniqueSelectFields(name.to_string()).into());
        }
        entry.fields.push(Field::Scalar(name.to_string()));
        Ok(())
    }

    fn add_aggregate(
        &mut self,
        table: usize,
        op: AggregateOp,
        column: Option<&str>,
        distinct: bool,
    ) -> CompileResult<()> {
        let entry = self.entry(table);

        if op == AggregateOp::Count {
            // every count renders as one `count` field
            if entry
                .fields
                .iter()
                .any(|field| matches!(field, Field::Aggregate { op: AggregateOp::Count, .. }))
            {
                return Err(Unsupported::NonUniqueSelectFields("count".to_string()).into());
            }
            let columns = match (column, distinct) {
                (Some(column), true) => vec![column.to_string()],
                _ => Vec::new(),
            };
            entry.fields.push(Field::Aggregate {
                op,
                distinct: !columns.is_empty(),
                columns,
            });
            return Ok(());
        }

        let column = column.ok_or_else(|| Unsupported::WildcardAggregate(op.name().to_string()))?;
        let existing = entry.fields.iter_mut().find_map(|field| match field {
            Field::Aggregate {
                op: existing,
                columns,
                ..
            } if *existing == op => Some(columns),
            _ => None,
        });
        match existing {
            Some(columns) if columns.iter().any(|name| name == column) => Err(
                Unsupported::NonUniqueSelectFields(format!("{}.{}", op.name(), column)).into(),
            ),
            Some(columns) => {
                columns.push(column.to_string());
                Ok(())
            }
            None => {
                entry.fields.push(Field::Aggregate {
                    op,
                    columns: vec![column.to_string()],
                    distinct: false,
                });
                Ok(())
            }
        }
    }
}

/// Splits the SELECT list into per-table field groups
pub fn translate_select(
    select: &SelectClause,
    from: &FromTables,
    schemas: &Schemas<'_>,
) -> CompileResult<Selection> {
    let mut selection = Selection::default();
    let mut distinct_columns: Vec<(usize, String)> = Vec::new();

    for item in &select.items {
        if item.value.op != UnitOp::None {
            return Err(Unsupported::UnitOperation.into());
        }
        let unit = item.value.left;
        let aggregate = if item.aggregate.is_none() {
            unit.aggregate
        } else {
            item.aggregate
        };
        let column = schemas.relational.column(unit.column_id)?;

        if column.is_wildcard() {
            let table = from.first().ok_or_else(|| {
                Error::SchemaMismatch("wildcard selected without a FROM table".to_string())
            })?;
            match aggregate {
                AggregateOp::None => {
                    for column in schemas.relational.table_columns(table)? {
                        let name = schemas.field_name(column)?;
                        selection.add_scalar(table, name)?;
                        distinct_columns.push((table, name.to_string()));
                    }
                }
                AggregateOp::Count => selection.add_aggregate(table, aggregate, None, false)?,
                other => return Err(Unsupported::WildcardAggregate(other.name().to_string()).into()),
            }
            continue;
        }

        let table = column.table_index.ok_or_else(|| {
            Error::SchemaMismatch(format!("column '{}' has no table", column.name))
        })?;
        let name = schemas.field_name(column)?;
        if aggregate.is_none() {
            selection.add_scalar(table, name)?;
            distinct_columns.push((table, name.to_string()));
        } else {
            selection.add_aggregate(table, aggregate, Some(name), unit.distinct)?;
        }
    }

    if selection.tables.iter().all(|table| table.fields.is_empty()) {
        return Err(Unsupported::EmptySelection.into());
    }

    if select.distinct {
        selection.distinct = distinct_on(&distinct_columns, schemas)?;
    }
    Ok(selection)
}

fn distinct_on(
    columns: &[(usize, String)],
    schemas: &Schemas<'_>,
) -> CompileResult<Option<TableLeaf>> {
    let Some((table, name)) = columns.first() else {
        return Ok(None);
    };
    if columns.iter().any(|(other, _)| other != table) {
        return Err(Unsupported::DistinctOnMultipleTables.into());
    }
    if columns.len() > 1 {
        return Err(Unsupported::DistinctOnMultipleColumns.into());
    }
    Ok(Some(TableLeaf {
        table: *table,
        argument: Argument::named(
            schemas.config.distinct_argument_name.clone(),
            ArgumentValue::Enum(name.clone()),
        ),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::CompileError;
    use crate::sql::SqlQuery;
    use crate::translate::{fixtures, translate_from};
    use serde_json::json;

    fn translate(select: serde_json::Value, tables: serde_json::Value) -> CompileResult<Selection> {
        let relational = fixtures::relational();
        let target = fixtures::target();
        let config = Config::default();
        let schemas = Schemas::new(&relational, &target, &config);
        let query = SqlQuery::decode(&json!({
            "select": select,
            "from": { "table_units": tables, "conds": [] },
            "where": []
        }))
        .unwrap();
        let from = translate_from(&query.from, &schemas)?;
        translate_select(&query.select, &from, &schemas)
    }

    fn reason(result: CompileResult<Selection>) -> &'static str {
        match result {
            Err(CompileError::Unsupported(unsupported)) => unsupported.reason(),
            other => panic!("expected an unsupported construct, got {:?}", other),
        }
    }

    #[test]
    fn test_fields_grouped_by_table() {
        let selection = translate(
            json!([false, [
                [0, [0, [0, 2, false], null]],
                [0, [0, [0, 6, false], null]],
                [0, [0, [0, 3, false], null]]
            ]]),
            json!([["table_unit", 0], ["table_unit", 1]]),
        )
        .unwrap();
        assert_eq!(selection.tables.len(), 2);
        assert_eq!(
            selection.tables[0].fields,
            vec![
                Field::Scalar("title".to_string()),
                Field::Scalar("release_year".to_string())
            ]
        );
        assert_eq!(selection.tables[1].table, 1);
        assert!(selection.distinct.is_none());
    }

    #[test]
    fn test_aggregates_merge_by_function() {
        let selection = translate(
            json!([false, [
                [1, [0, [0, 3, false], null]],
                [3, [0, [0, 0, false], null]],
                [1, [0, [0, 4, false], null]],
                [0, [0, [0, 2, false], null]]
            ]]),
            json!([["table_unit", 0]]),
        )
        .unwrap();
        let movie = &selection.tables[0];
        assert!(movie.has_aggregates());
        assert_eq!(
            movie.fields,
            vec![
                Field::Aggregate {
                    op: AggregateOp::Max,
                    columns: vec!["release_year".to_string(), "budget".to_string()],
                    distinct: false
                },
                Field::Aggregate {
                    op: AggregateOp::Count,
                    columns: Vec::new(),
                    distinct: false
                },
                Field::Scalar("title".to_string()),
            ]
        );
    }

    #[test]
    fn test_count_distinct_keeps_column() {
        let selection = translate(
            json!([false, [[3, [0, [0, 2, true], null]]]]),
            json!([["table_unit", 0]]),
        )
        .unwrap();
        assert_eq!(
            selection.tables[0].fields,
            vec![Field::Aggregate {
                op: AggregateOp::Count,
                columns: vec!["title".to_string()],
                distinct: true
            }]
        );
    }

    #[test]
    fn test_wildcard_expands_first_table() {
        let selection = translate(
            json!([false, [[0, [0, [0, 0, false], null]]]]),
            json!([["table_unit", 1]]),
        )
        .unwrap();
        assert_eq!(
            selection.tables[0].fields,
            vec![
                Field::Scalar("did".to_string()),
                Field::Scalar("name".to_string())
            ]
        );
    }

    #[test]
    fn test_distinct_on_single_column() {
        let selection = translate(
            json!([true, [[0, [0, [0, 2, false], null]]]]),
            json!([["table_unit", 0]]),
        )
        .unwrap();
        let distinct = selection.distinct.unwrap();
        assert_eq!(distinct.table, 0);
        assert_eq!(
            distinct.argument,
            Argument::named("distinct_on", ArgumentValue::Enum("title".to_string()))
        );
    }

    #[test]
    fn test_unsupported_selections() {
        assert_eq!(
            reason(translate(
                json!([true, [[0, [0, [0, 2, false], null]], [0, [0, [0, 3, false], null]]]]),
                json!([["table_unit", 0]]),
            )),
            "distinct_on_multiple_columns"
        );
        assert_eq!(
            reason(translate(
                json!([true, [[0, [0, [0, 2, false], null]], [0, [0, [0, 6, false], null]]]]),
                json!([["table_unit", 0], ["table_unit", 1]]),
            )),
            "distinct_on_multiple_tables"
        );
        assert_eq!(
            reason(translate(
                json!([false, [[0, [0, [0, 2, false], null]], [0, [0, [0, 2, false], null]]]]),
                json!([["table_unit", 0]]),
            )),
            "non_unique_select_fields"
        );
        assert_eq!(
            reason(translate(
                json!([false, [[0, [2, [0, 3, false], [0, 4, false]]]]]),
                json!([["table_unit", 0]]),
            )),
            "unit_operation"
        );
        assert_eq!(
            reason(translate(
                json!([false, [[4, [0, [0, 0, false], null]]]]),
                json!([["table_unit", 0]]),
            )),
            "wildcard_aggregate"
        );
        assert_eq!(
            reason(translate(json!([false, []]), json!([["table_unit", 0]]))),
            "empty_selection"
        );
    }
}
