//! ORDER BY and LIMIT translation
use crate::error::{CompileResult, Error, Unsupported};
use crate::query::{Argument, ArgumentValue};
use crate::sql::{OrderBy, UnitOp};
use crate::translate::{Schemas, TableLeaf};

/// Ordering keys and row limit of a query
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ordering {
    /// One `column: direction` key per ordered column
    pub keys: Vec<TableLeaf>,
    pub limit: Option<Argument>,
}

pub fn translate_order(
    order_by: Option<&OrderBy>,
    limit: Option<u64>,
    schemas: &Schemas<'_>,
) -> CompileResult<Ordering> {
    let mut ordering = Ordering::default();

    if let Some(order_by) = order_by {
        let direction = ArgumentValue::Enum(order_by.direction.as_str().to_string());
        for value in &order_by.values {
            if value.op != UnitOp::None {
                return Err(Unsupported::UnitOperation.into());
            }
            if !value.left.aggregate.is_none() {
                return Err(Unsupported::AggregateOrder.into());
            }
            let column = schemas.table_column(value.left.column_id)?;
            let table = column.table_index.ok_or_else(|| {
                Error::SchemaMismatch(format!("column '{}' has no table", column.name))
            })?;
            ordering.keys.push(TableLeaf {
                table,
                argument: schemas.column_argument(column, direction.clone())?,
            });
        }
    }

    if let Some(limit) = limit {
        let limit = i64::try_from(limit)
            .map_err(|_| Error::decode("sql.limit", format!("limit {} out of range", limit)))?;
        ordering.limit = Some(Argument::named(
            schemas.config.limit_argument_name.clone(),
            ArgumentValue::Int(limit),
        ));
    }

    Ok(ordering)
}
