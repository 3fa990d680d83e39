//! SQL AST types and decoder
//!
//! The Spider dataset encodes each query as positional JSON: the same array
//! shape means a column unit in one place and a value unit in another. This
//! module decodes that encoding into one closed type per grammar position.
//! At positions admitting several shapes the decoder tries them in a fixed
//! order (boolean, list, scalar, null) and takes the first that fits.
//!
//! Every decode error carries the JSON path of the offending value, for
//! example `sql.where[2][3]`.

use serde_json::Value;

use crate::error::{Error, Result};

/// Aggregate function applied to a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    None,
    Max,
    Min,
    Count,
    Sum,
    Avg,
}

impl AggregateOp {
    fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(AggregateOp::None),
            1 => Some(AggregateOp::Max),
            2 => Some(AggregateOp::Min),
            3 => Some(AggregateOp::Count),
            4 => Some(AggregateOp::Sum),
            5 => Some(AggregateOp::Avg),
            _ => None,
        }
    }

    /// Lowercase function name, as used by the GraphQL aggregate fields
    pub fn name(self) -> &'static str {
        match self {
            AggregateOp::None => "none",
            AggregateOp::Max => "max",
            AggregateOp::Min => "min",
            AggregateOp::Count => "count",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
        }
    }

    pub fn is_none(self) -> bool {
        self == AggregateOp::None
    }
}

/// Arithmetic between the two columns of a value unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitOp {
    None,
    Minus,
    Plus,
    Times,
    Divide,
}

impl UnitOp {
    fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(UnitOp::None),
            1 => Some(UnitOp::Minus),
            2 => Some(UnitOp::Plus),
            3 => Some(UnitOp::Times),
            4 => Some(UnitOp::Divide),
            _ => None,
        }
    }
}

/// Comparison operator of a condition unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WhereOp {
    Not,
    Between,
    Eq,
    Gt,
    Lt,
    Ge,
    Le,
    Ne,
    In,
    Like,
    Is,
    Exists,
}

impl WhereOp {
    fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(WhereOp::Not),
            1 => Some(WhereOp::Between),
            2 => Some(WhereOp::Eq),
            3 => Some(WhereOp::Gt),
            4 => Some(WhereOp::Lt),
            5 => Some(WhereOp::Ge),
            6 => Some(WhereOp::Le),
            7 => Some(WhereOp::Ne),
            8 => Some(WhereOp::In),
            9 => Some(WhereOp::Like),
            10 => Some(WhereOp::Is),
            11 => Some(WhereOp::Exists),
            _ => None,
        }
    }

    /// SQL spelling of the operator
    pub fn sql(self) -> &'static str {
        match self {
            WhereOp::Not => "not",
            WhereOp::Between => "between",
            WhereOp::Eq => "=",
            WhereOp::Gt => ">",
            WhereOp::Lt => "<",
            WhereOp::Ge => ">=",
            WhereOp::Le => "<=",
            WhereOp::Ne => "!=",
            WhereOp::In => "in",
            WhereOp::Like => "like",
            WhereOp::Is => "is",
            WhereOp::Exists => "exists",
        }
    }
}

/// Connective between two condition units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connective {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderDirection::Asc => "asc",
            OrderDirection::Desc => "desc",
        }
    }
}

/// Set operation combining two queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOperator {
    Intersect,
    Union,
    Except,
}

/// `[aggregate, column id, distinct]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnUnit {
    pub aggregate: AggregateOp,
    pub column_id: usize,
    pub distinct: bool,
}

/// `[unit op, column unit, column unit or null]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueUnit {
    pub op: UnitOp,
    pub left: ColumnUnit,
    pub right: Option<ColumnUnit>,
}

/// Right-hand side of a condition unit
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Int(i64),
    Double(f64),
    Str(String),
    Sql(Box<SqlQuery>),
    Column(ColumnUnit),
    Null,
}

/// `[not, operator, value unit, value, value or null]`
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionUnit {
    pub negated: bool,
    pub op: WhereOp,
    pub value: ValueUnit,
    pub first: FilterValue,
    pub second: Option<FilterValue>,
}

/// Condition units joined by connectives
///
/// Holds `n` units and `n - 1` connectives, or nothing at all.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Conditions {
    units: Vec<ConditionUnit>,
    connectives: Vec<Connective>,
}

impl Conditions {
    /// Builds a sequence, checking the alternation invariant
    pub fn new(units: Vec<ConditionUnit>, connectives: Vec<Connective>) -> Result<Self> {
        let expected = units.len().saturating_sub(1);
        if connectives.len() != expected {
            return Err(Error::decode(
                "conditions",
                format!(
                    "{} condition units need {} connectives, found {}",
                    units.len(),
                    expected,
                    connectives.len()
                ),
            ));
        }
        Ok(Conditions { units, connectives })
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn units(&self) -> &[ConditionUnit] {
        &self.units
    }

    /// Units paired with the connective that precedes them
    pub fn iter(&self) -> impl Iterator<Item = (Option<Connective>, &ConditionUnit)> {
        let preceding = std::iter::once(None).chain(self.connectives.iter().copied().map(Some));
        preceding.zip(self.units.iter())
    }
}

/// Entry of the FROM clause
#[derive(Debug, Clone, PartialEq)]
pub enum TableUnit {
    Table(usize),
    Sql(Box<SqlQuery>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FromClause {
    pub table_units: Vec<TableUnit>,
    pub conds: Conditions,
}

/// `[aggregate, value unit]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SelectItem {
    pub aggregate: AggregateOp,
    pub value: ValueUnit,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectClause {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub direction: OrderDirection,
    pub values: Vec<ValueUnit>,
}

/// A decoded Spider query
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlQuery {
    pub select: SelectClause,
    pub from: FromClause,
    pub filter: Conditions,
    pub group_by: Vec<ColumnUnit>,
    pub having: Conditions,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
    pub set_operation: Option<(SetOperator, Box<SqlQuery>)>,
}

impl SqlQuery {
    /// Decodes the `sql` member of a dataset example
    pub fn decode(value: &Value) -> Result<Self> {
        decode_sql(value, "sql")
    }
}

fn at(path: &str, index: usize) -> String {
    format!("{}[{}]", path, index)
}

fn member(path: &str, key: &str) -> String {
    format!("{}.{}", path, key)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn array<'a>(value: &'a Value, path: &str) -> Result<&'a [Value]> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| Error::decode(path, format!("expected a list, found {}", kind_of(value))))
}

/// A list of `min..=max` elements
fn tuple<'a>(value: &'a Value, path: &str, min: usize, max: usize) -> Result<&'a [Value]> {
    let items = array(value, path)?;
    if items.len() < min || items.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{} to {}", min, max)
        };
        return Err(Error::decode(
            path,
            format!("expected {} elements, found {}", expected, items.len()),
        ));
    }
    Ok(items)
}

fn boolean(value: &Value, path: &str) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| Error::decode(path, format!("expected a boolean, found {}", kind_of(value))))
}

fn code(value: &Value, path: &str) -> Result<u64> {
    if let Some(code) = value.as_u64() {
        return Ok(code);
    }
    match value.as_f64() {
        Some(number) if number >= 0.0 && number.fract() == 0.0 => Ok(number as u64),
        _ => Err(Error::decode(
            path,
            format!("expected a non-negative integer, found {}", value),
        )),
    }
}

fn text<'a>(value: &'a Value, path: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| Error::decode(path, format!("expected a string, found {}", kind_of(value))))
}

/// A member that may be missing, read as null
fn optional<'a>(object: &'a serde_json::Map<String, Value>, key: &str) -> &'a Value {
    object.get(key).unwrap_or(&Value::Null)
}

fn required<'a>(
    object: &'a serde_json::Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a Value> {
    object
        .get(key)
        .ok_or_else(|| Error::decode(path, format!("missing member '{}'", key)))
}

fn decode_sql(value: &Value, path: &str) -> Result<SqlQuery> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::decode(path, format!("expected an object, found {}", kind_of(value))))?;

    let select = decode_select(required(object, "select", path)?, &member(path, "select"))?;
    let from = decode_from(required(object, "from", path)?, &member(path, "from"))?;
    let filter = decode_conditions(required(object, "where", path)?, &member(path, "where"))?;

    let group_by = match optional(object, "groupBy") {
        Value::Null => Vec::new(),
        value => {
            let path = member(path, "groupBy");
            array(value, &path)?
                .iter()
                .enumerate()
                .map(|(i, unit)| decode_column_unit(unit, &at(&path, i)))
                .collect::<Result<_>>()?
        }
    };

    let having = decode_conditions(optional(object, "having"), &member(path, "having"))?;
    let order_by = decode_order_by(optional(object, "orderBy"), &member(path, "orderBy"))?;

    let limit = match optional(object, "limit") {
        Value::Null => None,
        value => Some(code(value, &member(path, "limit"))?),
    };

    let mut set_operation = None;
    for (key, operator) in [
        ("intersect", SetOperator::Intersect),
        ("union", SetOperator::Union),
        ("except", SetOperator::Except),
    ] {
        let value = optional(object, key);
        if value.is_null() {
            continue;
        }
        if let Some((existing, _)) = &set_operation {
            return Err(Error::decode(
                path,
                format!("both {} and {} are set", existing, operator),
            ));
        }
        let nested = decode_sql(value, &member(path, key))?;
        set_operation = Some((operator, Box::new(nested)));
    }

    Ok(SqlQuery {
        select,
        from,
        filter,
        group_by,
        having,
        order_by,
        limit,
        set_operation,
    })
}

fn decode_select(value: &Value, path: &str) -> Result<SelectClause> {
    let parts = tuple(value, path, 2, 2)?;
    let distinct = boolean(&parts[0], &at(path, 0))?;
    let items_path = at(path, 1);
    let items = array(&parts[1], &items_path)?
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let item_path = at(&items_path, i);
            let pair = tuple(item, &item_path, 2, 2)?;
            Ok(SelectItem {
                aggregate: decode_aggregate(&pair[0], &at(&item_path, 0))?,
                value: decode_value_unit(&pair[1], &at(&item_path, 1))?,
            })
        })
        .collect::<Result<_>>()?;
    Ok(SelectClause { distinct, items })
}

fn decode_from(value: &Value, path: &str) -> Result<FromClause> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::decode(path, format!("expected an object, found {}", kind_of(value))))?;

    let units_path = member(path, "table_units");
    let table_units = array(required(object, "table_units", path)?, &units_path)?
        .iter()
        .enumerate()
        .map(|(i, unit)| decode_table_unit(unit, &at(&units_path, i)))
        .collect::<Result<_>>()?;

    let conds = decode_conditions(optional(object, "conds"), &member(path, "conds"))?;
    Ok(FromClause { table_units, conds })
}

fn decode_table_unit(value: &Value, path: &str) -> Result<TableUnit> {
    let parts = tuple(value, path, 2, 2)?;
    match text(&parts[0], &at(path, 0))? {
        "table_unit" => {
            let index = code(&parts[1], &at(path, 1))?;
            Ok(TableUnit::Table(index as usize))
        }
        "sql" => Ok(TableUnit::Sql(Box::new(decode_sql(&parts[1], &at(path, 1))?))),
        other => Err(Error::decode(
            &at(path, 0),
            format!("unknown table unit kind '{}'", other),
        )),
    }
}

fn decode_conditions(value: &Value, path: &str) -> Result<Conditions> {
    if value.is_null() {
        return Ok(Conditions::default());
    }
    let items = array(value, path)?;
    if !items.is_empty() && items.len() % 2 == 0 {
        return Err(Error::decode(
            path,
            format!("expected an odd number of elements, found {}", items.len()),
        ));
    }

    let mut units = Vec::with_capacity(items.len() / 2 + 1);
    let mut connectives = Vec::with_capacity(items.len() / 2);
    for (i, item) in items.iter().enumerate() {
        let item_path = at(path, i);
        if i % 2 == 0 {
            units.push(decode_condition_unit(item, &item_path)?);
        } else {
            let connective = match text(item, &item_path)? {
                "and" => Connective::And,
                "or" => Connective::Or,
                other => {
                    return Err(Error::decode(
                        &item_path,
                        format!("unknown connective '{}'", other),
                    ))
                }
            };
            connectives.push(connective);
        }
    }
    Conditions::new(units, connectives)
}

fn decode_condition_unit(value: &Value, path: &str) -> Result<ConditionUnit> {
    let parts = tuple(value, path, 5, 5)?;
    let negated = boolean(&parts[0], &at(path, 0))?;
    let op_code = code(&parts[1], &at(path, 1))?;
    let op = WhereOp::from_code(op_code).ok_or_else(|| {
        Error::decode(&at(path, 1), format!("unknown operator code {}", op_code))
    })?;
    let value_unit = decode_value_unit(&parts[2], &at(path, 2))?;
    let first = decode_filter_value(&parts[3], &at(path, 3))?;
    let second = match decode_filter_value(&parts[4], &at(path, 4))? {
        FilterValue::Null => None,
        value => Some(value),
    };
    Ok(ConditionUnit {
        negated,
        op,
        value: value_unit,
        first,
        second,
    })
}

fn decode_filter_value(value: &Value, path: &str) -> Result<FilterValue> {
    match value {
        Value::Array(_) => Ok(FilterValue::Column(decode_column_unit(value, path)?)),
        Value::Object(_) => Ok(FilterValue::Sql(Box::new(decode_sql(value, path)?))),
        Value::Number(number) => match number.as_i64() {
            Some(int) => Ok(FilterValue::Int(int)),
            None => number
                .as_f64()
                .map(FilterValue::Double)
                .ok_or_else(|| Error::decode(path, format!("unrepresentable number {}", number))),
        },
        Value::String(raw) => Ok(FilterValue::Str(unquote(raw).to_string())),
        Value::Null => Ok(FilterValue::Null),
        Value::Bool(_) => Err(Error::decode(
            path,
            "expected a column unit, a query, a number or a string, found boolean",
        )),
    }
}

/// Strips one layer of surrounding quotes from a dataset literal
pub fn unquote(raw: &str) -> &str {
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

fn decode_value_unit(value: &Value, path: &str) -> Result<ValueUnit> {
    let parts = tuple(value, path, 2, 3)?;
    let op_code = code(&parts[0], &at(path, 0))?;
    let op = UnitOp::from_code(op_code).ok_or_else(|| {
        Error::decode(&at(path, 0), format!("unknown unit operator code {}", op_code))
    })?;
    let left = decode_column_unit(&parts[1], &at(path, 1))?;
    let right = match parts.get(2) {
        None | Some(Value::Null) => None,
        Some(unit) => Some(decode_column_unit(unit, &at(path, 2))?),
    };
    Ok(ValueUnit { op, left, right })
}

fn decode_column_unit(value: &Value, path: &str) -> Result<ColumnUnit> {
    let parts = tuple(value, path, 3, 3)?;
    let aggregate = decode_aggregate(&parts[0], &at(path, 0))?;
    let column_id = code(&parts[1], &at(path, 1))? as usize;
    let distinct = boolean(&parts[2], &at(path, 2))?;
    Ok(ColumnUnit {
        aggregate,
        column_id,
        distinct,
    })
}

fn decode_aggregate(value: &Value, path: &str) -> Result<AggregateOp> {
    let code = code(value, path)?;
    AggregateOp::from_code(code)
        .ok_or_else(|| Error::decode(path, format!("unknown aggregate code {}", code)))
}

fn decode_order_by(value: &Value, path: &str) -> Result<Option<OrderBy>> {
    if value.is_null() {
        return Ok(None);
    }
    let parts = array(value, path)?;
    if parts.is_empty() {
        return Ok(None);
    }
    let parts = tuple(value, path, 2, 2)?;
    let direction = match text(&parts[0], &at(path, 0))? {
        "asc" => OrderDirection::Asc,
        "desc" => OrderDirection::Desc,
        other => {
            return Err(Error::decode(
                &at(path, 0),
                format!("unknown order direction '{}'", other),
            ))
        }
    };
    let values_path = at(path, 1);
    let values = array(&parts[1], &values_path)?
        .iter()
        .enumerate()
        .map(|(i, unit)| decode_value_unit(unit, &at(&values_path, i)))
        .collect::<Result<_>>()?;
    Ok(Some(OrderBy { direction, values }))
}
