//! WHERE clause translation
//!
//! A condition sequence `c0 op1 c1 op2 c2 ...` is reduced left to right into
//! a [`ConditionTree`]. Runs of units joined by `and` collect into one group;
//! every `or` starts a new group. One group of one unit stays a leaf, one
//! larger group becomes an `And`, several groups become an `Or` of their
//! groups. This keeps `AND` binding tighter than `OR`:
//! `a or b and c` reduces to `Or[a, And[b, c]]`.

use crate::error::{CompileResult, Error, Unsupported};
use crate::query::{merge_conjuncts, Argument, ArgumentName, ArgumentValue};
use crate::sql::{ConditionUnit, Conditions, Connective, FilterValue, UnitOp, WhereOp};
use crate::translate::{Schemas, TableLeaf};

/// Reduced boolean structure over leaves of type `T`
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionTree<T> {
    Leaf(T),
    And(Vec<T>),
    /// Members are leaves or `And` groups
    Or(Vec<ConditionTree<T>>),
}

impl<T> ConditionTree<T> {
    /// Applies a fallible conversion to every leaf, in order
    pub fn try_map<U, E, F>(self, f: &mut F) -> Result<ConditionTree<U>, E>
    where
        F: FnMut(T) -> Result<U, E>,
    {
        Ok(match self {
            ConditionTree::Leaf(leaf) => ConditionTree::Leaf(f(leaf)?),
            ConditionTree::And(leaves) => {
                ConditionTree::And(leaves.into_iter().map(&mut *f).collect::<Result<_, _>>()?)
            }
            ConditionTree::Or(members) => ConditionTree::Or(
                members
                    .into_iter()
                    .map(|member| member.try_map(&mut *f))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    fn from_group(mut group: Vec<T>) -> Self {
        if group.len() == 1 {
            if let Some(leaf) = group.pop() {
                return ConditionTree::Leaf(leaf);
            }
        }
        ConditionTree::And(group)
    }
}

impl ConditionTree<Argument> {
    /// The argument rendering this tree
    pub fn into_argument(self) -> Argument {
        match self {
            ConditionTree::Leaf(argument) => argument,
            ConditionTree::And(arguments) => Argument::new(
                ArgumentName::And,
                ArgumentValue::Object(merge_conjuncts(arguments)),
            ),
            ConditionTree::Or(members) => Argument::new(
                ArgumentName::Or,
                ArgumentValue::Object(members.into_iter().map(Self::into_argument).collect()),
            ),
        }
    }
}

/// Left-to-right reducer of a condition sequence
#[derive(Debug)]
pub struct ConditionReducer<T> {
    groups: Vec<Vec<T>>,
}

impl<T> Default for ConditionReducer<T> {
    fn default() -> Self {
        ConditionReducer { groups: Vec::new() }
    }
}

impl<T> ConditionReducer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a leaf with the connective preceding it
    pub fn push(&mut self, connective: Option<Connective>, leaf: T) {
        match (connective, self.groups.last_mut()) {
            (Some(Connective::And), Some(group)) => group.push(leaf),
            _ => self.groups.push(vec![leaf]),
        }
    }

    pub fn finish(mut self) -> Option<ConditionTree<T>> {
        match self.groups.len() {
            0 => None,
            1 => self.groups.pop().map(ConditionTree::from_group),
            _ => Some(ConditionTree::Or(
                self.groups
                    .into_iter()
                    .map(ConditionTree::from_group)
                    .collect(),
            )),
        }
    }
}

/// Reduces a whole sequence at once
pub fn reduce<T>(items: impl IntoIterator<Item = (Option<Connective>, T)>) -> Option<ConditionTree<T>> {
    let mut reducer = ConditionReducer::new();
    for (connective, leaf) in items {
        reducer.push(connective, leaf);
    }
    reducer.finish()
}

/// Translates a WHERE clause into a tree of column predicates
///
/// # Arguments
///
/// * `conditions` - The WHERE clause, connectives interleaved with conditions
/// * `schemas` - Models resolving columns and their tables
///
/// # Returns
///
/// * `Ok(None)` - The clause is empty
/// * `Ok(Some(tree))` - Leaves bound to their tables, `and` grouped below `or`
/// * `Err(_)` - A condition has no GraphQL counterpart
pub fn translate_filter(
    conditions: &Conditions,
    schemas: &Schemas<'_>,
) -> CompileResult<Option<ConditionTree<TableLeaf>>> {
    let mut reducer = ConditionReducer::new();
    for (connective, unit) in conditions.iter() {
        reducer.push(connective, condition_leaf(unit, schemas)?);
    }
    Ok(reducer.finish())
}

/// Hasura comparison operator for a SQL operator
fn comparison(op: WhereOp) -> CompileResult<&'static str> {
    Ok(match op {
        WhereOp::Eq => "_eq",
        WhereOp::Gt => "_gt",
        WhereOp::Lt => "_lt",
        WhereOp::Ge => "_gte",
        WhereOp::Le => "_lte",
        WhereOp::Ne => "_neq",
        WhereOp::Like => "_like",
        WhereOp::In => "_in",
        WhereOp::Is => "_is_null",
        WhereOp::Between | WhereOp::Not | WhereOp::Exists => {
            return Err(Unsupported::Operation(op.sql().to_string()).into())
        }
    })
}

fn literal(value: &FilterValue) -> CompileResult<ArgumentValue> {
    match value {
        FilterValue::Int(int) => Ok(ArgumentValue::Int(*int)),
        FilterValue::Double(double) => Ok(ArgumentValue::Double(*double)),
        FilterValue::Str(text) => Ok(ArgumentValue::Str(text.clone())),
        FilterValue::Null => Ok(ArgumentValue::Str("null".to_string())),
        FilterValue::Sql(_) => Err(Unsupported::NestedQueryAsValue.into()),
        FilterValue::Column(_) => Err(Unsupported::ColumnAsFilterValue.into()),
    }
}

fn condition_leaf(unit: &ConditionUnit, schemas: &Schemas<'_>) -> CompileResult<TableLeaf> {
    if matches!(unit.op, WhereOp::Not | WhereOp::Exists) {
        return Err(Unsupported::Operation(unit.op.sql().to_string()).into());
    }
    if unit.value.op != UnitOp::None {
        return Err(Unsupported::UnitOperation.into());
    }
    if !unit.value.left.aggregate.is_none() {
        return Err(Unsupported::AggregateFilter.into());
    }
    let column = schemas.table_column(unit.value.left.column_id)?;

    let predicates = match unit.op {
        WhereOp::Between => {
            let upper = unit.second.as_ref().ok_or_else(|| {
                Error::decode("where", "between condition without an upper bound")
            })?;
            vec![
                Argument::new(ArgumentName::Operator("_gte"), literal(&unit.first)?),
                Argument::new(ArgumentName::Operator("_lte"), literal(upper)?),
            ]
        }
        WhereOp::In => {
            let value = ArgumentValue::List(vec![literal(&unit.first)?]);
            vec![Argument::new(ArgumentName::Operator("_in"), value)]
        }
        WhereOp::Is => {
            literal(&unit.first)?;
            vec![Argument::new(
                ArgumentName::Operator("_is_null"),
                ArgumentValue::Bool(true),
            )]
        }
        op => vec![Argument::new(
            ArgumentName::Operator(comparison(op)?),
            literal(&unit.first)?,
        )],
    };

    let mut argument = schemas.column_argument(column, ArgumentValue::Object(predicates))?;
    argument.negated = unit.negated;
    let table = column.table_index.ok_or_else(|| {
        Error::SchemaMismatch(format!("column '{}' has no table", column.name))
    })?;
    Ok(TableLeaf { table, argument })
}
