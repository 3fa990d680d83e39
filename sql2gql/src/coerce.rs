//! Argument type coercion
//!
//! Dataset literals carry whatever type the SQL parser guessed: `2000.0` for
//! a year, `94107` for a text zip code. Each column predicate is rewritten so
//! its literals match the scalar family of the field it compares against,
//! and each column argument is renamed to the field's schema name.
//!
//! Coercing an already coerced tree changes nothing.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::query::{Argument, ArgumentName, ArgumentValue, QueryTree};
use crate::target::TargetTypeGraph;

/// Representation family of a scalar type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarFamily {
    String,
    Int,
    Float,
    Boolean,
}

impl ScalarFamily {
    fn is_numeric(self) -> bool {
        matches!(self, ScalarFamily::Int | ScalarFamily::Float)
    }
}

/// Scalar names by lowercase name: GraphQL built-ins and Postgres types
static SCALAR_FAMILIES: Lazy<HashMap<&'static str, ScalarFamily>> = Lazy::new(|| {
    let mut families = HashMap::new();
    for name in [
        "string",
        "id",
        "bpchar",
        "char",
        "character",
        "character varying",
        "varchar",
        "text",
        "citext",
        "name",
        "uuid",
        "date",
        "time",
        "timetz",
        "timestamp",
        "timestamptz",
        "interval",
    ] {
        families.insert(name, ScalarFamily::String);
    }
    for name in ["int", "integer", "smallint", "bigint", "int2", "int4", "int8"] {
        families.insert(name, ScalarFamily::Int);
    }
    for name in [
        "float",
        "float4",
        "float8",
        "real",
        "double precision",
        "numeric",
        "decimal",
    ] {
        families.insert(name, ScalarFamily::Float);
    }
    for name in ["boolean", "bool"] {
        families.insert(name, ScalarFamily::Boolean);
    }
    families
});

/// Family of a scalar type name
pub fn scalar_family(type_name: &str) -> Option<ScalarFamily> {
    SCALAR_FAMILIES.get(type_name.to_lowercase().as_str()).copied()
}

/// Coerces every argument of every node in the tree
pub fn coerce_tree(tree: &mut QueryTree, target: &TargetTypeGraph) -> Result<()> {
    for id in tree.walk() {
        for argument in &mut tree.node_mut(id).arguments {
            coerce_argument(argument, target)?;
        }
    }
    Ok(())
}

/// Coerces one argument and everything nested in it
pub fn coerce_argument(argument: &mut Argument, target: &TargetTypeGraph) -> Result<()> {
    match &mut argument.name {
        ArgumentName::Column { table, name } => {
            let field = target.field_for(table, name)?;
            let scalar = field.scalar_name().ok_or_else(|| Error::UnknownScalar {
                field: field.name.clone(),
                type_name: field.ty.named().unwrap_or_default().to_string(),
            })?;
            let family = scalar_family(scalar).ok_or_else(|| Error::UnknownScalar {
                field: field.name.clone(),
                type_name: scalar.to_string(),
            })?;
            *name = field.name.clone();
            if let ArgumentValue::Object(predicates) = &mut argument.value {
                for predicate in predicates {
                    coerce_predicate(predicate, family);
                }
            }
            Ok(())
        }
        _ => match &mut argument.value {
            ArgumentValue::Object(members) => members
                .iter_mut()
                .try_for_each(|member| coerce_argument(member, target)),
            _ => Ok(()),
        },
    }
}

fn is_null_literal(value: &ArgumentValue) -> bool {
    match value {
        ArgumentValue::Str(text) => {
            let text = text.trim();
            text.is_empty() || text.eq_ignore_ascii_case("null")
        }
        _ => false,
    }
}

/// Coerces the literal of a comparison such as `_eq: "2000"`
fn coerce_predicate(predicate: &mut Argument, family: ScalarFamily) {
    let ArgumentName::Operator(operator) = predicate.name else {
        return;
    };
    if operator == "_is_null" {
        return;
    }
    if family.is_numeric() && is_null_literal(&predicate.value) {
        predicate.value = ArgumentValue::Bool(operator != "_neq");
        predicate.name = ArgumentName::Operator("_is_null");
        return;
    }
    let value = std::mem::replace(&mut predicate.value, ArgumentValue::Bool(false));
    predicate.value = coerce_value(value, family);
}

/// Converts a literal into the representation of a scalar family
pub fn coerce_value(value: ArgumentValue, family: ScalarFamily) -> ArgumentValue {
    match (family, value) {
        (_, ArgumentValue::List(values)) => ArgumentValue::List(
            values
                .into_iter()
                .map(|value| coerce_value(value, family))
                .collect(),
        ),

        (ScalarFamily::String, ArgumentValue::Int(int)) => ArgumentValue::Str(int.to_string()),
        (ScalarFamily::String, ArgumentValue::Double(double)) => {
            ArgumentValue::Str(number_text(double))
        }
        (ScalarFamily::String, ArgumentValue::Bool(flag)) => ArgumentValue::Str(flag.to_string()),

        (ScalarFamily::Int, ArgumentValue::Double(double)) if is_integral(double) => {
            ArgumentValue::Int(double as i64)
        }
        (ScalarFamily::Int, ArgumentValue::Str(text)) => match parse_number(&text) {
            Some(number) if is_integral(number) => ArgumentValue::Int(number as i64),
            Some(number) => ArgumentValue::Double(number),
            None => ArgumentValue::Str(text),
        },
        (ScalarFamily::Int, ArgumentValue::Bool(flag)) => ArgumentValue::Int(i64::from(flag)),

        (ScalarFamily::Float, ArgumentValue::Str(text)) => match parse_number(&text) {
            Some(number) => ArgumentValue::Double(number),
            None => ArgumentValue::Str(text),
        },
        (ScalarFamily::Float, ArgumentValue::Bool(flag)) => {
            ArgumentValue::Double(if flag { 1.0 } else { 0.0 })
        }

        (ScalarFamily::Boolean, ArgumentValue::Int(int)) if int == 0 || int == 1 => {
            ArgumentValue::Bool(int == 1)
        }
        (ScalarFamily::Boolean, ArgumentValue::Double(double)) if double == 0.0 || double == 1.0 => {
            ArgumentValue::Bool(double == 1.0)
        }
        (ScalarFamily::Boolean, ArgumentValue::Str(text)) => {
            match text.trim().to_lowercase().as_str() {
                "true" | "t" | "1" => ArgumentValue::Bool(true),
                "false" | "f" | "0" => ArgumentValue::Bool(false),
                _ => ArgumentValue::Str(text),
            }
        }

        (_, value) => value,
    }
}

fn is_integral(number: f64) -> bool {
    number.is_finite() && number.fract() == 0.0 && number.abs() < i64::MAX as f64
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|number| number.is_finite())
}

/// Decimal text of a number, without a trailing `.0` when integral
fn number_text(number: f64) -> String {
    if is_integral(number) {
        (number as i64).to_string()
    } else {
        number.to_string()
    }
}
