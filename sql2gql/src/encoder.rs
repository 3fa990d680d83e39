//! GraphQL text encoder
//!
//! Serializes a resolved [`QueryTree`] into query text. Fields keep their
//! input order, empty child selections are dropped, and the same tree always
//! encodes to the same bytes.

use graphql_query::ast::{ASTContext, Document, ParseNode};
use std::fmt::Write;

use crate::error::{Error, Result};
use crate::query::{Argument, ArgumentName, ArgumentValue, Field, NodeId, QueryTree};
use crate::sql::AggregateOp;

/// Encodes the whole tree as `query { ... }`
pub fn encode(tree: &QueryTree) -> Result<String> {
    let root = tree
        .root()
        .ok_or_else(|| Error::InvalidOutput("query tree has no root".to_string()))?;
    let mut out = String::with_capacity(128);
    out.push_str("query { ");
    encode_node(tree, root, &mut out);
    out.push_str(" }");
    Ok(out)
}

/// Checks that the text parses as a GraphQL query document
pub fn validate(text: &str) -> Result<()> {
    let ctx = ASTContext::new();
    let document = Document::parse(&ctx, text).map_err(|e| Error::InvalidOutput(e.to_string()))?;
    document
        .operation(None)
        .map_err(|e| Error::InvalidOutput(e.to_string()))?;
    Ok(())
}

/// Whether a node renders no selection at all
fn is_empty(tree: &QueryTree, id: NodeId) -> bool {
    let node = tree.node(id);
    node.fields.is_empty() && node.children.iter().all(|child| is_empty(tree, *child))
}

fn encode_node(tree: &QueryTree, id: NodeId, out: &mut String) {
    let node = tree.node(id);
    out.push_str(&node.name);

    if !node.arguments.is_empty() {
        out.push('(');
        encode_list(&node.arguments, out);
        out.push(')');
    }

    let mut items: Vec<String> = node.fields.iter().map(encode_field).collect();
    for child in &node.children {
        if is_empty(tree, *child) {
            continue;
        }
        let mut text = String::new();
        encode_node(tree, *child, &mut text);
        items.push(text);
    }

    out.push_str(" { ");
    out.push_str(&items.join(" "));
    out.push_str(" }");
}

fn encode_field(field: &Field) -> String {
    match field {
        Field::Scalar(name) => name.clone(),
        Field::Aggregate {
            op: AggregateOp::Count,
            columns,
            distinct,
        } => match columns.as_slice() {
            [] => "count".to_string(),
            [column] => format!("count(columns: {}, distinct: {})", column, distinct),
            columns => format!("count(columns: [{}], distinct: {})", columns.join(", "), distinct),
        },
        Field::Aggregate { op, columns, .. } => {
            format!("{} {{ {} }}", op.name(), columns.join(" "))
        }
    }
}

/// Arguments separated by `, `
fn encode_list(arguments: &[Argument], out: &mut String) {
    for (i, argument) in arguments.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        encode_argument(argument, out);
    }
}

fn encode_argument(argument: &Argument, out: &mut String) {
    if argument.negated {
        out.push_str("_not: { ");
        encode_plain_argument(argument, out);
        out.push_str(" }");
    } else {
        encode_plain_argument(argument, out);
    }
}

fn encode_plain_argument(argument: &Argument, out: &mut String) {
    let key = match &argument.name {
        ArgumentName::And => {
            // members join the enclosing object
            match &argument.value {
                ArgumentValue::Object(members) => encode_list(members, out),
                value => encode_value(value, out),
            }
            return;
        }
        ArgumentName::Or => return encode_object_list("_or", &argument.value, out),
        ArgumentName::All => return encode_object_list("_and", &argument.value, out),
        ArgumentName::Column { name, .. } => name.as_str(),
        ArgumentName::Name(name) => name.as_str(),
        ArgumentName::Operator(operator) => operator,
        ArgumentName::Relation(relation) => relation.as_str(),
    };
    out.push_str(key);
    out.push_str(": ");
    encode_value(&argument.value, out);
}

/// `key: [ { m1 }, { m2 } ]`, one object per member
fn encode_object_list(key: &str, value: &ArgumentValue, out: &mut String) {
    out.push_str(key);
    out.push_str(": [");
    if let ArgumentValue::Object(members) = value {
        for (i, member) in members.iter().enumerate() {
            out.push_str(if i > 0 { ", { " } else { " { " });
            encode_argument(member, out);
            out.push_str(" }");
        }
    }
    out.push_str(" ]");
}

fn encode_value(value: &ArgumentValue, out: &mut String) {
    match value {
        ArgumentValue::Str(text) => encode_string(text, out),
        ArgumentValue::Int(int) => {
            let _ = write!(out, "{}", int);
        }
        ArgumentValue::Double(double) => {
            let _ = write!(out, "{}", double);
        }
        ArgumentValue::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        ArgumentValue::Enum(token) => out.push_str(token),
        ArgumentValue::List(values) => {
            out.push('[');
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                encode_value(value, out);
            }
            out.push(']');
        }
        ArgumentValue::Object(members) if members.is_empty() => out.push_str("{}"),
        ArgumentValue::Object(members) => {
            out.push_str("{ ");
            encode_list(members, out);
            out.push_str(" }");
        }
    }
}

fn encode_string(text: &str, out: &mut String) {
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
}
