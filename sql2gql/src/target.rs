//! Target schema model
//!
//! Decodes a GraphQL introspection document into a type graph. Type names are
//! interned case-insensitively with lasso: the graph is built once per database
//! and then frozen into a `RodeoReader`, so the same graph can be read from
//! every worker thread.

use lasso::{Rodeo, RodeoReader, Spur};
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Kind of a GraphQL type or type reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
    List,
    NonNull,
}

/// A possibly wrapped reference to a named type
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TypeRef {
    pub kind: TypeKind,
    pub name: Option<String>,
    #[serde(rename = "ofType", default)]
    pub of_type: Option<Box<TypeRef>>,
}

impl TypeRef {
    /// The innermost named type, skipping LIST and NON_NULL wrappers
    pub fn leaf(&self) -> &TypeRef {
        let mut current = self;
        while let (TypeKind::List | TypeKind::NonNull, Some(inner)) =
            (current.kind, current.of_type.as_deref())
        {
            current = inner;
        }
        current
    }

    /// Name of the innermost named type
    pub fn named(&self) -> Option<&str> {
        self.leaf().name.as_deref()
    }
}

/// A field of an object type
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TargetField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(rename = "isDeprecated", default)]
    pub is_deprecated: bool,
}

impl TargetField {
    /// Scalar type name if the field holds a scalar
    pub fn scalar_name(&self) -> Option<&str> {
        let leaf = self.ty.leaf();
        match leaf.kind {
            TypeKind::Scalar => leaf.name.as_deref(),
            _ => None,
        }
    }
}

/// A named type of the target schema
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TargetType {
    pub kind: TypeKind,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub fields: Vec<TargetField>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<TargetField>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let fields: Option<Vec<TargetField>> = Option::deserialize(deserializer)?;
    Ok(fields.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    types: Vec<TargetType>,
}

#[derive(Debug, Deserialize)]
struct SchemaEnvelope {
    #[serde(rename = "__schema")]
    schema: SchemaDocument,
}

/// Introspection result, with or without the `data` envelope
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IntrospectionDocument {
    Wrapped { data: SchemaEnvelope },
    Bare(SchemaEnvelope),
}

/// Type graph of a target GraphQL schema
#[derive(Debug)]
pub struct TargetTypeGraph {
    names: RodeoReader,
    types: HashMap<Spur, TargetType>,
}

impl TargetTypeGraph {
    /// Decodes an introspection document
    pub fn from_json(text: &str) -> Result<Self> {
        let document: IntrospectionDocument = serde_json::from_str(text)?;
        Ok(Self::from_types(match document {
            IntrospectionDocument::Wrapped { data } => data.schema.types,
            IntrospectionDocument::Bare(envelope) => envelope.schema.types,
        }))
    }

    /// Builds the graph from already decoded types
    pub fn from_types(types: Vec<TargetType>) -> Self {
        let mut interner = Rodeo::new();
        let mut by_name = HashMap::with_capacity(types.len());
        for target_type in types {
            let key = interner.get_or_intern(target_type.name.to_lowercase());
            by_name.insert(key, target_type);
        }
        TargetTypeGraph {
            names: interner.into_reader(),
            types: by_name,
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Type by case-insensitive name
    #[inline]
    pub fn type_named(&self, name: &str) -> Option<&TargetType> {
        self.names
            .get(name.to_lowercase())
            .and_then(|key| self.types.get(&key))
    }

    /// The field of the table's type matching a column name, case-insensitively
    pub fn field_for(&self, table: &str, column: &str) -> Result<&TargetField> {
        let target_type = self.type_named(table).ok_or_else(|| {
            Error::SchemaMismatch(format!("no type for table '{}'", table))
        })?;
        target_type
            .fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(column))
            .ok_or_else(|| {
                Error::SchemaMismatch(format!(
                    "type '{}' has no field for column '{}'",
                    target_type.name, column
                ))
            })
    }

    /// Whether a field resolves to the object type of `table_name`
    pub fn resolves_to(&self, field: &TargetField, table_name: &str) -> bool {
        let leaf = field.ty.leaf();
        if leaf.kind != TypeKind::Object {
            return false;
        }
        match leaf.name.as_deref() {
            Some(name) => {
                name.eq_ignore_ascii_case(table_name)
                    && self
                        .type_named(name)
                        .is_some_and(|t| t.kind == TypeKind::Object)
            }
            None => false,
        }
    }

    /// Relation fields of `parent_type` leading to `child_table`
    ///
    /// With an aggregate suffix, the fields leading to the child's aggregate
    /// type are returned instead.
    pub fn relation_fields(
        &self,
        parent_type: &str,
        child_table: &str,
        aggregate_suffix: Option<&str>,
    ) -> Vec<&TargetField> {
        let target_name = match aggregate_suffix {
            Some(suffix) => format!("{}{}", child_table, suffix),
            None => child_table.to_string(),
        };
        match self.type_named(parent_type) {
            Some(parent) => parent
                .fields
                .iter()
                .filter(|field| !field.is_deprecated && self.resolves_to(field, &target_name))
                .collect(),
            None => Vec::new(),
        }
    }

    /// First relation field of `parent_type` leading to `child_table`
    pub fn relation_field(
        &self,
        parent_type: &str,
        child_table: &str,
        aggregate_suffix: Option<&str>,
    ) -> Option<&TargetField> {
        self.relation_fields(parent_type, child_table, aggregate_suffix)
            .into_iter()
            .next()
    }
}
