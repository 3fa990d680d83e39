//! Relational schema model
//!
//! Decodes one entry of the Spider `tables.json` file into lookup structures:
//! column id to column, table index to table. Column ids
//! are positions in the flat column list; id 0 is the `*` wildcard.

use serde::Deserialize;

use crate::error::{Error, Result};

/// Id of the wildcard column used by `COUNT(*)`
pub const WILDCARD_COLUMN: usize = 0;

/// Type tag of a relational column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    Number,
    Others,
    Text,
    Time,
}

/// A column of the relational schema
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationalColumn {
    /// Position in the flat column list
    pub id: usize,
    /// Original column name
    pub name: String,
    /// Owning table, `None` for the wildcard
    pub table_index: Option<usize>,
    /// Owning table name, `*` for the wildcard
    pub table_name: String,
    pub column_type: ColumnType,
}

impl RelationalColumn {
    pub fn is_wildcard(&self) -> bool {
        self.table_index.is_none()
    }
}

/// A table with the ids of its columns, in id order
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationalTable {
    pub index: usize,
    pub name: String,
    pub columns: Vec<usize>,
}

/// Shape of one `tables.json` entry
#[derive(Debug, Deserialize)]
struct DatabaseDocument {
    db_id: String,
    column_names_original: Vec<(i64, String)>,
    #[serde(default)]
    column_types: Vec<ColumnType>,
    #[serde(default)]
    foreign_keys: Vec<(usize, usize)>,
    #[serde(default)]
    primary_keys: Vec<usize>,
    table_names_original: Vec<String>,
}

/// Relational schema of one database
#[derive(Debug, Clone)]
pub struct RelationalSchema {
    db_id: String,
    columns: Vec<RelationalColumn>,
    tables: Vec<RelationalTable>,
    foreign_keys: Vec<(usize, usize)>,
    primary_keys: Vec<usize>,
}

impl RelationalSchema {
    /// Decodes a single `tables.json` entry
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let document: DatabaseDocument = serde_json::from_value(value)?;
        Self::from_document(document)
    }

    /// Decodes the whole `tables.json` list
    pub fn load_all(text: &str) -> Result<Vec<Self>> {
        let documents: Vec<DatabaseDocument> = serde_json::from_str(text)?;
        documents.into_iter().map(Self::from_document).collect()
    }

    fn from_document(document: DatabaseDocument) -> Result<Self> {
        let mut tables: Vec<RelationalTable> = document
            .table_names_original
            .iter()
            .enumerate()
            .map(|(index, name)| RelationalTable {
                index,
                name: name.clone(),
                columns: Vec::new(),
            })
            .collect();

        let mut columns = Vec::with_capacity(document.column_names_original.len());
        for (id, (table_index, name)) in document.column_names_original.into_iter().enumerate() {
            let column_type = document
                .column_types
                .get(id)
                .copied()
                .unwrap_or(ColumnType::Others);

            let (table_index, table_name) = if table_index < 0 {
                (None, "*".to_string())
            } else {
                let index = table_index as usize;
                let table = tables.get_mut(index).ok_or_else(|| {
                    Error::SchemaMismatch(format!(
                        "column '{}' of database '{}' refers to missing table {}",
                        name, document.db_id, index
                    ))
                })?;
                table.columns.push(id);
                (Some(index), table.name.clone())
            };

            columns.push(RelationalColumn {
                id,
                name,
                table_index,
                table_name,
                column_type,
            });
        }

        Ok(RelationalSchema {
            db_id: document.db_id,
            columns,
            tables,
            foreign_keys: document.foreign_keys,
            primary_keys: document.primary_keys,
        })
    }

    pub fn db_id(&self) -> &str {
        &self.db_id
    }

    pub fn tables(&self) -> &[RelationalTable] {
        &self.tables
    }

    pub fn columns(&self) -> &[RelationalColumn] {
        &self.columns
    }

    /// Column by id
    #[inline]
    pub fn column(&self, id: usize) -> Result<&RelationalColumn> {
        self.columns.get(id).ok_or_else(|| {
            Error::SchemaMismatch(format!(
                "column id {} not found in database '{}'",
                id, self.db_id
            ))
        })
    }

    /// Table by index
    #[inline]
    pub fn table(&self, index: usize) -> Result<&RelationalTable> {
        self.tables.get(index).ok_or_else(|| {
            Error::SchemaMismatch(format!(
                "table index {} not found in database '{}'",
                index, self.db_id
            ))
        })
    }

    /// Columns of a table in id order
    pub fn table_columns(&self, index: usize) -> Result<Vec<&RelationalColumn>> {
        self.table(index)?
            .columns
            .iter()
            .map(|id| self.column(*id))
            .collect()
    }

    pub fn is_primary_key(&self, column_id: usize) -> bool {
        self.primary_keys.contains(&column_id)
    }

    /// Whether two columns form a declared foreign key pair, in either direction
    pub fn is_foreign_key_join(&self, left: usize, right: usize) -> bool {
        self.foreign_keys
            .iter()
            .any(|&(a, b)| (a == left && b == right) || (a == right && b == left))
    }

    /// Whether an equality between two columns joins rows by key.
    ///
    /// Spider leaves many foreign keys undeclared, so besides declared pairs
    /// this accepts equally named columns when one of them is a primary key,
    /// and columns that both look like ids.
    ///
    /// # Arguments
    ///
    /// * `left` - Column id on one side of the equality
    /// * `right` - Column id on the other side
    ///
    /// # Returns
    ///
    /// * `Ok(true)` if the join follows a key
    /// * `Err(Error::SchemaMismatch)` if a column id is unknown
    pub fn is_key_join(&self, left: usize, right: usize) -> Result<bool> {
        if self.is_foreign_key_join(left, right) {
            return Ok(true);
        }
        let left_name = self.column(left)?.name.to_lowercase();
        let right_name = self.column(right)?.name.to_lowercase();
        if left_name == right_name
            && (self.is_primary_key(left) || self.is_primary_key(right))
        {
            return Ok(true);
        }
        Ok(left_name.contains("id") && right_name.contains("id"))
    }
}
