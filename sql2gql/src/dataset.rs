//! Spider dataset records and schema sources
//!
//! Loads the dataset files and `tables.json`, groups examples by database
//! and pairs each database with its target schema. Target schemas come from
//! a [`SchemaSource`]; acquiring them from a running service happens outside
//! this crate.

use anyhow::Context;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::relational::RelationalSchema;
use crate::sql::SqlQuery;
use crate::target::TargetTypeGraph;

/// One question/query pair of a Spider dataset file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatasetExample {
    pub db_id: String,
    pub query: String,
    #[serde(default)]
    pub query_toks: Vec<String>,
    #[serde(default)]
    pub query_toks_no_value: Vec<String>,
    pub question: String,
    #[serde(default)]
    pub question_toks: Vec<String>,
    /// Raw SQL AST, decoded per example so a bad AST only fails its database
    pub sql: serde_json::Value,
}

/// Output record: a question with its GraphQL query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLDatasetExample {
    pub schema_id: String,
    pub question: String,
    pub query: String,
}

/// Reads a dataset file
pub fn load_examples(path: &Path) -> anyhow::Result<Vec<DatasetExample>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("malformed dataset {}", path.display()))
}

/// Reads `tables.json`
pub fn load_tables(path: &Path) -> anyhow::Result<Vec<RelationalSchema>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read tables {}", path.display()))?;
    RelationalSchema::load_all(&text).with_context(|| format!("malformed tables {}", path.display()))
}

/// Writes output records as a pretty-printed JSON list
pub fn write_output(path: &Path, examples: &[GraphQLDatasetExample]) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(examples)?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

/// Dataset files directly under `root` whose name mentions `train` or `dev`
pub fn discover_datasets(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("failed to list {}", root.display()))? {
        let path = entry?.path();
        let is_json = path.extension().is_some_and(|extension| extension == "json");
        let is_dataset = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| stem.contains("train") || stem.contains("dev"));
        if path.is_file() && is_json && is_dataset {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Examples by database id, each with its position in the input
///
/// Groups iterate in sorted id order; examples keep their input order.
pub fn group_by_database(
    examples: Vec<DatasetExample>,
) -> BTreeMap<String, Vec<(usize, DatasetExample)>> {
    let mut groups: BTreeMap<String, Vec<(usize, DatasetExample)>> = BTreeMap::new();
    for (index, example) in examples.into_iter().enumerate() {
        groups
            .entry(example.db_id.clone())
            .or_default()
            .push((index, example));
    }
    groups
}

/// Source of target schemas by database id
pub trait SchemaSource: Send + Sync {
    fn schema_document(&self, db_id: &str) -> Result<TargetTypeGraph>;
}

/// Schemas stored as `<root>/<db_id>/schema.json`
#[derive(Debug, Clone)]
pub struct SchemaDirectory {
    root: PathBuf,
}

impl SchemaDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SchemaDirectory { root: root.into() }
    }

    pub fn path_for(&self, db_id: &str) -> PathBuf {
        self.root.join(db_id).join("schema.json")
    }
}

impl SchemaSource for SchemaDirectory {
    fn schema_document(&self, db_id: &str) -> Result<TargetTypeGraph> {
        let text = fs::read_to_string(self.path_for(db_id))?;
        TargetTypeGraph::from_json(&text)
    }
}

/// Relational and target models of one database
#[derive(Debug)]
pub struct DatabaseModel {
    pub relational: RelationalSchema,
    pub target: TargetTypeGraph,
}

/// Loads each database's models once and shares them across workers
pub struct ModelRegistry<S> {
    relational: HashMap<String, RelationalSchema>,
    source: S,
    models: DashMap<String, Arc<DatabaseModel>>,
}

impl<S: SchemaSource> ModelRegistry<S> {
    pub fn new(relational: Vec<RelationalSchema>, source: S) -> Self {
        ModelRegistry {
            relational: relational
                .into_iter()
                .map(|schema| (schema.db_id().to_string(), schema))
                .collect(),
            source,
            models: DashMap::new(),
        }
    }

    /// Models of a database, loading its target schema on first use
    pub fn model(&self, db_id: &str) -> Result<Arc<DatabaseModel>> {
        if let Some(model) = self.models.get(db_id) {
            return Ok(Arc::clone(model.value()));
        }
        let entry = self
            .models
            .entry(db_id.to_string())
            .or_try_insert_with(|| {
                let relational = self.relational.get(db_id).cloned().ok_or_else(|| {
                    Error::SchemaMismatch(format!("database '{}' is not in tables.json", db_id))
                })?;
                let target = self.source.schema_document(db_id)?;
                log::debug!("loaded {} target types for '{}'", target.len(), db_id);
                Ok::<_, Error>(Arc::new(DatabaseModel { relational, target }))
            })?;
        Ok(Arc::clone(entry.value()))
    }

    /// Number of databases loaded so far
    pub fn loaded(&self) -> usize {
        self.models.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource(AtomicUsize);

    impl SchemaSource for CountingSource {
        fn schema_document(&self, _: &str) -> Result<TargetTypeGraph> {
            self.0.fetch_add(1, Ordering::SeqCst);
            TargetTypeGraph::from_json(r#"{ "__schema": { "types": [] } }"#)
        }
    }

    fn example(db_id: &str, question: &str) -> DatasetExample {
        serde_json::from_value(json!({
            "db_id": db_id,
            "query": "SELECT 1",
            "question": question,
            "sql": {}
        }))
        .unwrap()
    }

    #[test]
    fn test_group_by_database_keeps_order() {
        let groups = group_by_database(vec![
            example("b", "q0"),
            example("a", "q1"),
            example("b", "q2"),
        ]);
        let keys: Vec<_> = groups.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b"]);
        let b: Vec<_> = groups["b"].iter().map(|(i, e)| (*i, e.question.as_str())).collect();
        assert_eq!(b, vec![(0, "q0"), (2, "q2")]);
    }

    #[test]
    fn test_output_uses_camel_case() {
        let record = GraphQLDatasetExample {
            schema_id: "imdb".to_string(),
            question: "q".to_string(),
            query: "query { a { b } }".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({ "schemaId": "imdb", "question": "q", "query": "query { a { b } }" })
        );
    }

    #[test]
    fn test_registry_loads_once() {
        let relational = RelationalSchema::from_value(json!({
            "db_id": "imdb",
            "column_names_original": [[-1, "*"], [0, "mid"]],
            "table_names_original": ["movie"]
        }))
        .unwrap();
        let registry = ModelRegistry::new(vec![relational], CountingSource(AtomicUsize::new(0)));

        let first = registry.model("imdb").unwrap();
        let second = registry.model("imdb").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.source.0.load(Ordering::SeqCst), 1);
        assert_eq!(registry.loaded(), 1);

        assert!(matches!(
            registry.model("yelp"),
            Err(Error::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_schema_directory_layout() {
        let directory = SchemaDirectory::new("/data/schemas");
        assert_eq!(
            directory.path_for("imdb"),
            PathBuf::from("/data/schemas/imdb/schema.json")
        );
    }
}
