//! Batch driver
//!
//! Compiles a dataset database by database. Databases run in parallel on the
//! rayon pool; the examples of one database run in input order. Capability
//! failures are recorded per example and the run goes on. A structural error
//! aborts the rest of its database, keeping what succeeded before it.

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;

use crate::assemble::{NonInteractive, RelationResolver};
use crate::cache::CompileCache;
use crate::compile::CompileContext;
use crate::config::Config;
use crate::dataset::{
    group_by_database, DatasetExample, GraphQLDatasetExample, ModelRegistry, SchemaSource,
};
use crate::error::{CompileError, CompileResult, Unsupported};

/// An example that could not be translated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedExample {
    /// Position of the example in the dataset file
    pub index: usize,
    pub question: String,
    pub reason: Unsupported,
}

/// Outcome of one database
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub db_id: String,
    pub successes: Vec<GraphQLDatasetExample>,
    pub failures: Vec<FailedExample>,
    /// Structural error that stopped the database, if any
    pub aborted: Option<String>,
}

impl BatchReport {
    fn new(db_id: String) -> Self {
        BatchReport {
            db_id,
            ..BatchReport::default()
        }
    }
}

/// Totals over a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub successes: usize,
    /// Failure count by reason key
    pub failures: BTreeMap<&'static str, usize>,
    /// Databases stopped by a structural error, with the error
    pub aborted: Vec<(String, String)>,
}

impl RunSummary {
    pub fn from_reports(reports: &[BatchReport]) -> Self {
        let mut summary = RunSummary::default();
        for report in reports {
            summary.add(report);
        }
        summary
    }

    pub fn add(&mut self, report: &BatchReport) {
        self.successes += report.successes.len();
        for failure in &report.failures {
            *self.failures.entry(failure.reason.reason()).or_insert(0) += 1;
        }
        if let Some(error) = &report.aborted {
            self.aborted.push((report.db_id.clone(), error.clone()));
        }
    }

    /// Total number of failed examples
    pub fn failed(&self) -> usize {
        self.failures.values().sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "succeeded: {}", self.successes)?;
        writeln!(f, "failed: {}", self.failed())?;
        for (reason, count) in &self.failures {
            writeln!(f, "  {}: {}", reason, count)?;
        }
        if !self.aborted.is_empty() {
            writeln!(f, "aborted databases: {}", self.aborted.len())?;
            for (db_id, error) in &self.aborted {
                writeln!(f, "  {}: {}", db_id, error)?;
            }
        }
        Ok(())
    }
}

/// Compiles datasets against the models of a [`ModelRegistry`]
pub struct BatchDriver<S> {
    registry: ModelRegistry<S>,
    config: Config,
    cache: CompileCache,
    prompt: Option<Box<dyn RelationResolver>>,
}

impl<S: SchemaSource> BatchDriver<S> {
    pub fn new(registry: ModelRegistry<S>, config: Config) -> Self {
        let cache = CompileCache::new(&config);
        BatchDriver {
            registry,
            config,
            cache,
            prompt: None,
        }
    }

    /// Retries examples needing a manual relation choice with `prompt`
    pub fn with_prompt(mut self, prompt: impl RelationResolver + 'static) -> Self {
        self.prompt = Some(Box::new(prompt));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &CompileCache {
        &self.cache
    }

    /// Runs a dataset, returning one report per database in sorted id order
    pub fn run(&self, examples: Vec<DatasetExample>) -> Vec<BatchReport> {
        let groups: Vec<_> = group_by_database(examples).into_iter().collect();
        groups
            .into_par_iter()
            .map(|(db_id, examples)| self.run_database(db_id, examples))
            .collect()
    }

    /// Runs the examples of one database in order
    pub fn run_database(
        &self,
        db_id: String,
        examples: Vec<(usize, DatasetExample)>,
    ) -> BatchReport {
        let mut report = BatchReport::new(db_id);
        let model = match self.registry.model(&report.db_id) {
            Ok(model) => model,
            Err(e) => {
                log::error!("skipping database '{}': {}", report.db_id, e);
                report.aborted = Some(e.to_string());
                return report;
            }
        };
        let context =
            CompileContext::new(&model.relational, &model.target, &self.config, &NonInteractive);

        for (index, example) in examples {
            match self.compile_example(context, &report.db_id, index, &example) {
                Ok(query) => report.successes.push(GraphQLDatasetExample {
                    schema_id: report.db_id.clone(),
                    question: example.question,
                    query,
                }),
                Err(CompileError::Unsupported(reason)) => {
                    log::debug!(
                        "example {} of '{}' failed: {}",
                        index,
                        report.db_id,
                        reason
                    );
                    report.failures.push(FailedExample {
                        index,
                        question: example.question,
                        reason,
                    });
                }
                Err(CompileError::Structural(e)) => {
                    log::error!(
                        "aborting database '{}' at example {}: {}",
                        report.db_id,
                        index,
                        e
                    );
                    report.aborted = Some(format!("example {}: {}", index, e));
                    break;
                }
            }
        }

        log::info!(
            "{}: {} succeeded, {} failed{}",
            report.db_id,
            report.successes.len(),
            report.failures.len(),
            if report.aborted.is_some() { ", aborted" } else { "" }
        );
        report
    }

    fn compile_example(
        &self,
        context: CompileContext<'_>,
        db_id: &str,
        index: usize,
        example: &DatasetExample,
    ) -> CompileResult<String> {
        let key = CompileCache::key(db_id, &example.sql);
        let outcome = match self.cache.get(key) {
            Some(cached) => {
                log::trace!("cache hit {} for example {}", CompileCache::query_id(key), index);
                cached.map_err(CompileError::from)
            }
            None => {
                let outcome = context.compile_value(&example.sql);
                self.cache.insert(key, &outcome);
                outcome
            }
        };

        match (outcome, &self.prompt) {
            (Err(CompileError::Unsupported(reason)), Some(prompt)) if reason.is_manual_entry() => {
                log::warn!("example {} of '{}': {}", index, db_id, reason);
                context
                    .with_resolver(prompt.as_ref())
                    .compile_value(&example.sql)
            }
            (outcome, _) => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::RelationRequest;
    use crate::error::Result;
    use crate::target::TargetTypeGraph;
    use crate::translate::fixtures;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixtureSource;

    impl SchemaSource for FixtureSource {
        fn schema_document(&self, _: &str) -> Result<TargetTypeGraph> {
            Ok(fixtures::target())
        }
    }

    struct CountingPrompt(Arc<AtomicUsize>);

    impl RelationResolver for CountingPrompt {
        fn choose(&self, _: &RelationRequest<'_>) -> std::result::Result<usize, Unsupported> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }
    }

    fn driver() -> BatchDriver<FixtureSource> {
        let registry = ModelRegistry::new(vec![fixtures::relational()], FixtureSource);
        BatchDriver::new(registry, Config::default())
    }

    fn sql(select: Value, tables: &[usize], filter: Value) -> Value {
        let units: Vec<_> = tables.iter().map(|t| json!(["table_unit", t])).collect();
        json!({
            "select": select,
            "from": { "table_units": units, "conds": [] },
            "where": filter,
            "groupBy": [],
            "having": [],
            "orderBy": [],
            "limit": null,
            "union": null,
            "intersect": null,
            "except": null
        })
    }

    fn example(db_id: &str, question: &str, sql: Value) -> DatasetExample {
        serde_json::from_value(json!({
            "db_id": db_id,
            "query": "",
            "question": question,
            "sql": sql
        }))
        .unwrap()
    }

    fn titles() -> Value {
        sql(json!([false, [[0, [0, [0, 2, false], null]]]]), &[0], json!([]))
    }

    fn director_without_bridge() -> Value {
        sql(
            json!([false, [[0, [0, [0, 2, false], null]], [0, [0, [0, 6, false], null]]]]),
            &[0, 1],
            json!([]),
        )
    }

    #[test]
    fn test_failures_are_recorded_and_run_continues() {
        let mut grouped = titles();
        grouped["groupBy"] = json!([[0, 2, false]]);

        let reports = driver().run(vec![
            example("imdb", "all titles", titles()),
            example("imdb", "titles grouped", grouped),
            example("imdb", "titles again", titles()),
        ]);
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.successes.len(), 2);
        assert_eq!(report.successes[0].query, "query { movie { title } }");
        assert_eq!(report.successes[1].question, "titles again");
        assert_eq!(
            report.failures,
            vec![FailedExample {
                index: 1,
                question: "titles grouped".to_string(),
                reason: Unsupported::GroupBy,
            }]
        );
        assert!(report.aborted.is_none());

        let summary = RunSummary::from_reports(&reports);
        assert_eq!(summary.successes, 2);
        assert_eq!(summary.failures.get("group_by"), Some(&1));
    }

    #[test]
    fn test_structural_error_aborts_database() {
        let mut broken = titles();
        broken["select"] = json!("nonsense");

        let reports = driver().run(vec![
            example("imdb", "first", titles()),
            example("imdb", "broken", broken),
            example("imdb", "never reached", titles()),
            example("yelp", "unknown database", titles()),
        ]);
        assert_eq!(reports.len(), 2);

        let imdb = &reports[0];
        assert_eq!(imdb.successes.len(), 1);
        assert!(imdb.failures.is_empty());
        assert!(imdb.aborted.as_deref().is_some_and(|e| e.starts_with("example 1:")));

        let yelp = &reports[1];
        assert_eq!(yelp.db_id, "yelp");
        assert!(yelp.aborted.is_some());

        let summary = RunSummary::from_reports(&reports);
        assert_eq!(summary.aborted.len(), 2);
        assert_eq!(summary.failed(), 0);
    }

    #[test]
    fn test_manual_entry_without_prompt_fails() {
        let reports = driver().run(vec![example("imdb", "q", director_without_bridge())]);
        assert!(reports[0].failures[0].reason.is_manual_entry());
    }

    #[test]
    fn test_manual_entry_retried_with_prompt() {
        let asked = Arc::new(AtomicUsize::new(0));
        let driver = driver().with_prompt(CountingPrompt(Arc::clone(&asked)));
        let reports = driver.run(vec![
            example("imdb", "q1", director_without_bridge()),
            example("imdb", "q2", director_without_bridge()),
        ]);

        assert_eq!(reports[0].successes.len(), 2);
        assert_eq!(
            reports[0].successes[0].query,
            "query { movie { title directed_bies { director { name } } } }"
        );
        // the retry never comes from the cache
        assert_eq!(asked.load(Ordering::SeqCst), 2);
        assert_eq!(driver.cache().len(), 1);
    }

    #[test]
    fn test_summary_display() {
        let mut failures = BTreeMap::new();
        failures.insert("group_by", 2);
        failures.insert("having", 1);
        let summary = RunSummary {
            successes: 5,
            failures,
            aborted: Vec::new(),
        };
        assert_eq!(
            summary.to_string(),
            "succeeded: 5\nfailed: 3\n  group_by: 2\n  having: 1\n"
        );
    }
}
