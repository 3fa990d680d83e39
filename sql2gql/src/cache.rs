//! Compiled query cache
//!
//! Spider asks many paraphrased questions over the same SQL, so compile
//! outcomes are memoized per database and SQL AST. Entries are keyed by the
//! xxh3 hash of the database id and the canonical JSON text of the AST
//! (`serde_json` maps keep their keys sorted). Only outcomes that do not
//! depend on a manual decision are stored: the produced text or the
//! unsupported construct. Structural errors are never cached.
use moka::sync::Cache;
use serde_json::Value;
use std::time::Duration;
use xxhash_rust::xxh3::xxh3_64;

use crate::config::Config;
use crate::error::{CompileError, CompileResult, Unsupported};

/// A cached compile outcome
pub type CachedOutcome = std::result::Result<String, Unsupported>;

/// Bounded, TTL'd cache of compile outcomes
#[derive(Clone)]
pub struct CompileCache {
    entries: Cache<u64, CachedOutcome>,
}

impl CompileCache {
    pub fn new(config: &Config) -> Self {
        CompileCache {
            entries: Cache::builder()
                .max_capacity(config.query_cache_max_size)
                .time_to_live(Duration::from_secs(config.query_cache_ttl_seconds))
                .build(),
        }
    }

    /// Cache key of one database's SQL AST
    ///
    /// # Arguments
    ///
    /// * `db_id` - Database the AST runs against
    /// * `sql` - The raw Spider AST
    ///
    /// # Returns
    ///
    /// * `u64` - xxh3 hash of the database id and the AST's JSON text
    #[inline]
    pub fn key(db_id: &str, sql: &Value) -> u64 {
        let canonical = format!("{}\u{0}{}", db_id, sql);
        xxh3_64(canonical.as_bytes())
    }

    /// Hex form of a key, for logs
    pub fn query_id(key: u64) -> String {
        format!("{:x}", key)
    }

    pub fn get(&self, key: u64) -> Option<CachedOutcome> {
        self.entries.get(&key)
    }

    /// Stores an outcome unless it is a structural error
    pub fn insert(&self, key: u64, outcome: &CompileResult<String>) {
        let cached = match outcome {
            Ok(text) => Ok(text.clone()),
            Err(CompileError::Unsupported(reason)) => Err(reason.clone()),
            Err(CompileError::Structural(_)) => return,
        };
        self.entries.insert(key, cached);
    }

    /// Approximate number of entries
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    #[test]
    fn test_key_ignores_member_order() {
        let a = json!({ "select": [false, []], "where": [] });
        let b: Value = serde_json::from_str(r#"{ "where": [], "select": [false, []] }"#).unwrap();
        assert_eq!(CompileCache::key("imdb", &a), CompileCache::key("imdb", &b));
        assert_ne!(CompileCache::key("imdb", &a), CompileCache::key("yelp", &a));
    }

    #[test]
    fn test_structural_errors_are_not_cached() {
        let cache = CompileCache::new(&Config::default());
        cache.insert(1, &Ok("query { a { b } }".to_string()));
        cache.insert(2, &Err(Unsupported::GroupBy.into()));
        cache.insert(3, &Err(Error::SchemaMismatch("x".to_string()).into()));

        assert_eq!(cache.get(1), Some(Ok("query { a { b } }".to_string())));
        assert_eq!(cache.get(2), Some(Err(Unsupported::GroupBy)));
        assert_eq!(cache.get(3), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_query_id_is_hex() {
        assert_eq!(CompileCache::query_id(255), "ff");
    }
}
