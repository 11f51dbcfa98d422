use lru::LruCache;
use tracing::trace;

use crate::engine::parser::ParserOptions;
use crate::engine::relation::Relation;
use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::SystemTime;

const DEFAULT_CAPACITY: NonZeroUsize = NonZeroUsize::new(128).unwrap();

/// Statistics query memoized by [`QueryCache`]
#[derive(Debug, Hash, Eq, PartialEq, Clone)]
pub enum QueryKey {
    Count,
    Min { column: String },
    Max { column: String },
    Mean { column: String },
    Std { column: String },
    Describe,
}

/// Identity of a file-backed source at one point in time. Rewriting the
/// file changes its modification time or length, which changes the stamp.
#[derive(Debug, Hash, Eq, PartialEq, Clone)]
struct SourceStamp {
    path: PathBuf,
    modified: SystemTime,
    len: u64,
    options: ParserOptions,
}

impl SourceStamp {
    fn of(relation: &Relation) -> Option<SourceStamp> {
        let path = relation.source_path()?;
        let options = *relation.parser_options()?;
        let metadata = std::fs::metadata(path).ok()?;
        Some(SourceStamp {
            path: path.to_path_buf(),
            modified: metadata.modified().ok()?,
            len: metadata.len(),
            options,
        })
    }
}

#[derive(Debug, Clone)]
enum CachedResult {
    Count(usize),
    Scalar(Option<f64>),
    Table(Relation),
}

/// LRU cache of statistics over file-backed relations
///
/// Lives outside the relations it serves: the engine itself never caches.
/// Memory-backed relations, and sources whose metadata cannot be read, are
/// computed directly on every call.
///
/// # Example
///
/// ```no_run
/// # use tabular_engine::{QueryCache, Relation};
/// let cache = QueryCache::new();
/// let orders = Relation::from_path("orders.csv")?;
/// let first = cache.mean(&orders, "amount");
/// let again = cache.mean(&orders, "amount"); // no rescan
/// assert_eq!(first, again);
/// # Ok::<(), tabular_engine::EngineError>(())
/// ```
#[derive(Debug)]
pub struct QueryCache {
    cache: RefCell<LruCache<(SourceStamp, QueryKey), CachedResult>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            cache: RefCell::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.cache.borrow_mut().clear();
    }

    pub fn count(&self, relation: &Relation) -> usize {
        match self.get_or_compute(relation, QueryKey::Count, || {
            CachedResult::Count(relation.count())
        }) {
            CachedResult::Count(n) => n,
            _ => relation.count(),
        }
    }

    pub fn min(&self, relation: &Relation, column: &str) -> Option<f64> {
        let key = QueryKey::Min {
            column: column.to_string(),
        };
        self.scalar(relation, key, || relation.min(column))
    }

    pub fn max(&self, relation: &Relation, column: &str) -> Option<f64> {
        let key = QueryKey::Max {
            column: column.to_string(),
        };
        self.scalar(relation, key, || relation.max(column))
    }

    pub fn mean(&self, relation: &Relation, column: &str) -> Option<f64> {
        let key = QueryKey::Mean {
            column: column.to_string(),
        };
        self.scalar(relation, key, || relation.mean(column))
    }

    pub fn std(&self, relation: &Relation, column: &str) -> f64 {
        let key = QueryKey::Std {
            column: column.to_string(),
        };
        self.scalar(relation, key, || Some(relation.std(column)))
            .unwrap_or(0.0)
    }

    pub fn describe(&self, relation: &Relation) -> Relation {
        match self.get_or_compute(relation, QueryKey::Describe, || {
            CachedResult::Table(relation.describe())
        }) {
            CachedResult::Table(table) => table,
            _ => relation.describe(),
        }
    }

    fn scalar<F>(&self, relation: &Relation, key: QueryKey, compute: F) -> Option<f64>
    where
        F: Fn() -> Option<f64>,
    {
        match self.get_or_compute(relation, key, || CachedResult::Scalar(compute())) {
            CachedResult::Scalar(v) => v,
            _ => compute(),
        }
    }

    fn get_or_compute<F>(&self, relation: &Relation, query: QueryKey, compute: F) -> CachedResult
    where
        F: FnOnce() -> CachedResult,
    {
        let Some(stamp) = SourceStamp::of(relation) else {
            return compute();
        };

        let key = (stamp, query);
        if let Some(hit) = self.cache.borrow_mut().get(&key) {
            trace!(path = %key.0.path.display(), query = ?key.1, "query cache hit");
            return hit.clone();
        }

        trace!(path = %key.0.path.display(), query = ?key.1, "query cache miss");
        let result = compute();
        self.cache.borrow_mut().put(key, result.clone());
        result
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}
