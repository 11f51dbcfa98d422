//! # tabular-engine
//!
//! `tabular-engine` is a small embeddable engine for delimited text files
//! (CSV and friends). It supports:
//!
//! - Streaming, re-readable parsing with bounded-sample type inference
//!   (int, float, string)
//! - Immutable relations backed either by a file or by resolved rows
//! - Column statistics: count, min, max, mean, sample std and `describe`
//! - Group-by with per-column aggregates (count, sum, mean, min, max, std)
//! - Filter, projection, stable sort, top-k and hash equality joins
//! - An optional LRU cache for statistics over unchanged files
//!
//! File-backed relations never hold the data in memory: every traversal
//! reopens the source and streams it. Operators that must see every row
//! (sort, filter, join, aggregate) return memory-backed relations.
//!
//! # Example
//!
//! ```no_run
//! use tabular_engine::{AggregateSpec, Relation, Value};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orders = Relation::from_path("orders.csv")?;
//!
//!     // Column statistics
//!     println!("mean amount: {:?}", orders.mean("amount"));
//!
//!     // Keep the large orders, biggest first
//!     let large = orders
//!         .filter(|row| row.get("amount").and_then(Value::to_f64).unwrap_or(0.0) > 100.0)
//!         .sort_by("amount", true);
//!     println!("{:?}", large.head(5));
//!
//!     // Revenue per region
//!     let spec = AggregateSpec::parse([("amount", "sum"), ("id", "count")])?;
//!     let per_region = orders.aggregate(&orders.groupby(Some("region")), &spec);
//!     for row in per_region.to_list() {
//!         println!("{row:?}");
//!     }
//!
//!     // Attach customer names
//!     let customers = Relation::from_path("customers.csv")?;
//!     let enriched = orders.join(&customers, "customer_id", "id");
//!     println!("{} joined rows", enriched.len());
//!
//!     Ok(())
//! }
//! ```

pub mod engine;
mod helpers;

pub use engine::column::{ColumnType, Schema};
pub use engine::grouping::{AggregateSpec, Groups, aggregate};
pub use engine::parser::{CsvParser, ParsedRows, ParserOptions, RowChunks};
pub use engine::query_cache::{QueryCache, QueryKey};
pub use engine::relation::Relation;
pub use engine::stats::{Coercion, NumericColumn};
pub use engine::{AggregateFn, EngineError, ParseError, ParseSummary, Row, Value};
