use indexmap::IndexMap;
use tracing::debug;

use crate::engine::relation::Relation;
use crate::engine::stats::numeric_values;
use crate::engine::{AggregateFn, EngineError, Row, Value};
use crate::helpers::reduce;

/// Key of the single group produced by a global grouping
pub const TOTAL_GROUP: &str = "Total";
/// Key substituted when a row lacks the grouping column
pub const UNKNOWN_GROUP: &str = "Unknown";
/// Column carrying the group key in aggregated output
pub const GROUP_COLUMN: &str = "group";

/// Group key to member rows, in first-seen order
pub type Groups = IndexMap<Value, Vec<Row>>;

/// Target column to aggregate function, in request order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateSpec {
    entries: IndexMap<String, AggregateFn>,
}

impl AggregateSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the function applied to `column`
    pub fn with(mut self, column: &str, func: AggregateFn) -> Self {
        self.entries.insert(column.to_string(), func);
        self
    }

    /// Builds a spec from `(column, tag)` pairs such as `("amount", "avg")`
    ///
    /// # Errors
    /// Returns [`EngineError::UnknownAggregate`] for an unrecognised tag.
    pub fn parse<I, C, T>(pairs: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = (C, T)>,
        C: Into<String>,
        T: AsRef<str>,
    {
        let mut entries = IndexMap::new();
        for (column, tag) in pairs {
            entries.insert(column.into(), tag.as_ref().parse()?);
        }
        Ok(AggregateSpec { entries })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, AggregateFn)> {
        self.entries.iter().map(|(c, f)| (c.as_str(), *f))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, AggregateFn)> for AggregateSpec {
    fn from_iter<I: IntoIterator<Item = (String, AggregateFn)>>(iter: I) -> Self {
        AggregateSpec {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Relation {
    /// Partitions the rows by the exact value of `column`.
    ///
    /// With `None`, returns the single group `"Total"` holding every row.
    /// Rows without the column land in `"Unknown"`.
    pub fn groupby(&self, column: Option<&str>) -> Groups {
        let mut groups = Groups::new();
        let Some(column) = column else {
            groups.insert(Value::from(TOTAL_GROUP), self.to_list());
            return groups;
        };

        for row in self.scan() {
            let key = row
                .get(column)
                .cloned()
                .unwrap_or_else(|| Value::from(UNKNOWN_GROUP));
            groups.entry(key).or_default().push(row.into_owned());
        }
        debug!(column, groups = groups.len(), "grouped relation");
        groups
    }

    /// Per-group summaries; see [`aggregate`].
    pub fn aggregate(&self, groups: &Groups, spec: &AggregateSpec) -> Relation {
        aggregate(groups, spec)
    }
}

/// Computes one output row per group: `{"group": key, <column>: value, ...}`
///
/// - `count` is the group's row count and ignores the column.
/// - `sum`, `mean`, `min`, `max` and `std` coerce the column to float and drop
///   missing or non-numeric values. Results are rounded to two decimals.
/// - An empty numeric set yields the integer `0` for `sum`, `mean`, `min`
///   and `max`; `std` is `0` below two values.
///
/// Output keeps group order, and within a row the spec's column order.
pub fn aggregate(groups: &Groups, spec: &AggregateSpec) -> Relation {
    let mut results = Vec::with_capacity(groups.len());

    for (key, rows) in groups {
        let mut out = Row::with_capacity(spec.len() + 1);
        out.insert(GROUP_COLUMN.to_string(), key.clone());
        for (column, func) in spec.iter() {
            out.insert(column.to_string(), aggregate_rows(rows, column, func));
        }
        results.push(out);
    }

    Relation::from_rows(results)
}

fn aggregate_rows(rows: &[Row], column: &str, func: AggregateFn) -> Value {
    let numeric = || numeric_values(rows, column).values;
    let result = match func {
        AggregateFn::Count => return Value::Int(rows.len() as i64),
        AggregateFn::Sum => {
            let vals = numeric();
            if vals.is_empty() {
                None
            } else {
                Some(reduce::sum(&vals))
            }
        }
        AggregateFn::Mean => reduce::mean(&numeric()),
        AggregateFn::Min => reduce::min(&numeric()),
        AggregateFn::Max => reduce::max(&numeric()),
        AggregateFn::Std => reduce::sample_std(&numeric()),
    };

    result.map_or(Value::Int(0), |v| Value::Float(reduce::round2(v)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn sales() -> Relation {
        Relation::from_rows(vec![
            row(&[("country", "CA".into()), ("amount", Value::Int(10))]),
            row(&[("country", "US".into()), ("amount", Value::Int(5))]),
            row(&[("country", "CA".into()), ("amount", Value::Float(20.4))]),
            row(&[("amount", Value::Int(1))]),
            row(&[("country", "US".into()), ("amount", "n/a".into())]),
        ])
    }

    #[test]
    fn test_groupby_first_seen_order() {
        let groups = sales().groupby(Some("country"));
        let keys: Vec<&Value> = groups.keys().collect();
        assert_eq!(
            keys,
            vec![&Value::from("CA"), &Value::from("US"), &Value::from(UNKNOWN_GROUP)]
        );
        assert_eq!(groups[&Value::from("CA")].len(), 2);
        assert_eq!(groups[&Value::from(UNKNOWN_GROUP)].len(), 1);
    }

    #[test]
    fn test_groupby_none_is_total() {
        let relation = sales();
        let groups = relation.groupby(None);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[&Value::from(TOTAL_GROUP)], relation.to_list());
    }

    #[test]
    fn test_groupby_null_key_is_its_own_group() {
        let relation = Relation::from_rows(vec![
            row(&[("k", Value::Null)]),
            row(&[("k", Value::Int(1))]),
            row(&[("k", Value::Null)]),
        ]);
        let groups = relation.groupby(Some("k"));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&Value::Null].len(), 2);
    }

    #[test]
    fn test_groupby_merges_equal_numbers() {
        let relation = Relation::from_rows(vec![
            row(&[("k", Value::Int(1)), ("v", Value::Int(2))]),
            row(&[("k", Value::Float(1.0)), ("v", Value::Int(3))]),
            row(&[("k", Value::Float(1.5)), ("v", Value::Int(4))]),
        ]);
        let groups = relation.groupby(Some("k"));
        assert_eq!(groups.len(), 2);
        let (first_key, rows) = groups.first().unwrap();
        assert_eq!(first_key, &Value::Int(1));
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_aggregate_rounds_half_to_even_on_exact_value() {
        let relation = Relation::from_rows(vec![
            row(&[("amount", Value::Float(0.01))]),
            row(&[("amount", Value::Float(0.02))]),
        ]);
        let spec = AggregateSpec::new().with("amount", AggregateFn::Mean);
        let rows = relation.aggregate(&relation.groupby(None), &spec).to_list();
        assert_eq!(rows[0]["amount"], Value::Float(0.01));
    }

    #[test]
    fn test_aggregate_output_shape() {
        let relation = sales();
        let spec = AggregateSpec::parse([("amount", "sum"), ("country", "count")]).unwrap();
        let result = relation.aggregate(&relation.groupby(Some("country")), &spec);

        assert_eq!(result.columns(), [GROUP_COLUMN, "amount", "country"]);
        let rows = result.to_list();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["group"], Value::from("CA"));
        assert_eq!(rows[0]["amount"], Value::Float(30.4));
        assert_eq!(rows[0]["country"], Value::Int(2));
        assert_eq!(rows[1]["amount"], Value::Float(5.0));
        assert_eq!(rows[2]["group"], Value::from(UNKNOWN_GROUP));
    }

    #[test]
    fn test_aggregate_functions() {
        let relation = sales();
        let groups = relation.groupby(None);
        let spec = AggregateSpec::new().with("amount", AggregateFn::Mean);
        let mean = aggregate(&groups, &spec).to_list();
        assert_eq!(mean[0]["amount"], Value::Float(9.1));

        let stats = |func| {
            let spec = AggregateSpec::new().with("amount", func);
            aggregate(&groups, &spec).to_list()[0]["amount"].clone()
        };
        assert_eq!(stats(AggregateFn::Min), Value::Float(1.0));
        assert_eq!(stats(AggregateFn::Max), Value::Float(20.4));
        assert_eq!(stats(AggregateFn::Std), Value::Float(8.38));
        assert_eq!(stats(AggregateFn::Count), Value::Int(5));
    }

    #[test]
    fn test_aggregate_empty_set_defaults_to_zero() {
        let relation = sales();
        let groups = relation.groupby(Some("country"));
        let spec = AggregateSpec::parse([
            ("missing", "mean"),
            ("missing_min", "min"),
            ("missing_max", "max"),
            ("missing_sum", "sum"),
            ("missing_std", "std"),
        ])
        .unwrap();
        let rows = aggregate(&groups, &spec).to_list();
        for column in ["missing", "missing_min", "missing_max", "missing_sum", "missing_std"] {
            assert_eq!(rows[0][column], Value::Int(0), "{column}");
        }
    }

    #[test]
    fn test_aggregate_std_single_value_is_zero() {
        let relation = sales();
        let groups = relation.groupby(Some("country"));
        let spec = AggregateSpec::new().with("amount", AggregateFn::Std);
        let rows = aggregate(&groups, &spec).to_list();
        // US has one numeric amount, "n/a" is dropped
        assert_eq!(rows[1]["amount"], Value::Int(0));
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        assert!(matches!(
            AggregateSpec::parse([("amount", "median")]),
            Err(EngineError::UnknownAggregate(_))
        ));
    }

    #[test]
    fn test_aggregate_empty_groups() {
        let result = aggregate(&Groups::new(), &AggregateSpec::new().with("x", AggregateFn::Sum));
        assert!(result.is_empty());
    }
}
