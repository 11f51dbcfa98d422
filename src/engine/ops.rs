use std::borrow::Cow;
use std::collections::HashMap;

use tracing::{debug, trace};

use crate::engine::relation::Relation;
use crate::engine::{Row, Value};

const NULL_SORT_TEXT: &str = "None";

impl Relation {
    /// Rows for which `predicate` holds, in source order
    pub fn filter<F>(&self, predicate: F) -> Relation
    where
        F: Fn(&Row) -> bool,
    {
        let rows = self
            .scan()
            .filter(|row| predicate(row))
            .map(Cow::into_owned)
            .collect();
        self.derive(rows)
    }

    /// Plain rows restricted to `columns`; absent columns read as `Null`.
    pub fn project<S: AsRef<str>>(&self, columns: &[S]) -> Vec<Row> {
        self.scan()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| {
                        let c = c.as_ref();
                        (c.to_string(), row.get(c).cloned().unwrap_or(Value::Null))
                    })
                    .collect()
            })
            .collect()
    }

    /// Stable sort on `key`.
    ///
    /// Sorts numerically when every row's key coerces to a float (absent,
    /// `Null` and falsy keys count as 0). A single value that does not
    /// coerce switches the whole sort to a lexicographic one on the values'
    /// text, where a `Null` reads as `"None"` and an absent key as `""`.
    pub fn sort_by(&self, key: &str, reverse: bool) -> Relation {
        let rows = self.to_list();

        let numeric_keys: Option<Vec<f64>> =
            rows.iter().map(|row| sort_number(row.get(key))).collect();
        let sorted = match numeric_keys {
            Some(keys) => sort_keyed(rows, keys, reverse, |a, b| a.total_cmp(b)),
            None => {
                trace!(key, "falling back to lexicographic sort");
                let keys = rows
                    .iter()
                    .map(|row| row.get(key).map(sort_text).unwrap_or_default())
                    .collect();
                sort_keyed(rows, keys, reverse, |a: &String, b: &String| a.cmp(b))
            }
        };
        self.derive(sorted)
    }

    /// Top `k` rows by descending `column`, through a full [`Relation::sort_by`]
    pub fn top_k_by(&self, column: &str, k: usize) -> Vec<Row> {
        self.sort_by(column, true).head(k)
    }

    /// Row holding the largest `column` value (first one on ties)
    pub fn max_by(&self, column: &str) -> Vec<Row> {
        self.sort_by(column, true).head(1)
    }

    /// Row holding the smallest `column` value (first one on ties)
    pub fn min_by(&self, column: &str) -> Vec<Row> {
        self.sort_by(column, false).head(1)
    }

    /// Inner equality join through an in-memory hash index over `right`.
    ///
    /// Right rows whose `right_on` value is missing or falsy are not
    /// indexed. Each match yields the left row with the right row's fields
    /// written over it, minus `right_on`. Left rows without a match are
    /// dropped; a left row matching k right rows yields k rows.
    pub fn join(&self, right: &Relation, left_on: &str, right_on: &str) -> Relation {
        let mut index: HashMap<Value, Vec<Row>> = HashMap::new();
        for row in right.scan() {
            let key = match row.get(right_on) {
                Some(key) if key.is_truthy() => key.clone(),
                _ => continue,
            };
            index.entry(key).or_default().push(row.into_owned());
        }

        let mut joined = Vec::new();
        for left in self.scan() {
            let Some(matches) = left.get(left_on).and_then(|key| index.get(key)) else {
                continue;
            };
            for right_row in matches {
                let mut merged = Row::clone(&left);
                for (column, value) in right_row {
                    if column != right_on {
                        merged.insert(column.clone(), value.clone());
                    }
                }
                joined.push(merged);
            }
        }

        debug!(
            left_on,
            right_on,
            index_keys = index.len(),
            rows = joined.len(),
            "joined relations"
        );
        Relation::from_rows(joined)
    }
}

fn sort_number(value: Option<&Value>) -> Option<f64> {
    match value {
        None => Some(0.0),
        Some(v) if !v.is_truthy() => Some(0.0),
        Some(v) => v.to_f64(),
    }
}

fn sort_text(value: &Value) -> String {
    match value {
        Value::Null => NULL_SORT_TEXT.to_string(),
        v => v.to_string(),
    }
}

fn sort_keyed<K, F>(rows: Vec<Row>, keys: Vec<K>, reverse: bool, cmp: F) -> Vec<Row>
where
    F: Fn(&K, &K) -> std::cmp::Ordering,
{
    let mut keyed: Vec<(K, Row)> = keys.into_iter().zip(rows).collect();
    if reverse {
        keyed.sort_by(|a, b| cmp(&b.0, &a.0));
    } else {
        keyed.sort_by(|a, b| cmp(&a.0, &b.0));
    }
    keyed.into_iter().map(|(_, row)| row).collect()
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

    fn ids(rows: &[Row]) -> Vec<Value> {
        rows.iter().map(|r| r["id"].clone()).collect()
    }

    fn people() -> Relation {
        Relation::from_rows(vec![
            row(&[("id", Value::Int(1)), ("age", Value::Int(30)), ("city", "Oslo".into())]),
            row(&[("id", Value::Int(2)), ("age", Value::Int(25)), ("city", "Bergen".into())]),
            row(&[("id", Value::Int(3)), ("age", Value::Int(30)), ("city", "Oslo".into())]),
            row(&[("id", Value::Int(4)), ("age", Value::Null), ("city", "Tromso".into())]),
        ])
    }

    #[test]
    fn test_filter_preserves_order_and_schema() {
        let relation = people();
        let oslo = relation.filter(|r| r.get("city") == Some(&Value::from("Oslo")));
        assert!(!oslo.is_file_backed());
        assert_eq!(ids(&oslo.to_list()), vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(oslo.columns(), relation.columns());

        let none = relation.filter(|_| false);
        assert!(none.is_empty());
        assert_eq!(none.columns(), ["id", "age", "city"]);
    }

    #[test]
    fn test_project() {
        let projected = people().project(&["city", "missing"]);
        assert_eq!(projected.len(), 4);
        assert_eq!(
            projected[0],
            row(&[("city", "Oslo".into()), ("missing", Value::Null)])
        );
    }

    #[test]
    fn test_sort_numeric_is_stable() {
        let sorted = people().sort_by("age", false).to_list();
        // Null sorts as 0; equal ages keep source order
        assert_eq!(
            ids(&sorted),
            vec![Value::Int(4), Value::Int(2), Value::Int(1), Value::Int(3)]
        );

        let sorted = people().sort_by("age", true).to_list();
        assert_eq!(
            ids(&sorted),
            vec![Value::Int(1), Value::Int(3), Value::Int(2), Value::Int(4)]
        );
    }

    #[test]
    fn test_sort_numeric_strings() {
        let relation = Relation::from_rows(vec![
            row(&[("id", Value::Int(1)), ("amt", "9".into())]),
            row(&[("id", Value::Int(2)), ("amt", "10".into())]),
            row(&[("id", Value::Int(3)), ("amt", "".into())]),
        ]);
        let sorted = relation.sort_by("amt", true).to_list();
        assert_eq!(ids(&sorted), vec![Value::Int(2), Value::Int(1), Value::Int(3)]);
    }

    #[test]
    fn test_sort_falls_back_to_lexicographic() {
        let relation = Relation::from_rows(vec![
            row(&[("id", Value::Int(1)), ("amt", "9".into())]),
            row(&[("id", Value::Int(2)), ("amt", "10".into())]),
            row(&[("id", Value::Int(3)), ("amt", "bad".into())]),
        ]);
        let sorted = relation.sort_by("amt", true).to_list();
        // "bad" > "9" > "10" as text
        assert_eq!(ids(&sorted), vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_lexicographic_sort_places_null_as_none() {
        let relation = Relation::from_rows(vec![
            row(&[("id", Value::Int(1)), ("name", "Apple".into())]),
            row(&[("id", Value::Int(2)), ("name", Value::Null)]),
            row(&[("id", Value::Int(3)), ("name", "Zed".into())]),
            row(&[("id", Value::Int(4))]),
        ]);
        let sorted = relation.sort_by("name", false).to_list();
        // absent key reads as "" and sorts first; Null sits between Apple and Zed
        assert_eq!(
            ids(&sorted),
            vec![Value::Int(4), Value::Int(1), Value::Int(2), Value::Int(3)]
        );
    }

    #[test]
    fn test_top_k_and_extremes() {
        let relation = people();
        assert_eq!(ids(&relation.top_k_by("age", 2)), vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(ids(&relation.max_by("age")), vec![Value::Int(1)]);
        assert_eq!(ids(&relation.min_by("age")), vec![Value::Int(4)]);
        assert_eq!(relation.top_k_by("age", 10).len(), 4);
    }

    #[test]
    fn test_join_fans_out() {
        let left = Relation::from_rows(vec![row(&[("uid", Value::Int(1)), ("n", "A".into())])]);
        let right = Relation::from_rows(vec![
            row(&[("uid", Value::Int(1)), ("city", "X".into())]),
            row(&[("uid", Value::Int(1)), ("city", "Y".into())]),
        ]);
        let joined = left.join(&right, "uid", "uid").to_list();
        assert_eq!(
            joined,
            vec![
                row(&[("uid", Value::Int(1)), ("n", "A".into()), ("city", "X".into())]),
                row(&[("uid", Value::Int(1)), ("n", "A".into()), ("city", "Y".into())]),
            ]
        );
    }

    #[test]
    fn test_join_is_inner_and_drops_right_key() {
        let left = Relation::from_rows(vec![
            row(&[("id", Value::Int(1)), ("customer", Value::Int(10))]),
            row(&[("id", Value::Int(2)), ("customer", Value::Int(99))]),
            row(&[("id", Value::Int(3)), ("customer", Value::Int(20))]),
        ]);
        let right = Relation::from_rows(vec![
            row(&[("cid", Value::Int(10)), ("name", "Ann".into()), ("id", Value::Int(500))]),
            row(&[("cid", Value::Int(20)), ("name", "Bob".into()), ("id", Value::Int(600))]),
        ]);
        let joined = left.join(&right, "customer", "cid").to_list();
        assert_eq!(joined.len(), 2);
        assert!(joined.iter().all(|r| !r.contains_key("cid")));
        // right fields overwrite left ones of the same name
        assert_eq!(joined[0]["id"], Value::Int(500));
        assert_eq!(joined[0]["name"], Value::from("Ann"));
        assert_eq!(joined[1]["name"], Value::from("Bob"));
    }

    #[test]
    fn test_join_matches_int_to_float_keys() {
        let left = Relation::from_rows(vec![row(&[("uid", Value::Int(1)), ("n", "A".into())])]);
        let right = Relation::from_rows(vec![
            row(&[("uid", Value::Float(1.5)), ("city", "Z".into())]),
            row(&[("uid", Value::Float(1.0)), ("city", "X".into())]),
        ]);
        let joined = left.join(&right, "uid", "uid").to_list();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0]["city"], Value::from("X"));
    }

    #[test]
    fn test_join_skips_falsy_right_keys() {
        let left = Relation::from_rows(vec![
            row(&[("k", Value::Int(0))]),
            row(&[("k", "".into())]),
            row(&[("k", Value::Null)]),
        ]);
        let right = Relation::from_rows(vec![
            row(&[("k", Value::Int(0)), ("v", "zero".into())]),
            row(&[("k", "".into()), ("v", "empty".into())]),
            row(&[("k", Value::Null), ("v", "null".into())]),
        ]);
        assert!(left.join(&right, "k", "k").is_empty());
    }
}
