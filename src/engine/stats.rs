use tracing::trace;

use crate::engine::relation::Relation;
use crate::engine::{Row, Value};
use crate::helpers::reduce;

/// How a single cell coerces to a number
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coercion {
    Number(f64),
    /// Absent, `Null` or empty
    Missing,
    /// Present but not numeric
    NotNumeric,
}

impl Coercion {
    pub fn of(value: Option<&Value>) -> Coercion {
        match value {
            None => Coercion::Missing,
            Some(v) if v.is_missing() => Coercion::Missing,
            Some(v) => v.to_f64().map_or(Coercion::NotNumeric, Coercion::Number),
        }
    }
}

/// Numeric values extracted from one column, in row order, plus counts of
/// what was skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericColumn {
    pub values: Vec<f64>,
    pub missing: usize,
    pub rejected: usize,
}

impl NumericColumn {
    pub fn skipped(&self) -> usize {
        self.missing + self.rejected
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    fn push(&mut self, coercion: Coercion) {
        match coercion {
            Coercion::Number(v) => self.values.push(v),
            Coercion::Missing => self.missing += 1,
            Coercion::NotNumeric => self.rejected += 1,
        }
    }
}

impl FromIterator<Coercion> for NumericColumn {
    fn from_iter<I: IntoIterator<Item = Coercion>>(iter: I) -> Self {
        let mut column = NumericColumn::default();
        for coercion in iter {
            column.push(coercion);
        }
        column
    }
}

/// Numeric view of `column` over a slice of rows
pub(crate) fn numeric_values(rows: &[Row], column: &str) -> NumericColumn {
    rows.iter().map(|row| Coercion::of(row.get(column))).collect()
}

impl Relation {
    /// Walks every row and keeps the values of `column` that coerce to a
    /// float. Order follows the rows; nothing is sorted.
    pub fn extract_numeric(&self, column: &str) -> NumericColumn {
        let extracted: NumericColumn = self
            .scan()
            .map(|row| Coercion::of(row.get(column)))
            .collect();
        trace!(
            column,
            values = extracted.len(),
            missing = extracted.missing,
            rejected = extracted.rejected,
            "extracted numeric column"
        );
        extracted
    }

    /// `None` when the column holds no numeric value
    pub fn min(&self, column: &str) -> Option<f64> {
        reduce::min(&self.extract_numeric(column).values)
    }

    /// `None` when the column holds no numeric value
    pub fn max(&self, column: &str) -> Option<f64> {
        reduce::max(&self.extract_numeric(column).values)
    }

    /// `None` when the column holds no numeric value
    pub fn mean(&self, column: &str) -> Option<f64> {
        reduce::mean(&self.extract_numeric(column).values)
    }

    /// Sample standard deviation. Unlike the other statistics this is
    /// `0.0`, not `None`, below two numeric values.
    pub fn std(&self, column: &str) -> f64 {
        reduce::sample_std(&self.extract_numeric(column).values).unwrap_or(0.0)
    }

    /// Summary statistics per numeric column
    ///
    /// Covers the columns inferred as `Integer` or `Float`, or every column
    /// when none is numeric. Columns without a single numeric value are left
    /// out. Each column costs one traversal of the source.
    ///
    /// Result rows: `{column, count, mean, std, min, max}` with `mean` and
    /// `std` rounded to two decimals.
    pub fn describe(&self) -> Relation {
        let mut columns: Vec<&String> = self
            .columns()
            .iter()
            .filter(|c| {
                self.column_types()
                    .get(c.as_str())
                    .is_some_and(|t| t.is_numeric())
            })
            .collect();
        if columns.is_empty() {
            columns = self.columns().iter().collect();
        }

        let mut summary = Vec::with_capacity(columns.len());
        for column in columns {
            let extracted = self.extract_numeric(column);
            let vals = &extracted.values;
            let (Some(avg), Some(minimum), Some(maximum)) =
                (reduce::mean(vals), reduce::min(vals), reduce::max(vals))
            else {
                continue;
            };
            let std_dev = reduce::sample_std(vals).unwrap_or(0.0);

            let mut row = Row::new();
            row.insert("column".to_string(), Value::from(column.as_str()));
            row.insert("count".to_string(), Value::Int(vals.len() as i64));
            row.insert("mean".to_string(), Value::Float(reduce::round2(avg)));
            row.insert("std".to_string(), Value::Float(reduce::round2(std_dev)));
            row.insert("min".to_string(), Value::Float(minimum));
            row.insert("max".to_string(), Value::Float(maximum));
            summary.push(row);
        }

        Relation::from_rows(summary)
    }
}
