use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::engine::column::{ColumnType, Schema};
use crate::engine::parser::{CsvParser, ParsedRows, ParserOptions};
use crate::engine::{EngineError, ParseError, ParseSummary, Row};

/// Where a relation's rows come from
#[derive(Debug, Clone)]
enum Backing {
    /// Rows are produced by re-reading the file on every traversal
    File(Arc<CsvParser>),
    /// Rows are already resolved
    Memory(Arc<Vec<Row>>),
}

/// Immutable tabular value, either file-backed or memory-backed
///
/// Every operation leaves `self` untouched and returns a new relation or a
/// plain row collection. Cloning is shallow: both copies share the parser
/// or the resolved rows.
///
/// # Example
///
/// ```rust
/// # use tabular_engine::{Relation, Row, Value};
/// let rows: Vec<Row> = vec![
///     [("id".to_string(), Value::Int(1)), ("amt".to_string(), Value::from("10"))].into_iter().collect(),
///     [("id".to_string(), Value::Int(2)), ("amt".to_string(), Value::from("20"))].into_iter().collect(),
/// ];
/// let relation = Relation::from_rows(rows);
/// assert_eq!(relation.columns(), ["id", "amt"]);
/// assert_eq!(relation.len(), 2);
/// assert_eq!(relation.mean("amt"), Some(15.0));
/// ```
#[derive(Debug, Clone)]
pub struct Relation {
    backing: Backing,
    header: Vec<String>,
    column_types: Schema,
}

impl Relation {
    /// File-backed relation over `path` with default parser options
    ///
    /// # Errors
    /// Returns [`EngineError::SourceNotFound`] if the path does not exist.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        Ok(Self::from_parser(CsvParser::new(path)?))
    }

    pub fn from_path_with(
        path: impl AsRef<Path>,
        options: ParserOptions,
    ) -> Result<Self, EngineError> {
        Ok(Self::from_parser(CsvParser::with_options(path, options)?))
    }

    pub fn from_parser(parser: CsvParser) -> Self {
        Relation {
            header: parser.header().to_vec(),
            column_types: parser.column_types().clone(),
            backing: Backing::File(Arc::new(parser)),
        }
    }

    /// Memory-backed relation. Columns come from the first row's keys and
    /// the schema is inferred from that row alone.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let (header, column_types) = match rows.first() {
            Some(first) => (
                first.keys().cloned().collect(),
                first
                    .iter()
                    .map(|(name, value)| (name.clone(), ColumnType::of_value(value)))
                    .collect(),
            ),
            None => (Vec::new(), Schema::new()),
        };
        Relation {
            backing: Backing::Memory(Arc::new(rows)),
            header,
            column_types,
        }
    }

    /// Shallow adoption of another relation's backing and schema
    pub fn from_relation(other: &Relation) -> Self {
        other.clone()
    }

    /// Memory-backed relation over `rows` that keeps this relation's
    /// declared columns and schema
    pub(crate) fn derive(&self, rows: Vec<Row>) -> Relation {
        Relation {
            backing: Backing::Memory(Arc::new(rows)),
            header: self.header.clone(),
            column_types: self.column_types.clone(),
        }
    }

    /// Ordered column names
    pub fn columns(&self) -> &[String] {
        &self.header
    }

    pub fn column_types(&self) -> &Schema {
        &self.column_types
    }

    pub fn is_file_backed(&self) -> bool {
        matches!(self.backing, Backing::File(_))
    }

    /// Source file of a file-backed relation
    pub fn source_path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::File(parser) => Some(parser.path()),
            Backing::Memory(_) => None,
        }
    }

    pub fn parser_options(&self) -> Option<&ParserOptions> {
        match &self.backing {
            Backing::File(parser) => Some(parser.options()),
            Backing::Memory(_) => None,
        }
    }

    /// Number of rows.
    ///
    /// O(1) when memory-backed. A file-backed relation performs a full
    /// uncast scan of its source on every call; the count is never cached.
    pub fn len(&self) -> usize {
        match &self.backing {
            Backing::File(parser) => parser.parse(false).count(),
            Backing::Memory(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.backing {
            Backing::File(parser) => parser.parse(false).next().is_none(),
            Backing::Memory(rows) => rows.is_empty(),
        }
    }

    /// Number of rows (same cost as [`Relation::len`])
    pub fn count(&self) -> usize {
        self.len()
    }

    /// One traversal over the rows; file-backed relations cast values to
    /// their inferred types.
    pub(crate) fn scan(&self) -> Scan<'_> {
        match &self.backing {
            Backing::File(parser) => Scan::File(parser.parse(true)),
            Backing::Memory(rows) => Scan::Memory(rows.iter()),
        }
    }

    pub fn to_list(&self) -> Vec<Row> {
        self.scan().map(Cow::into_owned).collect()
    }

    /// Resolves the relation into a memory-backed one with the same columns
    /// and schema. Memory-backed relations are shared, not copied.
    pub fn materialize(&self) -> Relation {
        match &self.backing {
            Backing::File(parser) => {
                let rows = self.to_list();
                debug!(
                    path = %parser.path().display(),
                    rows = rows.len(),
                    "materialized relation"
                );
                self.derive(rows)
            }
            Backing::Memory(_) => self.clone(),
        }
    }

    /// First `n` rows; the traversal stops as soon as they are read.
    pub fn head(&self, n: usize) -> Vec<Row> {
        self.scan().take(n).map(Cow::into_owned).collect()
    }

    /// Reports the rows that normal traversal silently drops or reshapes.
    ///
    /// File-backed: records whose field count differs from the header.
    /// Memory-backed: rows whose key set differs from the declared columns.
    pub fn diagnose(&self) -> ParseSummary {
        match &self.backing {
            Backing::File(parser) => parser.diagnose(),
            Backing::Memory(rows) => {
                let mut errors = Vec::new();
                for (i, row) in rows.iter().enumerate() {
                    for column in self.header.iter().filter(|c| !row.contains_key(*c)) {
                        errors.push(ParseError {
                            row: i + 1,
                            column: column.clone(),
                            value: String::new(),
                            error: "missing column".to_string(),
                        });
                    }
                    for (column, value) in row.iter().filter(|(k, _)| !self.header.contains(k)) {
                        errors.push(ParseError {
                            row: i + 1,
                            column: column.clone(),
                            value: value.to_string(),
                            error: "unexpected column".to_string(),
                        });
                    }
                }
                ParseSummary {
                    rows_processed: rows.len(),
                    errors,
                }
            }
        }
    }
}

impl From<Vec<Row>> for Relation {
    fn from(rows: Vec<Row>) -> Self {
        Relation::from_rows(rows)
    }
}

impl FromIterator<Row> for Relation {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Relation::from_rows(iter.into_iter().collect())
    }
}

/// A single traversal. Memory rows are borrowed, file rows are owned.
pub(crate) enum Scan<'a> {
    File(ParsedRows<'a>),
    Memory(std::slice::Iter<'a, Row>),
}

impl<'a> Iterator for Scan<'a> {
    type Item = Cow<'a, Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Scan::File(rows) => rows.next().map(Cow::Owned),
            Scan::Memory(rows) => rows.next().map(Cow::Borrowed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Value;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_relation_from_str(csv: &str) -> (NamedTempFile, Relation) {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, "{}", csv).unwrap();
        let relation = Relation::from_path(tmp.path()).unwrap();
        (tmp, relation)
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_file_backed_basics() {
        let (_tmp, relation) = make_relation_from_str("id,value\n1,10\n2,20\n3,30\n");
        assert!(relation.is_file_backed());
        assert_eq!(relation.columns(), ["id", "value"]);
        assert_eq!(relation.len(), 3);
        assert_eq!(relation.count(), 3);
        assert!(!relation.is_empty());
        assert_eq!(relation.column_types()["value"], ColumnType::Integer);
    }

    #[test]
    fn test_len_rescans_source() {
        let (mut tmp, relation) = make_relation_from_str("id\n1\n2\n");
        assert_eq!(relation.len(), 2);
        writeln!(tmp, "3").unwrap();
        tmp.flush().unwrap();
        assert_eq!(relation.len(), 3);
    }

    #[test]
    fn test_head_on_both_backings() {
        let (_tmp, relation) = make_relation_from_str("id\n1\n2\n3\n");
        let head = relation.head(2);
        assert_eq!(head, vec![row(&[("id", Value::Int(1))]), row(&[("id", Value::Int(2))])]);
        assert_eq!(relation.materialize().head(10).len(), 3);
        assert!(relation.head(0).is_empty());
    }

    #[test]
    fn test_materialize_round_trip() {
        let (_tmp, relation) = make_relation_from_str("b,a\nx,1\ny,2\n");
        let memory = relation.materialize();
        assert!(!memory.is_file_backed());
        assert_eq!(memory.columns(), relation.columns());
        assert_eq!(memory.column_types(), relation.column_types());

        let rebuilt = Relation::from_rows(memory.to_list());
        assert_eq!(rebuilt.columns(), ["b", "a"]);
        assert_eq!(rebuilt.to_list(), relation.to_list());
    }

    #[test]
    fn test_from_rows_infers_from_first_row() {
        let relation = Relation::from_rows(vec![
            row(&[
                ("a", Value::Int(1)),
                ("b", Value::Float(1.5)),
                ("c", "2".into()),
                ("d", "x".into()),
                ("e", Value::Null),
            ]),
            row(&[("a", "not a number".into())]),
        ]);
        let types = relation.column_types();
        assert_eq!(types["a"], ColumnType::Integer);
        assert_eq!(types["b"], ColumnType::Float);
        assert_eq!(types["c"], ColumnType::Integer);
        assert_eq!(types["d"], ColumnType::Text);
        assert_eq!(types["e"], ColumnType::Text);
    }

    #[test]
    fn test_empty_rows() {
        let relation = Relation::from_rows(Vec::new());
        assert!(relation.columns().is_empty());
        assert!(relation.is_empty());
        assert_eq!(relation.len(), 0);
    }

    #[test]
    fn test_from_relation_shares_backing() {
        let (_tmp, relation) = make_relation_from_str("id\n1\n");
        let adopted = Relation::from_relation(&relation);
        assert!(adopted.is_file_backed());
        assert_eq!(adopted.source_path(), relation.source_path());
        assert_eq!(adopted.to_list(), relation.to_list());
    }

    #[test]
    fn test_diagnose_memory_rows() {
        let relation = Relation::from_rows(vec![
            row(&[("id", Value::Int(1)), ("name", "A".into())]),
            row(&[("id", Value::Int(2))]),
            row(&[("id", Value::Int(3)), ("name", "C".into()), ("extra", "z".into())]),
        ]);
        let summary = relation.diagnose();
        assert_eq!(summary.rows_processed, 3);
        assert_eq!(summary.errors.len(), 2);
        assert_eq!(summary.errors[0].row, 2);
        assert_eq!(summary.errors[0].column, "name");
        assert_eq!(summary.errors[0].error, "missing column");
        assert_eq!(summary.errors[1].column, "extra");
        assert_eq!(summary.errors[1].value, "z");
    }
}
