use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::engine::column::{ColumnType, Schema};
use crate::engine::{EngineError, ParseError, ParseSummary, Row, Value};

const UTF8_BOM: char = '\u{feff}';

/// Options controlling how a delimited source is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Field separator
    pub delimiter: u8,
    /// Number of data records (plus one) sampled for type inference
    pub sample_size: usize,
    /// When false every column is read as text
    pub infer_types: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            delimiter: b',',
            sample_size: 50,
            infer_types: true,
        }
    }
}

impl ParserOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the field separator; only single-byte characters are accepted.
    pub fn with_delimiter(mut self, delimiter: char) -> Result<Self, EngineError> {
        if !delimiter.is_ascii() {
            return Err(EngineError::InvalidDelimiter(delimiter));
        }
        self.delimiter = delimiter as u8;
        Ok(self)
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn with_type_inference(mut self, infer_types: bool) -> Self {
        self.infer_types = infer_types;
        self
    }
}

/// Streaming reader for one delimited text file
///
/// The header and the column types are read once, at construction. Every
/// traversal afterwards reopens the file, so independent traversals never
/// share a cursor and no handle outlives the traversal that opened it.
///
/// # Example
///
/// ```no_run
/// # use tabular_engine::CsvParser;
/// let parser = CsvParser::new("orders.csv")?;
/// println!("{:?}", parser.header());
/// for row in parser.parse(true) {
///     println!("{row:?}");
/// }
/// # Ok::<(), tabular_engine::EngineError>(())
/// ```
#[derive(Debug, Clone)]
pub struct CsvParser {
    path: PathBuf,
    options: ParserOptions,
    header: Vec<String>,
    column_types: Schema,
}

impl CsvParser {
    /// Opens `path` with default [`ParserOptions`]
    ///
    /// # Errors
    /// Returns [`EngineError::SourceNotFound`] if the path does not exist.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        Self::with_options(path, ParserOptions::default())
    }

    pub fn with_options(path: impl AsRef<Path>, options: ParserOptions) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(EngineError::SourceNotFound(path));
        }

        let header = Self::read_header(&path, &options);
        let column_types = if options.infer_types {
            Self::infer_types(&path, &options, &header)
        } else {
            Schema::new()
        };

        debug!(
            path = %path.display(),
            columns = header.len(),
            "opened delimited source"
        );

        Ok(CsvParser {
            path,
            options,
            header,
            column_types,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Column names from the first record
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Inferred schema; empty when inference is disabled
    pub fn column_types(&self) -> &Schema {
        &self.column_types
    }

    /// Streams every well-formed record as a [`Row`].
    ///
    /// Records whose field count differs from the header are skipped. With
    /// `cast`, values are converted to their column type (empty fields
    /// become `Null`, unparsable fields keep their text).
    pub fn parse(&self, cast: bool) -> ParsedRows<'_> {
        let reader = match open_reader(&self.path, &self.options) {
            Ok(reader) => Some(reader),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot reopen source");
                None
            }
        };
        trace!(path = %self.path.display(), cast, "starting traversal");

        ParsedRows {
            parser: self,
            reader,
            record: StringRecord::new(),
            cast,
        }
    }

    /// Same rows as [`CsvParser::parse`], batched into vectors of `size`.
    /// The last batch may be shorter; a size of zero is treated as one.
    pub fn parse_chunks(&self, size: usize, cast: bool) -> RowChunks<'_> {
        RowChunks {
            rows: self.parse(cast),
            size: size.max(1),
        }
    }

    /// Full uncast scan reporting every record that [`CsvParser::parse`] would drop
    pub fn diagnose(&self) -> ParseSummary {
        let mut summary = ParseSummary::default();
        let mut reader = match open_reader(&self.path, &self.options) {
            Ok(reader) => reader,
            Err(e) => {
                summary.errors.push(ParseError {
                    row: 0,
                    column: String::new(),
                    value: String::new(),
                    error: e.to_string(),
                });
                return summary;
            }
        };

        let separator = char::from(self.options.delimiter).to_string();
        let mut record = StringRecord::new();
        loop {
            match reader.read_record(&mut record) {
                Ok(true) => {
                    summary.rows_processed += 1;
                    if record.len() != self.header.len() {
                        summary.errors.push(ParseError {
                            row: line_of(&record),
                            column: String::new(),
                            value: record.iter().collect::<Vec<_>>().join(&separator),
                            error: format!(
                                "Expected {} fields, got {}",
                                self.header.len(),
                                record.len()
                            ),
                        });
                    }
                }
                Ok(false) => break,
                Err(e) => {
                    summary.errors.push(ParseError {
                        row: e.position().map_or(0, |p| p.line() as usize),
                        column: String::new(),
                        value: String::new(),
                        error: e.to_string(),
                    });
                    break;
                }
            }
        }
        summary
    }

    fn read_header(path: &Path, options: &ParserOptions) -> Vec<String> {
        let header = open_reader(path, options)
            .map_err(csv::Error::from)
            .and_then(|mut reader| reader.headers().cloned());

        match header {
            Ok(record) => record
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    if i == 0 {
                        name.trim_start_matches(UTF8_BOM).to_string()
                    } else {
                        name.to_string()
                    }
                })
                .collect(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable header");
                Vec::new()
            }
        }
    }

    /// Samples up to `sample_size + 1` records. Every column starts as
    /// `Integer` and is demoted by the values it sees.
    fn infer_types(path: &Path, options: &ParserOptions, header: &[String]) -> Schema {
        let mut types: Schema = header
            .iter()
            .map(|name| (name.clone(), ColumnType::Integer))
            .collect();

        let mut reader = match open_reader(path, options) {
            Ok(reader) => reader,
            Err(_) => return types,
        };

        let mut record = StringRecord::new();
        for _ in 0..=options.sample_size {
            match reader.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "type inference stopped early");
                    break;
                }
            }
            for (name, raw) in header.iter().zip(record.iter()) {
                if let Some(ty) = types.get_mut(name) {
                    *ty = ty.observe(raw);
                }
            }
        }

        types
    }

    fn column_type(&self, name: &str) -> ColumnType {
        self.column_types
            .get(name)
            .copied()
            .unwrap_or(ColumnType::Text)
    }

    fn build_row(&self, record: &StringRecord, cast: bool) -> Row {
        self.header
            .iter()
            .zip(record.iter())
            .map(|(name, raw)| {
                let value = if cast {
                    self.column_type(name).cast(raw)
                } else {
                    Value::from(raw)
                };
                (name.clone(), value)
            })
            .collect()
    }
}

fn open_reader(path: &Path, options: &ParserOptions) -> std::io::Result<csv::Reader<File>> {
    let file = File::open(path)?;
    Ok(ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(file))
}

fn line_of(record: &StringRecord) -> usize {
    record.position().map_or(0, |p| p.line() as usize)
}

/// One traversal over a [`CsvParser`]'s source
#[derive(Debug)]
pub struct ParsedRows<'a> {
    parser: &'a CsvParser,
    reader: Option<csv::Reader<File>>,
    record: StringRecord,
    cast: bool,
}

impl Iterator for ParsedRows<'_> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        loop {
            let reader = self.reader.as_mut()?;
            match reader.read_record(&mut self.record) {
                Ok(true) => {
                    if self.record.len() != self.parser.header.len() {
                        debug!(
                            line = line_of(&self.record),
                            expected = self.parser.header.len(),
                            found = self.record.len(),
                            "dropping malformed record"
                        );
                        continue;
                    }
                    return Some(self.parser.build_row(&self.record, self.cast));
                }
                Ok(false) => {
                    // closes the file
                    self.reader = None;
                    return None;
                }
                Err(e) => {
                    warn!(
                        path = %self.parser.path.display(),
                        error = %e,
                        "CSV parse error, ending traversal"
                    );
                    self.reader = None;
                    return None;
                }
            }
        }
    }
}

/// Fixed-size batches over a [`ParsedRows`] traversal
#[derive(Debug)]
pub struct RowChunks<'a> {
    rows: ParsedRows<'a>,
    size: usize,
}

impl Iterator for RowChunks<'_> {
    type Item = Vec<Row>;

    fn next(&mut self) -> Option<Vec<Row>> {
        let batch: Vec<Row> = self.rows.by_ref().take(self.size).collect();
        if batch.is_empty() { None } else { Some(batch) }
    }
}
