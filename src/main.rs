use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tabular_engine::{AggregateSpec, ParserOptions, Relation};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Inspect and query delimited text files.
///
/// Results are printed as JSON. Set `RUST_LOG=debug` to see dropped records.
#[derive(Parser)]
#[clap(name = "tabular", version)]
struct Arguments {
    /// Field separator (single byte).
    #[clap(long, short, env = "TABULAR_DELIMITER", default_value_t = ',')]
    delimiter: char,

    /// Number of records sampled for type inference.
    #[clap(long, env = "TABULAR_SAMPLE_SIZE", default_value_t = 50)]
    sample_size: usize,

    /// Read every column as text.
    #[clap(long)]
    no_infer: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the header and the inferred column types.
    Schema { path: PathBuf },

    /// Print the first rows.
    Head {
        path: PathBuf,
        #[clap(short = 'n', long, default_value_t = 10)]
        rows: usize,
    },

    /// Summary statistics for every numeric column.
    Describe { path: PathBuf },

    /// Count, min, max, mean and std of one column.
    Stats { path: PathBuf, column: String },

    /// Group rows and aggregate columns.
    ///
    /// Aggregates are given as `column=function`, e.g. `--agg amount=sum`.
    /// Functions: count, sum, mean (avg), min, max, std.
    Group {
        path: PathBuf,
        /// Grouping column; all rows form one group when omitted.
        #[clap(long)]
        by: Option<String>,
        #[clap(long = "agg", value_parser = parse_aggregate, required = true)]
        aggregates: Vec<(String, String)>,
    },

    /// Sort rows by a column.
    Sort {
        path: PathBuf,
        column: String,
        #[clap(long)]
        desc: bool,
        #[clap(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Inner equality join of two files.
    Join {
        left: PathBuf,
        right: PathBuf,
        #[clap(long)]
        left_on: String,
        #[clap(long)]
        right_on: String,
        #[clap(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Report records that normal reads drop.
    Check { path: PathBuf },
}

fn parse_aggregate(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((column, func)) if !column.is_empty() && !func.is_empty() => {
            Ok((column.to_string(), func.to_string()))
        }
        _ => Err(format!("expected COLUMN=FUNCTION, got {s:?}")),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Arguments::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = ParserOptions::new()
        .with_delimiter(args.delimiter)?
        .with_sample_size(args.sample_size)
        .with_type_inference(!args.no_infer);
    debug!(?options, "parser options");

    let open = |path: &Path| Relation::from_path_with(path, options);

    match args.command {
        Command::Schema { path } => {
            let relation = open(&path)?;
            print_json(&json!({
                "columns": relation.columns(),
                "types": relation.column_types(),
            }))?;
        }
        Command::Head { path, rows } => {
            print_json(&open(&path)?.head(rows))?;
        }
        Command::Describe { path } => {
            print_json(&open(&path)?.describe().to_list())?;
        }
        Command::Stats { path, column } => {
            let relation = open(&path)?;
            print_json(&json!({
                "column": column,
                "count": relation.count(),
                "min": relation.min(&column),
                "max": relation.max(&column),
                "mean": relation.mean(&column),
                "std": relation.std(&column),
            }))?;
        }
        Command::Group {
            path,
            by,
            aggregates,
        } => {
            let spec = AggregateSpec::parse(aggregates)?;
            let relation = open(&path)?;
            let groups = relation.groupby(by.as_deref());
            print_json(&relation.aggregate(&groups, &spec).to_list())?;
        }
        Command::Sort {
            path,
            column,
            desc,
            limit,
        } => {
            let sorted = open(&path)?.sort_by(&column, desc);
            print_json(&sorted.head(limit.unwrap_or(usize::MAX)))?;
        }
        Command::Join {
            left,
            right,
            left_on,
            right_on,
            limit,
        } => {
            let joined = open(&left)?.join(&open(&right)?, &left_on, &right_on);
            print_json(&joined.head(limit.unwrap_or(usize::MAX)))?;
        }
        Command::Check { path } => {
            let summary = open(&path)?.diagnose();
            print_json(&summary)?;
            if !summary.errors.is_empty() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
