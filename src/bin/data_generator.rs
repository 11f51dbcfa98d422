use clap::Parser;
use rand::Rng;
use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

const CATEGORIES: [&str; 4] = ["books", "garden", "toys", "tools"];
const REGIONS: [&str; 6] = ["US", "EU", "ASIA", "AFRICA", "AUSTRALIA", "SOUTH AMERICA"];

/// Writes a synthetic orders CSV for trying out the `tabular` CLI.
#[derive(Parser)]
struct Arguments {
    /// Output file.
    #[clap(short, long, default_value = "data/orders.csv")]
    output: PathBuf,

    /// Number of order rows.
    #[clap(short, long, default_value_t = 1_000_000)]
    rows: usize,

    /// Number of distinct customers referenced by the orders.
    #[clap(long, default_value_t = 10_000)]
    customers: usize,

    /// Also write a customers file next to the orders.
    #[clap(long)]
    with_customers: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Arguments::parse();
    let customers = args.customers.max(1);
    if let Some(dir) = args.output.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let mut writer = BufWriter::new(File::create(&args.output)?);
    writeln!(writer, "id,customer_id,category,region,amount")?;

    let mut rng = rand::rng();
    for i in 0..args.rows {
        let customer = rng.random_range(1..=customers);
        let category = CATEGORIES[rng.random_range(0..CATEGORIES.len())];
        let region = REGIONS[rng.random_range(0..REGIONS.len())];

        match rng.random_range(0..1000) {
            // blank amount
            0..=9 => writeln!(writer, "{i},{customer},{category},{region},")?,
            // malformed record: one field short
            10 => writeln!(writer, "{i},{customer},{category}")?,
            _ => {
                let amount = rng.random_range(100..100_000) as f64 / 100.0;
                writeln!(writer, "{i},{customer},{category},{region},{amount:.2}")?;
            }
        }
    }
    writer.flush()?;
    println!("Orders CSV generated: {}", args.output.display());

    if args.with_customers {
        let path = args.output.with_file_name("customers.csv");
        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "id,name,tier")?;
        for id in 1..=customers {
            let tier = ["bronze", "silver", "gold"][rng.random_range(0..3)];
            writeln!(writer, "{id},customer_{id},{tier}")?;
        }
        writer.flush()?;
        println!("Customers CSV generated: {}", path.display());
    }

    Ok(())
}
