// ========================================================================================
//
//                        THE COMMAND-LINE FRONT DOOR: HEARTPREP
//
// ========================================================================================
//
// Parses the command line, assembles a `PipelineConfig`, and hands it to the library.
// No data logic lives here. On failure the message is printed and the process exits
// with a non-zero status; the library guarantees nothing was written by then.

#![deny(dead_code)]
#![deny(unused_imports)]

use clap::Parser;
use env_logger::Env;
use heartprep::mappings::Mappings;
use heartprep::pipeline::{self, DEFAULT_SEED, DEFAULT_TARGET, DEFAULT_TEST_FRACTION, PipelineConfig};
use std::error::Error;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(
    name = "heartprep",
    version,
    about = "Clean, encode, scale, and split the 2022 heart-health survey.",
    long_about = "Normalizes the raw survey answers into canonical codes, min-max scales the \
                  numeric features over the full dataset, and writes a reproducible stratified \
                  train/test split keyed on the target label."
)]
struct Cli {
    /// Path to the raw survey file (comma separated, or tab separated for .tsv)
    #[arg(long, value_name = "PATH", required_unless_present = "dump_mappings")]
    input: Option<PathBuf>,

    /// Output directory for the cleaned dataset and both partitions
    #[arg(long, value_name = "DIR", required_unless_present = "dump_mappings")]
    outdir: Option<PathBuf>,

    /// Fraction of each target class routed to the test partition
    #[arg(long, alias = "test_frac", default_value_t = DEFAULT_TEST_FRACTION)]
    test_frac: f64,

    /// Seed for the stratified sampling
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Also write a CSV copy of every artifact
    #[arg(long, alias = "write_csv")]
    write_csv: bool,

    /// Binary target column used for stratification
    #[arg(long, default_value = DEFAULT_TARGET)]
    target: String,

    /// TOML file replacing the built-in normalization tables
    #[arg(long, value_name = "PATH")]
    mappings: Option<PathBuf>,

    /// Worker threads for the row-parallel stages (defaults to all cores)
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Print the built-in normalization tables as TOML and exit
    #[arg(long)]
    dump_mappings: bool,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(e) = execute(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn execute(cli: Cli) -> Result<(), Box<dyn Error>> {
    if cli.dump_mappings {
        print!("{}", Mappings::default().to_toml_string()?);
        return Ok(());
    }

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    let (Some(input), Some(outdir)) = (cli.input, cli.outdir) else {
        return Err("both --input and --outdir are required".into());
    };

    let mut config = PipelineConfig::new(input, outdir);
    config.test_fraction = cli.test_frac;
    config.seed = cli.seed;
    config.write_csv = cli.write_csv;
    config.target = cli.target;
    if let Some(path) = cli.mappings {
        config.mappings = Mappings::from_path(&path)?;
    }

    let report = pipeline::run(&config)?;
    log::info!(
        "{} rows: {} train, {} test",
        report.rows,
        report.train_rows,
        report.test_rows
    );
    for stratum in &report.strata {
        log::info!(
            "Stratum {}={}: {} of {} rows in test ({:.4} realized, {:.4} requested)",
            config.target,
            stratum.label,
            stratum.test_rows,
            stratum.rows,
            stratum.realized_fraction(),
            stratum.requested_fraction
        );
    }

    println!(
        "✅ Wrote:\n  {}\n  {}\n  {}",
        report.paths.clean.display(),
        report.paths.train.display(),
        report.paths.test.display()
    );
    if let Some(csv) = &report.paths.csv {
        for path in csv {
            println!("  {}", path.display());
        }
    }
    Ok(())
}
