//! CLI runner shared by the `fsarmor` binary: installs logging, then
//! dispatches the parsed subcommand to the library.
//!
//! Standard output carries the archive stream for `join`, so every log line
//! goes to standard error.

use std::io::{self, BufReader, BufWriter, Write};

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{self, Commands};
use crate::{join, split, verify_tree};

/// Installs the `tracing` subscriber. `RUST_LOG` wins over `-v` when set.
pub fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli::default_log_filter(verbose)));

    // A second init (e.g. from tests) is harmless; keep the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

/// Public entry for running CLI logic.
pub fn run_cli_app() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::run()?;
    init_tracing(args.verbose);

    match &args.command {
        Commands::Split { dir } => {
            let stdin = io::stdin();
            let report = split(BufReader::new(stdin.lock()), dir)?;
            info!(
                dir = %dir.display(),
                entries = report.entries,
                ambiguous_symlinks = report.ambiguous_symlinks.len(),
                "split finished"
            );
        }
        Commands::Join { dir } => {
            let stdout = io::stdout();
            let (mut out, report) = join(dir, BufWriter::new(stdout.lock()))?;
            out.flush()?;
            info!(dir = %dir.display(), entries = report.entries, "join finished");
        }
        Commands::Verify { dir, json } => {
            let report = verify_tree(dir)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{}: OK ({} data entries, {} records, {} metadata-only, {} payload bytes)",
                    dir.display(),
                    report.data_entries,
                    report.records,
                    report.metadata_only,
                    report.payload_bytes
                );
            }
        }
    }

    Ok(())
}
