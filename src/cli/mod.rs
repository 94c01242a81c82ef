use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase log verbosity on stderr (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Read a tar stream from standard input and split it into an armored tree.
    #[command(alias = "s")]
    Split {
        /// The armored tree to create or add to.
        #[arg(required = true)]
        dir: PathBuf,
    },

    /// Join an armored tree back into a tar stream on standard output.
    #[command(alias = "j")]
    Join {
        /// The armored tree to read.
        #[arg(required = true)]
        dir: PathBuf,
    },

    /// Check that an armored tree is consistent without modifying it.
    #[command(alias = "v")]
    Verify {
        /// The armored tree to check.
        #[arg(required = true)]
        dir: PathBuf,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Maps the `-v` count to a default log filter.
pub fn default_log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Parses command-line arguments using `clap` and returns them.
///
/// Missing or invalid arguments make clap print the usage text and exit with
/// a non-zero status before this returns.
pub fn run() -> Result<Args, Box<dyn std::error::Error>> {
    let args = Args::parse();
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands() {
        let args = Args::try_parse_from(["fsarmor", "split", "out"]).unwrap();
        assert!(matches!(args.command, Commands::Split { ref dir } if dir == &PathBuf::from("out")));

        let args = Args::try_parse_from(["fsarmor", "-vv", "j", "out"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert!(matches!(args.command, Commands::Join { .. }));

        let args = Args::try_parse_from(["fsarmor", "v", "out", "--json"]).unwrap();
        assert!(matches!(args.command, Commands::Verify { json: true, .. }));
    }

    #[test]
    fn missing_dir_is_a_usage_error() {
        assert!(Args::try_parse_from(["fsarmor", "split"]).is_err());
        assert!(Args::try_parse_from(["fsarmor"]).is_err());
        assert!(Args::try_parse_from(["fsarmor", "frobnicate", "x"]).is_err());
    }

    #[test]
    fn verbosity_levels() {
        assert_eq!(default_log_filter(0), "warn");
        assert_eq!(default_log_filter(1), "info");
        assert_eq!(default_log_filter(5), "trace");
    }
}
