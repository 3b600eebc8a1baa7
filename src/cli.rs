//! CLI argument parsing for veredicto

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for plans and verdicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable report (default)
    Text,
    /// JSON for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "veredicto")]
#[command(version)]
#[command(about = "Statistical pass/fail verdicts for non-deterministic tests", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Enable debug tracing output (to stderr)
    #[arg(long = "debug", global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a plan's threshold and print the sample size and threshold
    Plan {
        /// Run plan (TOML)
        #[arg(value_name = "FILE")]
        plan: PathBuf,
    },

    /// Compose a verdict from externally recorded trial counts
    Evaluate {
        /// Run plan (TOML)
        #[arg(value_name = "FILE")]
        plan: PathBuf,

        /// Successful trials observed
        #[arg(short = 'k', long = "successes", value_name = "K")]
        successes: u64,

        /// Trials executed
        #[arg(short = 'n', long = "samples", value_name = "N")]
        samples: u64,
    },

    /// Run the plan against a synthetic executor with a fixed success rate
    Simulate {
        /// Run plan (TOML)
        #[arg(value_name = "FILE")]
        plan: PathBuf,

        /// True success rate of the synthetic executor
        #[arg(short = 'r', long = "rate", value_name = "P")]
        rate: f64,

        /// Seed for a reproducible simulation
        #[arg(short = 's', long = "seed", value_name = "SEED")]
        seed: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_plan() {
        let cli = Cli::parse_from(["veredicto", "plan", "plan.toml"]);
        match cli.command {
            Command::Plan { plan } => assert_eq!(plan, PathBuf::from("plan.toml")),
            other => panic!("Expected Plan, got {:?}", other),
        }
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_parses_evaluate_counts() {
        let cli = Cli::parse_from([
            "veredicto",
            "evaluate",
            "plan.toml",
            "--successes",
            "93",
            "--samples",
            "100",
        ]);
        match cli.command {
            Command::Evaluate {
                successes, samples, ..
            } => {
                assert_eq!(successes, 93);
                assert_eq!(samples, 100);
            }
            other => panic!("Expected Evaluate, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "veredicto", "simulate", "plan.toml", "--rate", "0.9", "--seed", "7", "--format",
            "json", "--debug",
        ]);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.debug);
        match cli.command {
            Command::Simulate { rate, seed, .. } => {
                assert_eq!(rate, 0.9);
                assert_eq!(seed, Some(7));
            }
            other => panic!("Expected Simulate, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_evaluate_requires_counts() {
        assert!(Cli::try_parse_from(["veredicto", "evaluate", "plan.toml"]).is_err());
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["veredicto", "--format", "csv", "plan", "p.toml"]).is_err());
    }
}
