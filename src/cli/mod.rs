use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// engraft: reconcile transplant-outcome datasets and predict engraftment success
#[derive(Parser, Debug)]
#[command(name = "engraft")]
#[command(about = "Reconcile transplant-outcome datasets and predict engraftment success")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "ENGRAFT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the combined canonical dataset from the raw sources
    ///
    /// Sources may be CSV/TSV (optionally gzipped) or Excel/ODS workbooks.
    /// SAS tables (.sas7bdat) are not read directly: export them to CSV and
    /// point the source at the export, otherwise the source is skipped.
    Reconcile(ReconcileArgs),

    /// Check a canonical dataset against the schema
    Validate(ValidateArgs),

    /// Train a model on a canonical dataset
    Train(TrainArgs),

    /// Predict every row of a canonical dataset
    Predict(PredictArgs),

    /// Serve predictions over HTTP
    Serve(ServeArgs),
}

/// Reconciliation arguments
#[derive(Parser, Debug)]
pub struct ReconcileArgs {
    /// Output CSV (overrides the configuration)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JSON report path (overrides the configuration)
    #[arg(short, long)]
    pub report: Option<PathBuf>,
}

/// Validation arguments
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Canonical dataset CSV
    #[arg(short, long, required = true)]
    pub input: PathBuf,

    /// Write the issues as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Training arguments
#[derive(Parser, Debug)]
pub struct TrainArgs {
    /// Canonical dataset CSV
    #[arg(short, long, required = true)]
    pub input: PathBuf,

    /// Output directory for the model artifacts
    #[arg(short, long, default_value = "models")]
    pub output: PathBuf,

    /// Number of training epochs
    #[arg(short, long)]
    pub epochs: Option<usize>,

    /// Batch size
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Learning rate
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Test ratio
    #[arg(long)]
    pub test_ratio: Option<f64>,

    /// Train on the imbalanced split as is
    #[arg(long)]
    pub no_oversample: bool,

    /// Quick test mode (fewer epochs, smaller model)
    #[arg(long)]
    pub quick: bool,
}

/// Output format for batch predictions
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
}

/// Prediction arguments
#[derive(Parser, Debug)]
pub struct PredictArgs {
    /// Canonical dataset CSV
    #[arg(short, long, required = true)]
    pub input: PathBuf,

    /// Model artifacts directory
    #[arg(short, long, default_value = "models")]
    pub model: PathBuf,

    /// Output file for predictions
    #[arg(short, long, default_value = "predictions.csv")]
    pub output: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,

    /// Probability threshold for a positive prediction
    #[arg(long, default_value = "0.5")]
    pub threshold: f64,
}

/// Serving arguments
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Model artifacts directory (overrides the configuration)
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Bind host (overrides the configuration)
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port (overrides the configuration)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Setup logging based on verbosity
pub fn setup_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::parse_from(["engraft", "train", "-i", "data.csv"]);

        match cli.command {
            Commands::Train(args) => {
                assert_eq!(args.input, PathBuf::from("data.csv"));
                assert_eq!(args.output, PathBuf::from("models"));
                assert_eq!(args.epochs, None);
                assert!(!args.no_oversample);
            }
            _ => panic!("Expected Train command"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["engraft", "reconcile", "--config", "engraft.toml", "-v"]);
        assert_eq!(cli.config, Some(PathBuf::from("engraft.toml")));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Reconcile(ReconcileArgs { output: None, .. })));
    }

    #[test]
    fn test_predict_args() {
        let cli = Cli::parse_from([
            "engraft", "predict",
            "-i", "input.csv",
            "-m", "artifacts",
            "-f", "json",
        ]);

        match cli.command {
            Commands::Predict(args) => {
                assert_eq!(args.input, PathBuf::from("input.csv"));
                assert_eq!(args.model, PathBuf::from("artifacts"));
                assert_eq!(args.format, OutputFormat::Json);
                assert_eq!(args.output, PathBuf::from("predictions.csv"));
            }
            _ => panic!("Expected Predict command"),
        }
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::parse_from(["engraft", "serve", "-p", "9000"]);
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.port, Some(9000));
                assert_eq!(args.host, None);
            }
            _ => panic!("Expected Serve command"),
        }
    }
}
