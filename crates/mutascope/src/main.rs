use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mutascope_core::config::{Config, CONFIG_FILE};
use mutascope_core::pipeline::{AnalysisPipeline, AnalysisResult};
use mutascope_core::OperatorCatalog;

use mutascope_report::{json, sonar, text};

#[derive(Parser)]
#[command(name = "mutascope")]
#[command(about = "Turn PIT mutation reports into per-file metrics and actionable issues")]
#[command(version)]
struct Cli {
    /// Log progress to stderr (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a module's mutation report and print a full report
    Analyze {
        /// Path to the module (the directory containing target/pit-reports)
        path: PathBuf,
        /// Config file path (defaults to .mutascope.toml in the module or an ancestor)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Single-line JSON output
        #[arg(long)]
        compact: bool,
        /// Collect every module of the build (overrides the config file)
        #[arg(long)]
        experimental: bool,
        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Analyze and exit with code 0 (no issues) or 1 (issues found)
    Check {
        /// Path to the module
        path: PathBuf,
        /// Also fail when project mutation coverage is below this percentage
        #[arg(long)]
        min_coverage: Option<f64>,
        /// Output format (text or json)
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Create a default .mutascope.toml configuration file
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
    /// List the known mutation operators
    Operators,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    /// SonarQube generic issue import format
    Sonar,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Analyze {
            path,
            config,
            format,
            compact,
            experimental,
            output,
        } => cmd_analyze(
            &path,
            config.as_deref(),
            format,
            compact,
            experimental,
            output.as_deref(),
        ),
        Commands::Check {
            path,
            min_coverage,
            format,
            config,
        } => cmd_check(&path, min_coverage, format, config.as_deref()),
        Commands::Init { force } => cmd_init(force),
        Commands::Operators => cmd_operators(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(2);
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn cmd_analyze(
    path: &Path,
    config_path: Option<&Path>,
    format: OutputFormat,
    compact: bool,
    experimental: bool,
    output: Option<&Path>,
) -> Result<()> {
    let mut config = load_config(path, config_path)?;
    if experimental {
        config.project.experimental_features = true;
    }
    let result = run_analysis(path, config)?;

    let report = match format {
        OutputFormat::Text => text::format_report(&result),
        OutputFormat::Json => json::format_report(&result, compact) + "\n",
        OutputFormat::Sonar => sonar::format_report(&result) + "\n",
    };

    match output {
        Some(target) => {
            std::fs::write(target, report)
                .with_context(|| format!("failed to write '{}'", target.display()))?;
            tracing::info!("Report written to {}", target.display());
        }
        None => print!("{report}"),
    }
    Ok(())
}

fn cmd_check(
    path: &Path,
    min_coverage: Option<f64>,
    format: OutputFormat,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = load_config(path, config_path)?;
    let min_coverage = min_coverage.or(config.rules.min_coverage);
    let result = run_analysis(path, config)?;

    let (report, passed) = match format {
        OutputFormat::Text => text::format_check(&result, min_coverage),
        OutputFormat::Json => {
            let (json, passed) = json::format_check(&result, min_coverage, false);
            (json + "\n", passed)
        }
        OutputFormat::Sonar => anyhow::bail!("check supports the text and json formats"),
    };
    print!("{report}");
    if !passed {
        process::exit(1);
    }
    Ok(())
}

fn cmd_init(force: bool) -> Result<()> {
    let target = PathBuf::from(CONFIG_FILE);
    if target.exists() && !force {
        anyhow::bail!("{CONFIG_FILE} already exists. Use --force to overwrite.");
    }
    std::fs::write(&target, Config::default_toml())?;
    println!("Created {CONFIG_FILE} with default configuration.");
    Ok(())
}

fn cmd_operators() -> Result<()> {
    let catalog = OperatorCatalog::builtin();
    for operator in catalog.all_operators() {
        let marker = if operator.is_experimental() {
            " (experimental)"
        } else {
            ""
        };
        println!("{:<34} {}{marker}", operator.id, operator.name);
    }
    Ok(())
}

fn load_config(module_path: &Path, config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(p) => Config::load(p),
        None => Ok(Config::load_or_default(module_path)),
    }
}

fn run_analysis(module_path: &Path, config: Config) -> Result<AnalysisResult> {
    if !module_path.is_dir() {
        anyhow::bail!("'{}' is not a directory", module_path.display());
    }
    let pipeline = AnalysisPipeline::new(OperatorCatalog::builtin(), config);
    Ok(pipeline.analyze(module_path))
}
