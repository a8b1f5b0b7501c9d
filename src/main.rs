use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use u_assoc::config::AnalysisConfig;
use u_assoc::csv_parser::CsvParser;
use u_assoc::dataset::{ColumnRules, Dataset};
use u_assoc::pipeline::{self, OutputLayout};

#[derive(Parser)]
#[command(
    name = "u-assoc",
    version,
    about = "Association analysis for mixed categorical/numerical tables"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: Options,
}

#[derive(Subcommand)]
enum Commands {
    /// Normality screen, association tests and FDR correction
    Correlate {
        /// Input CSV file
        input: PathBuf,
    },
    /// Post-hoc comparisons for significant associations
    Posthoc {
        /// Input CSV file (same as for `correlate`)
        input: PathBuf,
    },
    /// Interpret significant post-hoc comparisons
    Interpret,
    /// All three stages
    Run {
        /// Input CSV file
        input: PathBuf,
    },
}

#[derive(Args)]
struct Options {
    /// Output directory
    #[arg(short, long, global = true, default_value = ".")]
    output: PathBuf,

    /// JSON file with analysis thresholds
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Column name suffix marking categorical variables
    #[arg(long, global = true, default_value = "CAT")]
    categorical_suffix: String,

    /// Identifier column excluded from analysis ("" for none)
    #[arg(long, global = true, default_value = "strain_id")]
    id_column: String,

    /// Field delimiter
    #[arg(long, global = true, default_value_t = ',')]
    delimiter: char,

    /// Normality significance level
    #[arg(long, global = true)]
    normality_alpha: Option<f64>,

    /// Corrected p-value threshold for post-hoc tests
    #[arg(long, global = true)]
    fdr_alpha: Option<f64>,

    /// Post-hoc p-value threshold for interpretation
    #[arg(long, global = true)]
    posthoc_alpha: Option<f64>,

    /// Pairs need more complete rows than this
    #[arg(long, global = true)]
    min_rows: Option<usize>,

    /// Groups need more rows than this
    #[arg(long, global = true)]
    min_group_size: Option<usize>,

    /// Print the stage summary as JSON on stdout
    #[arg(long, global = true)]
    json: bool,
}

impl Options {
    fn analysis_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => AnalysisConfig::default(),
        };
        if let Some(v) = self.normality_alpha {
            config.normality_alpha = v;
        }
        if let Some(v) = self.fdr_alpha {
            config.fdr_alpha = v;
        }
        if let Some(v) = self.posthoc_alpha {
            config.posthoc_alpha = v;
        }
        if let Some(v) = self.min_rows {
            config.min_complete_rows = v;
        }
        if let Some(v) = self.min_group_size {
            config.min_group_size = v;
        }
        Ok(config)
    }

    fn load(&self, input: &Path) -> Result<Dataset> {
        if !self.delimiter.is_ascii() {
            anyhow::bail!("delimiter must be an ASCII character");
        }
        let rules = ColumnRules {
            categorical_suffix: self.categorical_suffix.clone(),
            id_column: Some(self.id_column.clone()).filter(|s| !s.is_empty()),
            ..ColumnRules::default()
        };
        CsvParser::new()
            .delimiter(self.delimiter as u8)
            .rules(rules)
            .parse_file(input)
            .with_context(|| format!("loading {}", input.display()))
    }

    fn report<T: Serialize + std::fmt::Debug>(&self, summary: &T) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(summary)?);
        } else {
            println!("{summary:#?}");
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let opts = &cli.options;
    let config = opts.analysis_config()?;
    let layout = OutputLayout::new(&opts.output);

    match &cli.command {
        Commands::Correlate { input } => {
            let ds = opts.load(input)?;
            let summary = pipeline::run_correlation(&ds, &layout, &config)
                .context("correlation stage failed")?;
            opts.report(&summary)?;
        }
        Commands::Posthoc { input } => {
            let ds = opts.load(input)?;
            let summary = pipeline::run_posthoc(&ds, &layout, &config)
                .context("post-hoc stage failed")?;
            opts.report(&summary)?;
        }
        Commands::Interpret => {
            let summary = pipeline::run_interpretation(&layout, &config)
                .context("interpretation stage failed")?;
            opts.report(&summary)?;
        }
        Commands::Run { input } => {
            let ds = opts.load(input)?;
            let summary =
                pipeline::run_all(&ds, &layout, &config).context("pipeline failed")?;
            opts.report(&summary)?;
        }
    }

    Ok(())
}
