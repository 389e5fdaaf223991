//! CLI argument parsing for jive

use crate::column_map::ColumnMap;
use crate::config::AnalysisConfig;
use crate::covariance::Weighting;
use crate::error::{JiveError, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for the analysis report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
    /// CSV of the moment table
    Csv,
}

/// Row weighting as spelled on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WeightingArg {
    RowCount,
    Uniform,
}

impl From<WeightingArg> for Weighting {
    fn from(arg: WeightingArg) -> Self {
        match arg {
            WeightingArg::RowCount => Weighting::RowCount,
            WeightingArg::Uniform => Weighting::Uniform,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "jive")]
#[command(version)]
#[command(
    about = "Jackknife instrumental-variable estimates from experiment tables in SQLite",
    long_about = None
)]
pub struct Cli {
    /// SQLite database file (opened read-only)
    #[arg(long = "db", value_name = "FILE", required_unless_present = "show_sql")]
    pub db: Option<PathBuf>,

    /// TOML analysis config; flags below override its values
    #[arg(short, long, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Observation table
    #[arg(short, long, value_name = "TABLE")]
    pub table: Option<String>,

    /// Column identifying the experiment
    #[arg(long = "test-id", value_name = "COLUMN")]
    pub test_id: Option<String>,

    /// Column identifying the arm; the smallest value is each test's reference
    #[arg(long = "treatment-id", value_name = "COLUMN")]
    pub treatment_id: Option<String>,

    /// Outcome column (regressand)
    #[arg(short, long, value_name = "COLUMN")]
    pub outcome: Option<String>,

    /// Mediator column (regressor); repeatable
    #[arg(short, long = "mediator", value_name = "COLUMN")]
    pub mediators: Vec<String>,

    /// Row weighting for the effect covariance
    #[arg(long, value_enum)]
    pub weighting: Option<WeightingArg>,

    /// Largest condition number of X'X accepted by the solver
    #[arg(long = "max-condition-number", value_name = "X")]
    pub max_condition_number: Option<f64>,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Print the composed moment query and exit without connecting
    #[arg(long = "show-sql")]
    pub show_sql: bool,

    /// Enable debug tracing on stderr
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Merge flags over an optional base config and validate the result
    pub fn resolve_config(&self, base: Option<AnalysisConfig>) -> Result<AnalysisConfig> {
        let mut config = match base {
            Some(config) => config,
            None => {
                let missing = |flag: &str| {
                    JiveError::Config(format!("{} is required without --config", flag))
                };
                let columns = ColumnMap::new(
                    self.test_id.clone().ok_or_else(|| missing("--test-id"))?,
                    self.treatment_id
                        .clone()
                        .ok_or_else(|| missing("--treatment-id"))?,
                    self.outcome.clone().ok_or_else(|| missing("--outcome"))?,
                    Vec::new(),
                );
                AnalysisConfig::new(
                    self.table.clone().ok_or_else(|| missing("--table"))?,
                    columns,
                )
            }
        };

        if let Some(table) = &self.table {
            config.table = table.clone();
        }
        if let Some(test_id) = &self.test_id {
            config.columns.test_id = test_id.clone();
        }
        if let Some(treatment_id) = &self.treatment_id {
            config.columns.treatment_id = treatment_id.clone();
        }
        if let Some(outcome) = &self.outcome {
            config.columns.outcome = outcome.clone();
        }
        if !self.mediators.is_empty() {
            config.columns.mediators = self.mediators.clone();
        }
        if let Some(weighting) = self.weighting {
            config.weighting = weighting.into();
        }
        if let Some(max) = self.max_condition_number {
            config.solver.max_condition_number = max;
        }

        config.validate()?;
        Ok(config)
    }
}
