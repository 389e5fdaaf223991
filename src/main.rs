use anyhow::{Context, Result};
use clap::Parser;
use jive::cli::{Cli, OutputFormat};
use jive::output::{format_text, JsonReport, MomentCsv};
use jive::{AnalysisConfig, JiveAnalysis, SqliteExecutor};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(args: &Cli) -> Result<AnalysisConfig> {
    let base = match &args.config {
        Some(path) => Some(
            AnalysisConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
        ),
        None => None,
    };
    args.resolve_config(base)
        .context("invalid analysis configuration")
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    let config = load_config(&args)?;
    let analysis = JiveAnalysis::new(config)?;

    if args.show_sql {
        let query = analysis.moment_query()?;
        println!("{};", query.moments_query());
        return Ok(());
    }

    let db = args
        .db
        .as_ref()
        .context("--db is required unless --show-sql is given")?;
    let executor = SqliteExecutor::open(db)
        .with_context(|| format!("opening database {}", db.display()))?;

    let report = analysis
        .run(&executor)
        .with_context(|| format!("analysing table '{}'", analysis.config().table))?;

    match args.format {
        OutputFormat::Text => print!("{}", format_text(&report)),
        OutputFormat::Json => println!("{}", JsonReport::from_report(&report).to_json()?),
        OutputFormat::Csv => print!("{}", MomentCsv::new(&report.moments).to_csv()),
    }

    Ok(())
}
