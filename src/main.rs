use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use filing_insights::config::{RawTable, Settings};
use filing_insights::dashboard::{Session, Tab};
use filing_insights::render;
use filing_insights::warehouse::local::LocalWarehouse;
use filing_insights::warehouse::snowflake::SnowflakeWarehouse;
use filing_insights::warehouse::Warehouse;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "filing-insights")]
#[command(about = "Risk & compliance dashboard over SEC filings held in a data warehouse")]
struct Cli {
    /// Which warehouse to talk to
    #[arg(long, value_enum, env = "FILING_BACKEND", default_value = "snowflake")]
    backend: Backend,

    /// CSV fixtures for the local backend
    #[arg(long, default_value = "demo")]
    fixtures: PathBuf,

    /// Stage directory for the local backend
    #[arg(long, env = "FILING_STAGE_ROOT", default_value = "stage")]
    stage_dir: PathBuf,

    /// Print outcomes as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Snowflake,
    Local,
}

#[derive(Subcommand)]
enum Command {
    /// All company filings (first 50)
    Overview,
    /// Filings missing key metrics
    Compliance,
    /// Filings with negative net income or high leverage
    Risk,
    /// AI-generated filing summaries
    Summaries,
    /// Revenue rankings, losses, trend and anomalies
    Analytics {
        /// Company for the trend drill-down (defaults to the top earner)
        #[arg(long)]
        company: Option<String>,
    },
    /// Ask a question about the filings
    Ask { question: String },
    /// Stage a raw SEC data file (sub, num, pre or tag)
    Upload { table: RawTable, file: PathBuf },
    /// Pipes, scheduled jobs and table row counts
    Monitor,
    /// Every tab in order
    Dashboard {
        #[arg(long)]
        company: Option<String>,
    },
}

fn connect(cli: &Cli, settings: &Settings) -> Result<Arc<dyn Warehouse>> {
    match cli.backend {
        Backend::Snowflake => {
            let connection = settings
                .connection
                .clone()
                .context("SNOWFLAKE_ACCOUNT_URL is not set; use --backend local for the demo data")?;
            Ok(Arc::new(SnowflakeWarehouse::new(connection)?))
        }
        Backend::Local => {
            std::fs::create_dir_all(&cli.stage_dir)
                .with_context(|| format!("cannot create stage directory {}", cli.stage_dir.display()))?;
            let warehouse =
                LocalWarehouse::from_fixture_dir(&cli.fixtures, &settings.catalog, cli.stage_dir.clone())?;
            Ok(Arc::new(warehouse))
        }
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", text(value));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // long views are shown in full
    if std::env::var_os("POLARS_FMT_MAX_ROWS").is_none() {
        std::env::set_var("POLARS_FMT_MAX_ROWS", "60");
    }

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let session = Session::new(connect(&cli, &settings)?, settings);
    info!("Schema {}", session.settings().catalog.schema_path());

    match &cli.command {
        Command::Overview => {
            let report = session.run_tab(Tab::Overview, None).await;
            emit(cli.json, &report, render::render_tab)?;
        }
        Command::Compliance => {
            let report = session.run_tab(Tab::ComplianceAlerts, None).await;
            emit(cli.json, &report, render::render_tab)?;
        }
        Command::Risk => {
            let report = session.run_tab(Tab::RiskAlerts, None).await;
            emit(cli.json, &report, render::render_tab)?;
        }
        Command::Summaries => {
            let report = session.run_tab(Tab::AiSummaries, None).await;
            emit(cli.json, &report, render::render_tab)?;
        }
        Command::Analytics { company } => {
            let report = session.run_tab(Tab::DataAnalytics, company.as_deref()).await;
            emit(cli.json, &report, render::render_tab)?;
        }
        Command::Monitor => {
            let report = session.run_tab(Tab::Monitoring, None).await;
            emit(cli.json, &report, render::render_tab)?;
        }
        Command::Dashboard { company } => {
            let reports = session.run_all(company.as_deref()).await;
            emit(cli.json, &reports, |reports| {
                reports
                    .iter()
                    .map(render::render_tab)
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        Command::Ask { question } => {
            let outcome = session.ask(question).await;
            emit(cli.json, &outcome, render::render_answer)?;
            if outcome.is_failed() {
                std::process::exit(1);
            }
        }
        Command::Upload { table, file } => match session.upload(*table, file).await {
            Ok(report) => emit(cli.json, &report, render::render_upload)?,
            Err(e) => {
                error!("Upload failed: {}", e);
                return Err(e.into());
            }
        },
    }

    Ok(())
}
