//! Lottobook - settlement CLI
//!
//! Usage:
//!   lottobook init-db
//!   lottobook create-period --name "16 Oct 2026" --draw-date 2026-10-16 --current
//!   lottobook announce --period 1 --high 12 --low 45 --three 345
//!   lottobook preview --period 1
//!   lottobook settle --period 1
//!   lottobook summary --period 1 --agents

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lottobook_backend::config::AppConfig;
use lottobook_backend::models::{DrawNumbers, PeriodId};
use lottobook_backend::{reporting, LotteryDb, SettlementService};

/// Numbers-lottery settlement tool
#[derive(Parser, Debug)]
#[command(name = "lottobook")]
#[command(about = "Settle lottery wagers against announced results and report totals")]
struct Cli {
    /// TOML config file
    #[arg(short, long, env = "LOTTOBOOK_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database, overrides the config file
    #[arg(long, env = "LOTTOBOOK_DB_PATH")]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the schema and seed the Rate Table from [rates]
    InitDb,

    /// Create a period
    CreatePeriod {
        #[arg(long)]
        name: String,

        /// YYYY-MM-DD
        #[arg(long)]
        draw_date: NaiveDate,

        /// Also mark it as the current period
        #[arg(long)]
        current: bool,
    },

    /// Store the period's result and settle it
    Announce {
        #[arg(short, long)]
        period: PeriodId,

        #[arg(long)]
        high: Option<String>,

        #[arg(long)]
        low: Option<String>,

        #[arg(long)]
        three: Option<String>,
    },

    /// Compute outcomes without persisting
    Preview {
        #[arg(short, long)]
        period: PeriodId,
    },

    /// Settle against the stored result and persist
    Settle {
        #[arg(short, long)]
        period: PeriodId,
    },

    /// Delete the period's result and its outcomes
    ClearResult {
        #[arg(short, long)]
        period: PeriodId,
    },

    /// List persisted outcomes
    Outcomes {
        #[arg(short, long)]
        period: PeriodId,

        #[arg(short, long)]
        agent: Option<i64>,
    },

    /// Settlement run log of a period
    Runs {
        #[arg(short, long)]
        period: PeriodId,
    },

    /// System totals, or per-agent totals with --agents
    Summary {
        #[arg(short, long)]
        period: Option<PeriodId>,

        #[arg(long)]
        agents: bool,
    },
}

fn main() -> Result<()> {
    load_env();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::from_env(),
    };
    if let Some(db_path) = &cli.db_path {
        config.database_path = db_path.clone();
    }
    init_tracing(&config.log_filter);

    let db = LotteryDb::new(&config.database_path)
        .with_context(|| format!("Failed to open database: {}", config.database_path))?;

    match cli.command {
        Commands::InitDb => {
            let entries = config.rate_entries()?;
            for entry in &entries {
                db.set_rate(entry.category, entry.multiplier)?;
            }
            info!("🗄️ Database ready at {} ({} rates seeded)", config.database_path, entries.len());
            print_json(&db.rates()?)?;
        }
        Commands::CreatePeriod {
            name,
            draw_date,
            current,
        } => {
            let period = db.create_period(&name, draw_date)?;
            if current {
                db.set_current_period(period.id)?;
            }
            print_json(&db.get_period(period.id)?)?;
        }
        Commands::Announce {
            period,
            high,
            low,
            three,
        } => {
            let numbers = DrawNumbers {
                two_digit_high: high,
                two_digit_low: low,
                three_digit: three,
            };
            let report = SettlementService::new(db)
                .announce_result(period, &numbers)
                .with_context(|| format!("Failed to announce result for period {period}"))?;
            print_json(&report)?;
        }
        Commands::Preview { period } => {
            let run = SettlementService::new(db)
                .settle(period)
                .with_context(|| format!("Failed to preview period {period}"))?;
            print_json(&run)?;
        }
        Commands::Settle { period } => {
            let report = SettlementService::new(db)
                .settle_and_persist(period)
                .with_context(|| format!("Failed to settle period {period}"))?;
            print_json(&report)?;
        }
        Commands::ClearResult { period } => {
            let removed = SettlementService::new(db).delete_result(period)?;
            info!("🧹 Result for period {} cleared, {} outcomes removed", period, removed);
            print_json(&serde_json::json!({ "period_id": period, "outcomes_removed": removed }))?;
        }
        Commands::Outcomes { period, agent } => {
            print_json(&db.outcomes_for_period(period, agent)?)?;
        }
        Commands::Runs { period } => {
            print_json(&db.settlement_runs(period)?)?;
        }
        Commands::Summary { period, agents } => {
            if agents {
                print_json(&reporting::agent_summary(&db, period)?)?;
            } else {
                print_json(&reporting::system_summary(&db, period)?)?;
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Crate-root .env when run from elsewhere
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}
