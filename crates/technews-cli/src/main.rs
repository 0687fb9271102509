mod report;
mod run;
mod state;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "technews")]
#[command(about = "Daily technical-news collection and deduplication pipeline")]
struct Cli {
    /// Directory holding the configuration files
    #[arg(long, global = true, default_value = "./config")]
    config_dir: PathBuf,

    /// Expanded logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Collect, deduplicate, and render today's digest
    Run {
        /// Build fetch tasks and print them without contacting the agent
        #[arg(long)]
        dry_run: bool,

        /// Render a flat article list without category sections
        #[arg(long)]
        simple: bool,

        /// Override "today" (YYYY-MM-DD, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Keep abort-heavy sources enabled
        #[arg(long)]
        no_auto_disable: bool,

        /// Do not re-run collection after disabling sources
        #[arg(long)]
        no_rerun: bool,
    },
    /// History store maintenance
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
}

#[derive(Debug, Subcommand)]
enum HistoryCommands {
    /// Totals, date range, and per-source counts
    Stats,
    /// Purge entries first seen before the retention horizon
    Cleanup {
        /// Override the retention horizon in days
        #[arg(long)]
        days: Option<u32>,
    },
    /// Entries re-sighted long after their first sighting
    Reposts {
        #[arg(long, default_value_t = 7)]
        min_gap_days: i64,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = dispatch(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(2);
    }
}

fn init_tracing(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            let level = if verbose {
                "debug".to_string()
            } else {
                std::env::var("TECHNEWS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
            };
            EnvFilter::try_new(level)
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Run {
            dry_run,
            simple,
            date,
            no_auto_disable,
            no_rerun,
        }) => {
            run::run(run::RunOptions {
                config_dir: cli.config_dir,
                dry_run,
                simple,
                date,
                auto_disable: !no_auto_disable,
                rerun: !no_rerun,
            })
            .await
        }
        Some(Commands::History { command }) => run_history_command(&cli.config_dir, command).await,
        None => {
            println!("technews: use `technews run` to build today's digest");
            Ok(())
        }
    }
}

async fn run_history_command(
    config_dir: &std::path::Path,
    command: HistoryCommands,
) -> anyhow::Result<()> {
    let app = technews_core::load_app(&config_dir.join("app.yaml"))?;
    let history = technews_history::HistoryStore::open(&app.history.path).await?;

    match command {
        HistoryCommands::Stats => {
            let stats = history.stats().await?;
            println!("entries: {}", stats.total);
            if let (Some(min), Some(max)) = (stats.first_seen_min, stats.first_seen_max) {
                println!("first seen: {min} .. {max}");
            }
            let mut per_source: Vec<_> = stats.per_source.into_iter().collect();
            per_source.sort_by(|a, b| b.1.cmp(&a.1));
            for (source, count) in per_source {
                println!("  {source}: {count}");
            }
        }
        HistoryCommands::Cleanup { days } => {
            let retention = days.unwrap_or(app.history.retention_days);
            let horizon = chrono::Utc::now() - chrono::Duration::days(i64::from(retention));
            let removed = history.cleanup(Some(horizon)).await?;
            println!("removed {removed} entries first seen before {horizon}");
        }
        HistoryCommands::Reposts { min_gap_days } => {
            let reposts = history.find_potential_reposts(min_gap_days).await?;
            println!("{} potential repost(s)", reposts.len());
            for row in reposts {
                println!(
                    "  {} (first {} / last {}) {}",
                    row.source, row.first_seen_at, row.last_seen_at, row.normalized_url
                );
            }
        }
    }

    history.close().await;
    Ok(())
}
