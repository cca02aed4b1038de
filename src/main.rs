use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tripweave_agent::TripPlanner;
use tripweave_core::config::AppConfig;
use tripweave_core::traits::{SearchProvider, WeatherProvider};
use tripweave_tools::{OpenWeatherClient, TavilySearch};

#[derive(Parser)]
#[command(name = "tripweave", version, about = "Weather-aware trip itinerary planner")]
struct Cli {
    /// Path to config file
    #[arg(short, long, env = "TRIPWEAVE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a trip from a free-form request
    Plan {
        /// The request, e.g. "Warsaw for 5 days, I like museums and food".
        /// Read from stdin when omitted.
        #[arg(trailing_var_arg = true)]
        request: Vec<String>,
        /// Maximum activity search passes
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Overall planning deadline in seconds (0 = unlimited)
        #[arg(long)]
        timeout: Option<u64>,
        /// Print per-stage timings to stderr
        #[arg(long)]
        report: bool,
    },
    /// Show the resolved configuration with secrets redacted
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tripweave=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "tripweave", &mut io::stdout());
        return Ok(());
    }

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config.redacted())?);
        }
        Commands::Plan {
            request,
            max_iterations,
            timeout,
            report,
        } => {
            if let Some(secs) = timeout {
                config.planner.plan_timeout_secs = secs;
            }
            if let Some(n) = max_iterations {
                config.planner.max_search_iterations = n;
            }

            let text = if request.is_empty() {
                read_stdin()
            } else {
                request.join(" ")
            };
            if text.trim().is_empty() {
                anyhow::bail!("no trip request given; pass it as arguments or on stdin");
            }

            let planner = build_planner(&config)?;
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling plan");
                    on_interrupt.cancel();
                }
            });

            let outcome = planner
                .plan(&text, config.planner.max_search_iterations, cancel)
                .await?;

            if report {
                for record in &outcome.stage_records {
                    eprintln!(
                        "{:<16} attempt {}  {:>6} ms  {}",
                        record.stage,
                        record.attempt,
                        record.elapsed_ms,
                        if record.succeeded { "ok" } else { "failed" }
                    );
                }
                eprintln!(
                    "{} search pass(es), {} ms total",
                    outcome.search_passes(),
                    outcome.total_elapsed_ms
                );
            }
            println!("{}", outcome.itinerary());
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// `--config`, then `~/.tripweave/config.toml`, then the environment.
fn load_config(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    if let Some(path) = explicit {
        return Ok(AppConfig::load(path)?);
    }
    if let Some(path) = AppConfig::default_path().filter(|p| p.exists()) {
        info!(path = %path.display(), "Loading config from home directory");
        return Ok(AppConfig::load(&path)?);
    }
    let config = AppConfig::from_env();
    config.validate()?;
    Ok(config)
}

fn build_planner(config: &AppConfig) -> anyhow::Result<TripPlanner> {
    let reasoning = tripweave_llm::create_client(&config.model);
    let weather: Arc<dyn WeatherProvider> = Arc::new(OpenWeatherClient::new(&config.weather)?);
    let search: Arc<dyn SearchProvider> = Arc::new(TavilySearch::new(&config.search)?);
    Ok(TripPlanner::new(
        reasoning,
        weather,
        search,
        config.planner.clone(),
    )?)
}

fn read_stdin() -> String {
    io::stdin()
        .lock()
        .lines()
        .map_while(|l| l.ok())
        .collect::<Vec<_>>()
        .join("\n")
}
