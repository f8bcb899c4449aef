use std::io::Write as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod chats;
mod classifier;
mod config;
mod dataset;
mod error;
mod metrics;
mod models;
mod report;
mod risk;
mod server;
mod triage;

use crate::classifier::GeminiClassifier;
use crate::config::AppConfig;
use crate::dataset::ReferenceData;
use crate::metrics::TriageMetrics;
use crate::risk::RiskAggregator;
use crate::triage::TriageEngine;

#[derive(Parser)]
#[command(name = "priority-triage")]
#[command(about = "Risk-aware priority routing for customer service messages", long_about = None)]
struct Cli {
    /// Configuration file (defaults apply when absent)
    #[arg(long, global = true, default_value = crate::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the triage gateway over HTTP
    Serve {
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Classify one message in-process
    Classify {
        #[arg(long)]
        user: String,
        #[arg(long)]
        message: String,
    },
    /// Print a user's fraud risk summary
    Risk {
        #[arg(long)]
        user: String,
    },
    /// Print a user's flagged transactions as CSV, newest first
    Flagged {
        #[arg(long)]
        user: String,
    },
    /// Send a message through a running gateway and keep it in the chat log
    Chat {
        #[arg(long)]
        user: String,
        #[arg(long)]
        message: String,
        #[arg(long)]
        api_url: Option<String>,
    },
    /// Show a user's saved chat log, newest first
    History {
        #[arg(long)]
        user: String,
    },
    /// Generate a markdown customer overview
    Report {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 0.0)]
        min_amount: f64,
        #[arg(long)]
        only_foreign: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Append synthetic flagged transactions for a user (demo data only)
    InjectFraud {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 3)]
        count: usize,
        #[arg(long, default_value_t = 0.92)]
        score: f64,
    },
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid log filter")?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn load_reference_data(config: &AppConfig) -> anyhow::Result<Arc<ReferenceData>> {
    let data = ReferenceData::load(&config.data.transactions_path, &config.data.fraud_scores_path)?;
    Ok(Arc::new(data))
}

fn build_engine(config: &AppConfig) -> anyhow::Result<TriageEngine> {
    let aggregator = RiskAggregator::new(load_reference_data(config)?);
    let api_key = config.api_key();
    if api_key.is_none() {
        tracing::warn!(
            env_var = %config.classifier.api_key_env,
            "no classifier API key set, every message will get the fallback classification"
        );
    }
    let classifier = GeminiClassifier::new(&config.classifier, api_key)?;
    Ok(TriageEngine::new(
        aggregator,
        Arc::new(classifier),
        Arc::new(TriageMetrics::new()),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let config = AppConfig::load_from_path(&cli.config)?;
    init_tracing(&config)?;

    match cli.command {
        Commands::Serve { bind } => {
            let addr = match bind {
                Some(addr) => addr,
                None => config
                    .server
                    .bind
                    .parse()
                    .with_context(|| format!("invalid bind address {}", config.server.bind))?,
            };
            let engine = Arc::new(build_engine(&config)?);
            info!(model = %config.classifier.model, "triage engine ready");
            server::serve(engine, addr).await?;
        }
        Commands::Classify { user, message } => {
            let engine = build_engine(&config)?;
            let result = engine.classify(&message, &user).await;
            let output = server::AnalyzeResponse {
                user_id: user,
                priority: result.priority,
                response: result.response,
                confidence: result.confidence,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Risk { user } => {
            let aggregator = RiskAggregator::new(load_reference_data(&config)?);
            println!("{}", aggregator.summarize(&user));
        }
        Commands::Flagged { user } => {
            let aggregator = RiskAggregator::new(load_reference_data(&config)?);
            let view = aggregator.flagged_transactions(&user);

            let mut writer = csv::Writer::from_writer(std::io::stdout());
            writer.write_record(view.header())?;
            for row in view.rows.iter() {
                writer.write_record(view.record(row))?;
            }
            writer.flush()?;
            if view.rows.is_empty() {
                eprintln!("No flagged transactions for {user}.");
            }
        }
        Commands::Chat {
            user,
            message,
            api_url,
        } => {
            let api_url = api_url.unwrap_or_else(|| config.server.api_url.clone());
            let entry = chats::send_message(&api_url, &config.data.chats_dir, &user, &message).await?;
            println!(
                "Priority: {} ({:.0}% confidence)",
                entry.priority.as_str(),
                entry.confidence * 100.0
            );
            println!("Assistant: {}", entry.response);
        }
        Commands::History { user } => {
            let history = chats::load_history(&config.data.chats_dir, &user)?;
            if history.is_empty() {
                println!("No messages yet for {user}.");
                return Ok(());
            }
            let mut stdout = std::io::stdout().lock();
            for entry in history.iter().rev() {
                writeln!(stdout, "You: {}", entry.user)?;
                writeln!(
                    stdout,
                    "Priority: {} ({:.0}% confidence)",
                    entry.priority.as_str(),
                    entry.confidence * 100.0
                )?;
                writeln!(stdout, "Assistant: {}", entry.response)?;
                if let Some(ts) = entry.ts {
                    writeln!(stdout, "{}", ts.to_rfc3339())?;
                }
                writeln!(stdout, "---")?;
            }
        }
        Commands::Report {
            user,
            min_amount,
            only_foreign,
            out,
        } => {
            let data = load_reference_data(&config)?;
            let accounts = dataset::load_accounts(&config.data.accounts_path)?;
            let history = chats::load_history(&config.data.chats_dir, &user)?;
            let aggregator = RiskAggregator::new(data);
            let summary = aggregator.summarize(&user);
            let transactions = aggregator.data().transactions_for_user(&user);
            let filter = report::TransactionFilter {
                min_amount,
                only_foreign,
            };
            let output = report::build_report(
                &user,
                accounts.get(&user),
                &summary,
                &transactions,
                &filter,
                &history,
            );
            match out {
                Some(path) => {
                    std::fs::write(&path, output)?;
                    println!("Report written to {}.", path.display());
                }
                None => print!("{output}"),
            }
        }
        Commands::InjectFraud { user, count, score } => {
            let inserted = dataset::inject_synthetic_fraud(
                &config.data.transactions_path,
                &config.data.fraud_scores_path,
                &user,
                count,
                score,
            )?;
            println!(
                "Injected {inserted} flagged transactions for {user}; restart the gateway to pick them up."
            );
        }
    }

    Ok(())
}
