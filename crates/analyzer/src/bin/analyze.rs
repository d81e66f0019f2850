//! One-off root cause analysis from the command line.
//!
//! Run with: cargo run --bin kube-rca -- [OPTIONS] <COMMAND>

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use kube_rca::{
    analysis::{prompt::PromptBuilder, AnalysisTarget, Analyzer, BatchCoordinator},
    collector::KubeCollector,
    config::{parse_duration, Config},
    llm::create_provider,
    sources::AlertManagerWebhook,
};

#[derive(Parser)]
#[command(author, version, about = "Root cause analysis for Kubernetes pods", long_about = None)]
struct Cli {
    /// Log level (debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Path to a YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured LLM provider (anthropic, openai, mock)
    #[arg(long)]
    provider: Option<String>,

    /// Override the configured model
    #[arg(long)]
    model: Option<String>,

    /// Compact single-line JSON output
    #[arg(long)]
    compact: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one pod
    Pod {
        #[arg(short, long)]
        namespace: String,

        #[arg(short, long)]
        pod: String,

        /// How far back to look, e.g. 30m or 2h
        #[arg(long)]
        lookback: Option<String>,
    },
    /// Analyze every alert in a saved Alertmanager webhook payload
    Webhook {
        /// JSON file holding the payload
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(provider) = cli.provider {
        config.llm.provider = provider.to_lowercase();
    }
    if let Some(model) = cli.model {
        config.llm.model = model;
    }
    config.validate()?;

    let collector = KubeCollector::infer(config.kube.context.as_deref(), config.kube.tail_lines)
        .await
        .context("failed to create Kubernetes client")?;
    let llm = create_provider(&config.llm)?;
    let analyzer = Arc::new(
        Analyzer::new(Arc::new(collector), llm).with_prompt_builder(PromptBuilder::new(
            config.analysis.max_log_chars,
            config.analysis.max_events,
        )),
    );

    let output = match cli.command {
        Commands::Pod {
            namespace,
            pod,
            lookback,
        } => {
            let lookback = match lookback {
                Some(raw) => parse_duration(&raw)?,
                None => config.analysis.default_lookback,
            };
            if lookback.is_zero() {
                bail!("lookback must be positive");
            }
            let target = AnalysisTarget::new(namespace, pod, lookback);
            let report = analyzer
                .analyze_within(&target, config.analysis.request_timeout)
                .await?;
            serde_json::to_value(report)?
        }
        Commands::Webhook { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let payload: AlertManagerWebhook = serde_json::from_str(&raw)?;
            let result = BatchCoordinator::new(analyzer)
                .with_max_concurrency(config.analysis.max_concurrency)
                .process_batch_within(
                    payload.into_alerts(),
                    config.analysis.default_lookback,
                    config.analysis.batch_timeout,
                )
                .await;
            serde_json::to_value(result)?
        }
    };

    if cli.compact {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(())
}
