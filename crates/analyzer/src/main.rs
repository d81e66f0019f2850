use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kube_rca::{
    analysis::{prompt::PromptBuilder, Analyzer},
    collector::KubeCollector,
    config::Config,
    llm::create_provider,
    server::Server,
    store::create_store,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load(None).context("failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        addr = %config.server.addr,
        provider = %config.llm.provider,
        model = %config.llm.model,
        lookback = ?config.analysis.default_lookback,
        "Loaded configuration"
    );

    // Initialize store
    let store = create_store(&config.database)
        .await
        .context("failed to open report store")?;

    // Initialize collector and model client
    let collector = KubeCollector::infer(config.kube.context.as_deref(), config.kube.tail_lines)
        .await
        .context("failed to create Kubernetes client")?;
    let llm = create_provider(&config.llm).context("failed to create LLM provider")?;

    let analyzer = Arc::new(
        Analyzer::new(Arc::new(collector), llm).with_prompt_builder(PromptBuilder::new(
            config.analysis.max_log_chars,
            config.analysis.max_events,
        )),
    );

    // Start server
    let server = Server::new(&config, analyzer, store);
    info!("Starting server on {}", config.server.addr);
    server.start(&config.server.addr).await?;

    Ok(())
}
