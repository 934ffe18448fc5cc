//! EntityLens server binary.
//!
//! Wires configuration, the SQLite store, LLM and browser clients, the
//! tool stack, the background worker queue, and the REST API.

use anyhow::Context;
use entitylens_core::browser::ChromiumBrowserClient;
use entitylens_core::cache::InMemoryCache;
use entitylens_core::config::AppConfig;
use entitylens_core::llm::OpenAiClient;
use entitylens_core::store::SqliteStore;
use entitylens_core::tool::ToolRunner;
use entitylens_research::browse::PageExtractTool;
use entitylens_research::dispatch::{SearchService, ValidationTasks};
use entitylens_research::llm_call::CompletionTool;
use entitylens_research::metrics::MetricsGenerationTool;
use entitylens_research::references::ReferenceGatheringTool;
use entitylens_research::researcher::Researcher;
use entitylens_research::validation::EntityValidationTool;
use entitylens_server::routes::{router, AppState};
use entitylens_server::worker::{job_queue, spawn_worker};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Optional config file path as the only CLI argument.
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config =
        AppConfig::load(config_path.as_deref()).context("failed to load configuration")?;

    let store = Arc::new(SqliteStore::open(&config.store.database_path)?);
    let cache = Arc::new(InMemoryCache::new());
    let runner = Arc::new(ToolRunner::new(cache));

    let llm = Arc::new(OpenAiClient::new(config.llm.clone())?);
    let browser = Arc::new(
        ChromiumBrowserClient::launch(&config.browser)
            .await
            .context("failed to launch browser")?,
    );

    let page_extract = Arc::new(PageExtractTool::new(browser, config.browser.retry.clone()));
    let references = Arc::new(ReferenceGatheringTool::new(
        runner.clone(),
        page_extract,
        store.clone(),
        config.search.clone(),
    ));
    let completion = Arc::new(CompletionTool::new(llm));
    let metrics = Arc::new(MetricsGenerationTool::new(
        runner.clone(),
        completion,
        store.clone(),
    ));
    let researcher = Arc::new(Researcher::new(
        store.clone(),
        runner.clone(),
        references,
        metrics,
    ));

    let (dispatcher, queue_rx) = job_queue(config.server.job_queue_depth);
    let worker = spawn_worker(researcher.clone(), queue_rx);

    let validation = Arc::new(EntityValidationTool::default());
    let service = Arc::new(SearchService::new(
        store,
        runner.clone(),
        validation.clone(),
        researcher,
        Arc::new(dispatcher),
    ));
    let tasks = Arc::new(ValidationTasks::new(runner, validation));

    let app = router(AppState { service, tasks });
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "EntityLens server listening");
    axum::serve(listener, app).await?;

    worker.abort();
    Ok(())
}
