//! farmd - farm advisory service
//!
//! Loads the usage table, trains the predictor once, then serves predictions,
//! advice, trends and per-session reviews over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use farm_common::{Advisor, Dataset, FarmConfig, HttpLlmClient, LlmClient, UsagePredictor};
use farmd::{server, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "farmd", version, about = "Farm advisory service")]
struct Args {
    /// Config file (default: ./farmd.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Usage dataset CSV, overrides [data] path
    #[arg(long)]
    data: Option<PathBuf>,

    /// Listen address, overrides [server] bind
    #[arg(long)]
    bind: Option<String>,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = FarmConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(data) = args.data {
        config.data.path = data;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    init_logging(&config.log.level);
    info!("farmd v{} starting", env!("CARGO_PKG_VERSION"));

    let dataset = Dataset::load(&config.data.path)
        .with_context(|| format!("loading dataset {}", config.data.path.display()))?;
    info!(
        "Dataset loaded: {} records, {} regions",
        dataset.len(),
        dataset.regions().len()
    );

    let predictor =
        UsagePredictor::train(&dataset, &config.model).context("training usage model")?;

    let api_key = config.llm.resolve_api_key();
    if api_key.is_none() {
        warn!(
            "No API key in ${} or {}; advice will be unavailable",
            config.llm.api_key_env,
            config.llm.env_file.display()
        );
    }
    let client: Box<dyn LlmClient> = Box::new(HttpLlmClient::new(config.llm.clone(), api_key)?);
    let advisor = Arc::new(Advisor::new(client));

    let state = AppState::new(dataset, predictor, Arc::clone(&advisor));

    // The blocking HTTP client must not be dropped inside the async runtime,
    // so the last advisor handle outlives it here.
    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    runtime.block_on(server::run(state, &config.server.bind))?;
    drop(runtime);
    drop(advisor);

    Ok(())
}
