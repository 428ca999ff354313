use std::sync::Arc;

use clap::Parser;
use metrics_api::{
    actors::persister::PersisterHandle,
    api::{
        ApiConfig, ApiSettings, ApiState, middleware::HeaderAuthorizer, spawn_api_server,
    },
    config::{Config, QueueConfig, read_config_file},
    queue::{MemoryQueue, MessageQueue},
    repository::MemoryRepository,
    util::apply_env_overrides,
};
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (defaults apply when omitted)
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("metrics_api", LevelFilter::DEBUG),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };
    let config = apply_env_overrides(config);

    let repository = Arc::new(MemoryRepository::new());
    let (queue, persister) = build_queue(&config, repository.clone())?;

    let state = ApiState::new(
        Arc::new(HeaderAuthorizer),
        queue,
        repository,
        ApiSettings::from_config(&config),
    );
    let addr = spawn_api_server(ApiConfig::from_config(&config), state).await?;
    info!("serving region {} on {addr}", config.region);

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    if let Some(persister) = persister {
        persister.shutdown().await;
    }

    Ok(())
}

fn build_queue(
    config: &Config,
    repository: Arc<MemoryRepository>,
) -> anyhow::Result<(Arc<dyn MessageQueue>, Option<PersisterHandle>)> {
    match &config.queue {
        QueueConfig::Memory { capacity } => {
            info!("using in-memory queue (capacity {capacity})");
            let (queue, batches) = MemoryQueue::channel(*capacity);
            let persister = PersisterHandle::spawn(repository, batches);
            Ok((Arc::new(queue), Some(persister)))
        }

        #[cfg(feature = "http-queue")]
        QueueConfig::Http { url, timeout_secs } => {
            info!("forwarding metrics to {url}");
            let queue = metrics_api::queue::HttpQueue::new(
                url.clone(),
                std::time::Duration::from_secs(*timeout_secs),
            )?;
            Ok((Arc::new(queue), None))
        }

        #[cfg(not(feature = "http-queue"))]
        QueueConfig::Http { .. } => {
            anyhow::bail!("http queue configured but the `http-queue` feature is disabled")
        }
    }
}
