use axum::Router;
use clap::Parser;
use crawldex::config::{CrawlConfig, ProcessingMode};
use crawldex::fetcher::CrawlerManager;
use crawldex::orchestrator::CrawlOrchestrator;
use crawldex::{api, Error};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "crawldex")]
#[command(about = "Crawl-and-index pipeline serving a vector-searchable knowledge store")]
struct Args {
    /// Server port
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Override the processing topology (sequential or hybrid)
    #[arg(long, value_enum)]
    mode: Option<ProcessingMode>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(Level::INFO.into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("crawldex - crawl and index service");

    let mut config = CrawlConfig::from_env();
    if let Some(mode) = args.mode {
        config.processing_mode = mode;
    }
    info!("Processing mode: {:?}", config.processing_mode);
    info!(
        "Chunking: size={} overlap={} tree-sitter={}",
        config.chunk_size, config.chunk_overlap, config.enable_tree_sitter
    );
    info!(
        "Embedding endpoints: text={} code={}",
        config.text_model_url(),
        config.code_model_url()
    );
    if config.browser_endpoint.is_none() {
        info!("No browser renderer configured; all fetches use plain HTTP");
    }

    let fetcher = Arc::new(CrawlerManager::new(&config));
    let orchestrator = Arc::new(CrawlOrchestrator::new(config, fetcher)?);

    let app = Router::new()
        .merge(api::routes(orchestrator))
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|exc| Error::Config(format!("failed to bind {}: {}", addr, exc)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|exc| Error::Config(format!("server error: {}", exc)))?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
