use anyhow::Context;
use clap::Parser;
use querytube::SearchService;
use querytube_web::{init_tracing, serve, Cli};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    let bind = config.server.bind.clone();

    tracing::info!(
        catalog = %config.catalog.path.display(),
        backend = ?config.embedding.backend,
        "Starting QueryTube"
    );

    let service = SearchService::initialize(config)
        .await
        .context("Failed to initialize search service")?;
    let stats = service.stats();
    tracing::info!(
        indexed = stats.indexed,
        dropped = stats.dropped,
        model = %stats.model,
        "Catalog indexed"
    );

    serve(Arc::new(service), &bind).await
}
