use anyhow::Context;
use clap::{Parser, Subcommand};
use qdrant_wrapper::{
    defaults, ClientConfig, CollectionClient, Condition, Filter, LogSink, Point, ScrollOptions,
    SearchOptions,
};
use serde_json::json;
use tracing::Level;

/// Connection settings default to the QDRANT_* environment variables.
#[derive(Parser)]
struct Cli {
    /// Qdrant gRPC URL
    #[arg(long)]
    url: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    api_key: Option<String>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create a scratch collection, write and query two points, then drop it
    Smoke {
        #[arg(long, default_value = "test_collection")]
        collection: String,
        #[arg(long, default_value_t = defaults::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Delete a collection
    Drop { collection: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env().context("Failed to read QDRANT_* environment")?;
    if let Some(url) = cli.url {
        config.url = url;
    }
    if let Some(port) = cli.port {
        config.port = Some(port);
    }
    if let Some(api_key) = cli.api_key {
        config.api_key = Some(api_key);
    }
    tracing::info!("Using Qdrant at {}", config.endpoint());

    match cli.cmd {
        Cmd::Smoke { collection, batch_size } => smoke(config, &collection, batch_size).await?,
        Cmd::Drop { collection } => {
            let mut client = CollectionClient::connect(config.print_logs(true))?.with_logger(LogSink::tracing());
            client
                .delete_collection(Some(&collection))
                .await
                .with_context(|| format!("Failed to delete collection {}", collection))?;
        }
    }
    Ok(())
}

async fn smoke(config: ClientConfig, collection: &str, batch_size: usize) -> anyhow::Result<()> {
    let mut client = CollectionClient::connect(config.vector_size(4).print_logs(true))?
        .with_logger(LogSink::tracing());

    client
        .create_collection(collection, None, None, true)
        .await
        .with_context(|| format!("Failed to create collection {}", collection))?;

    let points: Vec<Point> = serde_json::from_value(json!([
        {"id": 1, "vector": [0.1, 0.2, 0.3, 0.4], "payload": {"group": "a"}},
        {"id": 2, "vector": [0.2, 0.3, 0.4, 0.5], "payload": {"group": "b"}}
    ]))?;

    client.upsert(&points, None).await.context("Upsert failed")?;
    let ids = client.upsert_batched(&points, batch_size, None).await?;
    tracing::info!("Batched upsert accepted {} of {} points", ids.len(), points.len());

    let hits = client
        .search(vec![0.1, 0.2, 0.3, 0.4], SearchOptions::default())
        .await?;
    for hit in &hits {
        tracing::info!("hit id={} score={:.4}", hit.id, hit.score);
    }

    let group_a = Filter::new().must(Condition::matches("group", "a"));
    let filtered = client
        .search(vec![0.1, 0.2, 0.3, 0.4], SearchOptions::default().filter(group_a.clone()))
        .await?;
    tracing::info!("Filtered search returned {} hits", filtered.len());

    let (records, next) = client.filter_search(group_a, ScrollOptions::default()).await?;
    tracing::info!("Scroll returned {} records, next page: {:?}", records.len(), next);

    client.delete_points(vec![1u64, 2], None).await?;
    client.delete_collection(None).await?;
    Ok(())
}
