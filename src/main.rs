use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tierlimit::config::loader::{build_tier_table, load_config};
use tierlimit::config::watcher::watch_config_file;
use tierlimit::metrics_server::start_metrics_server;
use tierlimit::{metrics, LimiterRegistry, LineDriver};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tierlimit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Tiered Rate Limiter Starting...");

    let config = load_config().await?;
    let tier_table = build_tier_table(&config)?;
    metrics::update_config_metrics(tier_table.stats().configured_tier_count);

    let shared_table = Arc::new(ArcSwap::from_pointee(tier_table));
    let registry = Arc::new(LimiterRegistry::new(
        Arc::clone(&shared_table),
        &config.rate_limits.registry,
    ));

    if config.service.watch_config {
        let path = config.service.config_path.clone();
        let table = Arc::clone(&shared_table);
        tokio::spawn(async move {
            if let Err(e) = watch_config_file(path, table).await {
                tracing::error!("Config watcher stopped: {}", e);
            }
        });
    }

    let metrics_port = config.service.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_metrics_server(metrics_port).await {
            tracing::error!("Metrics server stopped: {}", e);
        }
    });

    let driver = LineDriver::new(Arc::clone(&registry));
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;
    let mut output = tokio::io::stdout();

    let mut maintenance = tokio::time::interval(MAINTENANCE_INTERVAL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = maintenance.tick() => registry.run_maintenance(),
            line = input.next_line(), if input_open => match line? {
                Some(line) => {
                    if let Some(reply) = driver.handle_line(&line) {
                        output.write_all(reply.as_bytes()).await?;
                        output.write_all(b"\n").await?;
                        output.flush().await?;
                    }
                }
                None => {
                    tracing::info!("Command input closed; serving until shutdown");
                    input_open = false;
                }
            },
            _ = &mut shutdown => break,
        }
    }

    let stats = registry.stats();
    tracing::info!(
        "Shutting down. {} active buckets, {} created over the process lifetime",
        stats.active_buckets,
        stats.buckets_created
    );

    Ok(())
}
