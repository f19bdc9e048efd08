use tracing_subscriber::util::SubscriberInitExt;

mod aggregator;
mod backoff;
pub(crate) mod best_stories;
pub(crate) mod cache;
pub(crate) mod config;
pub(crate) mod error;
pub(crate) mod hn_api;
pub(crate) mod http;
#[cfg(test)]
mod test_support;

pub(crate) static CLIENT: std::sync::LazyLock<reqwest::Client> =
    std::sync::LazyLock::new(reqwest::Client::new);

#[derive(Debug, Clone, clap::Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "false")]
    #[arg(help = "Log to console")]
    log_to_console: bool,

    #[arg(short, long, default_value = "false")]
    #[arg(help = "Serve best stories from a periodically refreshed cache")]
    allowed_caching: bool,

    #[arg(long)]
    #[arg(help = "Address to listen on, overrides LISTEN_ADDR")]
    listen_addr: Option<std::net::SocketAddr>,
}

fn init_logging(log_to_console: bool) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::layer::Layer;
    use tracing_subscriber::layer::SubscriberExt;

    let file_appender = tracing_appender::rolling::daily("./log", "hn_best_stories.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .json()
        .with_filter(tracing::level_filters::LevelFilter::INFO)
        .boxed();

    let pretty_layer = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stdout)
        .with_filter(tracing::level_filters::LevelFilter::INFO)
        .boxed();

    let registry = tracing_subscriber::registry().with(file_layer);

    if log_to_console {
        registry.with(pretty_layer).init();
    } else {
        registry.init();
    };

    guard
}

async fn shutdown_signal(shutdown: tokio_util::sync::CancellationToken) {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::error!(error =? e, "Failed to listen for shutdown signal");
            }
        }
        _ = shutdown.cancelled() => {}
    }
    tracing::info!("Shutting down");
}

async fn serve(config: config::Config) -> anyhow::Result<()> {
    let shutdown = tokio_util::sync::CancellationToken::new();

    let source = std::sync::Arc::new(hn_api::HnClient::new(&config.hn_base_url));
    let aggregator = aggregator::Aggregator::new(source, config.max_concurrent_fetches);

    let (stories, refresh_handle) = if config.allowed_caching {
        let cache = std::sync::Arc::new(cache::SnapshotCache::new(
            aggregator,
            config.cache_ttl,
            shutdown.clone(),
        ));
        let handle = cache.start(config.cache_refresh_interval);
        (best_stories::BestStories::cached(cache), Some(handle))
    } else {
        (
            best_stories::BestStories::uncached(aggregator, shutdown.clone()),
            None,
        )
    };
    let stories = std::sync::Arc::new(stories);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, http::router(stories.clone()))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    match stories.cache() {
        Some(cache) => cache.stop(),
        None => shutdown.cancel(),
    }
    if let Some(handle) = refresh_handle {
        if let Err(e) = handle.await {
            tracing::error!(error =? e, "Background cache refresh did not stop cleanly");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;
    let args = Args::parse();

    let mut config = config::Config::from_env()?;
    config.allowed_caching |= args.allowed_caching;
    config.log_to_console |= args.log_to_console;
    if let Some(addr) = args.listen_addr {
        config.listen_addr = addr;
    }

    let _guard = init_logging(config.log_to_console);

    tracing::info!(
        config =? config,
        args =? args,
        "Starting HN best stories service"
    );

    match serve(config).await {
        Ok(()) => {
            tracing::info!("HN best stories service stopped");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error =? e, "HN best stories service failed");
            Err(e)
        }
    }
}
