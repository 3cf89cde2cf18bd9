use std::sync::Arc;

use outflow::config::Config;
use outflow::http::reader;
use outflow::server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Arc::new(Config::load());
    if cfg.files.offload_reads {
        // Start the reader up front so the first small file doesn't pay for it.
        reader::init(cfg.files.read_queue_depth);
    }

    tokio::select! {
        res = server::listener::run(Arc::clone(&cfg)) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
