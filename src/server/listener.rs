use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::server::connection::Connection;
use crate::server::tcp::TcpTransport;

pub async fn run(cfg: Arc<Config>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    serve(listener, cfg).await
}

/// Accepts connections on an already bound listener until it fails.
pub async fn serve(listener: TcpListener, cfg: Arc<Config>) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        info!("Accepted connection from {}", peer);
        socket.set_nodelay(true)?;

        let config = Arc::clone(&cfg);
        tokio::spawn(async move {
            let mut conn = Connection::new(TcpTransport::new(socket), config);
            if let Err(e) = conn.run().await {
                tracing::error!("Connection error from {}: {}", peer, e);
            }
        });
    }
}
