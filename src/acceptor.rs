//! TCP accept loop: binds the wire-protocol listener and spawns one
//! [`crate::connection::handle`] task per accepted socket.

use crate::backend::Backend;
use crate::connection;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use arc_swap::ArcSwap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc::Sender;

pub async fn run(
    bind_addr: &str,
    backend: Arc<ArcSwap<Box<dyn Backend>>>,
    read_only: Arc<AtomicBool>,
    metrics: Arc<Metrics>,
    hotswap_tx: Sender<String>,
) -> Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| Error::Fatal(format!("bind {bind_addr}: {e}")))?;
    log::info!("listening for clients on {bind_addr}");

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("accept failed: {e}");
                metrics.record_network_error();
                continue;
            }
        };
        log::debug!("accepted connection from {peer}");

        let backend = Arc::clone(&backend);
        let read_only = Arc::clone(&read_only);
        let metrics = Arc::clone(&metrics);
        let hotswap_tx = hotswap_tx.clone();

        tokio::spawn(async move {
            connection::handle(socket, backend, read_only, metrics, hotswap_tx).await;
        });
    }
}
