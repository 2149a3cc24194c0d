//! Wires configuration, the live backend, the acceptor, the hot-swap
//! coordinator, and the admin HTTP surface into one running process.

use crate::backend::{Backend, BTreeBucketBackend, InMemoryBackend, LsmBackend, LsmValueLogBackend};
use crate::config::{BackendKind, Config};
use crate::error::{Error, Result};
use crate::hotswap::BackendFactory;
use crate::metrics::Metrics;
use crate::{acceptor, admin, hotswap};
use arc_swap::ArcSwap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn open_backend(kind: BackendKind, path: &str, config: &Config) -> Result<Box<dyn Backend>> {
    match kind {
        BackendKind::Btree => Ok(Box::new(BTreeBucketBackend::open(
            path,
            config.bloom_capacity,
            config.bloom_fp_rate,
        )?)),
        BackendKind::Lsm => Ok(Box::new(LsmBackend::open(path)?)),
        BackendKind::LsmValuelog => Ok(Box::new(LsmValueLogBackend::open(path)?)),
        BackendKind::Inmem => Ok(Box::new(InMemoryBackend::new(config.inmem_capacity, path))),
    }
}

pub async fn run(config: Config) -> Result<()> {
    let initial_backend = open_backend(config.backend, &config.db_path, &config)?;
    let backend: Arc<ArcSwap<Box<dyn Backend>>> =
        Arc::new(ArcSwap::from_pointee(initial_backend));
    let read_only = Arc::new(AtomicBool::new(false));
    let metrics = Arc::new(Metrics::new());

    let (hotswap_tx, hotswap_rx) = tokio::sync::mpsc::channel::<String>(16);

    let kind = config.backend;
    let factory: BackendFactory = {
        let config = config.clone();
        Box::new(move |path: &str| open_backend(kind, path, &config))
    };

    let hotswap_task = tokio::spawn(hotswap::run(
        hotswap_rx,
        Arc::clone(&backend),
        Arc::clone(&read_only),
        factory,
    ));

    let admin_addr = config.admin_addr();
    let admin_router = admin::router(hotswap_tx.clone(), Arc::clone(&metrics), config.metrics);
    let admin_listener = tokio::net::TcpListener::bind(&admin_addr)
        .await
        .map_err(|e| Error::Fatal(format!("bind admin {admin_addr}: {e}")))?;
    log::info!("admin HTTP surface listening on {admin_addr}");
    let admin_task = tokio::spawn(async move {
        let _ = axum::serve(admin_listener, admin_router).await;
    });

    let bind_addr = config.bind_addr();
    let acceptor_result = acceptor::run(&bind_addr, backend, read_only, metrics, hotswap_tx).await;

    hotswap_task.abort();
    admin_task.abort();
    acceptor_result
}
