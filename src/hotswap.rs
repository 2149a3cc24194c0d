//! Hot-swap coordinator.
//!
//! Consumes paths sent by the `switchdb` command (or the admin HTTP
//! endpoint) and atomically replaces the live backend with a freshly opened
//! one at the new path, without ever leaving a window where readers see a
//! half-open backend. The two `2s` pauses bracket the swap so in-flight
//! reads against the old backend have time to drain before it's closed, and
//! so a client that raced the read-only flag sees it consistently for a
//! moment before new traffic resumes.

use crate::backend::Backend;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;

const PRE_SWAP_DRAIN: Duration = Duration::from_secs(2);
const POST_SWAP_DRAIN: Duration = Duration::from_secs(2);

pub type BackendFactory = Box<dyn Fn(&str) -> crate::error::Result<Box<dyn Backend>> + Send>;

pub async fn run(
    mut requests: Receiver<String>,
    backend: Arc<ArcSwap<Box<dyn Backend>>>,
    read_only: Arc<AtomicBool>,
    open_backend: BackendFactory,
) {
    while let Some(new_path) = requests.recv().await {
        let current_path = backend.load().db_path().to_string();
        if current_path == new_path {
            log::warn!("switchdb requested current path {new_path}, ignoring");
            continue;
        }

        log::info!("switching backend from {current_path} to {new_path}");
        read_only.store(true, Ordering::SeqCst);
        tokio::time::sleep(PRE_SWAP_DRAIN).await;

        let new_backend = match open_backend(&new_path) {
            Ok(b) => b,
            Err(e) => {
                log::error!("failed to open new backend at {new_path}: {e}");
                read_only.store(false, Ordering::SeqCst);
                continue;
            }
        };

        let old_backend = backend.swap(Arc::new(new_backend));
        tokio::time::sleep(POST_SWAP_DRAIN).await;

        if let Err(e) = old_backend.close() {
            log::warn!("error closing previous backend at {current_path}: {e}");
        }
        read_only.store(false, Ordering::SeqCst);
        log::info!("backend switch to {new_path} complete");
    }
}
