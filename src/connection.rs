//! Per-connection command loop.
//!
//! One task per accepted socket. Each line is read under a 10s deadline
//! (mirrors the source's read timeout, so a client that stalls mid-request
//! doesn't pin a task forever); a run of blank lines with nothing useful in
//! them for more than 3s is treated as an idle client and the connection is
//! closed rather than waiting out the full 10s again.

use crate::backend::Backend;
use crate::metrics::Metrics;
use crate::proto::{self, Parsed, Request};
use arc_swap::ArcSwap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc::Sender;

const READ_DEADLINE: Duration = Duration::from_secs(10);
const IDLE_CLOSE_AFTER: Duration = Duration::from_secs(3);

pub async fn handle(
    socket: TcpStream,
    backend: Arc<ArcSwap<Box<dyn Backend>>>,
    read_only: Arc<AtomicBool>,
    metrics: Arc<Metrics>,
    hotswap_tx: Sender<String>,
) {
    metrics.connection_opened();
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    let mut idle_since: Option<Instant> = None;

    loop {
        let line = match read_line(&mut reader).await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(_) => {
                metrics.record_network_error();
                break;
            }
        };

        if line.trim().is_empty() {
            let now = Instant::now();
            match idle_since {
                Some(since) if now.duration_since(since) >= IDLE_CLOSE_AFTER => break,
                Some(_) => {}
                None => idle_since = Some(now),
            }
            continue;
        }
        idle_since = None;

        let parsed = match proto::parse_request(line.trim_end_matches(['\r', '\n'])) {
            Ok(p) => p,
            Err(e) => {
                log::debug!("protocol error from client: {e}");
                metrics.record_protocol_error();
                let _ = write_half.write_all(b"ERROR\r\n").await;
                continue;
            }
        };

        let (request, body) = match parsed {
            Parsed::Ready(request) => (request, None),
            Parsed::AwaitingBody { op, key, flags, bytes, noreply } => {
                let body = match read_body(&mut reader, bytes).await {
                    Ok(Some(body)) => body,
                    Ok(None) => break,
                    Err(_) => {
                        metrics.record_network_error();
                        break;
                    }
                };
                (Request::Store { op, key, flags, bytes, noreply }, Some(body))
            }
        };

        let started = Instant::now();
        let live_backend = backend.load_full();
        let response = tokio::task::spawn_blocking({
            let metrics = Arc::clone(&metrics);
            let read_only = Arc::clone(&read_only);
            let hotswap_tx = hotswap_tx.clone();
            move || {
                proto::execute(
                    live_backend.as_ref().as_ref(),
                    &metrics,
                    &read_only,
                    request,
                    body,
                    &hotswap_tx,
                )
            }
        })
        .await;

        let response = match response {
            Ok(r) => r,
            Err(_) => break,
        };
        metrics.record_response_time(started);

        let wire = response.to_wire();
        if !wire.is_empty() && write_half.write_all(&wire).await.is_err() {
            metrics.record_network_error();
            break;
        }
        if response.is_close() {
            break;
        }
    }

    metrics.connection_closed();
}

async fn read_line<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
) -> std::io::Result<Option<String>> {
    let mut line = String::new();
    let read = tokio::time::timeout(READ_DEADLINE, tokio::io::AsyncBufReadExt::read_line(reader, &mut line)).await;
    match read {
        Ok(Ok(0)) => Ok(None),
        Ok(Ok(_)) => Ok(Some(line)),
        Ok(Err(e)) => Err(e),
        Err(_elapsed) => Ok(None),
    }
}

async fn read_body<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    bytes: usize,
) -> std::io::Result<Option<Vec<u8>>> {
    let mut body = vec![0u8; bytes];
    let read = tokio::time::timeout(READ_DEADLINE, reader.read_exact(&mut body));
    match read.await {
        Ok(Ok(_)) => {
            // Body line is followed by its own CRLF terminator; discard it.
            let mut crlf = [0u8; 2];
            let _ = reader.read_exact(&mut crlf).await;
            Ok(Some(body))
        }
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Ok(Err(e)) => Err(e),
        Err(_elapsed) => Ok(None),
    }
}
