//! End-to-end tests that drive the server over a real loopback TCP socket,
//! the way a memcached client would.

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use beano::backend::InMemoryBackend;
use beano::metrics::Metrics;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

async fn spawn_test_server() -> std::net::SocketAddr {
    let backend: Arc<arc_swap::ArcSwap<Box<dyn beano::Backend>>> = Arc::new(
        arc_swap::ArcSwap::from_pointee(Box::new(InMemoryBackend::new(1000, "test")) as Box<dyn beano::Backend>),
    );
    let read_only = Arc::new(AtomicBool::new(false));
    let metrics = Arc::new(Metrics::new());
    let (tx, _rx) = tokio::sync::mpsc::channel(4);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (socket, _) = listener.accept().await.unwrap();
            let backend = Arc::clone(&backend);
            let read_only = Arc::clone(&read_only);
            let metrics = Arc::clone(&metrics);
            let tx = tx.clone();
            tokio::spawn(beano::connection::handle(socket, backend, read_only, metrics, tx));
        }
    });

    addr
}

async fn send_and_read(stream: &mut TcpStream, command: &str, reply_lines: usize) -> Vec<String> {
    stream.write_all(command.as_bytes()).await.unwrap();
    let mut reader = BufReader::new(stream);
    let mut lines = Vec::new();
    for _ in 0..reply_lines {
        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(2), reader.read_line(&mut line))
            .await
            .unwrap()
            .unwrap();
        lines.push(line.trim_end().to_string());
    }
    lines
}

#[tokio::test]
async fn set_and_get_round_trip_over_the_wire() {
    let addr = spawn_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let reply = send_and_read(&mut stream, "set greeting 0 0 5\r\nhello\r\n", 1).await;
    assert_eq!(reply, vec!["STORED"]);

    let reply = send_and_read(&mut stream, "get greeting\r\n", 3).await;
    assert_eq!(reply[0], "VALUE greeting 0 5");
    assert_eq!(reply[1], "hello");
    assert_eq!(reply[2], "END");
}

#[tokio::test]
async fn incr_and_decr_round_trip_over_the_wire() {
    let addr = spawn_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    send_and_read(&mut stream, "set counter 0 0 2\r\n10\r\n", 1).await;
    let reply = send_and_read(&mut stream, "incr counter 5\r\n", 1).await;
    assert_eq!(reply, vec!["15"]);
    let reply = send_and_read(&mut stream, "decr counter 3\r\n", 1).await;
    assert_eq!(reply, vec!["12"]);
}

#[tokio::test]
async fn delete_reports_not_found_for_missing_key() {
    let addr = spawn_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let reply = send_and_read(&mut stream, "delete nope\r\n", 1).await;
    assert_eq!(reply, vec!["NOT_FOUND"]);
}

#[tokio::test]
async fn noreply_suppresses_the_wire_response() {
    let addr = spawn_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(b"set silent 0 0 1 noreply\r\nx\r\nget silent\r\n")
        .await
        .unwrap();
    let mut reader = BufReader::new(&mut stream);
    let mut line = String::new();
    tokio::time::timeout(Duration::from_secs(2), reader.read_line(&mut line))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line.trim_end(), "VALUE silent 0 1");
}

#[tokio::test]
async fn quit_closes_the_connection() {
    let addr = spawn_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"quit\r\n").await.unwrap();

    let mut buf = [0u8; 8];
    let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}
