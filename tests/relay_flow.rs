//! End-to-end flow: topic notifications in, SSE frames out

use std::sync::Arc;
use std::time::Duration;

use detection_relay::relay;
use detection_relay::store::NotificationStream;
use detection_relay::{
    ConnectionRegistry, DetectionRecord, Error, FrameCounter, MemoryStore, NotificationListener,
    RegistryConfig, RelayConfig, RelayServer, ServerConfig, StoreError,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

const STREAM_REQUEST: &[u8] = b"GET /api/image-metadata/stream HTTP/1.1\r\nHost: relay\r\n\r\n";

fn insert_detection(store: &MemoryStore, timestamp: i64, confidence: f64) -> String {
    let key = format!("image_metadata:{}", timestamp);
    store.insert(
        key.clone(),
        [
            ("timestamp", timestamp.to_string()),
            ("center_x", "10.0".to_string()),
            ("center_y", "20.0".to_string()),
            ("width", "400.0".to_string()),
            ("height", "300.0".to_string()),
            ("confidence", confidence.to_string()),
        ],
    );
    key
}

fn notification_channel() -> (mpsc::UnboundedSender<String>, NotificationStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|msg| (msg, rx))
    });
    (tx, Box::pin(stream))
}

async fn start_server(registry: Arc<ConnectionRegistry>) -> std::net::SocketAddr {
    let server = RelayServer::new(ServerConfig::default(), registry);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        server
            .serve_until(listener, std::future::pending())
            .await
            .unwrap();
    });

    addr
}

/// Connect, retrying while the server is still binding
async fn connect(addr: std::net::SocketAddr) -> TcpStream {
    for _ in 0..200 {
        if let Ok(stream) = TcpStream::connect(addr).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server at {} never came up", addr);
}

async fn subscribe(addr: std::net::SocketAddr) -> BufReader<TcpStream> {
    let mut stream = connect(addr).await;
    stream.write_all(STREAM_REQUEST).await.unwrap();

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line, "HTTP/1.1 200 OK\r\n");
    loop {
        line.clear();
        reader.read_line(&mut line).await.unwrap();
        if line == "\r\n" {
            break;
        }
    }
    reader
}

async fn wait_for_connections(registry: &ConnectionRegistry, n: usize) {
    for _ in 0..200 {
        if registry.connection_count().await == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} connections", n);
}

/// Next record event, skipping heartbeats and blank separators
async fn next_record(reader: &mut BufReader<TcpStream>) -> DetectionRecord {
    let mut line = String::new();
    loop {
        line.clear();
        let n = tokio::time::timeout(Duration::from_secs(5), reader.read_line(&mut line))
            .await
            .expect("timed out waiting for event")
            .unwrap();
        assert!(n > 0, "stream closed");

        if let Some(body) = line.trim_end().strip_prefix("data:") {
            return serde_json::from_str(body).unwrap();
        }
    }
}

#[tokio::test]
async fn test_notifications_fan_out_to_subscribers() {
    let store = MemoryStore::new();
    let keys: Vec<String> = [100, 101, 102, 200]
        .into_iter()
        .map(|ts| insert_detection(&store, ts, 88.25))
        .collect();
    let late_key = insert_detection(&store, 201, 51.0);

    let registry = Arc::new(ConnectionRegistry::new());
    let addr = start_server(Arc::clone(&registry)).await;

    let mut first = subscribe(addr).await;
    let mut second = subscribe(addr).await;
    wait_for_connections(&registry, 2).await;

    let listener = NotificationListener::new(store, FrameCounter::new(), Arc::clone(&registry));
    let (tx, notifications) = notification_channel();
    tokio::spawn(async move { listener.run(notifications).await });

    tx.send(keys[0].clone()).unwrap();
    tx.send("image_metadata:does-not-exist".to_string()).unwrap();
    for key in &keys[1..] {
        tx.send(key.clone()).unwrap();
    }

    for reader in [&mut first, &mut second] {
        let mut counts = Vec::new();
        for expected in [100, 101, 102, 200] {
            let record = next_record(reader).await;
            assert_eq!(record.timestamp, expected);
            assert_eq!(record.confidence, 88.25);
            counts.push(record.people_count);
        }
        assert_eq!(counts, vec![0, 0, 0, 3]);
    }

    // One subscriber leaves; the other keeps receiving
    drop(second);
    wait_for_connections(&registry, 1).await;

    tx.send(late_key).unwrap();
    let record = next_record(&mut first).await;
    assert_eq!(record.timestamp, 201);
    assert_eq!(record.people_count, 3);
}

#[tokio::test]
async fn test_heartbeat_reaches_stream() {
    let registry = Arc::new(ConnectionRegistry::new());
    let addr = start_server(Arc::clone(&registry)).await;

    let mut reader = subscribe(addr).await;
    wait_for_connections(&registry, 1).await;

    let report = detection_relay::HeartbeatScheduler::new(Arc::clone(&registry))
        .tick()
        .await;
    assert_eq!(report.delivered, 1);

    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line, ":heartbeat\n");
}

#[tokio::test]
async fn test_registry_close_ends_client_stream() {
    let registry = Arc::new(ConnectionRegistry::new());
    let addr = start_server(Arc::clone(&registry)).await;

    let mut reader = subscribe(addr).await;
    wait_for_connections(&registry, 1).await;

    let handle = registry.snapshot().await.pop().unwrap();
    assert!(registry.unregister(handle.id()).await);

    let mut line = String::new();
    let n = tokio::time::timeout(Duration::from_secs(5), reader.read_line(&mut line))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

/// Line-level read with a deadline; returns an empty string at EOF
async fn read_line_timeout(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    tokio::time::timeout(Duration::from_secs(5), reader.read_line(&mut line))
        .await
        .expect("timed out waiting for stream data")
        .unwrap();
    line
}

async fn free_addr() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn test_run_with_relays_notifications_until_stream_ends() {
    let store = MemoryStore::new();
    let keys: Vec<String> = [100, 101, 102, 200]
        .into_iter()
        .map(|ts| insert_detection(&store, ts, 70.0))
        .collect();

    let addr = free_addr().await;
    let config = RelayConfig::default()
        .server(ServerConfig::with_addr(addr))
        .registry(RegistryConfig::default().heartbeat_interval(Duration::from_millis(50)));

    let (tx, notifications) = notification_channel();
    let running = tokio::spawn(relay::run_with(
        config,
        store,
        notifications,
        std::future::pending(),
    ));

    let mut reader = subscribe(addr).await;

    // A heartbeat proves the connection is registered with the running relay
    loop {
        let line = read_line_timeout(&mut reader).await;
        assert!(!line.is_empty(), "stream closed");
        if line == ":heartbeat\n" {
            break;
        }
    }

    for key in &keys {
        tx.send(key.clone()).unwrap();
    }

    let mut counts = Vec::new();
    for expected in [100, 101, 102, 200] {
        let record = next_record(&mut reader).await;
        assert_eq!(record.timestamp, expected);
        counts.push(record.people_count);
    }
    assert_eq!(counts, vec![0, 0, 0, 3]);

    // Losing the notification stream stops the relay with an error
    drop(tx);
    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("relay kept running without a subscription")
        .unwrap();
    assert!(matches!(
        result,
        Err(Error::Store(StoreError::SubscriptionClosed))
    ));

    // and closes every subscriber
    loop {
        if read_line_timeout(&mut reader).await.is_empty() {
            break;
        }
    }
}
