//! End-to-end tests driving the server over a real WebSocket connection

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use streamcache::{CacheGeometry, CacheServer, RegistryConfig, ServerConfig};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Bind an ephemeral port, spawn the server on it, return its address
async fn spawn_server(cache_dir: &TempDir) -> SocketAddr {
    spawn_server_with_geometry(cache_dir, CacheGeometry::default()).await
}

async fn spawn_server_with_geometry(cache_dir: &TempDir, geometry: CacheGeometry) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let registry_config = RegistryConfig::default()
        .cache_dir(cache_dir.path())
        .geometry(geometry);
    let server = CacheServer::with_registry_config(ServerConfig::default(), registry_config);

    tokio::spawn(async move {
        let _ = server.serve(listener, std::future::pending()).await;
    });
    addr
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{addr}/audio")).await.unwrap();
    ws
}

async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

async fn recv_message(ws: &mut WsClient) -> Message {
    loop {
        let message = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed unexpectedly")
            .expect("websocket error");
        match message {
            Message::Ping(_) | Message::Pong(_) => continue,
            other => return other,
        }
    }
}

async fn recv_json(ws: &mut WsClient) -> Value {
    match recv_message(ws).await {
        Message::Text(text) => serde_json::from_str(&text).expect("valid JSON"),
        other => panic!("expected text frame, got {other:?}"),
    }
}

async fn recv_binary(ws: &mut WsClient) -> Vec<u8> {
    match recv_message(ws).await {
        Message::Binary(data) => data,
        other => panic!("expected binary frame, got {other:?}"),
    }
}

fn pseudorandom_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

#[tokio::test]
async fn test_small_roundtrip() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_server(&dir).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, json!({"type": "START", "streamId": "s1"})).await;
    let started = recv_json(&mut ws).await;
    assert_eq!(started["type"], "STARTED");
    assert_eq!(started["streamId"], "s1");

    ws.send(Message::Binary(vec![0x01, 0x02, 0x03, 0x04]))
        .await
        .unwrap();

    send_json(&mut ws, json!({"type": "STOP", "streamId": "s1"})).await;
    let stopped = recv_json(&mut ws).await;
    assert_eq!(stopped["type"], "STOPPED");
    assert_eq!(stopped["streamId"], "s1");

    send_json(
        &mut ws,
        json!({"type": "GET", "streamId": "s1", "offset": 0, "length": 4}),
    )
    .await;
    assert_eq!(recv_binary(&mut ws).await, vec![0x01, 0x02, 0x03, 0x04]);

    // The backing file is the raw payload, truncated to its logical length.
    assert_eq!(
        std::fs::read(dir.path().join("s1.cache")).unwrap(),
        vec![0x01, 0x02, 0x03, 0x04]
    );
}

#[tokio::test]
async fn test_mid_upload_read_and_end_of_stream() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_server(&dir).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, json!({"type": "START", "streamId": "s1"})).await;
    recv_json(&mut ws).await;

    ws.send(Message::Binary(vec![0xAA; 100])).await.unwrap();

    // Read a prefix while the stream is still uploading.
    send_json(
        &mut ws,
        json!({"type": "GET", "streamId": "s1", "offset": 0, "length": 50}),
    )
    .await;
    assert_eq!(recv_binary(&mut ws).await, vec![0xAA; 50]);

    send_json(
        &mut ws,
        json!({"type": "GET", "streamId": "s1", "offset": 100, "length": 1}),
    )
    .await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "ERROR");
    assert_eq!(reply["message"], "No data available");
}

#[tokio::test]
async fn test_cross_segment_read() {
    let dir = TempDir::new().unwrap();
    // Small segments exercise the same boundary decomposition as 1 GiB ones.
    let segment = 4096u64;
    let addr =
        spawn_server_with_geometry(&dir, CacheGeometry::new(segment, segment * 8)).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, json!({"type": "START", "streamId": "big"})).await;
    recv_json(&mut ws).await;

    let payload = pseudorandom_bytes(segment as usize * 2 + 512, 42);
    for chunk in payload.chunks(1000) {
        ws.send(Message::Binary(chunk.to_vec())).await.unwrap();
    }
    send_json(&mut ws, json!({"type": "STOP", "streamId": "big"})).await;
    recv_json(&mut ws).await;

    // 128 bytes straddling the first segment boundary.
    let offset = segment - 64;
    send_json(
        &mut ws,
        json!({"type": "GET", "streamId": "big", "offset": offset, "length": 128}),
    )
    .await;
    let read = recv_binary(&mut ws).await;
    assert_eq!(read, &payload[offset as usize..offset as usize + 128]);

    // Full-range read matches the generator byte for byte.
    send_json(
        &mut ws,
        json!({"type": "GET", "streamId": "big", "offset": 0, "length": payload.len()}),
    )
    .await;
    assert_eq!(recv_binary(&mut ws).await, payload);
}

#[tokio::test]
async fn test_concurrent_uploads_stay_isolated() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_server(&dir).await;
    let mut ws_a = connect(addr).await;
    let mut ws_b = connect(addr).await;

    send_json(&mut ws_a, json!({"type": "START", "streamId": "s_a"})).await;
    recv_json(&mut ws_a).await;
    send_json(&mut ws_b, json!({"type": "START", "streamId": "s_b"})).await;
    recv_json(&mut ws_b).await;

    let payload_a = pseudorandom_bytes(10_000, 1);
    let payload_b = pseudorandom_bytes(14_000, 2);

    // Interleave frames from both connections.
    let mut chunks_a = payload_a.chunks(1024);
    let mut chunks_b = payload_b.chunks(1024);
    loop {
        let a = chunks_a.next();
        let b = chunks_b.next();
        if a.is_none() && b.is_none() {
            break;
        }
        if let Some(chunk) = a {
            ws_a.send(Message::Binary(chunk.to_vec())).await.unwrap();
        }
        if let Some(chunk) = b {
            ws_b.send(Message::Binary(chunk.to_vec())).await.unwrap();
        }
    }

    send_json(&mut ws_a, json!({"type": "STOP", "streamId": "s_a"})).await;
    recv_json(&mut ws_a).await;
    send_json(&mut ws_b, json!({"type": "STOP", "streamId": "s_b"})).await;
    recv_json(&mut ws_b).await;

    // Either connection can read either stream; each holds exactly its own bytes.
    send_json(
        &mut ws_b,
        json!({"type": "GET", "streamId": "s_a", "offset": 0, "length": payload_a.len()}),
    )
    .await;
    assert_eq!(recv_binary(&mut ws_b).await, payload_a);

    send_json(
        &mut ws_a,
        json!({"type": "GET", "streamId": "s_b", "offset": 0, "length": payload_b.len()}),
    )
    .await;
    assert_eq!(recv_binary(&mut ws_a).await, payload_b);
}

#[tokio::test]
async fn test_get_unknown_stream() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_server(&dir).await;
    let mut ws = connect(addr).await;

    send_json(
        &mut ws,
        json!({"type": "GET", "streamId": "nope", "offset": 0, "length": 1}),
    )
    .await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "ERROR");
    assert_eq!(reply["message"], "Failed to read from stream: nope");
}

#[tokio::test]
async fn test_malformed_json_then_recovery() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_server(&dir).await;
    let mut ws = connect(addr).await;

    ws.send(Message::Text("{not json".to_string())).await.unwrap();
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "ERROR");
    assert_eq!(reply["message"], "Invalid JSON format");

    // A valid START on the same connection still succeeds.
    send_json(&mut ws, json!({"type": "START", "streamId": "s1"})).await;
    let started = recv_json(&mut ws).await;
    assert_eq!(started["type"], "STARTED");
}

#[tokio::test]
async fn test_stream_outlives_uploader_connection() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_server(&dir).await;

    let payload = pseudorandom_bytes(2048, 7);
    {
        let mut uploader = connect(addr).await;
        send_json(&mut uploader, json!({"type": "START", "streamId": "s1"})).await;
        recv_json(&mut uploader).await;
        uploader
            .send(Message::Binary(payload.clone()))
            .await
            .unwrap();
        send_json(&mut uploader, json!({"type": "STOP", "streamId": "s1"})).await;
        recv_json(&mut uploader).await;
        uploader.close(None).await.unwrap();
    }

    // A fresh connection downloads what the old one uploaded.
    let mut downloader = connect(addr).await;
    send_json(
        &mut downloader,
        json!({"type": "GET", "streamId": "s1", "offset": 0, "length": payload.len()}),
    )
    .await;
    assert_eq!(recv_binary(&mut downloader).await, payload);
}

#[tokio::test]
async fn test_second_start_on_bound_connection_rejected() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_server(&dir).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, json!({"type": "START", "streamId": "s1"})).await;
    recv_json(&mut ws).await;

    send_json(&mut ws, json!({"type": "START", "streamId": "s2"})).await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "ERROR");
    assert_eq!(reply["message"], "Connection already bound to stream s1");
}
