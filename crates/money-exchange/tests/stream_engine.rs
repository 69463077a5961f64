//! 스트리밍 엔진 통합 테스트.
//!
//! 프로세스 내 WebSocket 서버를 띄워 연결, 재연결, 하트비트, 취소를 검증합니다.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;

use money_core::{Alert, AlertError, AlertLevel, AlertManager, AlertSink, Venue, VenueConfig};
use money_exchange::stream::{spawn_stream, StreamConfig, StreamState};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct RecordingSink(Mutex<Vec<Alert>>);

impl RecordingSink {
    fn alerts(&self) -> Vec<Alert> {
        self.0.lock().unwrap().clone()
    }

    async fn wait_for(&self, predicate: impl Fn(&Alert) -> bool) -> Alert {
        timeout(WAIT, async {
            loop {
                if let Some(alert) = self.alerts().into_iter().find(|a| predicate(a)) {
                    return alert;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("alert not emitted")
    }
}

impl AlertSink for RecordingSink {
    fn emit(&self, alert: &Alert) -> Result<(), AlertError> {
        self.0.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

fn test_config() -> VenueConfig {
    VenueConfig {
        reconnect_min_delay_ms: 10,
        reconnect_max_delay_ms: 100,
        connect_timeout_ms: 1000,
        ..Default::default()
    }
}

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

fn stream_config(addr: SocketAddr) -> StreamConfig {
    StreamConfig::new(Venue::Binance, format!("ws://{}", addr), &test_config()).unwrap()
}

#[tokio::test]
async fn test_invalid_json_skipped_and_order_preserved() {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
        for text in [r#"{"n":1}"#, "not json", r#"{"n":2}"#, r#"{"n":3}"#] {
            ws.send(Message::Text(text.to_string())).await.unwrap();
        }
        while let Some(Ok(_)) = ws.next().await {}
    });

    let sink = Arc::new(RecordingSink::default());
    let (tx, mut rx) = mpsc::channel::<Value>(16);
    let handle = spawn_stream(stream_config(addr), tx, AlertManager::new(sink.clone()));

    let mut received = Vec::new();
    for _ in 0..3 {
        let message = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        received.push(message["n"].as_i64().unwrap());
    }
    assert_eq!(received, vec![1, 2, 3]);
    assert_eq!(handle.state(), StreamState::Connected);

    let alert = sink
        .wait_for(|a| a.message.contains("invalid JSON"))
        .await;
    assert_eq!(alert.level, AlertLevel::Warning);
    assert_eq!(alert.context["payload"], "not json");
    assert_eq!(alert.context["venue"], "binance");

    let mut state = handle.watch_state();
    handle.cancel().await;
    assert_eq!(*state.borrow_and_update(), StreamState::Cancelled);
}

#[tokio::test]
async fn test_reconnect_resends_initial_frames() {
    let (listener, addr) = bind().await;
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        for connection in 0..2 {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();

            if let Some(Ok(Message::Text(frame))) = ws.next().await {
                frames_tx.send(frame).unwrap();
            }

            if connection == 0 {
                // 첫 연결은 서버가 끊음
                let _ = ws.close(None).await;
                continue;
            }

            ws.send(Message::Text(r#"{"after":"reconnect"}"#.to_string()))
                .await
                .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        }
    });

    let subscribe = json!({"op": "subscribe", "args": ["trades"]}).to_string();
    let sink = Arc::new(RecordingSink::default());
    let (tx, mut rx) = mpsc::channel::<Value>(16);
    let handle = spawn_stream(
        stream_config(addr).with_initial_frame(subscribe.clone()),
        tx,
        AlertManager::new(sink.clone()),
    );

    let first = timeout(WAIT, frames_rx.recv()).await.unwrap().unwrap();
    let second = timeout(WAIT, frames_rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, subscribe);
    assert_eq!(second, subscribe);

    let message = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(message["after"], "reconnect");

    let disconnected = sink
        .wait_for(|a| a.message.contains("disconnected"))
        .await;
    assert_eq!(disconnected.level, AlertLevel::Warning);

    let connected = sink
        .alerts()
        .into_iter()
        .filter(|a| a.level == AlertLevel::Info && a.message.contains("connected"))
        .count();
    assert_eq!(connected, 2);

    handle.cancel().await;
}

#[tokio::test]
async fn test_server_ping_answered_with_pong() {
    let (listener, addr) = bind().await;
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
        ws.send(Message::Ping(b"hello".to_vec())).await.unwrap();
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Pong(payload) = message {
                let _ = pong_tx.send(payload);
            }
        }
    });

    let (tx, _rx) = mpsc::channel::<Value>(1);
    let handle = spawn_stream(stream_config(addr), tx, AlertManager::default());

    let payload = timeout(WAIT, pong_rx.recv()).await.unwrap().unwrap();
    assert_eq!(payload, b"hello".to_vec());

    handle.cancel().await;
}

#[tokio::test]
async fn test_heartbeat_pings_server() {
    let (listener, addr) = bind().await;
    let (ping_tx, mut ping_rx) = mpsc::unbounded_channel::<()>();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
        while let Some(Ok(message)) = ws.next().await {
            if message.is_ping() {
                let _ = ping_tx.send(());
            }
        }
    });

    let (tx, _rx) = mpsc::channel::<Value>(1);
    let handle = spawn_stream(
        stream_config(addr).with_heartbeat(Duration::from_millis(20)),
        tx,
        AlertManager::default(),
    );

    for _ in 0..2 {
        timeout(WAIT, ping_rx.recv()).await.unwrap().unwrap();
    }
    assert_eq!(handle.state(), StreamState::Connected);

    handle.cancel().await;
}

#[tokio::test]
async fn test_dropped_receiver_ends_subscription() {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
        loop {
            if ws.send(Message::Text(r#"{"tick":1}"#.to_string())).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    let (tx, mut rx) = mpsc::channel::<Value>(1);
    let handle = spawn_stream(stream_config(addr), tx, AlertManager::default());

    timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    drop(rx);

    let mut state = handle.watch_state();
    timeout(WAIT, state.wait_for(|s| *s == StreamState::Cancelled))
        .await
        .unwrap()
        .unwrap();
    timeout(WAIT, handle.join()).await.unwrap();
}

#[tokio::test]
async fn test_connect_failure_alerts_and_cancel_stops_retrying() {
    // 바인딩 후 바로 닫아 연결이 거부되는 주소를 얻음
    let (listener, addr) = bind().await;
    drop(listener);

    let sink = Arc::new(RecordingSink::default());
    let (tx, _rx) = mpsc::channel::<Value>(1);
    let handle = spawn_stream(stream_config(addr), tx, AlertManager::new(sink.clone()));

    let alert = sink
        .wait_for(|a| a.message.contains("disconnected"))
        .await;
    assert_eq!(alert.level, AlertLevel::Warning);
    assert!(alert.context["error"].starts_with("io error"));
    assert_ne!(handle.state(), StreamState::Connected);

    let mut state = handle.watch_state();
    timeout(WAIT, handle.cancel()).await.unwrap();
    assert_eq!(*state.borrow_and_update(), StreamState::Cancelled);
}

#[tokio::test]
async fn test_cancel_completes_while_handler_is_blocked() {
    let (listener, addr) = bind().await;
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel::<()>();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
        for n in 0..5 {
            ws.send(Message::Text(json!({ "n": n }).to_string()))
                .await
                .unwrap();
        }
        while let Some(Ok(_)) = ws.next().await {}
        let _ = closed_tx.send(());
    });

    // 수신자를 읽지 않으므로 두 번째 메시지부터 핸들러가 막힘
    let (tx, rx) = mpsc::channel::<Value>(1);
    let handle = spawn_stream(stream_config(addr), tx, AlertManager::default());

    let mut state = handle.watch_state();
    timeout(WAIT, state.wait_for(|s| *s == StreamState::Connected))
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    timeout(Duration::from_secs(3), handle.cancel())
        .await
        .expect("cancel blocked by handler");
    assert_eq!(*state.borrow_and_update(), StreamState::Cancelled);
    timeout(WAIT, closed_rx.recv()).await.unwrap().unwrap();
    drop(rx);
}

#[tokio::test]
async fn test_receiver_dropped_while_reconnecting_ends_subscription() {
    let (listener, addr) = bind().await;
    drop(listener);

    let sink = Arc::new(RecordingSink::default());
    let (tx, rx) = mpsc::channel::<Value>(1);
    let handle = spawn_stream(stream_config(addr), tx, AlertManager::new(sink.clone()));

    sink.wait_for(|a| a.message.contains("disconnected")).await;
    drop(rx);

    let mut state = handle.watch_state();
    timeout(WAIT, state.wait_for(|s| *s == StreamState::Cancelled))
        .await
        .unwrap()
        .unwrap();
    timeout(WAIT, handle.join()).await.unwrap();
}

#[tokio::test]
async fn test_idle_connection_is_dropped_and_reconnected() {
    let (listener, addr) = bind().await;
    let accepted = Arc::new(AtomicUsize::new(0));
    let server_accepted = accepted.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _) = listener.accept().await.unwrap();
            server_accepted.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                // 아무것도 보내지 않음
                let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });

    let sink = Arc::new(RecordingSink::default());
    let (tx, _rx) = mpsc::channel::<Value>(1);
    let handle = spawn_stream(
        stream_config(addr).with_idle_timeout(Some(Duration::from_millis(100))),
        tx,
        AlertManager::new(sink.clone()),
    );

    let alert = sink
        .wait_for(|a| a.message.contains("disconnected"))
        .await;
    assert_eq!(alert.level, AlertLevel::Warning);
    assert_eq!(alert.context["error"], "no data for 100ms");

    timeout(WAIT, async {
        while accepted.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no reconnect after idle timeout");

    handle.cancel().await;
}

#[tokio::test]
async fn test_heartbeat_restarts_per_connection_and_stops_on_close() {
    let (listener, addr) = bind().await;
    let pings: Arc<[AtomicUsize; 2]> = Arc::new([AtomicUsize::new(0), AtomicUsize::new(0)]);
    let (ended_tx, mut ended_rx) = mpsc::unbounded_channel::<(usize, usize)>();

    let server_pings = pings.clone();
    tokio::spawn(async move {
        for connection in 0..2 {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            while let Some(Ok(message)) = ws.next().await {
                if message.is_ping() {
                    let seen = server_pings[connection].fetch_add(1, Ordering::SeqCst) + 1;
                    if connection == 0 && seen == 2 {
                        let _ = ws.close(None).await;
                    }
                }
            }
            let seen = server_pings[connection].load(Ordering::SeqCst);
            let _ = ended_tx.send((connection, seen));
        }
    });

    let (tx, _rx) = mpsc::channel::<Value>(1);
    let handle = spawn_stream(
        stream_config(addr).with_heartbeat(Duration::from_millis(20)),
        tx,
        AlertManager::default(),
    );

    let (first, pings_at_close) = timeout(WAIT, ended_rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, 0);
    assert!(pings_at_close >= 2);
    timeout(WAIT, async {
        while pings[1].load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("heartbeat not running on second connection");

    // 닫힌 첫 연결로는 더 이상 ping이 나가지 않음
    assert_eq!(pings[0].load(Ordering::SeqCst), pings_at_close);

    handle.cancel().await;
    let (second, _) = timeout(WAIT, ended_rx.recv()).await.unwrap().unwrap();
    assert_eq!(second, 1);
    let after_cancel = pings[1].load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pings[1].load(Ordering::SeqCst), after_cancel);
}

#[tokio::test]
async fn test_stable_connection_resets_reconnect_delay() {
    let (listener, addr) = bind().await;
    let (accept_tx, mut accept_rx) = mpsc::unbounded_channel::<Instant>();
    tokio::spawn(async move {
        loop {
            let (socket, _) = listener.accept().await.unwrap();
            let _ = accept_tx.send(Instant::now());
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            let _ = ws.close(None).await;
            while let Some(Ok(_)) = ws.next().await {}
        }
    });

    // 연결에 성공하기만 하면 안정 연결로 간주
    let config = VenueConfig {
        reconnect_min_delay_ms: 50,
        reconnect_max_delay_ms: 5_000,
        stable_connection_secs: 0,
        ..test_config()
    };
    let (tx, _rx) = mpsc::channel::<Value>(1);
    let handle = spawn_stream(
        StreamConfig::new(Venue::Binance, format!("ws://{}", addr), &config).unwrap(),
        tx,
        AlertManager::default(),
    );

    let mut accepted = Vec::new();
    for _ in 0..6 {
        accepted.push(timeout(WAIT, accept_rx.recv()).await.unwrap().unwrap());
    }
    handle.cancel().await;

    // 초기화가 없으면 다섯 번째 대기는 800ms
    let last_gap = accepted[5].duration_since(accepted[4]);
    assert!(last_gap < Duration::from_millis(400), "gap {:?}", last_gap);
}

#[tokio::test]
async fn test_rejected_handshake_raises_critical_alert() {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = socket
                    .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n")
                    .await;
            });
        }
    });

    let sink = Arc::new(RecordingSink::default());
    let (tx, _rx) = mpsc::channel::<Value>(1);
    let handle = spawn_stream(stream_config(addr), tx, AlertManager::new(sink.clone()));

    let alert = sink
        .wait_for(|a| a.message.contains("disconnected"))
        .await;
    assert_eq!(alert.level, AlertLevel::Critical);
    assert!(alert.context["error"].starts_with("unexpected error"));
    assert_ne!(handle.state(), StreamState::Connected);

    handle.cancel().await;
}
