//! 재연결하는 WebSocket 스트리밍 엔진.
//!
//! 구독마다 하나의 태스크가 연결을 소유합니다:
//!
//! ```text
//! Disconnected → Connecting → Connected → Disconnected → ... → Cancelled
//! ```
//!
//! - 연결 전 현재 백오프만큼 대기 (첫 연결은 대기 없음)
//! - 연결되면 초기 프레임(구독 메시지)을 보내고 하트비트 자식 태스크 시작
//! - 수신 메시지는 JSON으로 디코딩해 핸들러에 순서대로 전달
//! - 연결이 끊기면 하트비트를 취소하고 종료를 기다린 뒤 재연결
//! - 명시적 취소 시에만 종료

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, protocol::Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use money_core::{AlertManager, Venue, VenueConfig};

use super::backoff::Backoff;
use super::handler::StreamHandler;
use crate::error::ExchangeResult;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = Arc<Mutex<SplitSink<WsStream, Message>>>;

/// 구독 연결 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Connected,
    /// 취소되어 더 이상 재연결하지 않음
    Cancelled,
}

/// 스트림 구독 설정.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub venue: Venue,
    pub url: String,
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
    /// 이 시간 동안 아무것도 수신하지 못하면 연결을 끊고 재연결
    pub idle_timeout: Option<Duration>,
    /// (재)연결마다 전송할 텍스트 프레임
    pub initial_frames: Vec<String>,
    pub backoff: Backoff,
}

impl StreamConfig {
    pub fn new(venue: Venue, url: impl Into<String>, config: &VenueConfig) -> ExchangeResult<Self> {
        Ok(Self {
            venue,
            url: url.into(),
            heartbeat_interval: config.heartbeat_interval(),
            connect_timeout: config.connect_timeout(),
            idle_timeout: config.idle_timeout(),
            initial_frames: Vec::new(),
            backoff: Backoff::from_config(config)?,
        })
    }

    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_initial_frame(mut self, frame: impl Into<String>) -> Self {
        self.initial_frames.push(frame.into());
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

/// 실행 중인 구독의 핸들.
///
/// 핸들을 버려도 구독은 계속 실행됩니다. 종료하려면 [`cancel`](Self::cancel)을
/// 호출하세요.
#[derive(Debug)]
pub struct SubscriptionHandle {
    cancel: CancellationToken,
    state: watch::Receiver<StreamState>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// 현재 연결 상태.
    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// 상태 변화를 구독합니다.
    pub fn watch_state(&self) -> watch::Receiver<StreamState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// 구독 취소 토큰.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 구독을 취소하고 태스크 종료를 기다립니다.
    pub async fn cancel(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Stream task ended abnormally");
        }
    }

    /// 취소 없이 태스크 종료를 기다립니다.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Stream task ended abnormally");
        }
    }
}

/// 스트림 구독을 시작합니다.
pub fn spawn_stream<H>(config: StreamConfig, handler: H, alerts: AlertManager) -> SubscriptionHandle
where
    H: StreamHandler + 'static,
{
    spawn_stream_with_token(config, handler, alerts, CancellationToken::new())
}

/// 외부 취소 토큰에 묶인 스트림 구독을 시작합니다.
pub fn spawn_stream_with_token<H>(
    config: StreamConfig,
    handler: H,
    alerts: AlertManager,
    cancel: CancellationToken,
) -> SubscriptionHandle
where
    H: StreamHandler + 'static,
{
    let (state_tx, state_rx) = watch::channel(StreamState::Disconnected);
    let span = money_core::venue_span!("stream", config.venue, config.url);
    let task = tokio::spawn(
        StreamSession {
            config,
            alerts,
            cancel: cancel.clone(),
            state: state_tx,
        }
        .run(handler)
        .instrument(span),
    );

    SubscriptionHandle {
        cancel,
        state: state_rx,
        task,
    }
}

/// 연결 종료 사유.
#[derive(Debug)]
enum Disconnect {
    /// 정상/비정상 close 프레임 또는 스트림 종료
    Closed(String),
    /// 소켓 I/O 실패
    Io(String),
    /// 하트비트 전송 실패
    Heartbeat(String),
    /// 수신 없음
    Idle(Duration),
    /// 그 외 프로토콜/TLS 에러
    Unexpected(String),
}

impl Disconnect {
    fn from_ws_error(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Disconnect::Closed(err.to_string())
            }
            tungstenite::Error::Io(e) => Disconnect::Io(e.to_string()),
            other => Disconnect::Unexpected(other.to_string()),
        }
    }

    fn describe(&self) -> String {
        match self {
            Disconnect::Closed(reason) => format!("closed: {}", reason),
            Disconnect::Io(e) => format!("io error: {}", e),
            Disconnect::Heartbeat(e) => format!("heartbeat failed: {}", e),
            Disconnect::Idle(after) => format!("no data for {}ms", after.as_millis()),
            Disconnect::Unexpected(e) => format!("unexpected error: {}", e),
        }
    }

    fn is_unexpected(&self) -> bool {
        matches!(self, Disconnect::Unexpected(_))
    }
}

/// 한 연결의 종료 결과.
enum SessionEnd {
    Cancelled,
    /// 핸들러가 더 이상 메시지를 받지 않음
    HandlerClosed,
    Disconnected(Disconnect),
}

struct StreamSession {
    config: StreamConfig,
    alerts: AlertManager,
    cancel: CancellationToken,
    state: watch::Sender<StreamState>,
}

impl StreamSession {
    fn context(&self, extra: &[(&str, String)]) -> BTreeMap<String, String> {
        let mut context = BTreeMap::new();
        context.insert("venue".to_string(), self.config.venue.to_string());
        context.insert("url".to_string(), self.config.url.clone());
        for (k, v) in extra {
            context.insert(k.to_string(), v.clone());
        }
        context
    }

    fn report(&self, disconnect: &Disconnect) {
        let context = self.context(&[("error", disconnect.describe())]);
        let message = format!("{} websocket disconnected", self.config.venue);
        if disconnect.is_unexpected() {
            self.alerts.critical(message, context);
        } else {
            self.alerts.warning(message, context);
        }
    }

    async fn run<H: StreamHandler>(mut self, mut handler: H) {
        crate::ensure_crypto_provider();
        let mut delay = Duration::ZERO;

        loop {
            if !delay.is_zero() {
                debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            // 수신자가 사라졌으면 더 연결할 이유가 없음
            if handler.is_closed() {
                info!("Stream handler closed, ending subscription");
                break;
            }

            self.state.send_replace(StreamState::Connecting);
            info!("Connecting websocket");

            let connect = tokio::time::timeout(
                self.config.connect_timeout,
                connect_async(self.config.url.as_str()),
            );
            let result = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = connect => result,
            };

            let ws = match result {
                Ok(Ok((ws, _))) => ws,
                Ok(Err(e)) => {
                    let disconnect = Disconnect::from_ws_error(e);
                    warn!(error = %disconnect.describe(), "Websocket connect failed");
                    self.report(&disconnect);
                    self.state.send_replace(StreamState::Disconnected);
                    delay = self.config.backoff.on_disconnect(None);
                    continue;
                }
                Err(_) => {
                    let disconnect = Disconnect::Io(format!(
                        "connect timed out after {}ms",
                        self.config.connect_timeout.as_millis()
                    ));
                    warn!(error = %disconnect.describe(), "Websocket connect failed");
                    self.report(&disconnect);
                    self.state.send_replace(StreamState::Disconnected);
                    delay = self.config.backoff.on_disconnect(None);
                    continue;
                }
            };

            self.state.send_replace(StreamState::Connected);
            info!("Websocket connected");
            self.alerts.info(
                format!("{} websocket connected", self.config.venue),
                self.context(&[]),
            );

            let connected_at = Instant::now();
            match self.session(ws, &mut handler).await {
                SessionEnd::Cancelled => break,
                SessionEnd::HandlerClosed => {
                    info!("Stream handler closed, ending subscription");
                    break;
                }
                SessionEnd::Disconnected(disconnect) => {
                    let uptime = connected_at.elapsed();
                    warn!(
                        error = %disconnect.describe(),
                        uptime_ms = uptime.as_millis() as u64,
                        "Websocket disconnected"
                    );
                    self.report(&disconnect);
                    self.state.send_replace(StreamState::Disconnected);
                    delay = self.config.backoff.on_disconnect(Some(uptime));
                }
            }
        }

        self.state.send_replace(StreamState::Cancelled);
        info!("Stream subscription ended");
    }

    /// 하나의 연결을 끊길 때까지 처리합니다.
    async fn session<H: StreamHandler>(&self, ws: WsStream, handler: &mut H) -> SessionEnd {
        let (sink, mut source) = ws.split();
        let sink: WsSink = Arc::new(Mutex::new(sink));

        for frame in &self.config.initial_frames {
            let sent = sink.lock().await.send(Message::Text(frame.clone().into())).await;
            if let Err(e) = sent {
                return SessionEnd::Disconnected(Disconnect::from_ws_error(e));
            }
        }

        // 연결 단위 취소 토큰: 구독 취소 또는 하트비트 실패 시 취소됨
        let session = self.cancel.child_token();
        let heartbeat = tokio::spawn(
            heartbeat_loop(sink.clone(), self.config.heartbeat_interval, session.clone())
                .in_current_span(),
        );

        let end = self.receive_loop(&mut source, &sink, &session, handler).await;

        session.cancel();
        let heartbeat_error = match heartbeat.await {
            Ok(result) => result,
            Err(e) => Some(e.to_string()),
        };

        match end {
            SessionEnd::Cancelled | SessionEnd::HandlerClosed => {
                let _ = sink.lock().await.close().await;
                end
            }
            SessionEnd::Disconnected(Disconnect::Heartbeat(_)) => SessionEnd::Disconnected(
                Disconnect::Heartbeat(heartbeat_error.unwrap_or_else(|| "ping failed".to_string())),
            ),
            other => other,
        }
    }

    async fn receive_loop<H: StreamHandler>(
        &self,
        source: &mut SplitStream<WsStream>,
        sink: &WsSink,
        session: &CancellationToken,
        handler: &mut H,
    ) -> SessionEnd {
        let mut last_activity = Instant::now();

        loop {
            let idle_deadline = self.config.idle_timeout.map(|t| last_activity + t);

            let next = tokio::select! {
                _ = session.cancelled() => return self.interrupted(),
                _ = sleep_until_opt(idle_deadline) => {
                    let idle = self.config.idle_timeout.unwrap_or_default();
                    return SessionEnd::Disconnected(Disconnect::Idle(idle));
                }
                next = source.next() => next,
            };

            let message = match next {
                None => {
                    return SessionEnd::Disconnected(Disconnect::Closed("stream ended".to_string()))
                }
                Some(Err(e)) => return SessionEnd::Disconnected(Disconnect::from_ws_error(e)),
                Some(Ok(message)) => message,
            };
            last_activity = Instant::now();

            let raw = match message {
                Message::Text(text) => Some(text.into_bytes()),
                Message::Binary(data) => Some(data),
                Message::Ping(payload) => {
                    if let Err(e) = sink.lock().await.send(Message::Pong(payload)).await {
                        return SessionEnd::Disconnected(Disconnect::from_ws_error(e));
                    }
                    None
                }
                Message::Pong(_) | Message::Frame(_) => None,
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| format!("{} {}", f.code, f.reason))
                        .unwrap_or_else(|| "no close frame".to_string());
                    return SessionEnd::Disconnected(Disconnect::Closed(reason));
                }
            };

            // 핸들러가 막혀 있어도 취소는 즉시 반영되어야 함
            if let Some(raw) = raw {
                tokio::select! {
                    _ = session.cancelled() => return self.interrupted(),
                    _ = self.dispatch(&raw, handler) => {}
                }
            }

            if handler.is_closed() {
                return SessionEnd::HandlerClosed;
            }
        }
    }

    /// 연결 토큰이 취소된 이유. 구독 취소가 아니면 하트비트 실패입니다.
    fn interrupted(&self) -> SessionEnd {
        if self.cancel.is_cancelled() {
            SessionEnd::Cancelled
        } else {
            SessionEnd::Disconnected(Disconnect::Heartbeat(String::new()))
        }
    }

    /// 메시지를 디코딩해 핸들러에 전달합니다. 디코딩 실패는 알림 후 건너뜁니다.
    async fn dispatch<H: StreamHandler>(&self, raw: &[u8], handler: &mut H) {
        let value: Value = match serde_json::from_slice(raw) {
            Ok(value) => value,
            Err(e) => {
                let payload = String::from_utf8_lossy(raw);
                let payload: String = payload.chars().take(256).collect();
                self.alerts.warning(
                    format!("{} websocket received invalid JSON", self.config.venue),
                    self.context(&[("payload", payload), ("error", e.to_string())]),
                );
                return;
            }
        };

        if let Err(e) = handler.handle(value).await {
            self.alerts.warning(
                format!("{} stream handler failed", self.config.venue),
                self.context(&[("error", e.to_string())]),
            );
        }
    }
}

/// 연결 수명 동안 주기적으로 ping을 보냅니다.
///
/// 전송에 실패하면 연결 토큰을 취소하고 에러를 반환합니다.
async fn heartbeat_loop(
    sink: WsSink,
    interval: Duration,
    session: CancellationToken,
) -> Option<String> {
    loop {
        tokio::select! {
            _ = session.cancelled() => return None,
            _ = tokio::time::sleep(interval) => {}
        }

        let sent = sink.lock().await.send(Message::Ping(Vec::new())).await;
        if let Err(e) = sent {
            debug!(error = %e, "Heartbeat ping failed");
            session.cancel();
            return Some(e.to_string());
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
