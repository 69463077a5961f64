//! WebSocket 스트리밍.
//!
//! - `backoff` - 재연결 지수 백오프
//! - `engine` - 연결, 하트비트, 재연결을 관리하는 구독 태스크
//! - `handler` - 메시지 핸들러 트레이트

mod backoff;
mod engine;
mod handler;

pub use backoff::Backoff;
pub use engine::{
    spawn_stream, spawn_stream_with_token, StreamConfig, StreamState, SubscriptionHandle,
};
pub use handler::{handler_fn, FnHandler, StreamHandler};
