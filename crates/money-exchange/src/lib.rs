//! 암호화폐 거래소 데이터 수집.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - Connector trait: 거래소별 시세, 거래량, 호가창, 입출금 조회와 스트림 구독
//! - 요청 파이프라인: 토큰 버킷 요청 한도, 지수 백오프 재시도, 요청 서명
//! - 스트리밍 엔진: 하트비트와 재연결을 관리하는 WebSocket 구독 태스크
//! - 온체인 지갑 이벤트 폴러

pub mod auth;
pub mod blockchain;
pub mod connector;
pub mod error;
pub mod pipeline;
pub mod rate_limiter;
pub mod retry;
pub mod stream;
pub mod traits;

pub use auth::{canonical_query, Authenticator, SignedRequest};
pub use blockchain::{BlockchainClient, BlockchainEvent};
pub use connector::{
    build_connector, BinanceConnector, CoinbaseConnector, Endpoints, OkxConnector,
};
pub use error::*;
pub use pipeline::{RawResponse, RequestDescriptor, RequestPipeline};
pub use rate_limiter::RateLimiter;
pub use retry::{with_retry, RetryConfig};
pub use stream::{
    handler_fn, spawn_stream, spawn_stream_with_token, Backoff, StreamConfig, StreamHandler,
    StreamState, SubscriptionHandle,
};
pub use traits::*;

use std::sync::Once;

/// rustls 암호화 공급자(ring)를 프로세스 기본값으로 설치합니다.
///
/// 여러 번 호출해도 안전하며, 이미 다른 공급자가 설치되어 있으면 그대로 둡니다.
pub fn ensure_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
