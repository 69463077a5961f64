//! 커넥터 trait 정의.

use async_trait::async_trait;
use std::time::Duration;

use money_core::{OrderBookSnapshot, PricePoint, Venue, VolumePoint, WalletEvent};

use crate::error::ExchangeResult;
use crate::stream::{StreamHandler, SubscriptionHandle};

/// 거래소 데이터 조회 인터페이스.
///
/// REST 조회는 요청 파이프라인(요청 한도, 재시도, 서명)을 거치며,
/// 구독은 재연결하는 스트림 태스크를 시작합니다.
#[async_trait]
pub trait Connector: Send + Sync {
    /// 거래소 식별자.
    fn venue(&self) -> Venue;

    // === 시장 데이터 ===

    /// 최근 체결가 조회.
    async fn fetch_price(&self, symbol: &str) -> ExchangeResult<PricePoint>;

    /// 24시간 거래량 조회.
    async fn fetch_volume(&self, symbol: &str) -> ExchangeResult<VolumePoint>;

    /// 호가창 조회. 매수는 내림차순, 매도는 오름차순으로 정렬됩니다.
    async fn fetch_order_book(&self, symbol: &str, depth: u32)
        -> ExchangeResult<OrderBookSnapshot>;

    // === 계좌 ===

    /// 입출금 내역 조회 (인증 필요). 입금은 양수, 출금은 음수.
    async fn fetch_wallet_events(&self) -> ExchangeResult<Vec<WalletEvent>>;

    // === 스트리밍 ===

    /// 토픽을 구독합니다.
    ///
    /// `heartbeat_interval`이 `None`이면 거래소 설정의 간격을 사용합니다.
    fn subscribe(
        &self,
        topic: &str,
        handler: Box<dyn StreamHandler>,
        heartbeat_interval: Option<Duration>,
    ) -> ExchangeResult<SubscriptionHandle>;
}
