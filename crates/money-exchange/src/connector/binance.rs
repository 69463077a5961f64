//! Binance 현물 커넥터.
//!
//! - 시세: `GET /api/v3/ticker/price`
//! - 거래량: `GET /api/v3/ticker/24hr`
//! - 호가창: `GET /api/v3/depth`
//! - 입출금: `GET /sapi/v1/capital/withdraw/history`, `/sapi/v1/capital/deposit/hisrec` (서명)
//! - 스트림: `wss://stream.binance.com:9443/ws/<stream>` (예: `btcusdt@trade`)

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use money_core::{
    AlertManager, CredentialStore, DataSource, OrderBookSnapshot, PricePoint, Venue, VenueConfig,
    VolumePoint, WalletEvent, WalletEventType,
};

use super::base::{
    as_array, decimal_field, millis_field, opt_string, parse_levels, str_field, ConnectorBase,
    Endpoints,
};
use crate::error::{ExchangeError, ExchangeResult};
use crate::pipeline::{RequestDescriptor, RequestPipeline};
use crate::stream::{StreamHandler, SubscriptionHandle};
use crate::traits::Connector;

pub const BINANCE_REST_URL: &str = "https://api.binance.com";
pub const BINANCE_WS_URL: &str = "wss://stream.binance.com:9443/ws";

/// Binance 커넥터.
#[derive(Debug)]
pub struct BinanceConnector {
    base: ConnectorBase,
}

impl BinanceConnector {
    /// 운영 엔드포인트로 생성합니다 (설정의 URL 재정의는 적용됨).
    pub fn new(
        config: &VenueConfig,
        credentials: Arc<dyn CredentialStore>,
        alerts: AlertManager,
    ) -> ExchangeResult<Self> {
        Self::with_endpoints(
            Endpoints::new(BINANCE_REST_URL, BINANCE_WS_URL),
            config,
            credentials,
            alerts,
        )
    }

    /// 지정한 엔드포인트로 생성합니다.
    pub fn with_endpoints(
        endpoints: Endpoints,
        config: &VenueConfig,
        credentials: Arc<dyn CredentialStore>,
        alerts: AlertManager,
    ) -> ExchangeResult<Self> {
        Ok(Self {
            base: ConnectorBase::new(Venue::Binance, endpoints, config, credentials, alerts)?,
        })
    }

    /// 요청 파이프라인 설정을 바꿉니다.
    pub fn map_pipeline(self, f: impl FnOnce(RequestPipeline) -> RequestPipeline) -> Self {
        Self {
            base: self.base.map_pipeline(f),
        }
    }

    fn normalize_symbol(symbol: &str) -> String {
        symbol.trim().to_uppercase()
    }

    async fn get(&self, descriptor: RequestDescriptor) -> ExchangeResult<Value> {
        self.base.pipeline().execute_json(&descriptor).await
    }

    fn parse_withdrawal(item: &Value) -> ExchangeResult<Option<WalletEvent>> {
        wallet_event(item, WalletEventType::Withdrawal, "applyTime")
    }

    fn parse_deposit(item: &Value) -> ExchangeResult<Option<WalletEvent>> {
        wallet_event(item, WalletEventType::Deposit, "insertTime")
    }
}

fn wallet_event(
    item: &Value,
    event_type: WalletEventType,
    time_field: &str,
) -> ExchangeResult<Option<WalletEvent>> {
    let amount = decimal_field(item, "amount")?;
    if amount.is_zero() {
        debug!(item = %item, "Skipping zero-amount wallet entry");
        return Ok(None);
    }

    let mut event = WalletEvent::new(
        Venue::Binance,
        str_field(item, "coin")?,
        amount,
        event_type,
        millis_field(item, time_field)?,
    )?;
    if let Some(tx_id) = opt_string(item, "txId") {
        event = event.with_tx_id(tx_id);
    }
    if let Some(status) = opt_string(item, "status") {
        event = event.with_metadata("status", status);
    }
    Ok(Some(event))
}

#[async_trait]
impl Connector for BinanceConnector {
    fn venue(&self) -> Venue {
        Venue::Binance
    }

    async fn fetch_price(&self, symbol: &str) -> ExchangeResult<PricePoint> {
        let symbol = Self::normalize_symbol(symbol);
        let data = self
            .get(RequestDescriptor::get("api/v3/ticker/price").query("symbol", &symbol))
            .await?;

        Ok(PricePoint::new(
            Venue::Binance,
            symbol,
            decimal_field(&data, "price")?,
            Utc::now(),
            DataSource::Rest,
        )?)
    }

    async fn fetch_volume(&self, symbol: &str) -> ExchangeResult<VolumePoint> {
        let symbol = Self::normalize_symbol(symbol);
        let data = self
            .get(RequestDescriptor::get("api/v3/ticker/24hr").query("symbol", &symbol))
            .await?;

        Ok(VolumePoint::new(
            Venue::Binance,
            symbol,
            decimal_field(&data, "volume")?,
            decimal_field(&data, "quoteVolume")?,
            Utc::now(),
        )?)
    }

    async fn fetch_order_book(
        &self,
        symbol: &str,
        depth: u32,
    ) -> ExchangeResult<OrderBookSnapshot> {
        let symbol = Self::normalize_symbol(symbol);
        let data = self
            .get(
                RequestDescriptor::get("api/v3/depth")
                    .query("symbol", &symbol)
                    .query("limit", depth),
            )
            .await?;

        Ok(OrderBookSnapshot::new(
            Venue::Binance,
            symbol,
            parse_levels(&data, "bids")?,
            parse_levels(&data, "asks")?,
            Utc::now(),
        )?)
    }

    async fn fetch_wallet_events(&self) -> ExchangeResult<Vec<WalletEvent>> {
        let withdrawals = self
            .get(RequestDescriptor::get("sapi/v1/capital/withdraw/history").signed())
            .await?;
        let deposits = self
            .get(RequestDescriptor::get("sapi/v1/capital/deposit/hisrec").signed())
            .await?;

        let mut events = Vec::new();
        for item in as_array(&withdrawals, "withdraw history")? {
            events.extend(Self::parse_withdrawal(item)?);
        }
        for item in as_array(&deposits, "deposit history")? {
            events.extend(Self::parse_deposit(item)?);
        }
        Ok(events)
    }

    fn subscribe(
        &self,
        topic: &str,
        handler: Box<dyn StreamHandler>,
        heartbeat_interval: Option<Duration>,
    ) -> ExchangeResult<SubscriptionHandle> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ExchangeError::InvalidConfig(
                "binance stream name must not be empty".to_string(),
            ));
        }
        // 스트림 이름은 소문자 (`btcusdt@trade`)
        self.base
            .subscribe(&topic.to_lowercase(), Vec::new(), handler, heartbeat_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use money_core::{ApiKeyStore, Credential};
    use mockito::Matcher;
    use rust_decimal_macros::dec;

    fn test_config() -> VenueConfig {
        VenueConfig {
            rate_limit_per_second: 100.0,
            retry_backoff_ms: 1,
            ..Default::default()
        }
    }

    fn connector(url: &str, store: Arc<ApiKeyStore>) -> BinanceConnector {
        BinanceConnector::with_endpoints(
            Endpoints::new(url, "ws://127.0.0.1:1"),
            &test_config(),
            store,
            AlertManager::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_price_uppercases_symbol() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/ticker/price")
            .match_query(Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()))
            .with_body(r#"{"symbol":"BTCUSDT","price":"42000.50000000"}"#)
            .create_async()
            .await;

        let price = connector(&server.url(), Arc::new(ApiKeyStore::new()))
            .fetch_price("btcusdt")
            .await
            .unwrap();

        assert_eq!(price.symbol, "BTCUSDT");
        assert_eq!(price.price, dec!(42000.5));
        assert_eq!(price.source, DataSource::Rest);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_order_book_sorted() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v3/depth")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "ETHUSDT".into()),
                Matcher::UrlEncoded("limit".into(), "5".into()),
            ]))
            .with_body(
                r#"{"lastUpdateId":1,"bids":[["10","1"],["12","2"]],"asks":[["15","1"],["13","2"]]}"#,
            )
            .create_async()
            .await;

        let book = connector(&server.url(), Arc::new(ApiKeyStore::new()))
            .fetch_order_book("ETHUSDT", 5)
            .await
            .unwrap();

        let bids: Vec<_> = book.bids.iter().map(|l| (l.price, l.size)).collect();
        let asks: Vec<_> = book.asks.iter().map(|l| (l.price, l.size)).collect();
        assert_eq!(bids, vec![(dec!(12), dec!(2)), (dec!(10), dec!(1))]);
        assert_eq!(asks, vec![(dec!(13), dec!(2)), (dec!(15), dec!(1))]);
    }

    #[tokio::test]
    async fn test_fetch_wallet_events_signs_and_normalizes() {
        let mut server = mockito::Server::new_async().await;
        let withdrawals = server
            .mock("GET", "/sapi/v1/capital/withdraw/history")
            .match_header("X-MBX-APIKEY", "key")
            .match_query(Matcher::Regex("timestamp=\\d+&signature=[0-9a-f]{64}".into()))
            .with_body(
                r#"[{"coin":"USDT","amount":"5","applyTime":1700000000000,"txId":"0xabc","status":6}]"#,
            )
            .create_async()
            .await;
        let deposits = server
            .mock("GET", "/sapi/v1/capital/deposit/hisrec")
            .match_query(Matcher::Regex("signature=".into()))
            .with_body(r#"[{"coin":"BTC","amount":"0.5","insertTime":1700000001000,"txId":"tx1","status":1}]"#)
            .create_async()
            .await;

        let store = Arc::new(ApiKeyStore::new());
        store.set_key(Venue::Binance, Credential::new("key", "secret"));

        let events = connector(&server.url(), store)
            .fetch_wallet_events()
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, WalletEventType::Withdrawal);
        assert_eq!(events[0].amount, dec!(-5));
        assert_eq!(events[0].tx_id.as_deref(), Some("0xabc"));
        assert_eq!(events[0].metadata.get("status").unwrap(), "6");
        assert_eq!(events[1].event_type, WalletEventType::Deposit);
        assert_eq!(events[1].amount, dec!(0.5));
        withdrawals.assert_async().await;
        deposits.assert_async().await;
    }

    #[tokio::test]
    async fn test_wallet_requires_credentials() {
        let err = connector("http://127.0.0.1:1", Arc::new(ApiKeyStore::new()))
            .fetch_wallet_events()
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::MissingCredential(_)));
    }
}
