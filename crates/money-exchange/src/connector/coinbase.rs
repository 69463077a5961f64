//! Coinbase Exchange 커넥터.
//!
//! 상품 ID는 `BTC-USD` 형식이며, 스트림 토픽은 `채널:상품` (예: `ticker:BTC-USD`)입니다.
//! 연결될 때마다 subscribe 메시지를 다시 보냅니다.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use money_core::{
    AlertManager, CredentialStore, DataSource, OrderBookSnapshot, PricePoint, Venue, VenueConfig,
    VolumePoint, WalletEvent, WalletEventType,
};

use super::base::{
    as_array, decimal_field, opt_string, parse_levels, rfc3339_field, str_field, to_decimal,
    ConnectorBase, Endpoints,
};
use crate::error::{ExchangeError, ExchangeResult};
use crate::pipeline::{RequestDescriptor, RequestPipeline};
use crate::stream::{StreamHandler, SubscriptionHandle};
use crate::traits::Connector;

pub const COINBASE_REST_URL: &str = "https://api.exchange.coinbase.com";
pub const COINBASE_WS_URL: &str = "wss://ws-feed.exchange.coinbase.com";

/// Coinbase 커넥터.
#[derive(Debug)]
pub struct CoinbaseConnector {
    base: ConnectorBase,
    /// 입출금 조회 대상 프로필
    profile_id: Option<String>,
}

impl CoinbaseConnector {
    pub fn new(
        config: &VenueConfig,
        credentials: Arc<dyn CredentialStore>,
        alerts: AlertManager,
    ) -> ExchangeResult<Self> {
        Self::with_endpoints(
            Endpoints::new(COINBASE_REST_URL, COINBASE_WS_URL),
            config,
            credentials,
            alerts,
        )
    }

    pub fn with_endpoints(
        endpoints: Endpoints,
        config: &VenueConfig,
        credentials: Arc<dyn CredentialStore>,
        alerts: AlertManager,
    ) -> ExchangeResult<Self> {
        Ok(Self {
            base: ConnectorBase::new(Venue::Coinbase, endpoints, config, credentials, alerts)?,
            profile_id: None,
        })
    }

    pub fn with_profile_id(mut self, profile_id: impl Into<String>) -> Self {
        self.profile_id = Some(profile_id.into());
        self
    }

    pub fn map_pipeline(mut self, f: impl FnOnce(RequestPipeline) -> RequestPipeline) -> Self {
        self.base = self.base.map_pipeline(f);
        self
    }

    fn product_id(symbol: &str) -> String {
        symbol.trim().to_uppercase()
    }

    async fn get(&self, descriptor: RequestDescriptor) -> ExchangeResult<Value> {
        self.base.pipeline().execute_json(&descriptor).await
    }

    fn parse_transfer(item: &Value) -> ExchangeResult<Option<WalletEvent>> {
        let amount = decimal_field(item, "amount")?;
        if amount.is_zero() {
            debug!(item = %item, "Skipping zero-amount transfer");
            return Ok(None);
        }

        let event_type = match str_field(item, "type")? {
            "deposit" => WalletEventType::Deposit,
            "withdraw" | "withdrawal" => WalletEventType::Withdrawal,
            _ => WalletEventType::Transfer,
        };

        let mut event = WalletEvent::new(
            Venue::Coinbase,
            str_field(item, "currency")?,
            amount,
            event_type,
            rfc3339_field(item, "created_at")?,
        )?;
        if let Some(id) = opt_string(item, "id") {
            event = event.with_tx_id(id);
        }
        if let Some(completed_at) = opt_string(item, "completed_at") {
            event = event.with_metadata("completed_at", completed_at);
        }
        Ok(Some(event))
    }
}

/// `채널:상품` 토픽을 subscribe 메시지로 변환합니다.
fn subscribe_frame(topic: &str) -> ExchangeResult<String> {
    let (channel, product) = topic
        .split_once(':')
        .map(|(c, p)| (c.trim(), p.trim()))
        .filter(|(c, p)| !c.is_empty() && !p.is_empty())
        .ok_or_else(|| {
            ExchangeError::InvalidConfig(format!(
                "coinbase topic must be 'channel:product', got '{}'",
                topic
            ))
        })?;

    Ok(json!({
        "type": "subscribe",
        "product_ids": [product.to_uppercase()],
        "channels": [channel],
    })
    .to_string())
}

#[async_trait]
impl Connector for CoinbaseConnector {
    fn venue(&self) -> Venue {
        Venue::Coinbase
    }

    async fn fetch_price(&self, symbol: &str) -> ExchangeResult<PricePoint> {
        let product = Self::product_id(symbol);
        let data = self
            .get(RequestDescriptor::get(format!("products/{}/ticker", product)))
            .await?;

        Ok(PricePoint::new(
            Venue::Coinbase,
            product,
            decimal_field(&data, "price")?,
            Utc::now(),
            DataSource::Rest,
        )?)
    }

    async fn fetch_volume(&self, symbol: &str) -> ExchangeResult<VolumePoint> {
        let product = Self::product_id(symbol);
        let data = self
            .get(RequestDescriptor::get(format!("products/{}/stats", product)))
            .await?;

        let quote = match data.get("volume_30day").filter(|v| !v.is_null()) {
            Some(value) => to_decimal(value)?,
            None => Decimal::ZERO,
        };

        Ok(VolumePoint::new(
            Venue::Coinbase,
            product,
            decimal_field(&data, "volume")?,
            quote,
            Utc::now(),
        )?)
    }

    async fn fetch_order_book(
        &self,
        symbol: &str,
        depth: u32,
    ) -> ExchangeResult<OrderBookSnapshot> {
        let product = Self::product_id(symbol);
        let data = self
            .get(RequestDescriptor::get(format!("products/{}/book", product)).query("level", 2))
            .await?;

        // level 2 응답은 깊이를 지정할 수 없어 잘라서 사용
        let mut book = OrderBookSnapshot::new(
            Venue::Coinbase,
            product,
            parse_levels(&data, "bids")?,
            parse_levels(&data, "asks")?,
            Utc::now(),
        )?;
        if depth > 0 {
            book.bids.truncate(depth as usize);
            book.asks.truncate(depth as usize);
        }
        Ok(book)
    }

    async fn fetch_wallet_events(&self) -> ExchangeResult<Vec<WalletEvent>> {
        let mut descriptor = RequestDescriptor::get("transfers").signed();
        if let Some(profile_id) = &self.profile_id {
            descriptor = descriptor.query("profile_id", profile_id);
        }
        let data = self.get(descriptor).await?;

        let mut events = Vec::new();
        for item in as_array(&data, "transfers")? {
            events.extend(Self::parse_transfer(item)?);
        }
        Ok(events)
    }

    fn subscribe(
        &self,
        topic: &str,
        handler: Box<dyn StreamHandler>,
        heartbeat_interval: Option<Duration>,
    ) -> ExchangeResult<SubscriptionHandle> {
        let frame = subscribe_frame(topic)?;
        self.base.subscribe("", vec![frame], handler, heartbeat_interval)
    }
}
