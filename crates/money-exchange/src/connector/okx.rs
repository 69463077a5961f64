//! OKX v5 커넥터.
//!
//! REST 응답은 `{"code":"0","msg":"","data":[...]}` 형식이며,
//! 스트림 토픽은 `채널:instId` (예: `tickers:BTC-USDT`)입니다.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use money_core::{
    AlertManager, CredentialStore, DataSource, OrderBookSnapshot, PricePoint, Venue, VenueConfig,
    VolumePoint, WalletEvent,
};

use super::base::{
    decimal_field, millis_field, opt_string, parse_levels, str_field, to_decimal, ConnectorBase,
    Endpoints,
};
use crate::error::{ExchangeError, ExchangeResult};
use crate::pipeline::{RequestDescriptor, RequestPipeline};
use crate::stream::{StreamHandler, SubscriptionHandle};
use crate::traits::Connector;

pub const OKX_REST_URL: &str = "https://www.okx.com";
pub const OKX_WS_URL: &str = "wss://ws.okx.com:8443/ws/v5/public";

/// OKX 커넥터.
#[derive(Debug)]
pub struct OkxConnector {
    base: ConnectorBase,
}

impl OkxConnector {
    pub fn new(
        config: &VenueConfig,
        credentials: Arc<dyn CredentialStore>,
        alerts: AlertManager,
    ) -> ExchangeResult<Self> {
        Self::with_endpoints(
            Endpoints::new(OKX_REST_URL, OKX_WS_URL),
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
            base: ConnectorBase::new(Venue::Okx, endpoints, config, credentials, alerts)?,
        })
    }

    pub fn map_pipeline(self, f: impl FnOnce(RequestPipeline) -> RequestPipeline) -> Self {
        Self {
            base: self.base.map_pipeline(f),
        }
    }

    fn inst_id(symbol: &str) -> String {
        symbol.trim().to_uppercase()
    }

    /// 요청을 실행하고 `data` 배열을 꺼냅니다.
    async fn get_data(&self, descriptor: RequestDescriptor) -> ExchangeResult<Vec<Value>> {
        let response: Value = self.base.pipeline().execute_json(&descriptor).await?;
        unwrap_data(response)
    }

    async fn ticker(&self, inst_id: &str) -> ExchangeResult<Value> {
        first(
            self.get_data(RequestDescriptor::get("api/v5/market/ticker").query("instId", inst_id))
                .await?,
            "ticker",
        )
    }

    fn parse_bill(item: &Value) -> ExchangeResult<Option<WalletEvent>> {
        let amount = decimal_field(item, "balChg")?;
        if amount.is_zero() {
            debug!(item = %item, "Skipping zero-amount bill");
            return Ok(None);
        }

        let mut event = WalletEvent::new(
            Venue::Okx,
            str_field(item, "ccy")?,
            amount,
            WalletEvent::type_from_sign(amount),
            millis_field(item, "ts")?,
        )?;
        if let Some(bill_id) = opt_string(item, "billId") {
            event = event.with_tx_id(bill_id);
        }
        if let Some(kind) = opt_string(item, "type") {
            event = event.with_metadata("type", kind);
        }
        if let Some(sub_type) = opt_string(item, "subType") {
            event = event.with_metadata("subType", sub_type);
        }
        Ok(Some(event))
    }
}

/// 응답 코드가 `"0"`이 아니면 에러.
fn unwrap_data(response: Value) -> ExchangeResult<Vec<Value>> {
    if let Some(code) = opt_string(&response, "code") {
        if code != "0" {
            let msg = opt_string(&response, "msg").unwrap_or_default();
            return Err(ExchangeError::ParseError(format!(
                "okx error {}: {}",
                code, msg
            )));
        }
    }

    match response {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(data)) => Ok(data),
            _ => Err(ExchangeError::ParseError(
                "okx response has no data array".to_string(),
            )),
        },
        _ => Err(ExchangeError::ParseError(
            "okx response is not an object".to_string(),
        )),
    }
}

fn first(mut data: Vec<Value>, what: &str) -> ExchangeResult<Value> {
    if data.is_empty() {
        return Err(ExchangeError::ParseError(format!("okx {} data is empty", what)));
    }
    Ok(data.swap_remove(0))
}

fn optional_decimal(value: &Value, name: &str) -> ExchangeResult<Decimal> {
    match value.get(name) {
        Some(Value::Null) | None => Ok(Decimal::ZERO),
        Some(Value::String(s)) if s.is_empty() => Ok(Decimal::ZERO),
        Some(v) => to_decimal(v),
    }
}

/// `채널:instId` 토픽을 subscribe 메시지로 변환합니다.
fn subscribe_frame(topic: &str) -> ExchangeResult<String> {
    let (channel, inst_id) = topic
        .split_once(':')
        .map(|(c, i)| (c.trim(), i.trim()))
        .filter(|(c, i)| !c.is_empty() && !i.is_empty())
        .ok_or_else(|| {
            ExchangeError::InvalidConfig(format!(
                "okx topic must be 'channel:instId', got '{}'",
                topic
            ))
        })?;

    Ok(json!({
        "op": "subscribe",
        "args": [{"channel": channel, "instId": inst_id.to_uppercase()}],
    })
    .to_string())
}

#[async_trait]
impl Connector for OkxConnector {
    fn venue(&self) -> Venue {
        Venue::Okx
    }

    async fn fetch_price(&self, symbol: &str) -> ExchangeResult<PricePoint> {
        let inst_id = Self::inst_id(symbol);
        let ticker = self.ticker(&inst_id).await?;

        Ok(PricePoint::new(
            Venue::Okx,
            inst_id,
            decimal_field(&ticker, "last")?,
            Utc::now(),
            DataSource::Rest,
        )?)
    }

    async fn fetch_volume(&self, symbol: &str) -> ExchangeResult<VolumePoint> {
        let inst_id = Self::inst_id(symbol);
        let ticker = self.ticker(&inst_id).await?;

        Ok(VolumePoint::new(
            Venue::Okx,
            inst_id,
            optional_decimal(&ticker, "vol24h")?,
            optional_decimal(&ticker, "volCcy24h")?,
            Utc::now(),
        )?)
    }

    async fn fetch_order_book(
        &self,
        symbol: &str,
        depth: u32,
    ) -> ExchangeResult<OrderBookSnapshot> {
        let inst_id = Self::inst_id(symbol);
        let book = first(
            self.get_data(
                RequestDescriptor::get("api/v5/market/books")
                    .query("instId", &inst_id)
                    .query("sz", depth),
            )
            .await?,
            "order book",
        )?;

        let timestamp = match book.get("ts") {
            Some(_) => millis_field(&book, "ts")?,
            None => Utc::now(),
        };

        Ok(OrderBookSnapshot::new(
            Venue::Okx,
            inst_id,
            parse_levels(&book, "bids")?,
            parse_levels(&book, "asks")?,
            timestamp,
        )?)
    }

    async fn fetch_wallet_events(&self) -> ExchangeResult<Vec<WalletEvent>> {
        // type=1: 입출금
        let bills = self
            .get_data(
                RequestDescriptor::get("api/v5/account/bills")
                    .query("type", 1)
                    .signed(),
            )
            .await?;

        let mut events = Vec::new();
        for item in &bills {
            events.extend(Self::parse_bill(item)?);
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
