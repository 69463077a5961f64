//! 온체인 지갑 이벤트 폴러.
//!
//! JSON-RPC 유사 엔드포인트에 `{"method", "params"}`를 POST하고
//! `result[]` 항목을 [`BlockchainEvent`]로 변환합니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use money_core::{
    AlertManager, ApiKeyStore, BlockchainConfig, Venue, VenueConfig, WalletEvent,
};

use crate::connector::base::{decimal_field, opt_string, str_field};
use crate::error::{ExchangeError, ExchangeResult};
use crate::pipeline::{RequestDescriptor, RequestPipeline};

/// 블록체인 데이터 소스에서 조회한 이동 내역.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockchainEvent {
    pub address: String,
    pub asset: String,
    pub amount: Decimal,
    pub tx_hash: Option<String>,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
    /// 원본 항목
    pub raw: Value,
}

impl BlockchainEvent {
    fn from_item(item: &Value) -> ExchangeResult<Self> {
        let block_number = match item.get("block_number") {
            None | Some(Value::Null) => 0,
            Some(Value::Number(n)) => n.as_u64().unwrap_or_default(),
            Some(Value::String(s)) => s.parse().map_err(|_| {
                ExchangeError::ParseError(format!("invalid block_number '{}'", s))
            })?,
            Some(other) => {
                return Err(ExchangeError::ParseError(format!(
                    "invalid block_number {}",
                    other
                )))
            }
        };

        // 초 단위 유닉스 시각
        let seconds = match item.get("timestamp") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| ExchangeError::ParseError(format!("invalid timestamp in {}", item)))?;
        let timestamp = DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
            ExchangeError::ParseError(format!("timestamp '{}' out of range", seconds))
        })?;

        Ok(Self {
            address: opt_string(item, "address").unwrap_or_default(),
            asset: str_field(item, "asset")?.to_string(),
            amount: decimal_field(item, "amount")?,
            tx_hash: opt_string(item, "tx_hash"),
            block_number,
            timestamp,
            raw: item.clone(),
        })
    }
}

/// 블록체인 폴링 클라이언트.
#[derive(Debug)]
pub struct BlockchainClient {
    pipeline: RequestPipeline,
    alerts: AlertManager,
}

impl BlockchainClient {
    /// 엔드포인트와 요청 타임아웃으로 생성합니다.
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        alerts: AlertManager,
    ) -> ExchangeResult<Self> {
        let config = VenueConfig {
            request_timeout_ms: timeout.as_millis() as u64,
            ..Default::default()
        };
        let pipeline = RequestPipeline::new(
            Venue::OnChain,
            endpoint,
            &config,
            Arc::new(ApiKeyStore::new()),
        )?;
        Ok(Self { pipeline, alerts })
    }

    pub fn from_config(config: &BlockchainConfig, alerts: AlertManager) -> ExchangeResult<Self> {
        Self::new(config.endpoint.clone(), config.timeout(), alerts)
    }

    pub fn map_pipeline(mut self, f: impl FnOnce(RequestPipeline) -> RequestPipeline) -> Self {
        self.pipeline = f(self.pipeline);
        self
    }

    pub fn endpoint(&self) -> &str {
        self.pipeline.base_url()
    }

    /// 이벤트를 조회합니다. `params`가 `null`이면 빈 객체를 보냅니다.
    pub async fn fetch_events(
        &self,
        method: &str,
        params: Value,
    ) -> ExchangeResult<Vec<BlockchainEvent>> {
        let params = if params.is_null() { json!({}) } else { params };
        let descriptor =
            RequestDescriptor::post("/").json(json!({"method": method, "params": params}));
        let response: Value = self.pipeline.execute_json(&descriptor).await?;

        match response.get("result") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items.iter().map(BlockchainEvent::from_item).collect(),
            Some(other) => Err(ExchangeError::ParseError(format!(
                "result is not an array: {}",
                other
            ))),
        }
    }

    /// 지갑 이벤트로 변환합니다. 금액이 0인 항목은 제외됩니다.
    pub fn to_wallet_events(events: &[BlockchainEvent]) -> Vec<WalletEvent> {
        events
            .iter()
            .filter_map(|event| {
                let wallet_event = WalletEvent::new(
                    Venue::OnChain,
                    event.asset.clone(),
                    event.amount,
                    WalletEvent::type_from_sign(event.amount),
                    event.timestamp,
                );
                match wallet_event {
                    Ok(wallet_event) => {
                        let mut wallet_event = wallet_event
                            .with_metadata("block_number", event.block_number)
                            .with_metadata("address", &event.address);
                        if let Some(tx_hash) = &event.tx_hash {
                            wallet_event = wallet_event.with_tx_id(tx_hash.clone());
                        }
                        Some(wallet_event)
                    }
                    Err(e) => {
                        debug!(error = %e, tx_hash = ?event.tx_hash, "Skipping on-chain event");
                        None
                    }
                }
            })
            .collect()
    }

    /// 취소될 때까지 주기적으로 조회해 핸들러에 전달합니다.
    ///
    /// 조회나 핸들러 실패는 경고 알림 후 다음 주기에 다시 시도합니다.
    pub async fn monitor_wallet<F, Fut>(
        &self,
        method: &str,
        params: Value,
        mut handler: F,
        interval: Duration,
        cancel: CancellationToken,
    ) -> ExchangeResult<()>
    where
        F: FnMut(Vec<WalletEvent>) -> Fut,
        Fut: Future<Output = ExchangeResult<()>>,
    {
        if interval.is_zero() {
            return Err(ExchangeError::InvalidConfig(
                "poll interval must be positive".to_string(),
            ));
        }
        info!(endpoint = %self.endpoint(), method, "Blockchain monitor started");

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.fetch_events(method, params.clone()) => result,
            };

            let outcome = match result {
                Ok(events) => handler(Self::to_wallet_events(&events)).await,
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                warn!(error = %e, "Blockchain monitor error");
                self.alerts.warning(
                    "Blockchain monitor error",
                    [
                        ("endpoint".to_string(), self.endpoint().to_string()),
                        ("error".to_string(), e.to_string()),
                    ]
                    .into_iter()
                    .collect(),
                );
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Blockchain monitor stopped");
        Ok(())
    }
}
