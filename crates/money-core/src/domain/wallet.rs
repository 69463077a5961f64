//! 지갑 이동(입금, 출금, 이체) 레코드.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::Venue;
use crate::error::{CoreError, CoreResult};

/// 지갑 이동 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletEventType {
    Deposit,
    Withdrawal,
    Transfer,
    TradeFee,
    Reward,
}

impl fmt::Display for WalletEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WalletEventType::Deposit => "deposit",
            WalletEventType::Withdrawal => "withdrawal",
            WalletEventType::Transfer => "transfer",
            WalletEventType::TradeFee => "trade_fee",
            WalletEventType::Reward => "reward",
        };
        f.write_str(s)
    }
}

/// 지갑 이동.
///
/// 부호 규칙: 입금은 양수, 출금은 음수. 거래소가 어떤 부호로 보고하든
/// [`WalletEvent::new`]가 정규화합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletEvent {
    pub venue: Venue,
    pub asset: String,
    pub amount: Decimal,
    pub event_type: WalletEventType,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl WalletEvent {
    /// 부호를 정규화하여 지갑 이동을 생성합니다.
    pub fn new(
        venue: Venue,
        asset: impl Into<String>,
        amount: Decimal,
        event_type: WalletEventType,
        timestamp: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let asset = asset.into();
        if asset.trim().is_empty() {
            return Err(CoreError::Validation("asset must not be empty".to_string()));
        }
        if amount.is_zero() {
            return Err(CoreError::Validation("amount cannot be zero".to_string()));
        }

        let amount = match event_type {
            WalletEventType::Deposit => amount.abs(),
            WalletEventType::Withdrawal => -amount.abs(),
            _ => amount,
        };

        Ok(Self {
            venue,
            asset,
            amount,
            event_type,
            timestamp,
            tx_id: None,
            metadata: BTreeMap::new(),
        })
    }

    /// 트랜잭션 ID를 설정합니다. 빈 문자열은 무시합니다.
    pub fn with_tx_id(mut self, tx_id: impl Into<String>) -> Self {
        let tx_id = tx_id.into();
        if !tx_id.is_empty() {
            self.tx_id = Some(tx_id);
        }
        self
    }

    /// 메타데이터 항목을 추가합니다.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    /// 부호로 이동 유형을 추정합니다 (양수는 입금, 음수는 출금).
    pub fn type_from_sign(amount: Decimal) -> WalletEventType {
        if amount < Decimal::ZERO {
            WalletEventType::Withdrawal
        } else {
            WalletEventType::Deposit
        }
    }
}
