//! 시장 데이터 레코드.
//!
//! - `PricePoint` - 최근 체결가
//! - `VolumePoint` - 24시간 거래량
//! - `OrderBookSnapshot` - 호가창 스냅샷
//!
//! 모든 생성자는 값을 검증하며, 호가창은 생성 시 정렬됩니다
//! (매수 내림차순, 매도 오름차순).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{DataSource, Venue};
use crate::error::{CoreError, CoreResult};

fn require_symbol(symbol: &str) -> CoreResult<()> {
    if symbol.trim().is_empty() {
        return Err(CoreError::Validation("symbol must not be empty".to_string()));
    }
    Ok(())
}

/// 최근 체결가.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub venue: Venue,
    pub symbol: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    pub source: DataSource,
}

impl PricePoint {
    /// 검증된 가격 레코드를 생성합니다.
    pub fn new(
        venue: Venue,
        symbol: impl Into<String>,
        price: Decimal,
        timestamp: DateTime<Utc>,
        source: DataSource,
    ) -> CoreResult<Self> {
        let symbol = symbol.into();
        require_symbol(&symbol)?;
        if price <= Decimal::ZERO {
            return Err(CoreError::Validation(format!(
                "price must be positive, got {}",
                price
            )));
        }
        Ok(Self {
            venue,
            symbol,
            price,
            timestamp,
            source,
        })
    }
}

/// 24시간 거래량.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumePoint {
    pub venue: Venue,
    pub symbol: String,
    /// 기준 자산 거래량
    pub base_volume: Decimal,
    /// 호가 자산 거래대금
    pub quote_volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl VolumePoint {
    /// 검증된 거래량 레코드를 생성합니다.
    pub fn new(
        venue: Venue,
        symbol: impl Into<String>,
        base_volume: Decimal,
        quote_volume: Decimal,
        timestamp: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let symbol = symbol.into();
        require_symbol(&symbol)?;
        if base_volume < Decimal::ZERO || quote_volume < Decimal::ZERO {
            return Err(CoreError::Validation(format!(
                "volume must not be negative (base={}, quote={})",
                base_volume, quote_volume
            )));
        }
        Ok(Self {
            venue,
            symbol,
            base_volume,
            quote_volume,
            timestamp,
        })
    }
}

/// 호가 레벨.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl OrderBookLevel {
    /// 검증된 호가 레벨을 생성합니다.
    pub fn new(price: Decimal, size: Decimal) -> CoreResult<Self> {
        if price <= Decimal::ZERO {
            return Err(CoreError::Validation(format!(
                "level price must be positive, got {}",
                price
            )));
        }
        if size < Decimal::ZERO {
            return Err(CoreError::Validation(format!(
                "level size must not be negative, got {}",
                size
            )));
        }
        Ok(Self { price, size })
    }
}

/// 호가창 스냅샷.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub venue: Venue,
    pub symbol: String,
    /// 매수 호가 - 가격 내림차순 정렬
    pub bids: Vec<OrderBookLevel>,
    /// 매도 호가 - 가격 오름차순 정렬
    pub asks: Vec<OrderBookLevel>,
    pub timestamp: DateTime<Utc>,
}

impl OrderBookSnapshot {
    /// 레벨을 정렬하여 스냅샷을 생성합니다.
    ///
    /// 거래소가 어떤 순서로 보내든 매수는 내림차순, 매도는 오름차순이 됩니다.
    /// 같은 가격의 레벨은 원래 순서를 유지합니다.
    pub fn new(
        venue: Venue,
        symbol: impl Into<String>,
        mut bids: Vec<OrderBookLevel>,
        mut asks: Vec<OrderBookLevel>,
        timestamp: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let symbol = symbol.into();
        require_symbol(&symbol)?;

        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));

        Ok(Self {
            venue,
            symbol,
            bids,
            asks,
            timestamp,
        })
    }

    /// 최우선 매수 호가를 반환합니다.
    pub fn best_bid(&self) -> Option<&OrderBookLevel> {
        self.bids.first()
    }

    /// 최우선 매도 호가를 반환합니다.
    pub fn best_ask(&self) -> Option<&OrderBookLevel> {
        self.asks.first()
    }

    /// 스프레드를 반환합니다.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// 중간 가격을 반환합니다.
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::TWO),
            _ => None,
        }
    }
}
