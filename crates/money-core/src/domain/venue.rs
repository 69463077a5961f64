//! 거래소(venue) 식별자.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 데이터를 제공하는 거래소 또는 체인.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Binance,
    Coinbase,
    Okx,
    /// 블록체인 노드에서 직접 조회한 이동
    OnChain,
}

impl Venue {
    /// 설정 키와 로그에서 사용하는 이름.
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Binance => "binance",
            Venue::Coinbase => "coinbase",
            Venue::Okx => "okx",
            Venue::OnChain => "onchain",
        }
    }

    /// REST/WebSocket 커넥터가 존재하는 거래소 목록.
    pub fn exchanges() -> [Venue; 3] {
        [Venue::Binance, Venue::Coinbase, Venue::Okx]
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "binance" => Ok(Venue::Binance),
            "coinbase" => Ok(Venue::Coinbase),
            "okx" => Ok(Venue::Okx),
            "onchain" => Ok(Venue::OnChain),
            _ => Err(format!("Unknown venue: {}", s)),
        }
    }
}

/// 데이터 수신 경로.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Rest,
    WebSocket,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_roundtrip_names() {
        for venue in [Venue::Binance, Venue::Coinbase, Venue::Okx, Venue::OnChain] {
            assert_eq!(venue.as_str().parse::<Venue>().unwrap(), venue);
        }
        assert_eq!("OKX".parse::<Venue>().unwrap(), Venue::Okx);
        assert!("kraken".parse::<Venue>().is_err());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Venue::OnChain).unwrap(), "\"onchain\"");
        assert_eq!(
            serde_json::to_string(&DataSource::WebSocket).unwrap(),
            "\"websocket\""
        );
    }
}
