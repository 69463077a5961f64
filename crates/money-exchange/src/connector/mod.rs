//! 거래소 커넥터.

pub(crate) mod base;
pub mod binance;
pub mod coinbase;
pub mod okx;

pub use base::{ConnectorBase, Endpoints};
pub use binance::{BinanceConnector, BINANCE_REST_URL, BINANCE_WS_URL};
pub use coinbase::{CoinbaseConnector, COINBASE_REST_URL, COINBASE_WS_URL};
pub use okx::{OkxConnector, OKX_REST_URL, OKX_WS_URL};

use std::sync::Arc;

use money_core::{AlertManager, CredentialStore, Venue, VenueConfig};

use crate::error::{ExchangeError, ExchangeResult};
use crate::traits::Connector;

/// 거래소 이름으로 커넥터를 생성합니다.
///
/// 온체인 데이터는 [`BlockchainClient`](crate::blockchain::BlockchainClient)를 사용하세요.
pub fn build_connector(
    venue: Venue,
    config: &VenueConfig,
    credentials: Arc<dyn CredentialStore>,
    alerts: AlertManager,
) -> ExchangeResult<Box<dyn Connector>> {
    if !config.enabled {
        return Err(ExchangeError::InvalidConfig(format!(
            "{} is disabled in configuration",
            venue
        )));
    }

    Ok(match venue {
        Venue::Binance => Box::new(BinanceConnector::new(config, credentials, alerts)?),
        Venue::Coinbase => Box::new(CoinbaseConnector::new(config, credentials, alerts)?),
        Venue::Okx => Box::new(OkxConnector::new(config, credentials, alerts)?),
        Venue::OnChain => {
            return Err(ExchangeError::NotSupported(
                "onchain is not an exchange connector".to_string(),
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use money_core::ApiKeyStore;

    fn store() -> Arc<dyn CredentialStore> {
        Arc::new(ApiKeyStore::new())
    }

    #[test]
    fn test_build_connector_per_venue() {
        for venue in Venue::exchanges() {
            let connector =
                build_connector(venue, &VenueConfig::default(), store(), AlertManager::default())
                    .unwrap();
            assert_eq!(connector.venue(), venue);
        }
    }

    #[test]
    fn test_build_connector_rejects_onchain_and_disabled() {
        let err = build_connector(
            Venue::OnChain,
            &VenueConfig::default(),
            store(),
            AlertManager::default(),
        )
        .err().unwrap();
        assert!(matches!(err, ExchangeError::NotSupported(_)));

        let disabled = VenueConfig {
            enabled: false,
            ..Default::default()
        };
        let err = build_connector(Venue::Okx, &disabled, store(), AlertManager::default())
            .err().unwrap();
        assert!(matches!(err, ExchangeError::InvalidConfig(_)));
    }

    #[test]
    fn test_build_connector_validates_config() {
        let config = VenueConfig {
            rate_limit_per_second: 0.0,
            ..Default::default()
        };
        assert!(build_connector(Venue::Binance, &config, store(), AlertManager::default()).is_err());
    }
}
