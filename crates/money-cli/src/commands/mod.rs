//! CLI 명령어 구현 모듈.

pub mod market;
pub mod onchain;
pub mod stream;
pub mod wallet;

use anyhow::{Context as _, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use money_core::{AlertManager, ApiKeyStore, AppConfig, Venue};
use money_exchange::{build_connector, Connector};

/// 명령 실행에 필요한 공통 상태.
pub struct Context {
    pub config: AppConfig,
    pub credentials: Arc<ApiKeyStore>,
    pub alerts: AlertManager,
}

impl Context {
    /// 설정을 읽고 거래소 자격증명을 환경변수에서 불러옵니다.
    pub fn new(config: AppConfig) -> Self {
        let credentials = Arc::new(ApiKeyStore::new());
        for venue in Venue::exchanges() {
            let venue_config = config.venue(venue);
            match credentials.load_from_env(venue, &venue_config) {
                Ok(true) => debug!(%venue, "Loaded API credentials"),
                Ok(false) => {}
                // 인증이 필요 없는 명령은 계속 실행할 수 있도록 경고만 남김
                Err(e) => warn!(%venue, error = %e, "Failed to load API credentials"),
            }
        }

        Self {
            config,
            credentials,
            alerts: AlertManager::default(),
        }
    }

    /// 거래소 커넥터를 생성합니다.
    pub fn connector(&self, venue: Venue) -> Result<Box<dyn Connector>> {
        build_connector(
            venue,
            &self.config.venue(venue),
            self.credentials.clone(),
            self.alerts.clone(),
        )
        .with_context(|| format!("failed to create {} connector", venue))
    }
}

/// 설정 파일을 읽습니다. 경로가 없으면 `config/money.toml`.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load(path),
        None => AppConfig::load_default(),
    };
    config.context("failed to load configuration")
}

/// 결과를 들여쓴 JSON으로 출력합니다.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
