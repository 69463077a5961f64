//! 설정 관리.
//!
//! TOML 파일과 `MONEY__` 접두사 환경 변수에서 애플리케이션 설정을 읽습니다.
//!
//! ```toml
//! [logging]
//! level = "info"
//! format = "pretty"
//!
//! [venues.binance]
//! rate_limit_per_second = 10.0
//! api_key_env = "BINANCE_API_KEY"
//! api_secret_env = "BINANCE_API_SECRET"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::domain::Venue;
use crate::error::{CoreError, CoreResult};

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 거래소별 설정 (키: 거래소 이름)
    #[serde(default)]
    pub venues: HashMap<String, VenueConfig>,
    /// 블록체인 폴링 설정
    #[serde(default)]
    pub blockchain: Option<BlockchainConfig>,
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 거래소 연결 설정.
///
/// REST 파이프라인(요청 한도, 재시도, 타임아웃)과 스트리밍 엔진(하트비트,
/// 재연결 백오프)의 파라미터를 담습니다.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VenueConfig {
    /// 이 거래소 활성화 여부
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 초당 요청 한도 (토큰 리필 속도)
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_second: f64,
    /// 버스트 허용량 (미설정 시 `max(1, floor(rate))`)
    #[serde(default)]
    pub burst: Option<u32>,
    /// REST 요청 타임아웃 (밀리초)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// REST 호출 전체 데드라인 (밀리초, 재시도 포함)
    #[serde(default)]
    pub deadline_ms: Option<u64>,
    /// 최대 시도 횟수
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// 재시도 기본 대기 시간 (밀리초)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// WebSocket 하트비트 간격 (초)
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
    /// WebSocket 연결 타임아웃 (밀리초)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// 재연결 최소 대기 (밀리초)
    #[serde(default = "default_reconnect_min_ms")]
    pub reconnect_min_delay_ms: u64,
    /// 재연결 최대 대기 (밀리초)
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_delay_ms: u64,
    /// 백오프 초기화를 위한 최소 연결 유지 시간 (초)
    #[serde(default = "default_stable_secs")]
    pub stable_connection_secs: u64,
    /// 수신 없음 판정 시간 (초)
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    /// REST 기본 URL 재정의 (샌드박스용)
    #[serde(default)]
    pub rest_base_url: Option<String>,
    /// WebSocket 기본 URL 재정의
    #[serde(default)]
    pub ws_base_url: Option<String>,
    /// API 키 환경 변수 이름
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// API 시크릿 환경 변수 이름
    #[serde(default)]
    pub api_secret_env: Option<String>,
    /// 패스프레이즈 환경 변수 이름
    #[serde(default)]
    pub passphrase_env: Option<String>,
}

fn default_enabled() -> bool {
    true
}
fn default_rate_limit() -> f64 {
    10.0
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_heartbeat_secs() -> u64 {
    15
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_reconnect_min_ms() -> u64 {
    1_000
}
fn default_reconnect_max_ms() -> u64 {
    60_000
}
fn default_stable_secs() -> u64 {
    30
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            rate_limit_per_second: default_rate_limit(),
            burst: None,
            request_timeout_ms: default_request_timeout_ms(),
            deadline_ms: None,
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            heartbeat_interval_secs: default_heartbeat_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_min_delay_ms: default_reconnect_min_ms(),
            reconnect_max_delay_ms: default_reconnect_max_ms(),
            stable_connection_secs: default_stable_secs(),
            idle_timeout_secs: None,
            rest_base_url: None,
            ws_base_url: None,
            api_key_env: None,
            api_secret_env: None,
            passphrase_env: None,
        }
    }
}

impl VenueConfig {
    /// REST 요청 타임아웃.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// REST 호출 전체 데드라인.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// 재시도 기본 대기 시간.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// 하트비트 간격.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// WebSocket 연결 타임아웃.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// 재연결 최소 대기.
    pub fn reconnect_min_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_min_delay_ms)
    }

    /// 재연결 최대 대기.
    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    /// 백오프 초기화 기준 연결 유지 시간.
    pub fn stable_connection(&self) -> Duration {
        Duration::from_secs(self.stable_connection_secs)
    }

    /// 수신 없음 판정 시간.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    /// 설정 값의 일관성을 검사합니다.
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.rate_limit_per_second.is_finite() && self.rate_limit_per_second > 0.0) {
            return Err(CoreError::Config(format!(
                "rate_limit_per_second must be positive, got {}",
                self.rate_limit_per_second
            )));
        }
        if self.burst == Some(0) {
            return Err(CoreError::Config("burst must be at least 1".to_string()));
        }
        if self.retry_attempts == 0 {
            return Err(CoreError::Config(
                "retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.reconnect_min_delay_ms > self.reconnect_max_delay_ms {
            return Err(CoreError::Config(format!(
                "reconnect_min_delay_ms ({}) exceeds reconnect_max_delay_ms ({})",
                self.reconnect_min_delay_ms, self.reconnect_max_delay_ms
            )));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(CoreError::Config(
                "heartbeat_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// 블록체인 폴링 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlockchainConfig {
    /// RPC 엔드포인트
    pub endpoint: String,
    /// 요청 타임아웃 (밀리초)
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
    /// 폴링 간격 (초)
    #[serde(default = "default_heartbeat_secs")]
    pub poll_interval_secs: u64,
}

impl BlockchainConfig {
    /// 요청 타임아웃.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 폴링 간격.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let builder = config::Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("MONEY")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 기본 경로(`config/money.toml`)에서 설정을 로드합니다.
    pub fn load_default() -> CoreResult<Self> {
        Self::load("config/money.toml")
    }

    /// 거래소 설정을 반환합니다. 없으면 기본값을 사용합니다.
    pub fn venue(&self, venue: Venue) -> VenueConfig {
        self.venues
            .get(venue.as_str())
            .cloned()
            .unwrap_or_default()
    }

    /// 모든 거래소 설정을 검사합니다.
    pub fn validate(&self) -> CoreResult<()> {
        for (name, venue) in &self.venues {
            name.parse::<Venue>()
                .map_err(|e| CoreError::Config(format!("venues.{}: {}", name, e)))?;
            venue
                .validate()
                .map_err(|e| CoreError::Config(format!("venues.{}: {}", name, e)))?;
        }
        Ok(())
    }
}
