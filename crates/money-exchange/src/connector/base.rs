//! 커넥터 공통 구성 요소와 응답 파싱 헬퍼.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use money_core::{AlertManager, CredentialStore, OrderBookLevel, Venue, VenueConfig};

use crate::error::{ExchangeError, ExchangeResult};
use crate::pipeline::RequestPipeline;
use crate::stream::{spawn_stream, StreamConfig, StreamHandler, SubscriptionHandle};

/// 거래소 기본 엔드포인트.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub rest: String,
    pub ws: String,
}

impl Endpoints {
    pub fn new(rest: impl Into<String>, ws: impl Into<String>) -> Self {
        Self {
            rest: rest.into().trim_end_matches('/').to_string(),
            ws: ws.into().trim_end_matches('/').to_string(),
        }
    }

    /// 설정의 URL 재정의를 적용합니다.
    pub fn with_overrides(self, config: &VenueConfig) -> Self {
        Self::new(
            config.rest_base_url.clone().unwrap_or(self.rest),
            config.ws_base_url.clone().unwrap_or(self.ws),
        )
    }
}

/// 요청 파이프라인과 스트림 설정을 묶은 커넥터 공통 부분.
#[derive(Debug)]
pub struct ConnectorBase {
    venue: Venue,
    config: VenueConfig,
    endpoints: Endpoints,
    pipeline: RequestPipeline,
    alerts: AlertManager,
}

impl ConnectorBase {
    pub fn new(
        venue: Venue,
        endpoints: Endpoints,
        config: &VenueConfig,
        credentials: Arc<dyn CredentialStore>,
        alerts: AlertManager,
    ) -> ExchangeResult<Self> {
        config.validate()?;
        let endpoints = endpoints.with_overrides(config);
        let pipeline = RequestPipeline::new(venue, endpoints.rest.clone(), config, credentials)?;

        Ok(Self {
            venue,
            config: config.clone(),
            endpoints,
            pipeline,
            alerts,
        })
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    /// 파이프라인을 교체합니다 (요청 한도 공유 등).
    pub fn map_pipeline(mut self, f: impl FnOnce(RequestPipeline) -> RequestPipeline) -> Self {
        self.pipeline = f(self.pipeline);
        self
    }

    /// 스트림 구독을 시작합니다.
    ///
    /// `path`는 WebSocket 기본 URL 뒤에 붙고, `frames`는 (재)연결마다 전송됩니다.
    pub fn subscribe(
        &self,
        path: &str,
        frames: Vec<String>,
        handler: Box<dyn StreamHandler>,
        heartbeat_interval: Option<Duration>,
    ) -> ExchangeResult<SubscriptionHandle> {
        let url = if path.is_empty() {
            self.endpoints.ws.clone()
        } else {
            format!("{}/{}", self.endpoints.ws, path.trim_start_matches('/'))
        };

        let mut config = StreamConfig::new(self.venue, url, &self.config)?;
        if let Some(interval) = heartbeat_interval {
            if interval.is_zero() {
                return Err(ExchangeError::InvalidConfig(
                    "heartbeat interval must be positive".to_string(),
                ));
            }
            config = config.with_heartbeat(interval);
        }
        for frame in frames {
            config = config.with_initial_frame(frame);
        }

        Ok(spawn_stream(config, handler, self.alerts.clone()))
    }
}

/// 필드를 가져옵니다. 없으면 파싱 에러.
pub(crate) fn field<'a>(value: &'a Value, name: &str) -> ExchangeResult<&'a Value> {
    value
        .get(name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| ExchangeError::ParseError(format!("missing field '{}'", name)))
}

/// 문자열 필드를 가져옵니다.
pub(crate) fn str_field<'a>(value: &'a Value, name: &str) -> ExchangeResult<&'a str> {
    field(value, name)?
        .as_str()
        .ok_or_else(|| ExchangeError::ParseError(format!("field '{}' is not a string", name)))
}

/// 선택적 문자열 필드. 숫자도 문자열로 변환합니다.
pub(crate) fn opt_string(value: &Value, name: &str) -> Option<String> {
    match value.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// 문자열 또는 숫자 JSON 값을 Decimal로 변환합니다.
pub(crate) fn to_decimal(value: &Value) -> ExchangeResult<Decimal> {
    match value {
        Value::String(s) => parse_decimal_str(s),
        Value::Number(n) => parse_decimal_str(&n.to_string()),
        other => Err(ExchangeError::ParseError(format!(
            "expected decimal, got {}",
            other
        ))),
    }
}

fn parse_decimal_str(s: &str) -> ExchangeResult<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map_err(|e| ExchangeError::ParseError(format!("invalid decimal '{}': {}", s, e)))
}

/// Decimal 필드를 가져옵니다.
pub(crate) fn decimal_field(value: &Value, name: &str) -> ExchangeResult<Decimal> {
    to_decimal(field(value, name)?)
}

/// 밀리초 타임스탬프 필드 (문자열 또는 숫자).
pub(crate) fn millis_field(value: &Value, name: &str) -> ExchangeResult<DateTime<Utc>> {
    let raw = field(value, name)?;
    let millis = match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    };

    match millis {
        Some(ms) => DateTime::from_timestamp_millis(ms).ok_or_else(|| {
            ExchangeError::ParseError(format!("timestamp '{}' out of range", ms))
        }),
        // `2021-04-29 16:08:00` 형식의 UTC 문자열
        None => raw
            .as_str()
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok())
            .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
            .ok_or_else(|| {
                ExchangeError::ParseError(format!("field '{}' is not a timestamp: {}", name, raw))
            }),
    }
}

/// RFC 3339 타임스탬프 필드.
pub(crate) fn rfc3339_field(value: &Value, name: &str) -> ExchangeResult<DateTime<Utc>> {
    let raw = str_field(value, name)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ExchangeError::ParseError(format!("invalid timestamp '{}': {}", raw, e)))
}

/// `[[price, size, ...], ...]` 배열을 호가 레벨로 변환합니다.
pub(crate) fn parse_levels(value: &Value, name: &str) -> ExchangeResult<Vec<OrderBookLevel>> {
    let entries = field(value, name)?
        .as_array()
        .ok_or_else(|| ExchangeError::ParseError(format!("field '{}' is not an array", name)))?;

    entries
        .iter()
        .map(|entry| {
            let pair = entry.as_array().filter(|a| a.len() >= 2).ok_or_else(|| {
                ExchangeError::ParseError(format!("invalid level in '{}': {}", name, entry))
            })?;
            let price = to_decimal(&pair[0])?;
            let size = to_decimal(&pair[1])?;
            Ok(OrderBookLevel::new(price, size)?)
        })
        .collect()
}

/// 배열 응답을 가져옵니다.
pub(crate) fn as_array<'a>(value: &'a Value, what: &str) -> ExchangeResult<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| ExchangeError::ParseError(format!("{} response is not an array", what)))
}
