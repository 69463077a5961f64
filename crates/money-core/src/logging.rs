//! tracing 기반 로깅 인프라.
//!
//! 출력 형식:
//! - **pretty**: 개발용 사람이 읽기 쉬운 형식
//! - **json**: 로그 수집기용 JSON 형식
//! - **compact**: 한 줄 요약 형식

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

/// 로그 출력 형식.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// 색상이 포함된 형식 (개발용)
    #[default]
    Pretty,
    /// JSON 형식 (운영용)
    Json,
    /// 간결한 한 줄 형식
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 로그 레벨 필터 (예: "info", "money_exchange=debug")
    pub level: String,
    /// 출력 형식
    pub format: LogFormat,
    /// span 진입/종료 이벤트 포함 여부
    pub with_span_events: bool,
    /// 파일명과 줄 번호 포함 여부
    pub with_file: bool,
    /// 대상(모듈 경로) 포함 여부
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            with_span_events: false,
            with_file: false,
            with_target: true,
        }
    }
}

impl LogConfig {
    /// 새 로그 설정을 생성합니다.
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    /// 로그 형식을 설정합니다.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// span 이벤트를 활성화합니다.
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    /// `LOG_FORMAT` 환경변수가 있으면 형식을 덮어씁니다.
    ///
    /// 레벨은 [`init_logging`]에서 `RUST_LOG`가 우선 적용됩니다.
    pub fn with_env_overrides(self) -> Self {
        let raw = std::env::var("LOG_FORMAT").ok();
        self.with_format_override(raw.as_deref())
    }

    /// 알 수 없는 형식은 무시합니다.
    fn with_format_override(mut self, raw: Option<&str>) -> Self {
        if let Some(format) = raw.and_then(|s| s.parse().ok()) {
            self.format = format;
        }
        self
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.clone(),
            format: config.format.parse().unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// 주어진 설정으로 전역 subscriber를 초기화합니다.
///
/// `RUST_LOG`가 설정되어 있으면 `config.level`보다 우선합니다.
///
/// # 예제
///
/// ```no_run
/// use money_core::logging::{init_logging, LogConfig, LogFormat};
///
/// init_logging(LogConfig::new("debug").with_format(LogFormat::Json)).unwrap();
/// ```
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let span_events = if config.with_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_file(config.with_file)
        .with_line_number(config.with_file)
        .with_target(config.with_target)
        .with_span_events(span_events);

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Json => base.json().boxed(),
        LogFormat::Compact => base.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()?;

    tracing::info!(
        format = ?config.format,
        level = %config.level,
        "Logging initialized"
    );

    Ok(())
}

/// 거래소 컨텍스트 필드가 포함된 span을 생성하는 매크로.
#[macro_export]
macro_rules! venue_span {
    ($name:expr, $venue:expr) => {
        tracing::info_span!($name, venue = %$venue)
    };
    ($name:expr, $venue:expr, $topic:expr) => {
        tracing::info_span!($name, venue = %$venue, topic = %$topic)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_config_from_logging_section() {
        let section = LoggingConfig {
            level: "money_exchange=debug".to_string(),
            format: "json".to_string(),
        };
        let config = LogConfig::from(&section);
        assert_eq!(config.level, "money_exchange=debug");
        assert_eq!(config.format, LogFormat::Json);

        let section = LoggingConfig {
            level: "info".to_string(),
            format: "unknown".to_string(),
        };
        assert_eq!(LogConfig::from(&section).format, LogFormat::Pretty);
    }

    #[test]
    fn test_format_override() {
        let base = LogConfig::new("debug").with_format(LogFormat::Compact);

        let json = base.clone().with_format_override(Some("json"));
        assert_eq!(json.format, LogFormat::Json);
        assert_eq!(json.level, "debug");

        assert_eq!(base.clone().with_format_override(None).format, LogFormat::Compact);
        assert_eq!(base.with_format_override(Some("xml")).format, LogFormat::Compact);
    }

    #[test]
    fn test_span_events_builder() {
        assert!(!LogConfig::default().with_span_events);
        assert!(LogConfig::new("info").with_span_events(true).with_span_events);
    }

    #[test]
    fn test_venue_span_macro() {
        let span = crate::venue_span!("fetch", "binance", "BTCUSDT");
        // subscriber가 없으면 비활성 span이지만 생성은 가능해야 함
        let _guard = span.enter();
    }
}
