//! 거래소 에러 타입.

use money_core::CoreError;
use std::fmt;
use thiserror::Error;

/// 거래소 관련 에러.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// 네트워크/연결 에러 (연결 실패, 리셋)
    #[error("Transport error: {0}")]
    Transport(String),

    /// 요청 또는 데드라인 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 2xx가 아닌 HTTP 응답
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// 인증 요청에 필요한 자격증명 없음
    #[error("Missing credential for {0}")]
    MissingCredential(String),

    /// 디코딩할 수 없는 메시지
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// 스트림 연결 끊김
    #[error("Stream disconnected: {0}")]
    StreamDisconnected(String),

    /// 응답 필드 파싱 에러
    #[error("Parse error: {0}")]
    ParseError(String),

    /// 서명 생성 실패
    #[error("Signing error: {0}")]
    Signing(String),

    /// 잘못된 설정
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// 지원되지 않는 작업
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// 내부 불변식 위반
    #[error("Internal error: {0}")]
    Internal(String),
}

/// 거래소 작업을 위한 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// 재시도 판단에 쓰이는 에러 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Timeout,
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx
    ServerError,
    /// 429를 제외한 HTTP 4xx
    ClientError,
    MissingCredential,
    MalformedPayload,
    Disconnected,
    Parse,
    Signing,
    Config,
    NotSupported,
    Internal,
}

impl ErrorKind {
    /// 기본 재시도 대상 (일시적 전송 실패).
    pub const TRANSIENT: &'static [ErrorKind] = &[
        ErrorKind::Transport,
        ErrorKind::Timeout,
        ErrorKind::RateLimited,
        ErrorKind::ServerError,
    ];
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl ExchangeError {
    /// 에러 분류를 반환합니다.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExchangeError::Transport(_) => ErrorKind::Transport,
            ExchangeError::Timeout(_) => ErrorKind::Timeout,
            ExchangeError::Http { status, .. } => match *status {
                429 => ErrorKind::RateLimited,
                500..=599 => ErrorKind::ServerError,
                _ => ErrorKind::ClientError,
            },
            ExchangeError::MissingCredential(_) => ErrorKind::MissingCredential,
            ExchangeError::MalformedPayload(_) => ErrorKind::MalformedPayload,
            ExchangeError::StreamDisconnected(_) => ErrorKind::Disconnected,
            ExchangeError::ParseError(_) => ErrorKind::Parse,
            ExchangeError::Signing(_) => ErrorKind::Signing,
            ExchangeError::InvalidConfig(_) => ErrorKind::Config,
            ExchangeError::NotSupported(_) => ErrorKind::NotSupported,
            ExchangeError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// 주어진 재시도 대상에 포함되는지 확인.
    pub fn is_retryable(&self, retryable: &[ErrorKind]) -> bool {
        retryable.contains(&self.kind())
    }

    /// 기본 재시도 대상(일시적 실패)인지 확인.
    pub fn is_transient(&self) -> bool {
        self.is_retryable(ErrorKind::TRANSIENT)
    }

    /// HTTP 상태 코드 (HTTP 에러인 경우).
    pub fn status(&self) -> Option<u16> {
        match self {
            ExchangeError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            ExchangeError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else if err.is_decode() {
            ExchangeError::ParseError(err.to_string())
        } else if err.is_builder() {
            ExchangeError::InvalidConfig(err.to_string())
        } else {
            // 연결 실패, 리셋, 요청 본문 전송 실패
            ExchangeError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::ParseError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ExchangeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ExchangeError::StreamDisconnected(err.to_string())
    }
}

impl From<CoreError> for ExchangeError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config(msg) => ExchangeError::InvalidConfig(msg),
            CoreError::Credential(msg) => ExchangeError::MissingCredential(msg),
            CoreError::Validation(msg) => ExchangeError::ParseError(msg),
            CoreError::Serialization(msg) => ExchangeError::ParseError(msg),
            CoreError::Internal(msg) => ExchangeError::Internal(msg),
        }
    }
}
