//! 코어 에러 타입.
//!
//! 도메인 레코드 검증, 설정 로드, 자격증명 관리에서 발생하는 에러를 정의합니다.

use thiserror::Error;

/// 핵심 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 도메인 레코드 검증 실패
    #[error("검증 에러: {0}")]
    Validation(String),

    /// 자격증명 에러
    #[error("자격증명 에러: {0}")]
    Credential(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 내부 에러
    #[error("내부 에러: {0}")]
    Internal(String),
}

/// 코어 작업을 위한 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// 입력 데이터 문제로 인한 에러인지 확인합니다.
    pub fn is_validation(&self) -> bool {
        matches!(self, CoreError::Validation(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}
