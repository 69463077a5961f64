//! 지수 백오프 재시도.
//!
//! 재시도 대상 에러이면 `base × 2^(attempt-1)`만큼 대기 후 다시 시도합니다.
//! 시도 횟수를 모두 소진하면 마지막 에러를 그대로 반환하고, 재시도 대상이
//! 아닌 에러는 즉시 반환합니다.

use std::future::Future;
use std::time::Duration;

use money_core::VenueConfig;

use crate::error::{ErrorKind, ExchangeError, ExchangeResult};

/// 재시도 설정.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 최대 시도 횟수 (첫 시도 포함)
    pub max_attempts: u32,
    /// 기본 대기 시간
    pub base_delay: Duration,
    /// 재시도 대상 에러 분류
    pub retryable: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            retryable: ErrorKind::TRANSIENT.to_vec(),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Default::default()
        }
    }

    /// 재시도 대상 분류를 교체합니다.
    pub fn with_retryable(mut self, retryable: impl Into<Vec<ErrorKind>>) -> Self {
        self.retryable = retryable.into();
        self
    }

    /// 거래소 설정으로 생성합니다.
    pub fn from_config(config: &VenueConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_backoff())
    }

    /// `attempt`번째 실패 후 대기 시간 (`attempt`는 1부터).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

/// 재시도를 적용하여 작업을 실행합니다.
///
/// `operation`은 시도마다 새 future를 만들어야 합니다.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> ExchangeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ExchangeResult<T>>,
{
    if config.max_attempts < 1 {
        return Err(ExchangeError::Internal(format!(
            "{}: retry executor requires at least one attempt",
            operation_name
        )));
    }

    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable(&config.retryable) => {
                tracing::debug!(operation = operation_name, error = %e, "Non-retryable error");
                return Err(e);
            }
            Err(e) if attempt >= config.max_attempts => {
                tracing::warn!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %e,
                    "Retries exhausted"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = config.delay_for(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
