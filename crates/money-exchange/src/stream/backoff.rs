//! 재연결 지수 백오프.

use std::time::Duration;

use money_core::VenueConfig;

use crate::error::{ExchangeError, ExchangeResult};

/// 재연결 대기 상태.
///
/// 연결이 끊길 때마다 현재 대기 시간을 반환하고 다음 값을 두 배로 늘립니다
/// (최대값 상한). 충분히 오래 유지된 연결 이후에는 최소값부터 다시 시작합니다.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    min: Duration,
    max: Duration,
    /// 이 시간 이상 유지된 연결은 백오프를 초기화
    stable_threshold: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration, stable_threshold: Duration) -> ExchangeResult<Self> {
        if min.is_zero() {
            return Err(ExchangeError::InvalidConfig(
                "minimum reconnect delay must be positive".to_string(),
            ));
        }
        if min > max {
            return Err(ExchangeError::InvalidConfig(format!(
                "minimum reconnect delay {:?} exceeds maximum {:?}",
                min, max
            )));
        }
        Ok(Self {
            current: min,
            min,
            max,
            stable_threshold,
        })
    }

    pub fn from_config(config: &VenueConfig) -> ExchangeResult<Self> {
        Self::new(
            config.reconnect_min_delay(),
            config.reconnect_max_delay(),
            config.stable_connection(),
        )
    }

    /// 다음 재연결 전 대기 시간.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// 연결 종료를 기록하고 재연결 전 대기 시간을 반환합니다.
    ///
    /// `connected_for`는 끊기기 전 연결 유지 시간이며, 연결 자체가 실패했으면 `None`.
    pub fn on_disconnect(&mut self, connected_for: Option<Duration>) -> Duration {
        if connected_for.is_some_and(|uptime| uptime >= self.stable_threshold) {
            self.reset();
        }
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// 최소 대기 시간으로 되돌립니다.
    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> Backoff {
        Backoff::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
            Duration::from_secs(30),
        )
        .unwrap()
    }

    #[test]
    fn test_doubles_per_reconnect() {
        let mut b = backoff();
        let waits: Vec<u64> = (0..4).map(|_| b.on_disconnect(None).as_secs()).collect();
        assert_eq!(waits, vec![1, 2, 4, 8]);
    }

    #[test]
    fn test_capped_at_max() {
        let mut b = backoff();
        for _ in 0..10 {
            b.on_disconnect(None);
        }
        assert_eq!(b.on_disconnect(None), Duration::from_secs(60));
        assert_eq!(b.current(), Duration::from_secs(60));
    }

    #[test]
    fn test_resets_after_sustained_connection() {
        let mut b = backoff();
        b.on_disconnect(None);
        b.on_disconnect(None);
        b.on_disconnect(None);
        assert_eq!(b.current(), Duration::from_secs(8));

        // 짧은 연결은 초기화하지 않음
        assert_eq!(
            b.on_disconnect(Some(Duration::from_secs(5))),
            Duration::from_secs(8)
        );
        // 충분히 유지된 연결 이후에는 최소값
        assert_eq!(
            b.on_disconnect(Some(Duration::from_secs(45))),
            Duration::from_secs(1)
        );
        assert_eq!(b.current(), Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(Backoff::new(Duration::ZERO, Duration::from_secs(1), Duration::ZERO).is_err());
        assert!(Backoff::new(
            Duration::from_secs(2),
            Duration::from_secs(1),
            Duration::ZERO
        )
        .is_err());
    }
}
