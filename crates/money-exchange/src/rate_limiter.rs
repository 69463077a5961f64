//! 거래소별 토큰 버킷 요청 한도.
//!
//! 모든 REST 시도(재시도 포함)는 전송 전에 [`RateLimiter::acquire`]를 거칩니다.
//! 버킷 상태는 하나의 비동기 뮤텍스로 보호되며, 한 번의 acquire는 토큰을
//! 얻을 때까지 락을 유지하므로 대기자는 도착 순서대로 처리됩니다.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use money_core::VenueConfig;

use crate::error::{ExchangeError, ExchangeResult};

/// 부동소수점 오차로 0에 가까운 대기가 반복되지 않도록 하는 하한.
const MIN_WAIT: Duration = Duration::from_millis(1);
/// 한 번에 잠드는 최대 시간. 깨어나면 리필 후 다시 계산합니다.
const MAX_WAIT: Duration = Duration::from_secs(60);

/// 토큰 버킷 상태.
#[derive(Debug)]
struct TokenBucket {
    /// 현재 토큰 수
    tokens: f64,
    /// 마지막 리필 시간
    last_refill: Instant,
    /// 최대 토큰 수 (버킷 용량)
    capacity: f64,
    /// 초당 리필되는 토큰 수
    refill_rate: f64,
}

impl TokenBucket {
    /// 경과 시간만큼 토큰 리필 (용량 상한).
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// 다음 토큰까지 대기 시간. [`MIN_WAIT`, `MAX_WAIT`] 범위로 제한됩니다.
    fn time_until_next_token(&self) -> Duration {
        let deficit = (1.0 - self.tokens).max(0.0);
        Duration::try_from_secs_f64(deficit / self.refill_rate)
            .unwrap_or(MAX_WAIT)
            .clamp(MIN_WAIT, MAX_WAIT)
    }
}

/// 비동기 토큰 버킷 요청 한도.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
    capacity: u32,
    refill_rate: f64,
}

impl RateLimiter {
    /// 새 요청 한도를 생성합니다.
    ///
    /// `capacity`를 생략하면 `max(1, floor(refill_rate))`를 사용합니다.
    /// 버킷은 가득 찬 상태로 시작합니다.
    pub fn new(refill_rate: f64, capacity: Option<u32>) -> ExchangeResult<Self> {
        if !(refill_rate.is_finite() && refill_rate > 0.0) {
            return Err(ExchangeError::InvalidConfig(format!(
                "refill rate must be positive, got {}",
                refill_rate
            )));
        }
        let capacity = match capacity {
            Some(0) => {
                return Err(ExchangeError::InvalidConfig(
                    "capacity must be at least 1".to_string(),
                ))
            }
            Some(c) => c,
            None => (refill_rate.floor() as u32).max(1),
        };

        Ok(Self {
            bucket: Mutex::new(TokenBucket {
                tokens: capacity as f64,
                last_refill: Instant::now(),
                capacity: capacity as f64,
                refill_rate,
            }),
            capacity,
            refill_rate,
        })
    }

    /// 거래소 설정으로 생성합니다.
    pub fn from_config(config: &VenueConfig) -> ExchangeResult<Self> {
        Self::new(config.rate_limit_per_second, config.burst)
    }

    /// 토큰을 하나 얻을 때까지 대기한 뒤 차감합니다.
    pub async fn acquire(&self) {
        let mut bucket = self.bucket.lock().await;
        loop {
            bucket.refill(Instant::now());
            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return;
            }
            let wait = bucket.time_until_next_token();
            tracing::trace!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// 대기 없이 토큰 차감을 시도합니다.
    pub fn try_acquire(&self) -> bool {
        let Ok(mut bucket) = self.bucket.try_lock() else {
            return false;
        };
        bucket.refill(Instant::now());
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// 현재 사용 가능한 토큰 수.
    pub async fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(Instant::now());
        bucket.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_rejects_non_positive_rate() {
        assert!(RateLimiter::new(0.0, None).is_err());
        assert!(RateLimiter::new(-1.0, None).is_err());
        assert!(RateLimiter::new(f64::NAN, None).is_err());
        assert!(RateLimiter::new(5.0, Some(0)).is_err());
    }

    #[tokio::test]
    async fn test_default_capacity() {
        assert_eq!(RateLimiter::new(10.5, None).unwrap().capacity(), 10);
        assert_eq!(RateLimiter::new(0.2, None).unwrap().capacity(), 1);
        assert_eq!(RateLimiter::new(2.0, Some(7)).unwrap().capacity(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_wait() {
        let limiter = RateLimiter::new(2.0, Some(5)).unwrap();
        let start = Instant::now();

        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(10));

        // 6번째는 0.5초(1/rate) 대기
        limiter.acquire().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(499), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(600), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_rate_bounded() {
        let limiter = RateLimiter::new(10.0, Some(1)).unwrap();
        let start = Instant::now();

        for _ in 0..21 {
            limiter.acquire().await;
        }
        // 첫 토큰은 즉시, 이후 20개는 0.1초 간격
        assert!(start.elapsed() >= Duration::from_millis(1990));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_capped_at_capacity() {
        let limiter = RateLimiter::new(100.0, Some(3)).unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        let available = limiter.available().await;
        assert!(available <= 3.0);
        assert!(available >= 0.0);

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert!(limiter.available().await >= 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tiny_rate_waits_in_bounded_steps() {
        let limiter = RateLimiter::new(1e-30, None).unwrap();
        limiter.acquire().await;

        // 다음 토큰은 사실상 오지 않으므로 대기는 상한 단위로 반복됩니다.
        let blocked = tokio::time::timeout(Duration::from_secs(300), limiter.acquire()).await;
        assert!(blocked.is_err());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_wait_is_clamped() {
        let bucket = TokenBucket {
            tokens: 0.0,
            capacity: 1.0,
            refill_rate: 1e-30,
            last_refill: Instant::now(),
        };
        assert_eq!(bucket.time_until_next_token(), MAX_WAIT);

        let nearly_full = TokenBucket {
            tokens: 1.0 - 1e-12,
            refill_rate: 1e9,
            ..bucket
        };
        assert_eq!(nearly_full.time_until_next_token(), MIN_WAIT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_bucket() {
        let limiter = Arc::new(RateLimiter::new(5.0, Some(5)).unwrap());
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..15 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }

        // 5개 버스트 + 10개는 0.2초 간격 → 최소 2초
        let last = finished.into_iter().max().unwrap();
        assert!(last.duration_since(start) >= Duration::from_millis(1990));
    }
}
