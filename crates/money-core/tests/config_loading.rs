//! 설정 로드 통합 테스트.

use money_core::{AppConfig, LogConfig, LogFormat, Venue};

#[test]
fn test_load_missing_file_with_env_overrides() {
    std::env::set_var("MONEY__LOGGING__FORMAT", "json");
    std::env::set_var("MONEY__VENUES__BINANCE__RATE_LIMIT_PER_SECOND", "20.5");
    std::env::set_var("MONEY__VENUES__BINANCE__RETRY_ATTEMPTS", "5");

    let config = AppConfig::load("does/not/exist.toml").unwrap();

    assert_eq!(config.logging.level, "info");
    assert_eq!(LogConfig::from(&config.logging).format, LogFormat::Json);

    let binance = config.venue(Venue::Binance);
    assert_eq!(binance.rate_limit_per_second, 20.5);
    assert_eq!(binance.retry_attempts, 5);
    assert_eq!(binance.heartbeat_interval_secs, 15);

    let coinbase = config.venue(Venue::Coinbase);
    assert_eq!(coinbase.rate_limit_per_second, 10.0);
    assert!(config.blockchain.is_none());

    std::env::remove_var("MONEY__LOGGING__FORMAT");
    std::env::remove_var("MONEY__VENUES__BINANCE__RATE_LIMIT_PER_SECOND");
    std::env::remove_var("MONEY__VENUES__BINANCE__RETRY_ATTEMPTS");
}
