//! 거래소 데이터 수집 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 최근 체결가
//! money --venue binance price -s BTCUSDT
//!
//! # 호가창 (상위 10단계)
//! money --venue okx book -s BTC-USDT --depth 10
//!
//! # 입출금 내역 (MONEY__VENUES__BINANCE__API_KEY_ENV 등으로 지정한 환경변수 필요)
//! money --venue binance wallet
//!
//! # 실시간 스트림 (Ctrl-C로 종료)
//! money --venue coinbase stream -t ticker:BTC-USD --heartbeat 10
//!
//! # 온체인 지갑 이벤트 감시
//! money onchain -m wallet_events --params '{"address":"0xabc"}' --watch
//! ```

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;

use money_core::{init_logging, LogConfig, Venue};

mod commands;

use commands::{load_config, Context};

#[derive(Parser)]
#[command(name = "money")]
#[command(about = "Crypto venue market data, wallet history and live streams", long_about = None)]
#[command(version)]
struct Cli {
    /// 설정 파일 경로 (기본: config/money.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 거래소 (binance, coinbase, okx)
    #[arg(short, long, global = true, default_value = "binance")]
    venue: Venue,

    /// span 진입/종료를 로그에 포함
    #[arg(long, global = true)]
    log_spans: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 최근 체결가 조회
    Price {
        /// 심볼 (예: BTCUSDT, BTC-USD)
        #[arg(short, long)]
        symbol: String,
    },

    /// 24시간 거래량 조회
    Volume {
        #[arg(short, long)]
        symbol: String,
    },

    /// 호가창 조회
    Book {
        #[arg(short, long)]
        symbol: String,

        /// 호가 단계 수
        #[arg(short, long, default_value = "20")]
        depth: u32,
    },

    /// 입출금 내역 조회 (인증 필요)
    Wallet,

    /// 토픽 구독 후 메시지를 한 줄씩 출력
    Stream {
        /// 토픽 (binance: btcusdt@trade, coinbase: ticker:BTC-USD, okx: tickers:BTC-USDT)
        #[arg(short, long)]
        topic: String,

        /// 하트비트 간격 (초). 생략하면 설정값 사용
        #[arg(long)]
        heartbeat: Option<u64>,
    },

    /// 온체인 지갑 이벤트 조회
    Onchain {
        /// 데이터 소스 메서드
        #[arg(short, long)]
        method: String,

        /// 메서드 파라미터 (JSON 객체)
        #[arg(short, long)]
        params: Option<String>,

        /// 취소될 때까지 주기적으로 조회
        #[arg(long, default_value = "false")]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let log_config = LogConfig::from(&config.logging)
        .with_env_overrides()
        .with_span_events(cli.log_spans);
    init_logging(log_config).map_err(|e| anyhow!("{}", e))?;

    let ctx = Context::new(config);
    let result = run(&ctx, cli.venue, cli.command).await;
    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}

async fn run(ctx: &Context, venue: Venue, command: Commands) -> Result<()> {
    match command {
        Commands::Price { symbol } => commands::market::price(ctx, venue, &symbol).await,
        Commands::Volume { symbol } => commands::market::volume(ctx, venue, &symbol).await,
        Commands::Book { symbol, depth } => {
            commands::market::book(ctx, venue, &symbol, depth).await
        }
        Commands::Wallet => commands::wallet::wallet(ctx, venue).await,
        Commands::Stream { topic, heartbeat } => {
            if heartbeat == Some(0) {
                return Err(anyhow!("--heartbeat must be at least 1 second"));
            }
            let heartbeat = heartbeat.map(Duration::from_secs);
            commands::stream::stream(ctx, venue, &topic, heartbeat).await
        }
        Commands::Onchain {
            method,
            params,
            watch,
        } => {
            let params = commands::onchain::parse_params(params.as_deref())?;
            commands::onchain::onchain(ctx, &method, params, watch).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_book_command() {
        let cli = Cli::try_parse_from([
            "money", "--venue", "okx", "book", "-s", "BTC-USDT", "--depth", "5",
        ])
        .unwrap();
        assert_eq!(cli.venue, Venue::Okx);
        assert!(!cli.log_spans);
        assert!(matches!(cli.command, Commands::Book { depth: 5, .. }));
    }

    #[test]
    fn test_log_spans_flag_is_global() {
        let cli = Cli::try_parse_from(["money", "wallet", "--log-spans"]).unwrap();
        assert!(cli.log_spans);
    }

    #[test]
    fn test_parse_stream_command_defaults() {
        let cli = Cli::try_parse_from(["money", "stream", "-t", "btcusdt@trade"]).unwrap();
        assert_eq!(cli.venue, Venue::Binance);
        match cli.command {
            Commands::Stream { topic, heartbeat } => {
                assert_eq!(topic, "btcusdt@trade");
                assert_eq!(heartbeat, None);
            }
            _ => panic!("expected stream command"),
        }
    }

    #[test]
    fn test_unknown_venue_rejected() {
        assert!(Cli::try_parse_from(["money", "--venue", "kraken", "wallet"]).is_err());
    }
}
