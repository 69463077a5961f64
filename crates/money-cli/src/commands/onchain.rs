//! 온체인 지갑 이벤트 조회 및 감시.

use anyhow::{bail, Context as _, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use money_exchange::{BlockchainClient, ExchangeError};

use super::{print_json, Context};

/// `--params` 인자를 JSON으로 파싱합니다. 생략하면 빈 객체.
pub fn parse_params(raw: Option<&str>) -> Result<Value> {
    match raw {
        None => Ok(Value::Object(Default::default())),
        Some(raw) => {
            let value: Value = serde_json::from_str(raw).context("--params must be valid JSON")?;
            if !value.is_object() {
                bail!("--params must be a JSON object");
            }
            Ok(value)
        }
    }
}

pub async fn onchain(ctx: &Context, method: &str, params: Value, watch: bool) -> Result<()> {
    let Some(config) = ctx.config.blockchain.as_ref() else {
        bail!("[blockchain] section is missing from configuration");
    };
    let client = BlockchainClient::from_config(config, ctx.alerts.clone())?;

    if !watch {
        let events = client.fetch_events(method, params).await?;
        return print_json(&BlockchainClient::to_wallet_events(&events));
    }

    let cancel = CancellationToken::new();
    let stopper = {
        let cancel = cancel.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Interrupted, stopping monitor");
            cancel.cancel();
        }
    };

    let monitor = client.monitor_wallet(
        method,
        params,
        |events| async move {
            for event in events {
                println!("{}", serde_json::to_string(&event)?);
            }
            Ok::<(), ExchangeError>(())
        },
        config.poll_interval(),
        cancel.clone(),
    );

    let (result, ()) = tokio::join!(monitor, stopper);
    Ok(result?)
}
