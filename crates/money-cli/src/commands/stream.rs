//! 실시간 스트림 출력. Ctrl-C로 종료합니다.

use anyhow::Result;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

use money_core::Venue;

use super::Context;

pub async fn stream(
    ctx: &Context,
    venue: Venue,
    topic: &str,
    heartbeat: Option<Duration>,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<Value>(1024);
    let handle = ctx
        .connector(venue)?
        .subscribe(topic, Box::new(tx), heartbeat)?;
    info!(%venue, topic, "Streaming, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, cancelling subscription");
                break;
            }
            message = rx.recv() => match message {
                Some(message) => println!("{}", message),
                None => break,
            },
        }
    }

    drop(rx);
    handle.cancel().await;
    Ok(())
}
