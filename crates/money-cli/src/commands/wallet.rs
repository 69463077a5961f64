//! 입출금 내역 조회.

use anyhow::Result;
use tracing::info;

use money_core::Venue;

use super::{print_json, Context};

pub async fn wallet(ctx: &Context, venue: Venue) -> Result<()> {
    let events = ctx.connector(venue)?.fetch_wallet_events().await?;
    info!(%venue, count = events.len(), "Fetched wallet events");
    print_json(&events)
}
