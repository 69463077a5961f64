//! 시세, 거래량, 호가창 조회.

use anyhow::Result;
use tracing::info;

use money_core::Venue;

use super::{print_json, Context};

pub async fn price(ctx: &Context, venue: Venue, symbol: &str) -> Result<()> {
    let price = ctx.connector(venue)?.fetch_price(symbol).await?;
    info!(%venue, symbol = %price.symbol, price = %price.price, "Fetched price");
    print_json(&price)
}

pub async fn volume(ctx: &Context, venue: Venue, symbol: &str) -> Result<()> {
    let volume = ctx.connector(venue)?.fetch_volume(symbol).await?;
    print_json(&volume)
}

pub async fn book(ctx: &Context, venue: Venue, symbol: &str, depth: u32) -> Result<()> {
    let book = ctx.connector(venue)?.fetch_order_book(symbol, depth).await?;
    info!(
        %venue,
        bids = book.bids.len(),
        asks = book.asks.len(),
        spread = ?book.spread(),
        "Fetched order book"
    );
    print_json(&book)
}
