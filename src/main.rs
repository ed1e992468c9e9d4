use bitfeed::BitfeedError;
use bitfeed::config::fetch_config;
use bitfeed::rest::RestClient;
use bitfeed::websocket::{CandleParams, FeedClient};
use tracing::{info, warn};

const SYMBOL: &str = "tBTCUSD";

#[tokio::main]
async fn main() -> Result<(), BitfeedError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    let app_config = fetch_config()?;

    let rest = RestClient::new(&app_config.bitfinex.rest_url)?;
    match rest.tickers(&[SYMBOL, "tETHUSD"]).await {
        Ok(prices) => {
            for (symbol, price) in &prices {
                info!(symbol, %price, "Ticker");
            }
        }
        Err(e) => warn!("Failed to fetch tickers: {e}"),
    }

    let client = FeedClient::new(app_config.bitfinex.websocket_url);
    client.on_buy_trade(|trade| {
        info!(symbol = trade.symbol, id = trade.id, amount = %trade.amount, price = %trade.price, "Buy trade");
    });
    client.on_sell_trade(|trade| {
        info!(symbol = trade.symbol, id = trade.id, amount = %trade.amount, price = %trade.price, "Sell trade");
    });
    client.on_candle(|candle| {
        info!(
            symbol = candle.symbol,
            open_time = %candle.open_time,
            open = %candle.open,
            high = %candle.high,
            low = %candle.low,
            close = %candle.close,
            volume = %candle.volume,
            "Candle"
        );
    });

    client.start().await?;
    client.subscribe_trades(SYMBOL).await?;
    client.subscribe_candles(SYMBOL, CandleParams::new(60)).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {e}");
    }

    client.stop().await?;

    Ok(())
}
