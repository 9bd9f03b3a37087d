//! Candle producer process
//!
//! Polls the upstream market source, persists candles, publishes them to
//! the candle stream, and answers the control plane as `ALL/producer/main`.

use candlecast::config;
use candlecast::control::ControlPlane;
use candlecast::db::CandleStore;
use candlecast::logging;
use candlecast::market::BinanceSource;
use candlecast::producer::Producer;
use candlecast::stream::CandlePublisher;
use clap::Parser;
use dotenvy::dotenv;
use tokio::signal;
use tracing::info;

#[derive(Parser)]
#[command(name = "producer", about = "Candle producer for the prediction pipeline")]
struct Args {
    /// Symbol to serve, or ALL for every configured symbol.
    #[arg(long, default_value = "ALL")]
    symbol: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    logging::init_logging("producer");
    let args = Args::parse();

    let symbols = if args.symbol.eq_ignore_ascii_case("ALL") {
        config::get_symbols()
    } else {
        vec![args.symbol.to_uppercase()]
    };
    info!(symbols = ?symbols, "Starting producer for {}", symbols.join(", "));

    let store = CandleStore::connect().await?;
    let publisher = CandlePublisher::connect().await?;
    let control = ControlPlane::connect().await?;
    let mut producer = Producer::new(
        symbols,
        store,
        Box::new(BinanceSource::new()),
        publisher,
        control,
    )?;

    tokio::select! {
        result = producer.run() => result?,
        _ = signal::ctrl_c() => {
            info!("Producer interrupted, shutting down");
        }
    }
    Ok(())
}
