//! Prediction consumer process
//!
//! One instance per (symbol, model, version): tails the candle stream,
//! scores feature windows against the inference service, and upserts
//! predictions into the store.

use candlecast::consumer::Consumer;
use candlecast::control::ControlPlane;
use candlecast::db::CandleStore;
use candlecast::inference::HttpInferenceProvider;
use candlecast::logging;
use candlecast::models::{ControlState, EntityId};
use candlecast::stream::CandleSubscriber;
use clap::Parser;
use dotenvy::dotenv;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "consumer", about = "Prediction consumer for one (symbol, model, version)")]
struct Args {
    #[arg(long)]
    crypto: String,
    #[arg(long)]
    model: String,
    #[arg(long)]
    version: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    logging::init_logging("consumer");
    let args = Args::parse();
    info!(
        crypto = %args.crypto,
        model = %args.model,
        version = %args.version,
        "Starting consumer {}/{}/{}",
        args.crypto,
        args.model,
        args.version
    );

    let store = CandleStore::connect().await?;
    let inference = HttpInferenceProvider::new()?;
    let control = ControlPlane::connect().await?;
    let subscriber = CandleSubscriber::subscribe(&args.crypto).await?;

    let mut consumer = Consumer::new(
        &args.crypto,
        &args.model,
        &args.version,
        store,
        Box::new(inference),
        control.clone(),
        subscriber,
    );

    tokio::select! {
        result = consumer.run() => {
            // A dead process behind a RUNNING record would look healthy to
            // the orchestrator forever.
            if let Err(e) = &result {
                let entity = EntityId::consumer(&args.crypto, &args.model, &args.version);
                if let Err(we) = control
                    .write(&entity, ControlState::Error, Some(&e.to_string()))
                    .await
                {
                    error!(entity = %entity, error = %we, "Failed to record fatal consumer error");
                }
            }
            result?;
        }
        _ = signal::ctrl_c() => {
            info!("Consumer interrupted, shutting down");
        }
    }
    Ok(())
}
