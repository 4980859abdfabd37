//! Stockcast CLI - one-shot forecast runner
//!
//! Thin transport shell around the forecasting pipeline: parses a request
//! from the command line, runs it and prints the outcome as JSON.
//!
//! # Usage
//! ```sh
//! stockcast AAPL --start 2023-01-02 --end 2024-01-02 --future-days 30
//! ```
//!
//! # Environment Variables
//! - `MODE` - Market data provider: `mock` or `alpaca` (default: mock)
//! - `DATABASE_URL` - SQLite model store (default: sqlite://data/stockcast.db)
//! - `LOOKBACK`, `TRAIN_EPOCHS`, `LEARNING_RATE`, `RESERVOIR_SIZE`,
//!   `TRAIN_SPLIT` - model knobs

use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use std::sync::Arc;
use stockcast::application::pipeline::ForecastPipeline;
use stockcast::config::{Config, Mode};
use stockcast::domain::ports::MarketDataSource;
use stockcast::domain::types::ForecastRequest;
use stockcast::infrastructure::market_data::{AlpacaMarketData, MockMarketData};
use stockcast::infrastructure::persistence::{Database, SqliteModelCache};
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Instrument symbol, e.g. AAPL
    symbol: String,

    /// First day of the training window (YYYY-MM-DD)
    #[arg(long)]
    start: NaiveDate,

    /// Last day of the training window (YYYY-MM-DD)
    #[arg(long)]
    end: NaiveDate,

    /// Number of trading days to forecast
    #[arg(long, default_value_t = 30)]
    future_days: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let args = Args::parse();

    info!("Stockcast {} starting...", env!("CARGO_PKG_VERSION"));
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: Mode={:?}, Lookback={}, Epochs={}",
        config.mode, config.lookback, config.epochs
    );

    let database = Database::connect(&config.database_url).await?;
    let cache = Arc::new(SqliteModelCache::new(database.pool.clone()));

    let market_data: Arc<dyn MarketDataSource> = match config.mode {
        Mode::Alpaca => Arc::new(AlpacaMarketData::new(
            config.alpaca_api_key.clone(),
            config.alpaca_secret_key.clone(),
            config.alpaca_data_url.clone(),
        )),
        Mode::Mock => Arc::new(MockMarketData::linear_ramp(args.start, 250, 100.0, 0.5)),
    };

    let pipeline = ForecastPipeline::new(market_data, cache, config.pipeline_config());

    let request = ForecastRequest {
        symbol: args.symbol,
        start_date: args.start,
        end_date: args.end,
        future_days: args.future_days,
    };

    let result = pipeline.forecast(&request).await;
    database.close().await;

    let outcome = result?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(())
}
