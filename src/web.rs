#![cfg(not(tarpaulin_include))]

use jobtrend::app;
use jobtrend::config::Config;
use std::env;

/// Main entry point for the report web application
///
/// Positional arguments: `[ADDR] [STORE_PATH]`. Logging is controlled with
/// `RUST_LOG` and defaults to `info`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_args(env::args().skip(1))?;
    app::run(config).await
}
