use std::process;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod core;
mod migrations;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match core::start_connector().await {
        Ok(()) => {
            info!("connector stopped");
        }
        Err(err) => {
            error!(error = ?err, "connector failed");
            process::exit(1);
        }
    }
}
