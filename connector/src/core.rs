use config::shared::{CollaboratorsConfig, PgConnectionConfig};
use extractor::collaborators::logging::TracingExtractLog;
use extractor::collaborators::memory::{MemoryRecordGrouper, MemoryWorkIndexer};
use extractor::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use extractor::holds::{PgHoldsSink, PgHoldsSource};
use extractor::orchestrator::{CyclePacing, HoldsExport, Orchestrator};
use extractor::protocol::client::HttpTransport;
use extractor::store::state::PostgresWatermarkStore;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::config::load_connector_config;
use crate::migrations::migrate_discovery_schema;

const NUM_POOL_CONNECTIONS: u32 = 2;

pub async fn start_connector() -> anyhow::Result<()> {
    let connector_config = load_connector_config()?;

    let discovery_pool = connect_pool(&connector_config.discovery_db).await?;
    migrate_discovery_schema(&discovery_pool).await?;

    let transport = HttpTransport::new(&connector_config.ils_api)?;
    let watermarks = PostgresWatermarkStore::new(
        discovery_pool.clone(),
        &connector_config.profile.name,
    );

    let holds = match &connector_config.ils_db {
        Some(ils_db) => {
            let ils_pool = connect_pool(ils_db).await?;
            Some(HoldsExport {
                source: PgHoldsSource::new(ils_pool, &connector_config.profile.record_prefix),
                sink: PgHoldsSink::new(discovery_pool.clone()),
            })
        }
        None => {
            warn!("no ils database configured, holds summary will not be rebuilt");
            None
        }
    };

    let shutdown_tx = spawn_shutdown_listener();
    let shutdown_rx = shutdown_tx.subscribe();

    info!(
        profile = connector_config.profile.name,
        endpoint = connector_config.ils_api.marcout_url(),
        "starting connector"
    );

    match &connector_config.collaborators {
        CollaboratorsConfig::Memory => {
            let orchestrator = Orchestrator::new(
                connector_config.profile.clone(),
                CyclePacing::default(),
                transport,
                watermarks,
                MemoryRecordGrouper::new(),
                MemoryWorkIndexer::new(),
                holds,
                TracingExtractLog::new,
            );
            orchestrator.run(shutdown_rx).await?;
        }
    }

    Ok(())
}

async fn connect_pool(config: &PgConnectionConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(NUM_POOL_CONNECTIONS)
        .connect_with(config.connect_options())
        .await
}

/// Forwards ctrl-c to the shutdown channel so the cycle in progress can
/// finish before the loop exits.
fn spawn_shutdown_listener() -> ShutdownTx {
    let (shutdown_tx, _shutdown_rx) = create_shutdown_channel();
    let tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = tx.send(());
        }
    });
    shutdown_tx
}
