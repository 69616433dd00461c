//! Offline-first walkthrough: write while offline, watch the queue drain
//! once connectivity returns.
//!
//! ```sh
//! cargo run -p curio-sync --example offline_demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use curio_core::{ListFilter, RecordDraft};
use curio_db::{Database, DbConfig};
use curio_sync::{CatalogEngine, EngineConfig, MemoryRemote, SharedProbe};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let db = Database::new(DbConfig::in_memory()).await?;
    let remote = MemoryRemote::new();
    let probe = SharedProbe::new(false);

    let mut config = EngineConfig::default();
    config.sync.connectivity_poll_secs = 1;

    let engine = CatalogEngine::start(
        config,
        db,
        Arc::new(remote.clone()),
        Arc::new(probe.clone()),
    )?;

    engine.subscribe_status(|status| {
        println!(
            "[status] {:?} pending={} failed={}",
            status.state, status.pending_count, status.failed_count
        );
    });

    println!("-- creating records while offline --");
    let vase = engine
        .create_record(RecordDraft::named("Ming dynasty vase"))
        .await?;
    engine
        .create_record(RecordDraft::named("1921 Morgan dollar"))
        .await?;
    println!("created {} (placeholder id, queued for sync)", vase.record.id);
    println!("remote record count: {}", remote.record_count());

    println!("-- connectivity restored --");
    probe.set_online(true);
    tokio::time::sleep(Duration::from_secs(2)).await;
    engine.sync_now();
    tokio::time::sleep(Duration::from_secs(1)).await;

    println!("remote record count: {}", remote.record_count());
    for cached in engine.list_records(&ListFilter::default()).await? {
        println!(
            "local: {} '{}' v{} synced={}",
            cached.record.id, cached.record.name, cached.record.version, cached.synced
        );
    }

    engine.shutdown().await;
    Ok(())
}
