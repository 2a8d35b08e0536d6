//! # LucidFlow Binary
//!
//! Assembles the storage and persistence plugins chosen at compile time and runs the
//! janitor until Ctrl-C.

use anyhow::Context;
use lf_config::Settings;
use lf_core::traits::{FileStore, PostRepo};
use lf_services::{Janitor, JanitorSchedule, StorageLayout};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "db-sqlite")]
use lf_db_sqlite::SqlitePostRepo;

#[cfg(feature = "storage-local")]
use lf_storage_local::LocalFileStore;

#[cfg(not(all(feature = "db-sqlite", feature = "storage-local")))]
compile_error!("lucidflow needs one storage plugin and one database plugin enabled");

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if std::env::var_os("LUCIDFLOW_LOG_JSON").is_some() {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    init_tracing();

    // 1. Storage
    let store: Arc<dyn FileStore> = Arc::new(
        LocalFileStore::new(&settings.storage.root)
            .await
            .context("opening storage root")?,
    );

    // 2. Database
    let repo: Arc<dyn PostRepo> = Arc::new(
        SqlitePostRepo::new(&settings.database.url)
            .await
            .context("connecting to the database")?,
    );

    let layout = StorageLayout::new(
        settings.storage.staging_dir.clone(),
        settings.storage.permanent_dir.clone(),
    );
    let janitor = Janitor::new(
        store,
        repo,
        layout,
        settings.storage.temp_expiration(),
        JanitorSchedule {
            temp_sweep_interval: settings.janitor.temp_sweep_interval(),
            orphan_sweep_interval: settings.janitor.orphan_sweep_interval(),
        },
    );

    tracing::info!(root = %settings.storage.root.display(), "LucidFlow janitor starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(async move { janitor.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    tracing::info!("shutdown requested");
    // The receiver is gone only if the janitor already exited.
    let _ = shutdown_tx.send(true);
    worker.await.context("janitor task panicked")?;

    Ok(())
}
