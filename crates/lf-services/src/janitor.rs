//! # Janitor
//!
//! Background reclamation, independent of request handling:
//! expired staging uploads, and image rows (plus files) that lost their post.

use crate::images::StorageLayout;
use lf_core::error::Result;
use lf_core::filenames::extract_filename;
use lf_core::models::{Image, ImageId};
use lf_core::traits::{FileStore, PostRepo};
use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// How often each sweep runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JanitorSchedule {
    pub temp_sweep_interval: Duration,
    pub orphan_sweep_interval: Duration,
}

#[derive(Clone)]
pub struct Janitor {
    store: Arc<dyn FileStore>,
    repo: Arc<dyn PostRepo>,
    layout: StorageLayout,
    expiration: Duration,
    schedule: JanitorSchedule,
}

impl Janitor {
    pub fn new(
        store: Arc<dyn FileStore>,
        repo: Arc<dyn PostRepo>,
        layout: StorageLayout,
        expiration: Duration,
        schedule: JanitorSchedule,
    ) -> Self {
        Self {
            store,
            repo,
            layout,
            expiration,
            schedule,
        }
    }

    /// Deletes staged uploads older than the expiration window.
    /// Files whose age cannot be read are kept.
    pub async fn cleanup_expired_temp(&self) -> Result<usize> {
        let expiration = self.expiration;
        let now = SystemTime::now();

        let expired = move |path: &Path, metadata: &Metadata| {
            is_expired(path, metadata.modified(), now, expiration)
        };

        let deleted = self.store.cleanup(&self.layout.staging_dir, &expired).await?;

        info!(count = deleted, "expired staging files removed");
        Ok(deleted)
    }

    /// Deletes orphaned image rows and their permanent files.
    /// A failure on one image is logged and leaves it for the next sweep.
    pub async fn cleanup_orphans(&self) -> Result<usize> {
        let orphans = self.repo.find_orphaned_images().await?;
        let mut reclaimed = 0;

        for image in orphans {
            let Some(id) = image.id else {
                continue;
            };
            match self.reclaim(&image, id).await {
                Ok(()) => reclaimed += 1,
                Err(e) => warn!(image_id = %id, url = %image.url, error = %e, "failed to reclaim orphaned image"),
            }
        }

        if reclaimed > 0 {
            info!(count = reclaimed, "orphaned images removed");
        }
        Ok(reclaimed)
    }

    async fn reclaim(&self, image: &Image, id: ImageId) -> Result<()> {
        match extract_filename(&image.url) {
            Ok(filename) => self.store.delete(&self.layout.permanent_path(&filename)).await?,
            Err(_) => debug!(image_id = %id, url = %image.url, "orphan names no file"),
        }
        self.repo.delete_image(id).await
    }

    /// Runs both sweeps on their intervals until `shutdown` turns `true` or its sender is dropped.
    /// Each interval fires once immediately on start.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut temp_tick = interval(self.schedule.temp_sweep_interval);
        let mut orphan_tick = interval(self.schedule.orphan_sweep_interval);
        temp_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        orphan_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            temp_sweep = ?self.schedule.temp_sweep_interval,
            orphan_sweep = ?self.schedule.orphan_sweep_interval,
            "janitor started"
        );

        loop {
            tokio::select! {
                _ = temp_tick.tick() => {
                    if let Err(e) = self.cleanup_expired_temp().await {
                        error!(error = %e, "staging sweep failed");
                    }
                }
                _ = orphan_tick.tick() => {
                    if let Err(e) = self.cleanup_orphans().await {
                        error!(error = %e, "orphan sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("janitor stopped");
    }
}

/// Whether a file last modified at `modified` is past `expiration` at `now`.
/// An unreadable time keeps the file; a time in the future counts as fresh.
fn is_expired(path: &Path, modified: io::Result<SystemTime>, now: SystemTime, expiration: Duration) -> bool {
    match modified {
        Ok(modified) => now
            .duration_since(modified)
            .is_ok_and(|age| age > expiration),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read file age, keeping it");
            false
        }
    }
}
