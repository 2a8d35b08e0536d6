//! # Image Lifecycle Coordinator
//!
//! Applies a reconciled image plan to a post and keeps the backing files in step:
//! removed images lose their files, new images are promoted out of staging.

use bytes::Bytes;
use lf_core::error::{AppError, Result};
use lf_core::filenames::{extract_filename, rewrite_reference};
use lf_core::models::{Image, ImageId, ImageRequest, Post};
use lf_core::reconcile::reconcile;
use lf_core::traits::FileStore;
use mime::Mime;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where staged and permanent image files live, relative to the store root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub staging_dir: PathBuf,
    pub permanent_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(staging_dir: impl Into<PathBuf>, permanent_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            permanent_dir: permanent_dir.into(),
        }
    }

    pub fn staged_path(&self, filename: &str) -> PathBuf {
        self.staging_dir.join(filename)
    }

    pub fn permanent_path(&self, filename: &str) -> PathBuf {
        self.permanent_dir.join(filename)
    }
}

#[derive(Clone)]
pub struct ImageService {
    store: Arc<dyn FileStore>,
    layout: StorageLayout,
}

impl ImageService {
    pub fn new(store: Arc<dyn FileStore>, layout: StorageLayout) -> Self {
        Self { store, layout }
    }

    /// Stages an upload and returns its token (the generated filename under staging).
    ///
    /// Only the top-level type of `content_type` is checked; the bytes are not sniffed.
    pub async fn upload_temp(&self, content: Bytes, declared_name: &str, content_type: &str) -> Result<String> {
        let mime: Mime = content_type
            .parse()
            .map_err(|_| AppError::UnsupportedMediaType(content_type.to_string()))?;
        if mime.type_() != mime::IMAGE {
            return Err(AppError::UnsupportedMediaType(mime.to_string()));
        }

        let token = self
            .store
            .upload(content, declared_name, &self.layout.staging_dir)
            .await?;

        info!(token = %token, content_type = %mime, "staged image upload");
        Ok(token)
    }

    /// Brings `post.images` in line with `requests` and returns whether anything changed.
    ///
    /// Runs remove, then update, then add. A rejected request (bad display indices,
    /// repeated ids) fails before the post or any file is touched. Adds whose staged file
    /// is gone, or whose reference names no file, are skipped with a warning and the
    /// remaining images are renumbered.
    ///
    /// An update whose reference names a different file promotes that file out of staging
    /// like an add; if it is not staged the image keeps its current reference.
    pub async fn apply(&self, post: &mut Post, mut requests: Vec<ImageRequest>) -> Result<bool> {
        let plan = reconcile(&post.images, &mut requests)?;
        let before: HashMap<ImageId, (String, u32)> = post
            .images
            .iter()
            .filter_map(|image| image.id.map(|id| (id, (image.url.clone(), image.display_index))))
            .collect();
        let mut membership_changed = false;

        // Descending, so earlier positions stay valid while removing.
        for &position in plan.to_remove.iter().rev() {
            let image = post.images.remove(position);
            self.delete_backing_file(&image.url).await?;
            debug!(image_id = ?image.id, url = %image.url, "removed image");
            membership_changed = true;
        }

        for update in plan.to_update {
            let url = if update.url_changed {
                self.replace_reference(&update.previous_url, &update.url).await?
            } else {
                update.url
            };
            if let Some(image) = post.images.iter_mut().find(|image| image.id == Some(update.id)) {
                image.url = url;
                image.display_index = update.display_index;
            }
        }

        for request in plan.to_add {
            match self.promote(&request.url).await {
                Ok(url) => {
                    post.add_image(Image {
                        id: None,
                        post_id: None,
                        url,
                        display_index: request.display_index,
                    });
                    membership_changed = true;
                }
                Err(e) if is_unavailable(&e) => {
                    warn!(
                        url = %request.url,
                        display_index = request.display_index,
                        error = %e,
                        "skipping image whose staged file is unavailable"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        post.sort_images();
        // A skipped add leaves a hole; close it so stored indices stay 0..n.
        for (index, image) in (0u32..).zip(post.images.iter_mut()) {
            image.display_index = index;
        }

        // Compared after renumbering, which can undo a requested index change.
        let updated = post.images.iter().any(|image| {
            image.id.is_some_and(|id| {
                before
                    .get(&id)
                    .is_some_and(|(url, index)| *url != image.url || *index != image.display_index)
            })
        });
        Ok(membership_changed || updated)
    }

    /// Works out the reference an updated image ends up with.
    ///
    /// The same file under another spelling is only a new reference. A different file has to
    /// come out of staging; the old file is deleted once the new one is in place.
    async fn replace_reference(&self, previous: &str, requested: &str) -> Result<String> {
        let same_file = match (extract_filename(previous), extract_filename(requested)) {
            (Ok(old), Ok(new)) => old == new,
            _ => false,
        };
        if same_file {
            return Ok(requested.to_string());
        }

        match self.promote(requested).await {
            Ok(url) => {
                self.delete_backing_file(previous).await?;
                Ok(url)
            }
            Err(e) if is_unavailable(&e) => {
                warn!(
                    url = %requested,
                    kept = %previous,
                    error = %e,
                    "replacement image is not staged, keeping the current file"
                );
                Ok(previous.to_string())
            }
            Err(e) => Err(e),
        }
    }

    /// Deletes every backing file of `post`. The post itself is left as is.
    pub async fn remove_all(&self, post: &Post) -> Result<()> {
        for image in &post.images {
            self.delete_backing_file(&image.url).await?;
        }
        Ok(())
    }

    /// Moves a staged file into the permanent directory and returns the rewritten reference.
    async fn promote(&self, reference: &str) -> Result<String> {
        let filename = extract_filename(reference)?;

        self.store
            .move_file(
                &self.layout.staged_path(&filename),
                &self.layout.permanent_path(&filename),
            )
            .await?;

        Ok(rewrite_reference(
            reference,
            &self.layout.staging_dir,
            &self.layout.permanent_dir,
            &filename,
        ))
    }

    async fn delete_backing_file(&self, reference: &str) -> Result<()> {
        match extract_filename(reference) {
            Ok(filename) => self.store.delete(&self.layout.permanent_path(&filename)).await,
            Err(_) => {
                warn!(url = %reference, "image reference names no file, nothing to delete");
                Ok(())
            }
        }
    }
}

/// A staged file that is gone, or a reference that names no file at all.
fn is_unavailable(error: &AppError) -> bool {
    error.is_missing_file() || matches!(error, AppError::InvalidOperation(_))
}
