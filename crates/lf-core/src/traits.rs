//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the services and the binary.

use crate::error::Result;
use crate::models::{Image, ImageId, Post, PostId};
use async_trait::async_trait;
use bytes::Bytes;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

/// File storage contract. Every path argument is relative to the store root
/// and is resolved through [`crate::paths::resolve`] before any I/O.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Stores `content` under `destination_dir` and returns the generated filename (never a path).
    async fn upload(&self, content: Bytes, declared_name: &str, destination_dir: &Path) -> Result<String>;

    /// Removes a file. Deleting a file that does not exist succeeds.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Moves a file, creating destination directories and replacing any existing file.
    /// A missing source is an error.
    async fn move_file(&self, source: &Path, destination: &Path) -> Result<()>;

    /// Deletes the regular files directly under `directory` that `filter` selects.
    /// `filter` sees each file's absolute path and metadata.
    /// Returns how many were deleted; a missing directory counts as zero.
    async fn cleanup(
        &self,
        directory: &Path,
        filter: &(dyn for<'p> Fn(&'p Path, &'p Metadata) -> bool + Send + Sync),
    ) -> Result<usize>;

    /// Absolute location of `path` inside the store.
    fn resolve(&self, path: &Path) -> Result<PathBuf>;
}

/// Persistence contract for posts and their images.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Loads a post together with its images in display order.
    async fn get_post(&self, id: PostId) -> Result<Option<Post>>;

    /// Inserts or updates a post and its image graph, assigning ids to anything new.
    /// Image rows that are no longer part of the post are detached and become orphans.
    async fn save_post(&self, post: &mut Post) -> Result<()>;

    /// Returns `false` when no such post existed.
    async fn delete_post(&self, id: PostId) -> Result<bool>;

    async fn count_posts(&self) -> Result<i64>;

    /// Image rows that have no owning post.
    async fn find_orphaned_images(&self) -> Result<Vec<Image>>;

    async fn delete_image(&self, id: ImageId) -> Result<()>;
}
