//! # lf-storage-local
//! lucidflow/crates/lf-plugins/lf-storage-local/src/lib.rs
//! Local filesystem implementation of `FileStore`.
//! Every operation is confined to one root directory via `lf_core::paths::resolve`.

use async_trait::async_trait;
use bytes::Bytes;
use lf_core::error::{AppError, Result};
use lf_core::filenames::sanitize_filename;
use lf_core::paths;
use lf_core::traits::FileStore;
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct LocalFileStore {
    /// Absolute, normalized root for all uploads (e.g., "/srv/lucidflow/uploads")
    root_path: PathBuf,
}

impl LocalFileStore {
    /// Opens the store at `root`, creating the directory if needed.
    /// Relative roots are taken from the current working directory.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| AppError::storage("reading the working directory", e))?
                .join(root)
        };
        let root_path = paths::normalize(&absolute);

        fs::create_dir_all(&root_path).await.map_err(|e| {
            AppError::storage(format!("creating storage root {}", root_path.display()), e)
        })?;

        Ok(Self { root_path })
    }

    pub fn root(&self) -> &Path {
        &self.root_path
    }

    async fn ensure_parent(&self, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::storage(format!("creating directory {}", parent.display()), e)
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    /// Saves an upload as `<random token>_<sanitized name>` and returns that name.
    async fn upload(&self, content: Bytes, declared_name: &str, destination_dir: &Path) -> Result<String> {
        if content.is_empty() {
            return Err(AppError::InvalidOperation("cannot upload an empty file".into()));
        }

        let unique_filename = format!("{}_{}", Uuid::new_v4().simple(), sanitize_filename(declared_name)?);
        let target = self.resolve(&destination_dir.join(&unique_filename))?;

        self.ensure_parent(&target).await?;
        fs::write(&target, &content)
            .await
            .map_err(|e| AppError::storage(format!("writing {}", target.display()), e))?;

        debug!(filename = %unique_filename, bytes = content.len(), "stored upload");
        Ok(unique_filename)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let target = self.resolve(path)?;

        match fs::remove_file(&target).await {
            Ok(()) => {
                debug!(path = %target.display(), "deleted file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %target.display(), "file already gone");
                Ok(())
            }
            Err(e) => Err(AppError::storage(format!("deleting {}", target.display()), e)),
        }
    }

    async fn move_file(&self, source: &Path, destination: &Path) -> Result<()> {
        let source = self.resolve(source)?;
        let destination = self.resolve(destination)?;

        self.ensure_parent(&destination).await?;
        fs::rename(&source, &destination).await.map_err(|e| {
            AppError::storage(
                format!("moving {} to {}", source.display(), destination.display()),
                e,
            )
        })?;

        debug!(from = %source.display(), to = %destination.display(), "moved file");
        Ok(())
    }

    async fn cleanup(
        &self,
        directory: &Path,
        filter: &(dyn for<'p> Fn(&'p Path, &'p Metadata) -> bool + Send + Sync),
    ) -> Result<usize> {
        let directory = self.resolve(directory)?;

        let mut entries = match fs::read_dir(&directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(AppError::storage(
                    format!("listing {}", directory.display()),
                    e,
                ))
            }
        };

        let mut deleted = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::storage(format!("listing {}", directory.display()), e))?
        {
            let path = entry.path();

            // DirEntry::metadata does not follow symlinks, so links are never "regular files" here.
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot stat entry, skipped");
                    continue;
                }
            };

            if !metadata.is_file() || !filter(&path, &metadata) {
                continue;
            }

            self.delete(&path).await?;
            deleted += 1;
        }

        Ok(deleted)
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        paths::resolve(&self.root_path, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;
    use tempfile::TempDir;

    async fn store() -> (TempDir, LocalFileStore) {
        let temp = TempDir::new().unwrap();
        let store = LocalFileStore::new(temp.path().join("uploads")).await.unwrap();
        (temp, store)
    }

    #[tokio::test]
    async fn new_creates_root() {
        let (_temp, store) = store().await;
        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn upload_returns_bare_unique_filename() {
        let (_temp, store) = store().await;

        let name = store
            .upload(Bytes::from_static(b"png bytes"), "my cat.png", Path::new("images/temp"))
            .await
            .unwrap();

        assert!(name.ends_with("_my_cat.png"));
        assert!(!name.contains('/'));
        let stored = store.root().join("images/temp").join(&name);
        assert_eq!(std_fs::read(stored).unwrap(), b"png bytes");
    }

    #[tokio::test]
    async fn upload_twice_gives_distinct_names() {
        let (_temp, store) = store().await;
        let dir = Path::new("images/temp");

        let first = store.upload(Bytes::from_static(b"a"), "a.png", dir).await.unwrap();
        let second = store.upload(Bytes::from_static(b"a"), "a.png", dir).await.unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn upload_rejects_empty_content_and_blank_names() {
        let (_temp, store) = store().await;
        let dir = Path::new("images/temp");

        let err = store.upload(Bytes::new(), "a.png", dir).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidOperation(_)));

        let err = store.upload(Bytes::from_static(b"x"), "  ", dir).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn upload_outside_root_is_forbidden() {
        let (temp, store) = store().await;

        let err = store
            .upload(Bytes::from_static(b"x"), "a.png", Path::new("../escape"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ForbiddenPath(_)));
        assert!(!temp.path().join("escape").exists());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_temp, store) = store().await;
        let name = store
            .upload(Bytes::from_static(b"x"), "a.png", Path::new("images"))
            .await
            .unwrap();
        let path = Path::new("images").join(&name);

        store.delete(&path).await.unwrap();
        store.delete(&path).await.unwrap();

        assert!(!store.root().join(&path).exists());
    }

    #[tokio::test]
    async fn delete_outside_root_is_forbidden() {
        let (temp, store) = store().await;
        let outside = temp.path().join("keep.txt");
        std_fs::write(&outside, b"keep").unwrap();

        let err = store.delete(Path::new("../keep.txt")).await.unwrap_err();

        assert!(matches!(err, AppError::ForbiddenPath(_)));
        assert!(outside.exists());
    }

    #[tokio::test]
    async fn move_creates_parents_and_overwrites() {
        let (_temp, store) = store().await;
        std_fs::create_dir_all(store.root().join("images/temp")).unwrap();
        std_fs::write(store.root().join("images/temp/a.png"), b"new").unwrap();
        std_fs::create_dir_all(store.root().join("archive/2024")).unwrap();
        std_fs::write(store.root().join("archive/2024/a.png"), b"old").unwrap();

        store
            .move_file(Path::new("images/temp/a.png"), Path::new("archive/2024/a.png"))
            .await
            .unwrap();

        assert!(!store.root().join("images/temp/a.png").exists());
        assert_eq!(std_fs::read(store.root().join("archive/2024/a.png")).unwrap(), b"new");

        std_fs::write(store.root().join("images/temp/b.png"), b"b").unwrap();
        store
            .move_file(Path::new("images/temp/b.png"), Path::new("fresh/dir/b.png"))
            .await
            .unwrap();
        assert!(store.root().join("fresh/dir/b.png").is_file());
    }

    #[tokio::test]
    async fn move_of_missing_source_fails() {
        let (_temp, store) = store().await;

        let err = store
            .move_file(Path::new("images/temp/gone.png"), Path::new("images/gone.png"))
            .await
            .unwrap_err();

        assert!(err.is_missing_file());
    }

    #[tokio::test]
    async fn cleanup_deletes_only_selected_regular_files() {
        let (_temp, store) = store().await;
        let dir = store.root().join("images/temp");
        std_fs::create_dir_all(dir.join("nested")).unwrap();
        std_fs::write(dir.join("old.png"), b"x").unwrap();
        std_fs::write(dir.join("keep.png"), b"x").unwrap();
        std_fs::write(dir.join("nested/old.png"), b"x").unwrap();

        let deleted = store
            .cleanup(Path::new("images/temp"), &|path: &Path, _: &Metadata| {
                path.file_name().is_some_and(|name| name == "old.png")
            })
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert!(!dir.join("old.png").exists());
        assert!(dir.join("keep.png").exists());
        assert!(dir.join("nested/old.png").exists());
    }

    fn larger_than_one_byte(_: &Path, metadata: &Metadata) -> bool {
        metadata.len() > 1
    }

    #[tokio::test]
    async fn cleanup_filter_sees_each_file_metadata() {
        let (_temp, store) = store().await;
        let dir = store.root().join("images/temp");
        std_fs::create_dir_all(&dir).unwrap();
        std_fs::write(dir.join("big.png"), b"xyz").unwrap();
        std_fs::write(dir.join("tiny.png"), b"x").unwrap();

        let deleted = store
            .cleanup(Path::new("images/temp"), &larger_than_one_byte)
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert!(!dir.join("big.png").exists());
        assert!(dir.join("tiny.png").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cleanup_skips_symlinks() {
        let (temp, store) = store().await;
        let target = temp.path().join("outside.png");
        std_fs::write(&target, b"x").unwrap();
        let dir = store.root().join("images/temp");
        std_fs::create_dir_all(&dir).unwrap();
        std::os::unix::fs::symlink(&target, dir.join("link.png")).unwrap();

        let deleted = store
            .cleanup(Path::new("images/temp"), &|_: &Path, _: &Metadata| true)
            .await
            .unwrap();

        assert_eq!(deleted, 0);
        assert!(target.exists());
    }

    #[tokio::test]
    async fn cleanup_of_missing_directory_is_zero() {
        let (_temp, store) = store().await;

        let deleted = store
            .cleanup(Path::new("never/created"), &|_: &Path, _: &Metadata| true)
            .await
            .unwrap();

        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn cleanup_outside_root_is_forbidden() {
        let (_temp, store) = store().await;

        let err = store.cleanup(Path::new(".."), &|_: &Path, _: &Metadata| true).await.unwrap_err();

        assert!(matches!(err, AppError::ForbiddenPath(_)));
    }
}
