//! # lf-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `lf-core` domain models.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lf_core::error::{AppError, Result};
use lf_core::models::{Image, ImageId, Post, PostId};
use lf_core::traits::PostRepo;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        body TEXT NOT NULL,
        created_at TEXT NOT NULL,
        modified_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS images (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id INTEGER REFERENCES posts(id),
        url TEXT NOT NULL,
        display_index INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS images_post_id ON images(post_id)",
];

pub struct SqlitePostRepo {
    pool: SqlitePool,
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::Internal(format!("database: {e}"))
}

fn image_from_row(row: &SqliteRow) -> Result<Image> {
    let display_index: i64 = row.try_get("display_index").map_err(db_err)?;
    Ok(Image {
        id: Some(ImageId(row.try_get("id").map_err(db_err)?)),
        post_id: row.try_get::<Option<i64>, _>("post_id").map_err(db_err)?.map(PostId),
        url: row.try_get("url").map_err(db_err)?,
        display_index: u32::try_from(display_index)
            .map_err(|_| AppError::Internal(format!("corrupt display index {display_index}")))?,
    })
}

impl SqlitePostRepo {
    /// Connects and creates the schema if it is missing.
    ///
    /// In-memory databases are pinned to a single connection, otherwise every pooled
    /// connection would see its own empty database.
    pub async fn new(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db_err)?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await.map_err(db_err)?;
        }

        tracing::info!(url, "sqlite post repository ready");
        Ok(Self { pool })
    }

    async fn load_images(&self, post_id: PostId) -> Result<Vec<Image>> {
        sqlx::query(
            "SELECT id, post_id, url, display_index FROM images WHERE post_id = ? ORDER BY display_index ASC",
        )
        .bind(post_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .iter()
        .map(image_from_row)
        .collect()
    }

    /// Writes the image graph of an already-saved post.
    async fn save_images(tx: &mut Transaction<'_, Sqlite>, post_id: PostId, images: &mut [Image]) -> Result<()> {
        let kept: HashSet<i64> = images.iter().filter_map(|image| image.id.map(|id| id.0)).collect();

        let attached: Vec<i64> = sqlx::query_scalar("SELECT id FROM images WHERE post_id = ?")
            .bind(post_id.0)
            .fetch_all(&mut **tx)
            .await
            .map_err(db_err)?;

        // Detached rows become orphans; the janitor reclaims their files and rows.
        for id in attached.into_iter().filter(|id| !kept.contains(id)) {
            sqlx::query("UPDATE images SET post_id = NULL WHERE id = ?")
                .bind(id)
                .execute(&mut **tx)
                .await
                .map_err(db_err)?;
        }

        for image in images.iter_mut() {
            image.post_id = Some(post_id);
            match image.id {
                Some(id) => {
                    sqlx::query("UPDATE images SET post_id = ?, url = ?, display_index = ? WHERE id = ?")
                        .bind(post_id.0)
                        .bind(&image.url)
                        .bind(i64::from(image.display_index))
                        .bind(id.0)
                        .execute(&mut **tx)
                        .await
                        .map_err(db_err)?;
                }
                None => {
                    let result = sqlx::query("INSERT INTO images (post_id, url, display_index) VALUES (?, ?, ?)")
                        .bind(post_id.0)
                        .bind(&image.url)
                        .bind(i64::from(image.display_index))
                        .execute(&mut **tx)
                        .await
                        .map_err(db_err)?;
                    image.id = Some(ImageId(result.last_insert_rowid()));
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl PostRepo for SqlitePostRepo {
    async fn get_post(&self, id: PostId) -> Result<Option<Post>> {
        let row = sqlx::query("SELECT id, title, body, created_at, modified_at FROM posts WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Post {
            id: Some(PostId(row.try_get("id").map_err(db_err)?)),
            title: row.try_get("title").map_err(db_err)?,
            body: row.try_get("body").map_err(db_err)?,
            images: self.load_images(id).await?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(db_err)?,
            modified_at: row.try_get::<DateTime<Utc>, _>("modified_at").map_err(db_err)?,
        }))
    }

    /// Saves the post and its images atomically.
    ///
    /// # Developer Note
    /// The transaction covers the database only. Files were already moved or deleted by the
    /// time this runs; a failure here leaves orphans for the janitor, not a rollback.
    async fn save_post(&self, post: &mut Post) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let post_id = match post.id {
            Some(id) => {
                let updated = sqlx::query("UPDATE posts SET title = ?, body = ?, modified_at = ? WHERE id = ?")
                    .bind(&post.title)
                    .bind(&post.body)
                    .bind(post.modified_at)
                    .bind(id.0)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                if updated.rows_affected() == 0 {
                    return Err(AppError::NotFound("Post".into(), id.to_string()));
                }
                id
            }
            None => {
                let inserted = sqlx::query(
                    "INSERT INTO posts (title, body, created_at, modified_at) VALUES (?, ?, ?, ?)",
                )
                .bind(&post.title)
                .bind(&post.body)
                .bind(post.created_at)
                .bind(post.modified_at)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
                PostId(inserted.last_insert_rowid())
            }
        };

        Self::save_images(&mut tx, post_id, &mut post.images).await?;
        tx.commit().await.map_err(db_err)?;

        post.id = Some(post_id);
        Ok(())
    }

    async fn delete_post(&self, id: PostId) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("DELETE FROM images WHERE post_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        let deleted = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn count_posts(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn find_orphaned_images(&self) -> Result<Vec<Image>> {
        sqlx::query("SELECT id, post_id, url, display_index FROM images WHERE post_id IS NULL")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(image_from_row)
            .collect()
    }

    async fn delete_image(&self, id: ImageId) -> Result<()> {
        sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> SqlitePostRepo {
        SqlitePostRepo::new("sqlite::memory:").await.unwrap()
    }

    fn new_image(url: &str, display_index: u32) -> Image {
        Image {
            id: None,
            post_id: None,
            url: url.into(),
            display_index,
        }
    }

    #[tokio::test]
    async fn test_save_and_get_post() {
        let repo = repo().await;
        let mut post = Post::new("Hello", "World");
        post.images = vec![new_image("images/b.png", 1), new_image("images/a.png", 0)];

        repo.save_post(&mut post).await.expect("Failed to save post");

        let id = post.id.expect("id assigned");
        assert!(post.images.iter().all(|image| image.id.is_some()));
        assert!(post.images.iter().all(|image| image.post_id == Some(id)));

        let loaded = repo.get_post(id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Hello");
        assert_eq!(loaded.images.len(), 2);
        assert_eq!(loaded.images[0].url, "images/a.png");
        assert_eq!(loaded.images[0].display_index, 0);
    }

    #[tokio::test]
    async fn test_dropped_images_become_orphans() {
        let repo = repo().await;
        let mut post = Post::new("Hello", "World");
        post.images = vec![new_image("images/a.png", 0), new_image("images/b.png", 1)];
        repo.save_post(&mut post).await.unwrap();

        let dropped = post.images.pop().unwrap();
        repo.save_post(&mut post).await.unwrap();

        let orphans = repo.find_orphaned_images().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].id, dropped.id);
        assert_eq!(orphans[0].post_id, None);

        repo.delete_image(dropped.id.unwrap()).await.unwrap();
        assert!(repo.find_orphaned_images().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_post_is_not_found() {
        let repo = repo().await;
        let mut post = Post::new("Ghost", "Body");
        post.id = Some(PostId(404));

        let err = repo.save_post(&mut post).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(..)));
    }

    #[tokio::test]
    async fn test_delete_and_count() {
        let repo = repo().await;
        let mut post = Post::new("Hello", "World");
        post.images = vec![new_image("images/a.png", 0)];
        repo.save_post(&mut post).await.unwrap();
        assert_eq!(repo.count_posts().await.unwrap(), 1);

        assert!(repo.delete_post(post.id.unwrap()).await.unwrap());
        assert!(!repo.delete_post(post.id.unwrap()).await.unwrap());
        assert_eq!(repo.count_posts().await.unwrap(), 0);
        assert!(repo.get_post(post.id.unwrap()).await.unwrap().is_none());
        assert!(repo.find_orphaned_images().await.unwrap().is_empty());
    }
}
