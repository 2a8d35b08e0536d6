//! # Post Service
//!
//! Write path for posts: validates the payload, runs the image lifecycle and persists.

use crate::images::ImageService;
use lf_core::error::{AppError, Result};
use lf_core::models::{ImageRequest, Post, PostId, PostRequest};
use lf_core::traits::PostRepo;
use std::sync::Arc;
use tracing::info;

const MAX_TITLE_CHARS: usize = 100;
const MAX_URL_CHARS: usize = 2048;

#[derive(Clone)]
pub struct PostService {
    repo: Arc<dyn PostRepo>,
    images: ImageService,
}

impl PostService {
    pub fn new(repo: Arc<dyn PostRepo>, images: ImageService) -> Self {
        Self { repo, images }
    }

    /// Creates a post. Title, body and the image list are all required.
    pub async fn create_post(&self, request: PostRequest) -> Result<Post> {
        let title = validate_title(required(request.title, "title")?)?;
        let body = validate_body(required(request.body, "body")?)?;
        let images = required(request.images, "images")?;
        validate_image_urls(&images)?;

        let mut post = Post::new(title, body);
        self.images.apply(&mut post, images).await?;
        self.repo.save_post(&mut post).await?;

        info!(post_id = ?post.id, images = post.images.len(), "post created");
        Ok(post)
    }

    /// Applies the fields present in `request`; absent fields keep their stored value.
    /// `modified_at` only moves when something actually changed.
    pub async fn update_post(&self, id: PostId, request: PostRequest) -> Result<Post> {
        let title = request.title.map(validate_title).transpose()?;
        let body = request.body.map(validate_body).transpose()?;
        if let Some(images) = &request.images {
            validate_image_urls(images)?;
        }

        let mut post = self.get_post(id).await?;
        let mut modified = false;

        if let Some(title) = title.filter(|title| *title != post.title) {
            post.title = title;
            modified = true;
        }
        if let Some(body) = body.filter(|body| *body != post.body) {
            post.body = body;
            modified = true;
        }
        if let Some(images) = request.images {
            modified |= self.images.apply(&mut post, images).await?;
        }

        if modified {
            post.touch();
            self.repo.save_post(&mut post).await?;
            info!(post_id = %id, "post updated");
        }
        Ok(post)
    }

    pub async fn get_post(&self, id: PostId) -> Result<Post> {
        self.repo
            .get_post(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Post".into(), id.to_string()))
    }

    /// Deletes the image files first, then the post row.
    pub async fn delete_post(&self, id: PostId) -> Result<()> {
        let post = self.get_post(id).await?;

        self.images.remove_all(&post).await?;
        if !self.repo.delete_post(id).await? {
            return Err(AppError::NotFound("Post".into(), id.to_string()));
        }

        info!(post_id = %id, images = post.images.len(), "post deleted");
        Ok(())
    }

    /// Deletes several posts, stopping at the first failure.
    pub async fn delete_posts(&self, ids: &[PostId]) -> Result<()> {
        if ids.is_empty() {
            return Err(AppError::InvalidOperation("no post ids given".into()));
        }
        for &id in ids {
            self.delete_post(id).await?;
        }
        Ok(())
    }

    pub async fn post_count(&self) -> Result<i64> {
        self.repo.count_posts().await
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| AppError::ValidationError(format!("{field} is required")))
}

fn validate_title(title: String) -> Result<String> {
    if title.trim().is_empty() {
        return Err(AppError::ValidationError("title cannot be blank".into()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::ValidationError(format!(
            "title cannot exceed {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title)
}

fn validate_body(body: String) -> Result<String> {
    if body.trim().is_empty() {
        return Err(AppError::ValidationError("body cannot be blank".into()));
    }
    Ok(body)
}

fn validate_image_urls(images: &[ImageRequest]) -> Result<()> {
    for image in images {
        if image.url.trim().is_empty() {
            return Err(AppError::ValidationError("image url cannot be blank".into()));
        }
        if image.url.chars().count() > MAX_URL_CHARS {
            return Err(AppError::ValidationError(format!(
                "image url cannot exceed {MAX_URL_CHARS} characters"
            )));
        }
    }
    Ok(())
}
