//! # Domain Models
//!
//! These structs represent the core entities of LucidFlow.
//! Identifiers are issued by the persistence layer, so anything not yet saved carries `None`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Database identifier of a [`Post`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

/// Database identifier of an [`Image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub i64);

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A blog post. Exclusively owns its image collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Option<PostId>,
    pub title: String,
    pub body: String,
    /// Ordered by `display_index` once reconciled
    pub images: Vec<Image>,
    pub created_at: DateTime<Utc>,
    /// Only moves through [`Post::touch`]
    pub modified_at: DateTime<Utc>,
}

impl Post {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            title: title.into(),
            body: body.into(),
            images: Vec::new(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Bumps the modification timestamp. Image changes are not field changes on the post,
    /// so callers invoke this explicitly when an apply reports a modification.
    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
    }

    /// Attaches an image, pointing its back-reference at this post.
    pub fn add_image(&mut self, mut image: Image) {
        image.post_id = self.id;
        self.images.push(image);
    }

    /// Keeps `images` in presentation order.
    pub fn sort_images(&mut self) {
        self.images.sort_by_key(|image| image.display_index);
    }
}

/// A single image attached to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: Option<ImageId>,
    /// Non-owning link back to the post; used for lookup, never for lifecycle.
    /// A persisted image with no post is an orphan.
    pub post_id: Option<PostId>,
    /// Reference to the backing file under the storage root
    pub url: String,
    pub display_index: u32,
}

/// Client-submitted description of one image in a post's desired image list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRequest {
    /// Present: keep/update that image. Absent: a freshly staged upload.
    pub id: Option<ImageId>,
    /// Permanent reference for kept images, staged upload token or URL for new ones
    pub url: String,
    pub display_index: u32,
}

impl ImageRequest {
    pub fn new(url: impl Into<String>, display_index: u32) -> Self {
        Self {
            id: None,
            url: url.into(),
            display_index,
        }
    }

    pub fn existing(id: ImageId, url: impl Into<String>, display_index: u32) -> Self {
        Self {
            id: Some(id),
            url: url.into(),
            display_index,
        }
    }
}

/// Write payload for a post. Every field is optional so updates can be partial;
/// creation requires all of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub images: Option<Vec<ImageRequest>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_image_sets_back_reference() {
        let mut post = Post::new("Title", "Body");
        post.id = Some(PostId(9));

        post.add_image(Image {
            id: None,
            post_id: None,
            url: "images/a.png".into(),
            display_index: 0,
        });

        assert_eq!(post.images[0].post_id, Some(PostId(9)));
    }

    #[test]
    fn touch_only_moves_modified_at() {
        let mut post = Post::new("Title", "Body");
        let created = post.created_at;
        post.modified_at = created - chrono::Duration::seconds(10);

        post.touch();

        assert_eq!(post.created_at, created);
        assert!(post.modified_at >= created);
    }

    #[test]
    fn image_request_deserializes_without_id() {
        let request: ImageRequest =
            serde_json::from_str(r#"{"id":null,"url":"abc_cat.png","display_index":1}"#).unwrap();
        assert_eq!(request, ImageRequest::new("abc_cat.png", 1));
    }
}
