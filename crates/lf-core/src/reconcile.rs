//! # Image Reconciler
//!
//! Diffs a post's current images against a client-submitted list and produces the
//! remove/update/add plan. Pure: the only side effect is sorting the request list.

use crate::error::{AppError, Result};
use crate::models::{Image, ImageId, ImageRequest};
use std::collections::{HashMap, HashSet};

/// An existing image that the request keeps, possibly with a new reference or position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpdate {
    pub id: ImageId,
    pub url: String,
    pub display_index: u32,
    pub previous_url: String,
    pub url_changed: bool,
    /// Either the reference or the display index differs from what is stored
    pub modified: bool,
}

/// The outcome of [`reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Positions in the current image slice, ascending
    pub to_remove: Vec<usize>,
    pub to_update: Vec<ImageUpdate>,
    /// New images in display order
    pub to_add: Vec<ImageRequest>,
}

impl ReconcilePlan {
    pub fn is_modified(&self) -> bool {
        !self.to_remove.is_empty()
            || !self.to_add.is_empty()
            || self.to_update.iter().any(|update| update.modified)
    }
}

/// Computes the plan that turns `current` into `requests`.
///
/// `requests` is sorted by display index in place, then must read exactly `0..n`;
/// otherwise the whole request is rejected before anything is planned.
pub fn reconcile(current: &[Image], requests: &mut [ImageRequest]) -> Result<ReconcilePlan> {
    sort_and_validate_display_indices(requests)?;

    let mut requested_ids = HashSet::new();
    for id in requests.iter().filter_map(|request| request.id) {
        if !requested_ids.insert(id) {
            return Err(AppError::InvalidOperation(format!(
                "image {id} appears more than once in the request"
            )));
        }
    }

    let existing: HashMap<ImageId, &Image> = current
        .iter()
        .filter_map(|image| image.id.map(|id| (id, image)))
        .collect();

    let to_remove = current
        .iter()
        .enumerate()
        .filter(|(_, image)| !image.id.is_some_and(|id| requested_ids.contains(&id)))
        .map(|(position, _)| position)
        .collect();

    let mut plan = ReconcilePlan {
        to_remove,
        ..ReconcilePlan::default()
    };

    for request in requests.iter() {
        match request.id.and_then(|id| existing.get(&id).map(|image| (id, image))) {
            Some((id, image)) => {
                let url_changed = request.url != image.url;
                plan.to_update.push(ImageUpdate {
                    id,
                    url: request.url.clone(),
                    display_index: request.display_index,
                    previous_url: image.url.clone(),
                    url_changed,
                    modified: url_changed || request.display_index != image.display_index,
                });
            }
            None => plan.to_add.push(request.clone()),
        }
    }

    Ok(plan)
}

/// Sorts requests by display index and checks they form a contiguous run from zero.
pub fn sort_and_validate_display_indices(requests: &mut [ImageRequest]) -> Result<()> {
    requests.sort_by_key(|request| request.display_index);

    for (expected, request) in (0u32..).zip(requests.iter()) {
        if request.display_index != expected {
            return Err(AppError::InvalidDisplayIndex {
                expected,
                found: request.display_index,
            });
        }
    }

    Ok(())
}
