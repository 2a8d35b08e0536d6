//! # lf-services
//!
//! Orchestration on top of the `lf-core` ports: the image lifecycle coordinator,
//! the background janitor and the post write service.

pub mod images;
pub mod janitor;
pub mod posts;

pub use images::{ImageService, StorageLayout};
pub use janitor::{Janitor, JanitorSchedule};
pub use posts::PostService;
