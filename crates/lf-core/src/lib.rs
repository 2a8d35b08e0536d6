//! lucidflow/crates/lf-core/src/lib.rs
//!
//! The central domain logic and interface definitions for LucidFlow:
//! models, the error taxonomy, storage/persistence ports, path safety and image reconciliation.

pub mod error;
pub mod filenames;
pub mod models;
pub mod paths;
pub mod reconcile;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use reconcile::{reconcile, ImageUpdate, ReconcilePlan};
pub use traits::*;
