// Gallery module - query builder, template views and HTTP handlers
mod error;
mod handlers;
mod query;
mod types;

pub use error::GalleryError;
pub use handlers::{admin_ingest_handler, gallery_handler, like_handler, recipe_handler};
pub use query::{BuiltQuery, GalleryFilter, GalleryParams, MAX_RESULTS};
pub use types::*;
