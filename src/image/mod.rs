//! Image records.
//!
//! An **image record** is the core data type in GalleryDB: the gallery's
//! metadata for one uploaded picture plus the features extracted from it.
//!
//! # Operations
//!
//! Image operations are available on [`GalleryDB`](crate::GalleryDB):
//!
//! - [`upload(caller, images)`](crate::GalleryDB::upload)
//! - [`get_image(caller, id)`](crate::GalleryDB::get_image)
//! - [`delete_image(caller, id)`](crate::GalleryDB::delete_image)
//! - [`get_images(caller, page, page_size)`](crate::GalleryDB::get_images)

pub mod types;
pub(crate) mod validation;

pub use types::{ExtractedFeatures, ImageRecord, NewImage, ProcessingStatus};
