//! Core data models for the picture gallery.
//!
//! `PictureRecord` is the metadata document shown in the gallery;
//! `StoredBlob` describes the bytes behind it. Both serialize as camelCase
//! JSON, matching the document store's attribute names.

pub mod blob;
pub mod picture;
