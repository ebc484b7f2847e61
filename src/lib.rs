//! # exif-sweep
//!
//! Read, edit, and strip embedded image metadata — EXIF, IPTC, XMP, and
//! format-specific text chunks — across JPEG, PNG, TIFF, GIF, and WebP,
//! with the guarantee that pixel data is never altered by a metadata
//! operation.
//!
//! ## Quick Start
//!
//! The [`engine::MetadataEngine`] is the main entry point; it dispatches to
//! the right format adapter by extension (with content sniffing as a
//! fallback) and wraps every mutation in a backup/temp-file/rollback
//! protocol:
//!
//! ```rust,no_run
//! use exif_sweep::engine::MetadataEngine;
//! use std::path::Path;
//!
//! fn main() -> exif_sweep::error::Result<()> {
//!     let engine = MetadataEngine::new();
//!
//!     // Inspect
//!     let meta = engine.read_metadata(Path::new("photo.jpg"))?;
//!     println!("has GPS: {}", meta.has_gps_data());
//!     for (block, key) in meta.privacy_sensitive_keys() {
//!         println!("sensitive: {block}/{key}");
//!     }
//!
//!     // Strip everything, keeping a timestamped backup
//!     engine.strip_metadata(Path::new("photo.jpg"), None, true, false)?;
//!
//!     // Or strip only location data
//!     engine.strip_gps_data(Path::new("other.png"), None, true)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! Adapters can be used directly when the dispatch layer is not wanted:
//!
//! ```rust,no_run
//! use exif_sweep::adapter::MetadataAdapter;
//! use exif_sweep::adapters::PngAdapter;
//! use exif_sweep::config::IntegrityConfig;
//! use exif_sweep::safety::FileSafetyManager;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let adapter = PngAdapter::new(Arc::new(FileSafetyManager::new()), IntegrityConfig::default());
//! let meta = adapter.read_metadata(Path::new("image.png")).unwrap();
//! println!("{}", meta.to_json());
//! ```
//!
//! ## Supported Formats
//!
//! | Format | Metadata | Write Strategy |
//! |--------|----------|----------------|
//! | JPEG (`.jpg`, `.jpeg`, `.jpe`, `.jfif`) | EXIF (multi-IFD), IPTC detection, XMP | APP-segment surgery |
//! | PNG (`.png`) | `tEXt`/`iTXt`/`zTXt`, XMP | container re-emit, pixel chunks byte-identical |
//! | TIFF (`.tif`, `.tiff`) | EXIF, baseline tags, XMP | fresh container from pixels |
//! | GIF (`.gif`) | comment, loop/animation params, XMP app extension | block-level splice |
//! | WebP (`.webp`) | EXIF, XMP RIFF chunks | RIFF chunk surgery |
//!
//! ## Modules
//!
//! - [`metadata`] — the unified in-memory model and privacy/GPS scans
//! - [`safety`] — backups, hashing, and the guarded safe-write protocol
//! - [`adapter`] / [`adapters`] — the per-format adapter contract and impls
//! - [`engine`] — registry, dispatch, batch, export/restore
//! - [`discovery`] — raw chunk walking and platform classification
//! - [`config`] — explicit configuration passed in at construction

pub mod adapter;
pub mod adapters;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod safety;

#[cfg(test)]
pub(crate) mod test_fixtures;
