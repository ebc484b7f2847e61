//! Per-format metadata adapters.
//!
//! One adapter per container format, each implementing the
//! [`MetadataAdapter`](crate::adapter::MetadataAdapter) contract. The engine
//! owns the extension → adapter registry.

pub mod gif;
pub mod jpeg;
pub mod png;
pub mod tags;
pub mod tiff;
pub mod webp;

pub use gif::GifAdapter;
pub use jpeg::JpegAdapter;
pub use png::PngAdapter;
pub use tiff::TiffAdapter;
pub use webp::WebpAdapter;
