//! Forensic metadata discovery.
//!
//! A consumer of the engine that walks raw container chunks independent of
//! the normalized model and classifies the producing platform with simple
//! substring heuristics.

pub mod extractor;
pub mod models;

pub use extractor::MetadataExtractor;
pub use models::{Confidence, ExtractedMetadata, PlatformMatch, RawChunk};
