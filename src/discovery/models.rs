//! Data models for forensic metadata discovery.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::metadata::ImageMetadata;

/// Maximum bytes of raw chunk data captured per record.
pub const MAX_RAW_CAPTURE: usize = 1000;

/// A read-only forensic record of one container chunk/segment.
///
/// Immutable once produced; never written back to the file.
#[derive(Debug, Clone)]
pub struct RawChunk {
    /// Format-qualified tag, e.g. `"PNG:tEXt"`, `"JPEG:APP1"`, `"WebP:EXIF"`.
    pub chunk_type: String,
    /// Byte offset of the record in the file.
    pub offset: usize,
    /// Payload size in bytes (may exceed `raw_data.len()`).
    pub length: usize,
    /// Up to [`MAX_RAW_CAPTURE`] bytes of payload.
    pub raw_data: Vec<u8>,
    /// Decoded text, when the payload is textual.
    pub decoded_text: Option<String>,
}

/// Complete extraction result for a single image.
#[derive(Debug)]
pub struct ExtractedMetadata {
    pub file_path: PathBuf,
    pub file_format: String,
    pub file_size: u64,
    /// The normalized view from the engine, for cross-reference.
    pub standard_metadata: ImageMetadata,
    /// Raw container records, independent of the normalized model.
    pub raw_chunks: Vec<RawChunk>,
    /// Decoded textual fields keyed by their chunk path.
    pub custom_fields: BTreeMap<String, String>,
    /// Non-fatal walker errors.
    pub extraction_errors: Vec<String>,
}

/// Platform detection confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
    Unknown,
}

/// Result of the producing-platform classification heuristics.
#[derive(Debug, Clone)]
pub struct PlatformMatch {
    /// Identifier such as `"stable_diffusion"`, or `"unknown"`.
    pub platform_id: String,
    /// Human-readable name.
    pub platform_name: String,
    pub confidence: Confidence,
    /// Field paths that triggered the match.
    pub matched_indicators: Vec<String>,
}

impl PlatformMatch {
    pub fn unknown() -> Self {
        Self {
            platform_id: "unknown".into(),
            platform_name: "Unknown".into(),
            confidence: Confidence::Unknown,
            matched_indicators: Vec::new(),
        }
    }
}
