//! Unified in-memory metadata model.
//!
//! Every adapter normalizes its format's metadata into one [`ImageMetadata`]
//! value holding four named blocks (`exif`, `iptc`, `xmp`, `custom`). Values
//! are untyped JSON values — strings, numbers, booleans; raw bytes are stored
//! hex-encoded. Adapters coerce values to their target representation at
//! write time.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{MetadataError, Result};

/// Key patterns (lowercase substrings) that mark GPS/location data.
pub const GPS_PATTERNS: &[&str] = &["gps", "location", "geotag", "coordinate"];

/// Key patterns that mark device and software identification.
pub const DEVICE_PATTERNS: &[&str] = &["make", "model", "software", "lens", "serial", "camera"];

/// Key patterns that mark personal information.
pub const PERSONAL_PATTERNS: &[&str] =
    &["artist", "author", "creator", "owner", "copyright", "contact"];

/// A single named metadata block (EXIF, IPTC, XMP, or format-specific).
///
/// Keys are unique within a block; the block name is fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataBlock {
    name: &'static str,
    data: BTreeMap<String, Value>,
}

impl MetadataBlock {
    /// Create an empty block with the given name.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            data: BTreeMap::new(),
        }
    }

    /// Block name (`"exif"`, `"iptc"`, `"xmp"`, or `"custom"`).
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get a value by key as a string, if it is one.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Set a value. Anything convertible into a JSON value is accepted.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// Remove a key. Returns `true` iff the key existed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    /// All keys in the block.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Key/value pairs in the block.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether the block holds no keys.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of keys in the block.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Remove every key. Returns the number removed.
    pub fn clear(&mut self) -> usize {
        let count = self.data.len();
        self.data.clear();
        count
    }

    fn to_value(&self) -> Value {
        Value::Object(self.data.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn load_value(&mut self, value: &Value) {
        if let Value::Object(map) = value {
            self.data = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        }
    }
}

/// Unified metadata for a single image file.
///
/// Constructed fresh by an adapter's `read_metadata`, mutated in place by
/// callers, and consumed read-only by `write_metadata`/`strip_metadata`.
/// One instance per logical read — never cached.
///
/// # Example
///
/// ```rust
/// use exif_sweep::metadata::ImageMetadata;
///
/// let mut meta = ImageMetadata::new("photo.jpg", "JPEG").unwrap();
/// meta.exif.set("GPS:GPSLatitude", "40.7128");
/// assert!(meta.has_gps_data());
///
/// let removed = meta.strip_gps_data();
/// assert_eq!(removed, 1);
/// assert!(!meta.has_gps_data());
/// ```
#[derive(Debug, Clone)]
pub struct ImageMetadata {
    /// On-disk location this metadata describes.
    pub file_path: PathBuf,
    /// Container format name (`"JPEG"`, `"PNG"`, ...). Never empty.
    pub format: String,
    pub exif: MetadataBlock,
    pub iptc: MetadataBlock,
    pub xmp: MetadataBlock,
    pub custom: MetadataBlock,
    /// Size of the source file in bytes, when known.
    pub file_size: Option<u64>,
    /// Source file modification time, when known.
    pub last_modified: Option<DateTime<Utc>>,
    /// SHA-256 of decoded RGB pixel bytes, for integrity comparison only.
    pub pixel_hash: Option<String>,
}

impl ImageMetadata {
    /// Create an empty metadata value for the given file and format.
    ///
    /// Fails with a validation error if `format` is empty.
    pub fn new(file_path: impl Into<PathBuf>, format: impl Into<String>) -> Result<Self> {
        let format = format.into();
        if format.is_empty() {
            return Err(MetadataError::Validation(
                "image format must be specified".into(),
            ));
        }
        Ok(Self {
            file_path: file_path.into(),
            format,
            exif: MetadataBlock::new("exif"),
            iptc: MetadataBlock::new("iptc"),
            xmp: MetadataBlock::new("xmp"),
            custom: MetadataBlock::new("custom"),
            file_size: None,
            last_modified: None,
            pixel_hash: None,
        })
    }

    /// The four blocks, in canonical order.
    pub fn blocks(&self) -> [&MetadataBlock; 4] {
        [&self.exif, &self.iptc, &self.xmp, &self.custom]
    }

    /// The four blocks, mutably.
    pub fn blocks_mut(&mut self) -> [&mut MetadataBlock; 4] {
        [
            &mut self.exif,
            &mut self.iptc,
            &mut self.xmp,
            &mut self.custom,
        ]
    }

    /// Look up a block by name.
    pub fn block(&self, name: &str) -> Option<&MetadataBlock> {
        match name.to_ascii_lowercase().as_str() {
            "exif" => Some(&self.exif),
            "iptc" => Some(&self.iptc),
            "xmp" => Some(&self.xmp),
            "custom" => Some(&self.custom),
            _ => None,
        }
    }

    /// True iff at least one block is non-empty.
    pub fn has_metadata(&self) -> bool {
        self.blocks().iter().any(|b| !b.is_empty())
    }

    /// True iff any key in any block matches a GPS/location pattern.
    ///
    /// Matching is case-insensitive substring matching against
    /// [`GPS_PATTERNS`] — the same list [`strip_gps_data`](Self::strip_gps_data)
    /// uses, so stripping always clears this flag.
    pub fn has_gps_data(&self) -> bool {
        self.blocks().iter().any(|block| {
            block
                .keys()
                .any(|key| matches_any(&key.to_lowercase(), GPS_PATTERNS))
        })
    }

    /// Privacy-sensitive `(block_name, key)` pairs across all blocks.
    ///
    /// Substring matching errs on the side of over-reporting: a custom key
    /// containing `modelVersion` matches the device pattern `model`.
    pub fn privacy_sensitive_keys(&self) -> Vec<(&'static str, String)> {
        let mut sensitive = Vec::new();
        for block in self.blocks() {
            for key in block.keys() {
                let lower = key.to_lowercase();
                if matches_any(&lower, GPS_PATTERNS)
                    || matches_any(&lower, DEVICE_PATTERNS)
                    || matches_any(&lower, PERSONAL_PATTERNS)
                {
                    sensitive.push((block.name(), key.to_string()));
                }
            }
        }
        sensitive
    }

    /// Remove every GPS/location key in every block. Returns the count removed.
    pub fn strip_gps_data(&mut self) -> usize {
        let mut removed = 0;
        for block in self.blocks_mut() {
            let doomed: Vec<String> = block
                .keys()
                .filter(|key| matches_any(&key.to_lowercase(), GPS_PATTERNS))
                .map(String::from)
                .collect();
            for key in doomed {
                if block.remove(&key) {
                    removed += 1;
                    log::debug!("Removed GPS key {key} from {}", block.name());
                }
            }
        }
        removed
    }

    /// Empty all four blocks. Returns the total number of keys removed.
    pub fn strip_all_metadata(&mut self) -> usize {
        let removed: usize = self.blocks_mut().into_iter().map(|b| b.clear()).sum();
        log::info!(
            "Removed {removed} metadata keys from {}",
            self.file_path.display()
        );
        removed
    }

    /// Remove, in every block, each key whose lowercase form contains none of
    /// the `keep` patterns. Returns the count removed.
    pub fn strip_except(&mut self, keep: &[String]) -> usize {
        let mut removed = 0;
        for block in self.blocks_mut() {
            let doomed: Vec<String> = block
                .keys()
                .filter(|key| {
                    let lower = key.to_lowercase();
                    !keep.iter().any(|pat| lower.contains(&pat.to_lowercase()))
                })
                .map(String::from)
                .collect();
            for key in doomed {
                if block.remove(&key) {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Canonical JSON-serializable form. This is both the export format and
    /// the `restore` input format.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "file_path": self.file_path.to_string_lossy(),
            "format": self.format,
            "file_size": self.file_size,
            "last_modified": self.last_modified.map(|t| t.to_rfc3339()),
            "pixel_hash": self.pixel_hash,
            "metadata": {
                "exif": self.exif.to_value(),
                "iptc": self.iptc.to_value(),
                "xmp": self.xmp.to_value(),
                "custom": self.custom.to_value(),
            }
        })
    }

    /// Pretty-printed JSON of [`to_value`](Self::to_value).
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.to_value()).unwrap_or_default()
    }

    /// Rebuild metadata from the canonical JSON form.
    ///
    /// Round-trip contract: `from_value(&m.to_value())` reproduces identical
    /// block contents.
    pub fn from_value(value: &Value) -> Result<Self> {
        let file_path = value
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| MetadataError::Validation("missing file_path".into()))?;
        let format = value
            .get("format")
            .and_then(Value::as_str)
            .ok_or_else(|| MetadataError::Validation("missing format".into()))?;

        let mut meta = Self::new(Path::new(file_path), format)?;
        meta.file_size = value.get("file_size").and_then(Value::as_u64);
        meta.pixel_hash = value
            .get("pixel_hash")
            .and_then(Value::as_str)
            .map(String::from);
        if let Some(ts) = value.get("last_modified").and_then(Value::as_str) {
            meta.last_modified = DateTime::parse_from_rfc3339(ts)
                .map(|t| t.with_timezone(&Utc))
                .ok();
        }

        if let Some(blocks) = value.get("metadata") {
            for (name, block) in [
                ("exif", &mut meta.exif),
                ("iptc", &mut meta.iptc),
                ("xmp", &mut meta.xmp),
                ("custom", &mut meta.custom),
            ] {
                if let Some(v) = blocks.get(name) {
                    block.load_value(v);
                }
            }
        }

        Ok(meta)
    }

    /// Parse metadata from a JSON string in the canonical form.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| MetadataError::Validation(format!("invalid JSON: {e}")))?;
        Self::from_value(&value)
    }
}

fn matches_any(key_lower: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|pat| key_lower.contains(pat))
}
