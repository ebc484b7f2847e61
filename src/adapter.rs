//! The format-adapter contract shared by every container format.
//!
//! Each adapter is a free-standing type implementing [`MetadataAdapter`];
//! the engine composes them into a registry keyed by file extension. There
//! is no inheritance hierarchy — shared behavior lives in the trait's
//! default methods and the free helper functions below.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{MetadataError, Result};
use crate::metadata::ImageMetadata;

/// Operations every format adapter provides.
pub trait MetadataAdapter: Send + Sync + std::fmt::Debug {
    /// Lowercase extensions (no dot) this adapter handles.
    fn supported_formats(&self) -> &'static [&'static str];

    /// Human-readable format name.
    fn format_name(&self) -> &'static str;

    /// Case-insensitive suffix match against [`supported_formats`](Self::supported_formats).
    fn supports_format(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let lower = e.to_lowercase();
                self.supported_formats().contains(&lower.as_str())
            })
            .unwrap_or(false)
    }

    /// Check that `path` exists, is a regular readable file, and carries a
    /// suffix this adapter supports.
    fn validate_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(MetadataError::FileNotFound(path.to_path_buf()));
        }
        if !path.is_file() {
            return Err(MetadataError::NotAFile(path.to_path_buf()));
        }
        if !self.supports_format(path) {
            return Err(MetadataError::UnsupportedFormat {
                format: path
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            });
        }

        let mut probe = [0u8; 1];
        match File::open(path).and_then(|mut f| f.read(&mut probe)) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(MetadataError::Permission(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read all metadata from the file into a fresh [`ImageMetadata`].
    ///
    /// Populates `file_size` and `pixel_hash` when feasible.
    fn read_metadata(&self, path: &Path) -> Result<ImageMetadata>;

    /// Serialize `metadata` back into the image. When `output_path` is
    /// omitted, `metadata.file_path` is overwritten in place.
    ///
    /// Runs inside the safe-write scope and verifies pixel integrity after
    /// the write, failing with
    /// [`MetadataError::PixelCorruption`] when verification fails.
    fn write_metadata(&self, metadata: &ImageMetadata, output_path: Option<&Path>)
    -> Result<PathBuf>;

    /// Remove metadata from the file. `gps_only` requests selective GPS
    /// stripping — formats that cannot strip selectively ignore it and strip
    /// everything; each adapter documents which it does.
    fn strip_metadata(
        &self,
        path: &Path,
        output_path: Option<&Path>,
        gps_only: bool,
    ) -> Result<PathBuf>;

    /// SHA-256 over the canonical RGB byte layout of the decoded image.
    ///
    /// Returns an empty string — never an error — when the image cannot be
    /// decoded; callers treat `""` as "hash unavailable".
    fn get_pixel_hash(&self, path: &Path) -> String {
        pixel_hash(path)
    }

    /// True iff both pixel hashes are non-empty and equal.
    fn verify_pixel_integrity(&self, original: &Path, modified: &Path) -> bool {
        let original_hash = self.get_pixel_hash(original);
        let modified_hash = self.get_pixel_hash(modified);
        !original_hash.is_empty() && original_hash == modified_hash
    }
}

/// Integrity gate for lossless formats: exact pixel-hash equality under the
/// `Precise` strategy, dimensions/color-type match under `Basic`.
pub fn verify_lossless(
    strategy: crate::config::IntegrityStrategy,
    original: &Path,
    modified: &Path,
) -> bool {
    match strategy {
        crate::config::IntegrityStrategy::Precise => {
            let a = pixel_hash(original);
            let b = pixel_hash(modified);
            !a.is_empty() && a == b
        }
        crate::config::IntegrityStrategy::Basic => dimensions_match(original, modified),
    }
}

/// SHA-256 of the decoded RGB8 pixel bytes, or `""` on any failure.
pub fn pixel_hash(path: &Path) -> String {
    match image::open(path) {
        Ok(img) => {
            let rgb = img.to_rgb8();
            hex::encode(Sha256::digest(rgb.as_raw()))
        }
        Err(e) => {
            log::warn!("Could not calculate pixel hash for {}: {e}", path.display());
            String::new()
        }
    }
}

/// Dimensions-and-color-type comparison, the `Basic` integrity strategy.
pub fn dimensions_match(original: &Path, modified: &Path) -> bool {
    let (orig, modified) = match (image::open(original), image::open(modified)) {
        (Ok(a), Ok(b)) => (a, b),
        _ => return false,
    };
    orig.width() == modified.width()
        && orig.height() == modified.height()
        && orig.color() == modified.color()
}

/// Per-pixel mean squared error between the RGB8 buffers of two images.
///
/// `None` when either image cannot be decoded or the dimensions differ.
pub fn pixel_mse(original: &Path, modified: &Path) -> Option<f64> {
    let orig = image::open(original).ok()?.to_rgb8();
    let modified = image::open(modified).ok()?.to_rgb8();
    if orig.dimensions() != modified.dimensions() {
        return None;
    }

    let a = orig.as_raw();
    let b = modified.as_raw();
    if a.is_empty() {
        return Some(0.0);
    }

    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum();
    Some(sum / a.len() as f64)
}
