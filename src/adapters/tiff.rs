//! TIFF adapter: EXIF via the container decoder, baseline tags, and XMP.
//!
//! TIFF is itself the EXIF carrier format, so the container decoder yields
//! both the EXIF tag set and the baseline directory. EXIF-table tags land in
//! the unified EXIF block (IFD-namespaced); baseline tags without an EXIF
//! mapping land in `custom` under `TIFF:`; the XMP tag (700) payload lands
//! in the XMP block. Writing arbitrary custom TIFF tags is an explicit
//! no-op — this adapter is not a general-purpose TIFF tag writer. Writes
//! and strips rebuild a fresh container from the decoded pixels, so no
//! encoder-level metadata survives.
//!
//! `gps_only` is accepted for interface compatibility and ignored — TIFF
//! stripping always removes all metadata.

use little_exif::metadata::Metadata;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapter::{MetadataAdapter, verify_lossless};
use crate::adapters::jpeg::{collect_exif_tags, field_value, namespace_of};
use crate::adapters::tags;
use crate::config::IntegrityConfig;
use crate::error::{MetadataError, Result};
use crate::metadata::{ImageMetadata, MetadataBlock};
use crate::safety::FileSafetyManager;

/// TIFF tag 700: XMP packet.
const TAG_XMP: u16 = 0x02BC;

/// Structural geometry/layout tags. These describe the pixel encoding, not
/// user metadata: the encoder re-creates them, so surfacing or re-attaching
/// them would make every container look metadata-bearing.
const STRUCTURAL_TAGS: &[u16] = &[
    0x0100, // ImageWidth
    0x0101, // ImageLength
    0x0102, // BitsPerSample
    0x0103, // Compression
    0x0106, // PhotometricInterpretation
    0x0111, // StripOffsets
    0x0115, // SamplesPerPixel
    0x0116, // RowsPerStrip
    0x0117, // StripByteCounts
    0x011C, // PlanarConfiguration
    0x013D, // Predictor
    0x0142, // TileWidth
    0x0143, // TileLength
    0x0144, // TileOffsets
    0x0145, // TileByteCounts
    0x0152, // ExtraSamples
    0x0153, // SampleFormat
];

#[derive(Debug)]
pub struct TiffAdapter {
    safety: Arc<FileSafetyManager>,
    integrity: IntegrityConfig,
}

impl TiffAdapter {
    pub fn new(safety: Arc<FileSafetyManager>, integrity: IntegrityConfig) -> Self {
        Self { safety, integrity }
    }

    fn read_fields(&self, path: &Path, meta: &mut ImageMetadata) {
        let Ok(file) = File::open(path) else { return };
        let mut reader = BufReader::new(file);
        let parsed = match exif::Reader::new().read_from_container(&mut reader) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::debug!("No EXIF directory in {}: {e}", path.display());
                return;
            }
        };

        for field in parsed.fields() {
            let Some(ns) = namespace_of(field) else {
                continue;
            };
            if ns == tags::IfdNamespace::Ifd0 && STRUCTURAL_TAGS.contains(&field.tag.1) {
                continue;
            }

            if field.tag.1 == TAG_XMP {
                if let exif::Value::Byte(bytes) | exif::Value::Undefined(bytes, _) = &field.value {
                    let text = String::from_utf8_lossy(bytes).into_owned();
                    meta.xmp.set("XMP_Raw", text);
                    meta.xmp.set("XMP_Present", true);
                }
                continue;
            }

            match tags::tag_name(ns, field.tag.1) {
                Some(name) => {
                    meta.exif
                        .set(format!("{}{}", ns.prefix(), name), field_value(field));
                }
                None => {
                    // Baseline directory entry with no EXIF-table mapping
                    meta.custom
                        .set(format!("TIFF:Tag_{}", field.tag.1), field_value(field));
                }
            }
        }
    }

    /// Decode the source pixels and emit a fresh metadata-free container.
    fn reencode(&self, source: &Path, dest: &Path) -> Result<()> {
        let img = image::open(source).map_err(|e| MetadataError::write("TIFF", dest, e))?;
        img.save_with_format(dest, image::ImageFormat::Tiff)
            .map_err(|e| MetadataError::write("TIFF", dest, e))
    }

    /// Best-effort EXIF re-attachment on a freshly written container.
    fn attach_exif(&self, dest: &Path, block: &MetadataBlock) {
        let (tags_out, skipped) = collect_exif_tags(block);
        if skipped > 0 {
            log::warn!(
                "{skipped} EXIF key(s) had no tag mapping and were not written to {}",
                dest.display()
            );
        }
        if tags_out.is_empty() {
            return;
        }

        let dest = dest.to_path_buf();
        let prev_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));
        let result = std::panic::catch_unwind(move || {
            let mut metadata = Metadata::new();
            for tag in tags_out {
                metadata.set_tag(tag);
            }
            metadata.write_to_file(&dest)
        });
        std::panic::set_hook(prev_hook);

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Could not attach EXIF to TIFF: {e}"),
            Err(_) => log::warn!("EXIF encoder panicked attaching TIFF tags"),
        }
    }
}

impl MetadataAdapter for TiffAdapter {
    fn supported_formats(&self) -> &'static [&'static str] {
        &["tiff", "tif"]
    }

    fn format_name(&self) -> &'static str {
        "TIFF"
    }

    fn read_metadata(&self, path: &Path) -> Result<ImageMetadata> {
        self.validate_file(path)?;

        let mut meta = ImageMetadata::new(path, "TIFF")?;
        let stat = fs::metadata(path)?;
        meta.file_size = Some(stat.len());
        meta.last_modified = stat.modified().ok().map(Into::into);
        let hash = self.get_pixel_hash(path);
        meta.pixel_hash = (!hash.is_empty()).then_some(hash);

        self.read_fields(path, &mut meta);

        log::info!("TIFF READ: {}", path.display());
        Ok(meta)
    }

    /// Custom `TIFF:*` keys are not serialized — writing arbitrary TIFF
    /// directory entries is out of scope. The EXIF block is re-attached
    /// best-effort.
    fn write_metadata(&self, metadata: &ImageMetadata, output_path: Option<&Path>) -> Result<PathBuf> {
        let target = output_path.unwrap_or(&metadata.file_path);

        let op = self.safety.begin_safe_operation(target, false)?;
        self.reencode(&metadata.file_path, op.temp_path())?;
        if !metadata.exif.is_empty() {
            self.attach_exif(op.temp_path(), &metadata.exif);
        }

        if !verify_lossless(self.integrity.strategy, &metadata.file_path, op.temp_path()) {
            return Err(MetadataError::PixelCorruption {
                path: target.to_path_buf(),
                message: "pixel data changed during metadata write".into(),
            });
        }

        let written = op.commit()?;
        log::info!("TIFF WRITE: {}", written.display());
        Ok(written)
    }

    fn strip_metadata(&self, path: &Path, output_path: Option<&Path>, gps_only: bool) -> Result<PathBuf> {
        self.validate_file(path)?;
        if gps_only {
            log::warn!("TIFF does not support selective GPS stripping; removing all metadata");
        }

        let target = output_path.unwrap_or(path);
        let op = self.safety.begin_safe_operation(target, false)?;
        self.reencode(path, op.temp_path())?;

        if !verify_lossless(self.integrity.strategy, path, op.temp_path()) {
            return Err(MetadataError::PixelCorruption {
                path: target.to_path_buf(),
                message: "pixel data changed during metadata strip".into(),
            });
        }

        let written = op.commit()?;
        log::info!("TIFF STRIP: {}", written.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::write_plain_tiff;
    use tempfile::TempDir;

    fn adapter() -> TiffAdapter {
        TiffAdapter::new(Arc::new(FileSafetyManager::new()), IntegrityConfig::default())
    }

    #[test]
    fn reads_plain_tiff() {
        let dir = TempDir::new().unwrap();
        let path = write_plain_tiff(dir.path(), "a.tiff");

        let meta = adapter().read_metadata(&path).unwrap();
        assert_eq!(meta.format, "TIFF");
        assert!(meta.file_size.is_some());
        assert!(meta.pixel_hash.is_some());
    }

    #[test]
    fn supports_both_extensions() {
        let adapter = adapter();
        assert!(adapter.supports_format(Path::new("a.tif")));
        assert!(adapter.supports_format(Path::new("a.TIFF")));
        assert!(!adapter.supports_format(Path::new("a.png")));
    }

    #[test]
    fn strip_preserves_pixels() {
        let dir = TempDir::new().unwrap();
        let path = write_plain_tiff(dir.path(), "a.tiff");
        let adapter = adapter();

        let hash_before = adapter.get_pixel_hash(&path);
        let out = dir.path().join("out.tiff");
        adapter.strip_metadata(&path, Some(&out), false).unwrap();
        assert_eq!(adapter.get_pixel_hash(&out), hash_before);
    }

    #[test]
    fn strip_in_place_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = write_plain_tiff(dir.path(), "a.tif");
        let adapter = adapter();
        let hash_before = adapter.get_pixel_hash(&path);

        adapter.strip_metadata(&path, None, false).unwrap();
        assert_eq!(adapter.get_pixel_hash(&path), hash_before);
    }

    #[test]
    fn write_reencodes_container() {
        let dir = TempDir::new().unwrap();
        let path = write_plain_tiff(dir.path(), "a.tiff");
        let adapter = adapter();

        let meta = adapter.read_metadata(&path).unwrap();
        let out = dir.path().join("out.tiff");
        adapter.write_metadata(&meta, Some(&out)).unwrap();
        assert_eq!(adapter.get_pixel_hash(&out), adapter.get_pixel_hash(&path));
    }
}
