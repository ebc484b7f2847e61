//! JPEG adapter: EXIF (multi-IFD), IPTC detection, and XMP packets.
//!
//! EXIF lives in up to four IFDs (0th, Exif, GPS, 1st/thumbnail). The read
//! path decodes the raw APP1 TIFF blob and namespaces each tag into the
//! unified EXIF block (`GPS:GPSLatitude`, bare name for the 0th IFD); a
//! supplementary pass through a second decoder adds tags the primary path
//! missed without overwriting. IPTC is detected by marker presence only —
//! this adapter never writes IPTC. XMP is the raw `xpacket` text.
//!
//! Writes are segment surgery: the pixel stream is never re-encoded, and the
//! post-write gate is a mean-squared-error comparison (recompression noise
//! stays far below the threshold; corruption does not).

use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::{Bytes, ImageEXIF};
use little_exif::endian::Endian;
use little_exif::exif_tag::{ExifTag, ExifTagGroup};
use little_exif::exif_tag_format::ExifTagFormat;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapter::{MetadataAdapter, dimensions_match, pixel_mse};
use crate::adapters::tags::{self, IfdNamespace};
use crate::config::{IntegrityConfig, IntegrityStrategy};
use crate::error::{MetadataError, Result};
use crate::metadata::{ImageMetadata, MetadataBlock};
use crate::safety::FileSafetyManager;

const XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const IPTC_MARKER: &[u8] = b"Photoshop 3.0\x008BIM";
const XPACKET_BEGIN: &[u8] = b"<?xpacket begin=";
const XPACKET_END: &[u8] = b"<?xpacket end=";

const MARKER_APP1: u8 = 0xE1;
const MARKER_APP14: u8 = 0xEE;
const MARKER_COM: u8 = 0xFE;

// little_exif as_u8_vec(JPEG) returns [APP1 marker 2B][length 2B][Exif\0\0 6B][TIFF data];
// img-parts set_exif() expects just the TIFF data.
const JPEG_EXIF_OVERHEAD: usize = 10;

#[derive(Debug)]
pub struct JpegAdapter {
    safety: Arc<FileSafetyManager>,
    integrity: IntegrityConfig,
}

impl JpegAdapter {
    pub fn new(safety: Arc<FileSafetyManager>, integrity: IntegrityConfig) -> Self {
        Self { safety, integrity }
    }

    // ── reading ──────────────────────────────────────────────────────

    /// Primary EXIF pass: decode the raw APP1 TIFF blob, one key per tag,
    /// namespaced by IFD.
    fn read_exif_primary(&self, data: &[u8], meta: &mut ImageMetadata) {
        let Ok(jpeg) = Jpeg::from_bytes(Bytes::copy_from_slice(data)) else {
            return;
        };
        let Some(blob) = jpeg.exif() else { return };

        let parsed = match exif::Reader::new().read_raw(blob.to_vec()) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::debug!("Could not decode EXIF blob: {e}");
                return;
            }
        };

        for field in parsed.fields() {
            let Some(ns) = namespace_of(field) else {
                continue;
            };
            let name = tags::tag_name(ns, field.tag.1)
                .map(String::from)
                .unwrap_or_else(|| format!("Tag_{}", field.tag.1));
            let key = format!("{}{}", ns.prefix(), name);
            meta.exif.set(key, field_value(field));
        }
    }

    /// Supplementary pass through the second decoder; primary source wins.
    fn read_exif_fallback(&self, path: &Path, meta: &mut ImageMetadata) {
        let Ok(file) = File::open(path) else { return };
        let Ok(Some(iter)) = nom_exif::parse_exif(file, None) else {
            return;
        };

        for mut entry in iter {
            let code = entry.tag_code();
            let Some(value) = entry.take_value() else {
                continue;
            };
            let known = [IfdNamespace::Gps, IfdNamespace::Exif, IfdNamespace::Ifd0]
                .into_iter()
                .find_map(|ns| tags::tag_name(ns, code).map(|name| (ns, name)));
            let Some((ns, name)) = known else { continue };

            let key = format!("{}{}", ns.prefix(), name);
            if meta.exif.get(&key).is_none() {
                let text = value.to_string();
                let text = text.trim().trim_matches('"');
                if !text.is_empty() {
                    meta.exif.set(key, text);
                }
            }
        }
    }

    fn read_iptc(&self, data: &[u8], meta: &mut ImageMetadata) {
        if find_subslice(data, IPTC_MARKER).is_some() {
            log::debug!("IPTC data detected in {}", meta.file_path.display());
            meta.iptc.set("IPTC_Present", true);
        }
    }

    fn read_xmp(&self, data: &[u8], meta: &mut ImageMetadata) {
        let Some(header_pos) = find_subslice(data, XMP_HEADER) else {
            return;
        };
        let Some(begin) = find_subslice(&data[header_pos..], XPACKET_BEGIN) else {
            return;
        };
        let begin = header_pos + begin;
        let Some(end) = find_subslice(&data[begin..], XPACKET_END) else {
            return;
        };

        let content = String::from_utf8_lossy(&data[begin..begin + end]).into_owned();
        meta.xmp.set("XMP_Raw", content);
        meta.xmp.set("XMP_Present", true);
        log::debug!("XMP data found in {}", meta.file_path.display());
    }

    // ── writing ──────────────────────────────────────────────────────

    /// Replace (or remove) the XMP APP1 segment.
    fn apply_xmp(&self, jpeg: &mut Jpeg, xmp_raw: Option<&str>) {
        let xmp_pos = jpeg
            .segments()
            .iter()
            .position(|s| s.marker() == MARKER_APP1 && s.contents().starts_with(XMP_HEADER));

        match xmp_raw {
            None => {
                if let Some(pos) = xmp_pos {
                    jpeg.segments_mut().remove(pos);
                }
            }
            Some(xmp) => {
                let mut contents = Vec::with_capacity(XMP_HEADER.len() + xmp.len());
                contents.extend_from_slice(XMP_HEADER);
                contents.extend_from_slice(xmp.as_bytes());
                let segment = JpegSegment::new_with_contents(MARKER_APP1, Bytes::from(contents));

                let segments = jpeg.segments_mut();
                match xmp_pos {
                    Some(pos) => segments[pos] = segment,
                    None => {
                        // After the EXIF APP1 when present, else right after APP0
                        let insert = segments
                            .iter()
                            .position(|s| {
                                s.marker() == MARKER_APP1 && s.contents().starts_with(b"Exif\0\0")
                            })
                            .map(|p| p + 1)
                            .unwrap_or(1)
                            .min(segments.len());
                        segments.insert(insert, segment);
                    }
                }
            }
        }
    }

    /// Serialize the model into a fresh byte stream based on the source file.
    fn serialize(&self, metadata: &ImageMetadata) -> Result<Vec<u8>> {
        let source = &metadata.file_path;
        let bytes = fs::read(source)?;
        let mut jpeg = Jpeg::from_bytes(Bytes::from(bytes))
            .map_err(|e| MetadataError::write("JPEG", source, e))?;

        let (blob, skipped) = build_exif_tiff(&metadata.exif);
        if skipped > 0 {
            log::warn!(
                "{skipped} EXIF key(s) had no tag mapping and were not written to {}",
                source.display()
            );
        }
        jpeg.set_exif(blob.map(Bytes::from));

        self.apply_xmp(&mut jpeg, metadata.xmp.get_str("XMP_Raw"));

        Ok(jpeg.encoder().bytes().to_vec())
    }

    /// JPEG-aware integrity gate: recompression noise is tolerated up to the
    /// configured MSE threshold, anything beyond is treated as corruption.
    fn verify_jpeg_integrity(&self, original: &Path, candidate: &Path) -> bool {
        match self.integrity.strategy {
            IntegrityStrategy::Precise => match pixel_mse(original, candidate) {
                Some(mse) if mse <= self.integrity.jpeg_mse_threshold => {
                    log::debug!("JPEG integrity check passed: MSE = {mse:.4}");
                    true
                }
                Some(mse) => {
                    log::error!(
                        "High MSE detected: {mse:.2} (threshold: {})",
                        self.integrity.jpeg_mse_threshold
                    );
                    false
                }
                None => false,
            },
            IntegrityStrategy::Basic => dimensions_match(original, candidate),
        }
    }
}

impl MetadataAdapter for JpegAdapter {
    fn supported_formats(&self) -> &'static [&'static str] {
        &["jpg", "jpeg", "jpe", "jfif"]
    }

    fn format_name(&self) -> &'static str {
        "JPEG"
    }

    fn read_metadata(&self, path: &Path) -> Result<ImageMetadata> {
        self.validate_file(path)?;

        let mut meta = ImageMetadata::new(path, "JPEG")?;
        let stat = fs::metadata(path)?;
        meta.file_size = Some(stat.len());
        meta.last_modified = stat.modified().ok().map(Into::into);
        let hash = self.get_pixel_hash(path);
        meta.pixel_hash = (!hash.is_empty()).then_some(hash);

        let data = fs::read(path)?;
        if !data.starts_with(&[0xFF, 0xD8]) {
            return Err(MetadataError::read("JPEG", path, "not a JPEG stream"));
        }

        self.read_exif_primary(&data, &mut meta);
        self.read_exif_fallback(path, &mut meta);
        self.read_iptc(&data, &mut meta);
        self.read_xmp(&data, &mut meta);

        log::info!("JPEG READ: {}", path.display());
        Ok(meta)
    }

    fn write_metadata(&self, metadata: &ImageMetadata, output_path: Option<&Path>) -> Result<PathBuf> {
        let target = output_path.unwrap_or(&metadata.file_path);

        let serialized = self.serialize(metadata)?;
        let op = self.safety.begin_safe_operation(target, false)?;
        fs::write(op.temp_path(), &serialized)?;

        if !self.verify_jpeg_integrity(&metadata.file_path, op.temp_path()) {
            return Err(MetadataError::PixelCorruption {
                path: target.to_path_buf(),
                message: "JPEG integrity check failed after metadata write".into(),
            });
        }

        let written = op.commit()?;
        log::info!("JPEG WRITE: {}", written.display());
        Ok(written)
    }

    fn strip_metadata(&self, path: &Path, output_path: Option<&Path>, gps_only: bool) -> Result<PathBuf> {
        self.validate_file(path)?;

        if gps_only {
            // Selective strip round-trips through the model.
            let mut meta = self.read_metadata(path)?;
            meta.strip_gps_data();
            return self.write_metadata(&meta, output_path);
        }

        let target = output_path.unwrap_or(path);
        let bytes = fs::read(path)?;
        let mut jpeg = Jpeg::from_bytes(Bytes::from(bytes))
            .map_err(|e| MetadataError::write("JPEG", path, e))?;

        // Keep APP0 (JFIF) and APP14 (Adobe color transform — decoders need
        // it); every other APPn segment and COM is metadata.
        jpeg.segments_mut().retain(|segment| {
            let marker = segment.marker();
            let is_meta = (0xE1..=0xEF).contains(&marker) && marker != MARKER_APP14
                || marker == MARKER_COM;
            !is_meta
        });

        let op = self.safety.begin_safe_operation(target, false)?;
        fs::write(op.temp_path(), jpeg.encoder().bytes())?;

        if !self.verify_jpeg_integrity(path, op.temp_path()) {
            return Err(MetadataError::PixelCorruption {
                path: target.to_path_buf(),
                message: "JPEG integrity check failed after metadata strip".into(),
            });
        }

        let written = op.commit()?;
        log::info!("JPEG STRIP: {}", written.display());
        Ok(written)
    }
}

/// Re-derive a raw EXIF TIFF blob from a unified EXIF block by reversing the
/// `IFD:TagName` key convention through the per-namespace tag tables. Values
/// are re-encoded as NUL-terminated strings. Returns the blob (if any tag
/// mapped) and the number of keys that could not be mapped. Shared with the
/// WebP adapter, whose EXIF chunk carries the same TIFF layout.
pub(crate) fn build_exif_tiff(block: &MetadataBlock) -> (Option<Vec<u8>>, usize) {
    let (tags_out, skipped) = collect_exif_tags(block);
    if tags_out.is_empty() {
        return (None, skipped);
    }

    let mapped = tags_out.len();
    match encode_tags(tags_out) {
        Some(bytes) if bytes.len() > JPEG_EXIF_OVERHEAD => {
            (Some(bytes[JPEG_EXIF_OVERHEAD..].to_vec()), skipped)
        }
        _ => (None, skipped + mapped),
    }
}

/// Map each unified EXIF key to an encodable tag; unmappable keys are counted.
pub(crate) fn collect_exif_tags(block: &MetadataBlock) -> (Vec<ExifTag>, usize) {
    let mut tags_out: Vec<ExifTag> = Vec::new();
    let mut skipped = 0usize;

    for (key, value) in block.iter() {
        let (ns, name) = IfdNamespace::split_key(key);
        let Some(tag_id) = tags::tag_id(ns, name) else {
            log::debug!("No tag id for EXIF key {key}; skipping");
            skipped += 1;
            continue;
        };
        let group = match ns {
            IfdNamespace::Ifd0 => ExifTagGroup::IFD0,
            IfdNamespace::Exif => ExifTagGroup::ExifIFD,
            IfdNamespace::Gps => ExifTagGroup::GPSIFD,
            IfdNamespace::First => ExifTagGroup::IFD1,
        };

        let text = match value.as_str() {
            Some(s) => s.to_string(),
            None => value.to_string(),
        };
        let mut data = text.into_bytes();
        data.push(0);

        match ExifTag::from_u16_with_data(
            tag_id,
            &ExifTagFormat::STRING,
            &data,
            &Endian::Little,
            &group,
        ) {
            Ok(tag) => tags_out.push(tag),
            Err(e) => {
                log::debug!("Could not encode EXIF key {key}: {e:?}");
                skipped += 1;
            }
        }
    }

    (tags_out, skipped)
}

/// IFD namespace for a decoded field, if it belongs to a handled IFD.
pub(crate) fn namespace_of(field: &exif::Field) -> Option<IfdNamespace> {
    match field.tag.0 {
        exif::Context::Tiff => {
            if field.ifd_num == exif::In::THUMBNAIL {
                Some(IfdNamespace::First)
            } else {
                Some(IfdNamespace::Ifd0)
            }
        }
        exif::Context::Exif => Some(IfdNamespace::Exif),
        exif::Context::Gps => Some(IfdNamespace::Gps),
        _ => None,
    }
}

/// Decode a field value: text where possible, hex for binary payloads.
pub(crate) fn field_value(field: &exif::Field) -> serde_json::Value {
    match &field.value {
        exif::Value::Ascii(lines) => {
            let joined = lines
                .iter()
                .map(|line| String::from_utf8_lossy(line).into_owned())
                .collect::<Vec<_>>()
                .join("\n");
            joined.trim_end_matches('\0').to_string().into()
        }
        exif::Value::Byte(bytes) => bytes_value(bytes),
        exif::Value::Undefined(bytes, _) => bytes_value(bytes),
        _ => field.display_value().to_string().into(),
    }
}

fn bytes_value(bytes: &[u8]) -> serde_json::Value {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let trimmed = text.trim_matches('\0');
            if !trimmed.is_empty() && trimmed.chars().all(|c| !c.is_control() || c.is_whitespace())
            {
                return trimmed.to_string().into();
            }
            hex::encode(bytes).into()
        }
        Err(_) => hex::encode(bytes).into(),
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// The EXIF encoder occasionally panics on malformed tag data; suppress the
/// hook and treat a panic as "no blob".
fn encode_tags(tags: Vec<ExifTag>) -> Option<Vec<u8>> {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    let result = std::panic::catch_unwind(move || {
        let mut metadata = Metadata::new();
        for tag in tags {
            metadata.set_tag(tag);
        }
        metadata.as_u8_vec(FileExtension::JPEG)
    });
    std::panic::set_hook(prev_hook);

    match result {
        Ok(bytes) => Some(bytes),
        Err(_) => {
            log::warn!("EXIF encoder panicked; dropping EXIF block");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{write_jpeg_with_gps_exif, write_plain_jpeg};
    use tempfile::TempDir;

    fn adapter() -> JpegAdapter {
        JpegAdapter::new(Arc::new(FileSafetyManager::new()), IntegrityConfig::default())
    }

    // ── reading ──────────────────────────────────────────────────────

    #[test]
    fn reads_namespaced_exif_keys() {
        let dir = TempDir::new().unwrap();
        let path = write_jpeg_with_gps_exif(dir.path(), "a.jpg");

        let meta = adapter().read_metadata(&path).unwrap();
        assert_eq!(meta.exif.get_str("Make"), Some("Canon"));
        assert_eq!(meta.exif.get_str("GPS:GPSLatitudeRef"), Some("N"));
        assert!(meta.has_gps_data());
        assert!(meta.file_size.is_some());
    }

    #[test]
    fn plain_jpeg_reads_empty() {
        let dir = TempDir::new().unwrap();
        let path = write_plain_jpeg(dir.path(), "a.jpg");
        let meta = adapter().read_metadata(&path).unwrap();
        assert!(!meta.has_metadata());
        assert!(!meta.has_gps_data());
    }

    #[test]
    fn rejects_non_jpeg_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.jpg");
        fs::write(&path, b"not a jpeg at all").unwrap();
        assert!(adapter().read_metadata(&path).is_err());
    }

    // ── stripping ────────────────────────────────────────────────────

    #[test]
    fn strip_removes_exif_and_preserves_pixels() {
        let dir = TempDir::new().unwrap();
        let path = write_jpeg_with_gps_exif(dir.path(), "a.jpg");
        let adapter = adapter();

        let hash_before = adapter.get_pixel_hash(&path);
        let out = dir.path().join("out.jpg");
        adapter.strip_metadata(&path, Some(&out), false).unwrap();

        let meta = adapter.read_metadata(&out).unwrap();
        assert!(!meta.has_metadata());
        assert!(!meta.has_gps_data());
        // Segment surgery never touches the entropy-coded data
        assert_eq!(adapter.get_pixel_hash(&out), hash_before);
    }

    #[test]
    fn gps_only_strip_keeps_make() {
        let dir = TempDir::new().unwrap();
        let path = write_jpeg_with_gps_exif(dir.path(), "a.jpg");
        let adapter = adapter();

        let out = dir.path().join("out.jpg");
        adapter.strip_metadata(&path, Some(&out), true).unwrap();

        let meta = adapter.read_metadata(&out).unwrap();
        assert!(!meta.has_gps_data());
        assert_eq!(meta.exif.get_str("Make"), Some("Canon"));
    }

    // ── writing ──────────────────────────────────────────────────────

    #[test]
    fn write_round_trips_mapped_tags() {
        let dir = TempDir::new().unwrap();
        let path = write_plain_jpeg(dir.path(), "a.jpg");
        let adapter = adapter();

        let mut meta = adapter.read_metadata(&path).unwrap();
        meta.exif.set("Make", "Pentax");
        meta.exif.set("Exif:LensModel", "50mm F1.4");
        let out = dir.path().join("out.jpg");
        adapter.write_metadata(&meta, Some(&out)).unwrap();

        let reread = adapter.read_metadata(&out).unwrap();
        assert_eq!(reread.exif.get_str("Make"), Some("Pentax"));
        assert_eq!(reread.exif.get_str("Exif:LensModel"), Some("50mm F1.4"));
    }

    #[test]
    fn unmappable_keys_do_not_abort_write() {
        let dir = TempDir::new().unwrap();
        let path = write_plain_jpeg(dir.path(), "a.jpg");
        let adapter = adapter();

        let mut meta = adapter.read_metadata(&path).unwrap();
        meta.exif.set("Make", "Pentax");
        meta.exif.set("NotARealTagName", "whatever");
        let out = dir.path().join("out.jpg");
        adapter.write_metadata(&meta, Some(&out)).unwrap();

        let reread = adapter.read_metadata(&out).unwrap();
        assert_eq!(reread.exif.get_str("Make"), Some("Pentax"));
        assert!(reread.exif.get("NotARealTagName").is_none());
    }

    #[test]
    fn write_carries_xmp_packet() {
        let dir = TempDir::new().unwrap();
        let path = write_plain_jpeg(dir.path(), "a.jpg");
        let adapter = adapter();

        let xmp = "<?xpacket begin=\"\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\
                   <x:xmpmeta xmlns:x=\"adobe:ns:meta/\"></x:xmpmeta>\
                   <?xpacket end=\"w\"?>";
        let mut meta = adapter.read_metadata(&path).unwrap();
        meta.xmp.set("XMP_Raw", xmp);
        let out = dir.path().join("out.jpg");
        adapter.write_metadata(&meta, Some(&out)).unwrap();

        let reread = adapter.read_metadata(&out).unwrap();
        assert_eq!(reread.xmp.get("XMP_Present"), Some(&serde_json::Value::Bool(true)));
        assert!(reread.xmp.get_str("XMP_Raw").unwrap().contains("xmpmeta"));
    }

    // ── helpers ──────────────────────────────────────────────────────

    #[test]
    fn bytes_value_falls_back_to_hex() {
        assert_eq!(bytes_value(b"hello\0"), serde_json::json!("hello"));
        assert_eq!(bytes_value(&[0xFF, 0x00, 0x80]), serde_json::json!("ff0080"));
    }

    #[test]
    fn subslice_search() {
        assert_eq!(find_subslice(b"abcdef", b"cd"), Some(2));
        assert_eq!(find_subslice(b"abcdef", b"xy"), None);
    }
}
