//! WebP adapter: EXIF and XMP RIFF sub-chunks.
//!
//! WebP stores EXIF and XMP as opaque payloads in `EXIF`/`XMP ` RIFF chunks,
//! gated by feature bits in the `VP8X` header. Reads feed the EXIF payload
//! back through the generic decoder; when that fails the payload is
//! preserved as a hex string under `raw_exif` rather than lost. Writes and
//! strips rebuild the chunk list — image-bearing chunks are copied
//! byte-for-byte, metadata chunks are dropped or re-inserted, and the RIFF
//! size field and VP8X flag bits are fixed up. Files without a VP8X header
//! cannot gain metadata chunks; such writes are logged and skipped.
//!
//! `gps_only` is accepted for interface compatibility and ignored — WebP
//! stripping always removes all metadata.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapter::{MetadataAdapter, verify_lossless};
use crate::adapters::jpeg::build_exif_tiff;
use crate::config::IntegrityConfig;
use crate::error::{MetadataError, Result};
use crate::metadata::ImageMetadata;
use crate::safety::FileSafetyManager;

const CHUNK_VP8X: [u8; 4] = *b"VP8X";
const CHUNK_EXIF: [u8; 4] = *b"EXIF";
const CHUNK_XMP: [u8; 4] = *b"XMP ";
const CHUNK_ICCP: [u8; 4] = *b"ICCP";
const CHUNK_ANIM: [u8; 4] = *b"ANIM";

const VP8X_FLAG_EXIF: u8 = 0x08;
const VP8X_FLAG_XMP: u8 = 0x04;
const VP8X_FLAG_ICC: u8 = 0x20;

#[derive(Debug)]
pub struct WebpAdapter {
    safety: Arc<FileSafetyManager>,
    integrity: IntegrityConfig,
}

impl WebpAdapter {
    pub fn new(safety: Arc<FileSafetyManager>, integrity: IntegrityConfig) -> Self {
        Self { safety, integrity }
    }

    /// Decode an EXIF chunk payload, falling back to a hex string when the
    /// blob cannot be parsed.
    fn capture_exif(&self, payload: &[u8], meta: &mut ImageMetadata) {
        // Some writers prefix the TIFF data with the JPEG-style header
        let tiff = payload.strip_prefix(b"Exif\0\0").unwrap_or(payload);

        match exif::Reader::new().read_raw(tiff.to_vec()) {
            Ok(parsed) => {
                for field in parsed.fields() {
                    let Some(ns) = super::jpeg::namespace_of(field) else {
                        continue;
                    };
                    let name = super::tags::tag_name(ns, field.tag.1)
                        .map(String::from)
                        .unwrap_or_else(|| format!("Tag_{}", field.tag.1));
                    meta.exif.set(
                        format!("{}{}", ns.prefix(), name),
                        super::jpeg::field_value(field),
                    );
                }
            }
            Err(e) => {
                log::debug!("Could not decode WebP EXIF chunk: {e}; preserving raw bytes");
                meta.exif.set("raw_exif", hex::encode(payload));
            }
        }
    }

    /// Inverse of [`capture_exif`](Self::capture_exif): hex-decode a
    /// preserved payload, or re-encode the mapped tags.
    fn build_exif_bytes(&self, meta: &ImageMetadata) -> Option<Vec<u8>> {
        if let Some(raw) = meta.exif.get_str("raw_exif") {
            match hex::decode(raw) {
                Ok(bytes) => return Some(bytes),
                Err(e) => log::warn!("raw_exif is not valid hex: {e}"),
            }
        }
        if meta.exif.is_empty() {
            return None;
        }
        let (blob, skipped) = build_exif_tiff(&meta.exif);
        if skipped > 0 {
            log::warn!("{skipped} EXIF key(s) had no tag mapping and were not written");
        }
        blob
    }

    fn rebuild(
        &self,
        chunks: &[RiffChunk],
        exif: Option<Vec<u8>>,
        xmp: Option<&str>,
    ) -> Result<Vec<u8>> {
        let has_vp8x = chunks.iter().any(|c| c.id == CHUNK_VP8X);
        let (exif, xmp) = if !has_vp8x && (exif.is_some() || xmp.is_some()) {
            log::warn!("WebP file has no VP8X header; metadata chunks cannot be added");
            (None, None)
        } else {
            (exif, xmp)
        };

        let mut body: Vec<RiffChunk> = Vec::new();
        for chunk in chunks {
            match chunk.id {
                CHUNK_EXIF | CHUNK_XMP => continue,
                CHUNK_VP8X => {
                    let mut payload = chunk.payload.clone();
                    if let Some(flags) = payload.first_mut() {
                        *flags &= !(VP8X_FLAG_EXIF | VP8X_FLAG_XMP);
                        if exif.is_some() {
                            *flags |= VP8X_FLAG_EXIF;
                        }
                        if xmp.is_some() {
                            *flags |= VP8X_FLAG_XMP;
                        }
                    }
                    body.push(RiffChunk {
                        id: CHUNK_VP8X,
                        payload,
                    });
                }
                _ => body.push(chunk.clone()),
            }
        }
        if let Some(payload) = exif {
            body.push(RiffChunk {
                id: CHUNK_EXIF,
                payload,
            });
        }
        if let Some(text) = xmp {
            body.push(RiffChunk {
                id: CHUNK_XMP,
                payload: text.as_bytes().to_vec(),
            });
        }

        Ok(assemble_riff(&body))
    }

    fn guarded_write(&self, source: &Path, target: &Path, bytes: &[u8], op_name: &str) -> Result<PathBuf> {
        let op = self.safety.begin_safe_operation(target, false)?;
        fs::write(op.temp_path(), bytes)?;

        if !verify_lossless(self.integrity.strategy, source, op.temp_path()) {
            return Err(MetadataError::PixelCorruption {
                path: target.to_path_buf(),
                message: format!("pixel data changed during {op_name}"),
            });
        }

        let written = op.commit()?;
        log::info!("WebP {}: {}", op_name.to_uppercase(), written.display());
        Ok(written)
    }
}

impl MetadataAdapter for WebpAdapter {
    fn supported_formats(&self) -> &'static [&'static str] {
        &["webp"]
    }

    fn format_name(&self) -> &'static str {
        "WebP"
    }

    fn read_metadata(&self, path: &Path) -> Result<ImageMetadata> {
        self.validate_file(path)?;

        let mut meta = ImageMetadata::new(path, "WebP")?;
        let stat = fs::metadata(path)?;
        meta.file_size = Some(stat.len());
        meta.last_modified = stat.modified().ok().map(Into::into);
        let hash = self.get_pixel_hash(path);
        meta.pixel_hash = (!hash.is_empty()).then_some(hash);

        let data = fs::read(path)?;
        let chunks = parse_riff(&data).map_err(|e| MetadataError::read("WebP", path, e))?;

        for chunk in &chunks {
            match chunk.id {
                CHUNK_EXIF => self.capture_exif(&chunk.payload, &mut meta),
                CHUNK_XMP => {
                    let text = String::from_utf8_lossy(&chunk.payload).into_owned();
                    meta.xmp.set("XMP_Raw", text);
                    meta.xmp.set("XMP_Present", true);
                }
                CHUNK_ICCP => {
                    meta.custom.set("WebP:icc_profile", true);
                }
                CHUNK_ANIM => {
                    meta.custom.set("WebP:animated", true);
                }
                _ => {}
            }
        }

        log::info!("WebP READ: {}", path.display());
        Ok(meta)
    }

    fn write_metadata(&self, metadata: &ImageMetadata, output_path: Option<&Path>) -> Result<PathBuf> {
        let target = output_path.unwrap_or(&metadata.file_path);
        let data = fs::read(&metadata.file_path)?;
        let chunks = parse_riff(&data).map_err(|e| MetadataError::write("WebP", target, e))?;

        let exif = self.build_exif_bytes(metadata);
        let xmp = metadata.xmp.get_str("XMP_Raw");
        let out = self.rebuild(&chunks, exif, xmp)?;
        self.guarded_write(&metadata.file_path, target, &out, "write")
    }

    fn strip_metadata(&self, path: &Path, output_path: Option<&Path>, gps_only: bool) -> Result<PathBuf> {
        self.validate_file(path)?;
        if gps_only {
            log::warn!("WebP does not support selective GPS stripping; removing all metadata");
        }

        let target = output_path.unwrap_or(path);
        let data = fs::read(path)?;
        let chunks = parse_riff(&data).map_err(|e| MetadataError::write("WebP", target, e))?;

        // ICC color profiles are metadata too; the ICC flag bit goes with it.
        let without_icc: Vec<RiffChunk> = chunks
            .iter()
            .filter(|c| c.id != CHUNK_ICCP)
            .map(|c| {
                let mut chunk = (*c).clone();
                if chunk.id == CHUNK_VP8X {
                    if let Some(flags) = chunk.payload.first_mut() {
                        *flags &= !VP8X_FLAG_ICC;
                    }
                }
                chunk
            })
            .collect();

        let out = self.rebuild(&without_icc, None, None)?;
        self.guarded_write(path, target, &out, "strip")
    }
}

#[derive(Debug, Clone)]
struct RiffChunk {
    id: [u8; 4],
    payload: Vec<u8>,
}

/// Walk `id | size | payload | pad` records of a RIFF/WEBP container.
fn parse_riff(data: &[u8]) -> std::result::Result<Vec<RiffChunk>, String> {
    if data.len() < 12 || &data[..4] != b"RIFF" || &data[8..12] != b"WEBP" {
        return Err("invalid WebP RIFF header".into());
    }

    let mut chunks = Vec::new();
    let mut pos = 12;
    while pos + 8 <= data.len() {
        let id: [u8; 4] = data[pos..pos + 4].try_into().unwrap();
        let size = u32::from_le_bytes(data[pos + 4..pos + 8].try_into().unwrap()) as usize;
        let start = pos + 8;
        if start + size > data.len() {
            return Err(format!(
                "truncated {} chunk",
                String::from_utf8_lossy(&id)
            ));
        }
        chunks.push(RiffChunk {
            id,
            payload: data[start..start + size].to_vec(),
        });
        pos = start + size + (size % 2);
    }
    Ok(chunks)
}

/// Reassemble a RIFF/WEBP byte stream with a correct size field.
fn assemble_riff(chunks: &[RiffChunk]) -> Vec<u8> {
    let mut body = Vec::new();
    for chunk in chunks {
        body.extend_from_slice(&chunk.id);
        body.extend_from_slice(&(chunk.payload.len() as u32).to_le_bytes());
        body.extend_from_slice(&chunk.payload);
        if chunk.payload.len() % 2 == 1 {
            body.push(0);
        }
    }

    let mut out = Vec::with_capacity(body.len() + 12);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&((body.len() as u32 + 4).to_le_bytes()));
    out.extend_from_slice(b"WEBP");
    out.extend_from_slice(&body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{write_plain_webp, write_webp_with_exif};
    use tempfile::TempDir;

    fn adapter() -> WebpAdapter {
        WebpAdapter::new(Arc::new(FileSafetyManager::new()), IntegrityConfig::default())
    }

    // ── reading ──────────────────────────────────────────────────────

    #[test]
    fn reads_exif_chunk_tags() {
        let dir = TempDir::new().unwrap();
        let path = write_webp_with_exif(dir.path(), "a.webp");

        let meta = adapter().read_metadata(&path).unwrap();
        assert_eq!(meta.exif.get_str("Make"), Some("Canon"));
        assert_eq!(meta.exif.get_str("GPS:GPSLatitudeRef"), Some("N"));
        assert!(meta.has_gps_data());
    }

    #[test]
    fn plain_webp_reads_empty() {
        let dir = TempDir::new().unwrap();
        let path = write_plain_webp(dir.path(), "a.webp");
        let meta = adapter().read_metadata(&path).unwrap();
        assert!(!meta.has_metadata());
    }

    #[test]
    fn rejects_non_riff_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.webp");
        fs::write(&path, b"definitely not riff").unwrap();
        assert!(adapter().read_metadata(&path).is_err());
    }

    // ── stripping ────────────────────────────────────────────────────

    #[test]
    fn strip_removes_exif_and_preserves_pixels() {
        let dir = TempDir::new().unwrap();
        let path = write_webp_with_exif(dir.path(), "a.webp");
        let adapter = adapter();

        let hash_before = adapter.get_pixel_hash(&path);
        let out = dir.path().join("out.webp");
        adapter.strip_metadata(&path, Some(&out), false).unwrap();

        let meta = adapter.read_metadata(&out).unwrap();
        assert!(!meta.has_metadata());
        assert_eq!(adapter.get_pixel_hash(&out), hash_before);
    }

    #[test]
    fn strip_clears_vp8x_metadata_flags() {
        let dir = TempDir::new().unwrap();
        let path = write_webp_with_exif(dir.path(), "a.webp");
        let adapter = adapter();

        let out = dir.path().join("out.webp");
        adapter.strip_metadata(&path, Some(&out), false).unwrap();

        let chunks = parse_riff(&fs::read(&out).unwrap()).unwrap();
        let vp8x = chunks.iter().find(|c| c.id == CHUNK_VP8X).unwrap();
        assert_eq!(vp8x.payload[0] & (VP8X_FLAG_EXIF | VP8X_FLAG_XMP), 0);
        assert!(chunks.iter().all(|c| c.id != CHUNK_EXIF));
    }

    // ── writing ──────────────────────────────────────────────────────

    #[test]
    fn write_round_trips_xmp() {
        let dir = TempDir::new().unwrap();
        let path = write_webp_with_exif(dir.path(), "a.webp");
        let adapter = adapter();

        let mut meta = adapter.read_metadata(&path).unwrap();
        meta.xmp.set("XMP_Raw", "<x:xmpmeta>webp</x:xmpmeta>");
        let out = dir.path().join("out.webp");
        adapter.write_metadata(&meta, Some(&out)).unwrap();

        let reread = adapter.read_metadata(&out).unwrap();
        assert_eq!(reread.xmp.get_str("XMP_Raw"), Some("<x:xmpmeta>webp</x:xmpmeta>"));
        assert_eq!(reread.exif.get_str("Make"), Some("Canon"));
    }

    #[test]
    fn write_to_vp8x_less_file_skips_metadata() {
        let dir = TempDir::new().unwrap();
        let path = write_plain_webp(dir.path(), "a.webp");
        let adapter = adapter();

        let mut meta = adapter.read_metadata(&path).unwrap();
        meta.exif.set("Make", "Pentax");
        let out = dir.path().join("out.webp");
        // Write succeeds but the simple file cannot carry an EXIF chunk
        adapter.write_metadata(&meta, Some(&out)).unwrap();

        let reread = adapter.read_metadata(&out).unwrap();
        assert!(reread.exif.get("Make").is_none());
    }

    #[test]
    fn raw_exif_round_trips_as_hex() {
        let mut meta = ImageMetadata::new("a.webp", "WebP").unwrap();
        meta.exif.set("raw_exif", hex::encode(b"II*\0garbage"));
        let adapter = adapter();
        let bytes = adapter.build_exif_bytes(&meta).unwrap();
        assert_eq!(bytes, b"II*\0garbage");
    }

    // ── container plumbing ───────────────────────────────────────────

    #[test]
    fn riff_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = write_webp_with_exif(dir.path(), "a.webp");
        let data = fs::read(&path).unwrap();

        let chunks = parse_riff(&data).unwrap();
        let rebuilt = assemble_riff(&chunks);
        assert_eq!(rebuilt, data);
    }
}
