//! PNG adapter: `tEXt`/`iTXt`/`zTXt` chunks and embedded XMP.
//!
//! Reading walks the chunk stream directly at the byte level — the generic
//! decoder does not surface every chunk type. Writing re-emits the container
//! through the `png` encoder with the pixel-bearing chunks carried over
//! byte-for-byte (same color type, bit depth, palette, and transparency) and
//! a rebuilt text-chunk set. Ancillary chunks the model does not round-trip
//! (ICC profiles, APNG control chunks) are dropped on write; PNG is lossless,
//! so the integrity gate is exact pixel-hash equality.

use flate2::read::ZlibDecoder;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapter::{MetadataAdapter, verify_lossless};
use crate::config::IntegrityConfig;
use crate::error::{MetadataError, Result};
use crate::metadata::ImageMetadata;
use crate::safety::FileSafetyManager;

pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// XMP-bearing iTXt/tEXt keywords, matched case-insensitively.
const XMP_KEYWORDS: &[&str] = &["xml:com.adobe.xmp", "xmp"];

#[derive(Debug)]
pub struct PngAdapter {
    safety: Arc<FileSafetyManager>,
    integrity: IntegrityConfig,
}

impl PngAdapter {
    pub fn new(safety: Arc<FileSafetyManager>, integrity: IntegrityConfig) -> Self {
        Self { safety, integrity }
    }

    /// Walk the raw chunk stream, capturing text chunks into `meta`.
    fn read_chunks(&self, data: &[u8], meta: &mut ImageMetadata) -> Result<()> {
        if data.len() < PNG_SIGNATURE.len() || data[..8] != PNG_SIGNATURE {
            return Err(MetadataError::read(
                "PNG",
                &meta.file_path,
                "invalid PNG signature",
            ));
        }

        for chunk in PngChunkIter::new(&data[8..]) {
            match &chunk.chunk_type {
                b"tEXt" => self.capture_text(chunk.data, meta),
                b"iTXt" => self.capture_itxt(chunk.data, meta),
                b"zTXt" => self.capture_ztxt(chunk.data, meta),
                b"IEND" => break,
                _ => {}
            }
        }
        Ok(())
    }

    fn capture_text(&self, data: &[u8], meta: &mut ImageMetadata) {
        let Some(null_pos) = data.iter().position(|&b| b == 0) else {
            return;
        };
        let keyword = latin1(&data[..null_pos]);
        let text = latin1(&data[null_pos + 1..]);
        log::debug!("Found tEXt chunk: {keyword}");
        self.mirror_xmp(&keyword, &text, meta);
        meta.custom.set(format!("tEXt:{keyword}"), text);
    }

    fn capture_itxt(&self, data: &[u8], meta: &mut ImageMetadata) {
        // keyword \0 compression_flag compression_method language \0 translated \0 text
        let Some(kw_end) = data.iter().position(|&b| b == 0) else {
            return;
        };
        let keyword = latin1(&data[..kw_end]);
        let rest = &data[kw_end + 1..];
        if rest.len() < 2 {
            return;
        }
        let compressed = rest[0] == 0x01;
        let rest = &rest[2..]; // skip compression flag + method

        let Some(lang_end) = rest.iter().position(|&b| b == 0) else {
            return;
        };
        let language = String::from_utf8_lossy(&rest[..lang_end]).into_owned();
        let rest = &rest[lang_end + 1..];

        let Some(trans_end) = rest.iter().position(|&b| b == 0) else {
            return;
        };
        let text_data = &rest[trans_end + 1..];

        let text = if compressed {
            match inflate(text_data) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    log::debug!("Failed to decompress iTXt chunk {keyword}: {e}");
                    return;
                }
            }
        } else {
            String::from_utf8_lossy(text_data).into_owned()
        };

        self.mirror_xmp(&keyword, &text, meta);

        let mut key = format!("iTXt:{keyword}");
        if !language.is_empty() {
            key.push_str(&format!("[{language}]"));
        }
        meta.custom.set(key, text);
    }

    fn capture_ztxt(&self, data: &[u8], meta: &mut ImageMetadata) {
        // keyword \0 compression_method compressed_text
        let Some(null_pos) = data.iter().position(|&b| b == 0) else {
            return;
        };
        let keyword = latin1(&data[..null_pos]);
        if data.len() <= null_pos + 2 {
            return;
        }
        match inflate(&data[null_pos + 2..]) {
            Ok(bytes) => {
                let text = latin1(&bytes);
                meta.custom.set(format!("zTXt:{keyword}"), text);
            }
            Err(e) => log::debug!("Failed to decompress zTXt chunk {keyword}: {e}"),
        }
    }

    fn mirror_xmp(&self, keyword: &str, text: &str, meta: &mut ImageMetadata) {
        if XMP_KEYWORDS.contains(&keyword.to_lowercase().as_str()) {
            meta.xmp.set("XMP_Raw", text);
            meta.xmp.set("XMP_Present", true);
        }
    }

    /// Secondary pass through the generic decoder's text lists; raw-chunk
    /// data wins on conflict.
    fn read_decoder_text(&self, path: &Path, meta: &mut ImageMetadata) {
        let Ok(file) = File::open(path) else { return };
        let decoder = png::Decoder::new(BufReader::new(file));
        let Ok(reader) = decoder.read_info() else {
            return;
        };
        let info = reader.info();

        for chunk in &info.uncompressed_latin1_text {
            if meta.custom.get(&format!("tEXt:{}", chunk.keyword)).is_none() {
                meta.custom
                    .set(format!("PNG:{}", chunk.keyword), chunk.text.clone());
            }
        }
        for chunk in &info.compressed_latin1_text {
            if meta.custom.get(&format!("zTXt:{}", chunk.keyword)).is_none() {
                if let Ok(text) = chunk.get_text() {
                    meta.custom.set(format!("PNG:{}", chunk.keyword), text);
                }
            }
        }
        for chunk in &info.utf8_text {
            let already = meta
                .custom
                .keys()
                .any(|k| k.starts_with(&format!("iTXt:{}", chunk.keyword)));
            if !already {
                if let Ok(text) = chunk.get_text() {
                    meta.custom.set(format!("PNG:{}", chunk.keyword), text);
                }
            }
        }
    }

    /// Re-emit the container at `dest` with the given text chunks, carrying
    /// the pixel chunks over unchanged.
    fn reencode(
        &self,
        source: &Path,
        dest: &Path,
        text_chunks: &[(String, String)],
        xmp: Option<&str>,
    ) -> Result<()> {
        let wrap = |e: &dyn std::fmt::Display| MetadataError::write("PNG", dest, e);

        let file = File::open(source)?;
        let mut decoder = png::Decoder::new(BufReader::new(file));
        decoder.set_transformations(png::Transformations::IDENTITY);
        let mut reader = decoder.read_info().map_err(|e| wrap(&e))?;
        let mut buf = vec![0u8; reader.output_buffer_size()];
        let frame = reader.next_frame(&mut buf).map_err(|e| wrap(&e))?;
        let pixels = &buf[..frame.buffer_size()];

        let palette = reader.info().palette.as_ref().map(|p| p.to_vec());
        let trns = reader.info().trns.as_ref().map(|t| t.to_vec());

        let out = File::create(dest)?;
        let mut encoder = png::Encoder::new(BufWriter::new(out), frame.width, frame.height);
        encoder.set_color(frame.color_type);
        encoder.set_depth(frame.bit_depth);
        if let Some(palette) = palette {
            encoder.set_palette(palette);
        }
        if let Some(trns) = trns {
            encoder.set_trns(trns);
        }

        for (keyword, text) in text_chunks {
            encoder
                .add_text_chunk(keyword.clone(), text.clone())
                .map_err(|e| wrap(&e))?;
        }
        if let Some(xmp) = xmp {
            encoder
                .add_itxt_chunk("XML:com.adobe.xmp".into(), xmp.into())
                .map_err(|e| wrap(&e))?;
        }

        let mut writer = encoder.write_header().map_err(|e| wrap(&e))?;
        writer.write_image_data(pixels).map_err(|e| wrap(&e))?;
        writer.finish().map_err(|e| wrap(&e))?;
        Ok(())
    }

    /// Rebuild the outgoing text-chunk set from the `custom` block.
    fn build_text_chunks(&self, meta: &ImageMetadata) -> Vec<(String, String)> {
        let mut chunks = Vec::new();
        for (key, value) in meta.custom.iter() {
            let bare = strip_chunk_prefix(key);
            let keyword = sanitize_keyword(bare);
            if keyword.is_empty() {
                log::debug!("Skipping text chunk with unusable keyword: {key}");
                continue;
            }
            let text = match value.as_str() {
                Some(s) => s.to_string(),
                None => value.to_string(),
            };
            chunks.push((keyword, text));
        }
        chunks
    }
}

impl MetadataAdapter for PngAdapter {
    fn supported_formats(&self) -> &'static [&'static str] {
        &["png"]
    }

    fn format_name(&self) -> &'static str {
        "PNG"
    }

    fn read_metadata(&self, path: &Path) -> Result<ImageMetadata> {
        self.validate_file(path)?;

        let mut meta = ImageMetadata::new(path, "PNG")?;
        let stat = fs::metadata(path)?;
        meta.file_size = Some(stat.len());
        meta.last_modified = stat.modified().ok().map(Into::into);
        let hash = self.get_pixel_hash(path);
        meta.pixel_hash = (!hash.is_empty()).then_some(hash);

        let data = fs::read(path)?;
        self.read_chunks(&data, &mut meta)?;
        self.read_decoder_text(path, &mut meta);

        log::info!("PNG READ: {}", path.display());
        Ok(meta)
    }

    fn write_metadata(&self, metadata: &ImageMetadata, output_path: Option<&Path>) -> Result<PathBuf> {
        let target = output_path.unwrap_or(&metadata.file_path);

        let chunks = self.build_text_chunks(metadata);
        let xmp = metadata.xmp.get_str("XMP_Raw").map(String::from);

        let op = self.safety.begin_safe_operation(target, false)?;
        self.reencode(&metadata.file_path, op.temp_path(), &chunks, xmp.as_deref())?;

        if !verify_lossless(self.integrity.strategy, &metadata.file_path, op.temp_path()) {
            return Err(MetadataError::PixelCorruption {
                path: target.to_path_buf(),
                message: "pixel data changed during metadata write".into(),
            });
        }

        let written = op.commit()?;
        log::info!("PNG WRITE: {}", written.display());
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
        let op = self.safety.begin_safe_operation(target, false)?;
        self.reencode(path, op.temp_path(), &[], None)?;

        if !verify_lossless(self.integrity.strategy, path, op.temp_path()) {
            return Err(MetadataError::PixelCorruption {
                path: target.to_path_buf(),
                message: "pixel data changed during metadata strip".into(),
            });
        }

        let written = op.commit()?;
        log::info!("PNG STRIP: {}", written.display());
        Ok(written)
    }
}

/// Iterator over `length | type | data | crc` records.
struct PngChunkIter<'a> {
    data: &'a [u8],
    pos: usize,
}

struct PngChunk<'a> {
    chunk_type: [u8; 4],
    data: &'a [u8],
}

impl<'a> PngChunkIter<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for PngChunkIter<'a> {
    type Item = PngChunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + 8 > self.data.len() {
            return None;
        }
        let length = u32::from_be_bytes(self.data[self.pos..self.pos + 4].try_into().ok()?) as usize;
        let chunk_type: [u8; 4] = self.data[self.pos + 4..self.pos + 8].try_into().ok()?;
        let data_start = self.pos + 8;
        if data_start + length + 4 > self.data.len() {
            return None;
        }
        let payload = &self.data[data_start..data_start + length];

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.data[self.pos + 4..data_start + length]);
        let stored = u32::from_be_bytes(
            self.data[data_start + length..data_start + length + 4]
                .try_into()
                .ok()?,
        );
        if hasher.finalize() != stored {
            log::debug!(
                "CRC mismatch in {} chunk",
                String::from_utf8_lossy(&chunk_type)
            );
        }

        self.pos = data_start + length + 4;
        Some(PngChunk {
            chunk_type,
            data: payload,
        })
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn inflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

fn strip_chunk_prefix(key: &str) -> &str {
    for prefix in ["tEXt:", "zTXt:", "PNG:"] {
        if let Some(rest) = key.strip_prefix(prefix) {
            return rest;
        }
    }
    if let Some(rest) = key.strip_prefix("iTXt:") {
        // Drop a trailing language tag: "Comment[en]" -> "Comment"
        return rest.split('[').next().unwrap_or(rest);
    }
    key
}

/// PNG keywords: printable ASCII 32–126, 1–79 characters.
fn sanitize_keyword(keyword: &str) -> String {
    let cleaned: String = keyword
        .chars()
        .filter(|c| (' '..='~').contains(c))
        .collect();
    cleaned.chars().take(79).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{write_plain_png, write_png_with_text};
    use tempfile::TempDir;

    fn adapter() -> PngAdapter {
        PngAdapter::new(Arc::new(FileSafetyManager::new()), IntegrityConfig::default())
    }

    // ── reading ──────────────────────────────────────────────────────

    #[test]
    fn reads_text_chunks() {
        let dir = TempDir::new().unwrap();
        let path = write_png_with_text(
            dir.path(),
            "a.png",
            &[("Author", "someone"), ("Comment", "hello world")],
        );

        let meta = adapter().read_metadata(&path).unwrap();
        assert_eq!(meta.custom.get_str("tEXt:Author"), Some("someone"));
        assert_eq!(meta.custom.get_str("tEXt:Comment"), Some("hello world"));
        assert!(meta.file_size.is_some());
        assert!(meta.pixel_hash.is_some());
    }

    #[test]
    fn plain_png_has_no_metadata() {
        let dir = TempDir::new().unwrap();
        let path = write_plain_png(dir.path(), "a.png");
        let meta = adapter().read_metadata(&path).unwrap();
        assert!(!meta.has_metadata());
    }

    #[test]
    fn rejects_non_png_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.png");
        fs::write(&path, b"definitely not a png").unwrap();
        assert!(adapter().read_metadata(&path).is_err());
    }

    // ── stripping ────────────────────────────────────────────────────

    #[test]
    fn strip_removes_chunks_and_preserves_pixels() {
        let dir = TempDir::new().unwrap();
        let path = write_png_with_text(dir.path(), "a.png", &[("Software", "sweeptest")]);
        let adapter = adapter();

        let hash_before = adapter.get_pixel_hash(&path);
        let out = dir.path().join("out.png");
        adapter.strip_metadata(&path, Some(&out), false).unwrap();

        let meta = adapter.read_metadata(&out).unwrap();
        assert!(!meta.has_metadata());
        assert_eq!(adapter.get_pixel_hash(&out), hash_before);
    }

    #[test]
    fn gps_only_strip_keeps_other_chunks() {
        let dir = TempDir::new().unwrap();
        let path = write_png_with_text(
            dir.path(),
            "a.png",
            &[("GPSLocation", "40.7,-74.0"), ("Author", "someone")],
        );
        let adapter = adapter();

        let out = dir.path().join("out.png");
        adapter.strip_metadata(&path, Some(&out), true).unwrap();

        let meta = adapter.read_metadata(&out).unwrap();
        assert!(!meta.has_gps_data());
        assert!(meta.custom.keys().any(|k| k.contains("Author")));
    }

    #[test]
    fn strip_in_place_overwrites_original() {
        let dir = TempDir::new().unwrap();
        let path = write_png_with_text(dir.path(), "a.png", &[("Comment", "x")]);
        let adapter = adapter();

        adapter.strip_metadata(&path, None, false).unwrap();
        assert!(!adapter.read_metadata(&path).unwrap().has_metadata());
    }

    // ── writing ──────────────────────────────────────────────────────

    #[test]
    fn write_round_trips_custom_block() {
        let dir = TempDir::new().unwrap();
        let path = write_plain_png(dir.path(), "a.png");
        let adapter = adapter();

        let mut meta = adapter.read_metadata(&path).unwrap();
        meta.custom.set("tEXt:Title", "sunset");
        let out = dir.path().join("out.png");
        adapter.write_metadata(&meta, Some(&out)).unwrap();

        let reread = adapter.read_metadata(&out).unwrap();
        assert_eq!(reread.custom.get_str("tEXt:Title"), Some("sunset"));
    }

    #[test]
    fn write_carries_xmp_into_itxt() {
        let dir = TempDir::new().unwrap();
        let path = write_plain_png(dir.path(), "a.png");
        let adapter = adapter();

        let mut meta = adapter.read_metadata(&path).unwrap();
        meta.xmp.set("XMP_Raw", "<x:xmpmeta>test</x:xmpmeta>");
        let out = dir.path().join("out.png");
        adapter.write_metadata(&meta, Some(&out)).unwrap();

        let reread = adapter.read_metadata(&out).unwrap();
        assert_eq!(reread.xmp.get_str("XMP_Raw"), Some("<x:xmpmeta>test</x:xmpmeta>"));
        assert_eq!(reread.xmp.get("XMP_Present"), Some(&serde_json::Value::Bool(true)));
    }

    // ── keyword handling ─────────────────────────────────────────────

    #[test]
    fn keyword_sanitization() {
        assert_eq!(sanitize_keyword("Comment"), "Comment");
        assert_eq!(sanitize_keyword("Weird\u{7f}Key\n"), "WeirdKey");
        let long = "x".repeat(100);
        assert_eq!(sanitize_keyword(&long).len(), 79);
    }

    #[test]
    fn prefix_stripping() {
        assert_eq!(strip_chunk_prefix("tEXt:Comment"), "Comment");
        assert_eq!(strip_chunk_prefix("iTXt:Comment[en]"), "Comment");
        assert_eq!(strip_chunk_prefix("PNG:Software"), "Software");
        assert_eq!(strip_chunk_prefix("Unprefixed"), "Unprefixed");
    }
}
