//! GIF adapter: comment extensions and animation parameters.
//!
//! GIF has no EXIF or XMP concept of its own — metadata is the GIF89a
//! comment extension, the NETSCAPE looping extension, and (rarely) an XMP
//! application extension. All operations here are block-level splices over
//! the container: pixel-bearing blocks (image descriptors, color tables,
//! LZW data) and frame timing are copied byte-for-byte, so animated files
//! keep every frame with no re-quantization.
//!
//! `gps_only` is accepted for interface compatibility and ignored — GIF has
//! no selective strip; everything is removed regardless.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapter::{MetadataAdapter, verify_lossless};
use crate::config::IntegrityConfig;
use crate::error::{MetadataError, Result};
use crate::metadata::ImageMetadata;
use crate::safety::FileSafetyManager;

const EXTENSION_INTRODUCER: u8 = 0x21;
const LABEL_PLAIN_TEXT: u8 = 0x01;
const LABEL_GCE: u8 = 0xF9;
const LABEL_COMMENT: u8 = 0xFE;
const LABEL_APPLICATION: u8 = 0xFF;
const IMAGE_SEPARATOR: u8 = 0x2C;
const TRAILER: u8 = 0x3B;

const NETSCAPE_ID: &[u8] = b"NETSCAPE2.0";
const XMP_APP_ID: &[u8] = b"XMP DataXMP";

#[derive(Debug)]
pub struct GifAdapter {
    safety: Arc<FileSafetyManager>,
    integrity: IntegrityConfig,
}

impl GifAdapter {
    pub fn new(safety: Arc<FileSafetyManager>, integrity: IntegrityConfig) -> Self {
        Self { safety, integrity }
    }

    fn splice(
        &self,
        data: &[u8],
        scan: &GifScan,
        drop_kind: impl Fn(&BlockKind) -> bool,
        insert_comment: Option<&str>,
    ) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        out.extend_from_slice(&data[..scan.body_start]);

        if let Some(comment) = insert_comment {
            out.push(EXTENSION_INTRODUCER);
            out.push(LABEL_COMMENT);
            for chunk in comment.as_bytes().chunks(255) {
                out.push(chunk.len() as u8);
                out.extend_from_slice(chunk);
            }
            out.push(0);
        }

        for block in &scan.blocks {
            if !drop_kind(&block.kind) {
                out.extend_from_slice(&data[block.span.clone()]);
            }
        }
        out
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
        log::info!("GIF {}: {}", op_name.to_uppercase(), written.display());
        Ok(written)
    }
}

impl MetadataAdapter for GifAdapter {
    fn supported_formats(&self) -> &'static [&'static str] {
        &["gif"]
    }

    fn format_name(&self) -> &'static str {
        "GIF"
    }

    fn read_metadata(&self, path: &Path) -> Result<ImageMetadata> {
        self.validate_file(path)?;

        let mut meta = ImageMetadata::new(path, "GIF")?;
        let stat = fs::metadata(path)?;
        meta.file_size = Some(stat.len());
        meta.last_modified = stat.modified().ok().map(Into::into);
        let hash = self.get_pixel_hash(path);
        meta.pixel_hash = (!hash.is_empty()).then_some(hash);

        let data = fs::read(path)?;
        let scan = scan_blocks(&data).map_err(|e| MetadataError::read("GIF", path, e))?;

        let mut frame_count = 0usize;
        let mut delays: Vec<u16> = Vec::new();
        for block in &scan.blocks {
            match &block.kind {
                BlockKind::Comment(text) => {
                    meta.custom.set("GIF:comment", text.clone());
                }
                BlockKind::Application { id, payload } => {
                    if id == NETSCAPE_ID {
                        // sub-block: 0x01, loop count u16le
                        if payload.len() >= 3 && payload[0] == 0x01 {
                            let loops = u16::from_le_bytes([payload[1], payload[2]]);
                            meta.custom.set("GIF:loop", loops);
                        }
                    } else if id == XMP_APP_ID {
                        let text = String::from_utf8_lossy(payload).into_owned();
                        meta.xmp.set("XMP_Raw", text);
                        meta.xmp.set("XMP_Present", true);
                    } else {
                        meta.custom.set(
                            format!("GIF:app:{}", String::from_utf8_lossy(id).trim_end()),
                            hex::encode(payload),
                        );
                    }
                }
                BlockKind::GraphicControl { delay_cs } => {
                    // Delay is stored in centiseconds; expose milliseconds
                    delays.push(*delay_cs);
                }
                BlockKind::Image => frame_count += 1,
                BlockKind::PlainText | BlockKind::Trailer => {}
            }
        }

        if frame_count > 1 {
            meta.custom.set("GIF:is_animated", true);
            meta.custom.set("GIF:n_frames", frame_count);
        }
        if let Some(delay) = delays.first() {
            meta.custom.set("GIF:duration", u64::from(*delay) * 10);
        }

        log::info!("GIF READ: {}", path.display());
        Ok(meta)
    }

    /// Writes the comment extension from `custom["GIF:comment"]`. Animation
    /// parameters and every pixel-bearing block are carried over unchanged;
    /// other custom keys cannot be serialized into a GIF and are ignored.
    fn write_metadata(&self, metadata: &ImageMetadata, output_path: Option<&Path>) -> Result<PathBuf> {
        let target = output_path.unwrap_or(&metadata.file_path);
        let data = fs::read(&metadata.file_path)?;
        let scan = scan_blocks(&data).map_err(|e| MetadataError::write("GIF", target, e))?;

        let comment = metadata.custom.get("GIF:comment").map(|v| match v.as_str() {
            Some(s) => s.to_string(),
            None => v.to_string(),
        });

        let out = self.splice(
            &data,
            &scan,
            |kind| matches!(kind, BlockKind::Comment(_)),
            comment.as_deref(),
        );
        self.guarded_write(&metadata.file_path, target, &out, "write")
    }

    fn strip_metadata(&self, path: &Path, output_path: Option<&Path>, gps_only: bool) -> Result<PathBuf> {
        self.validate_file(path)?;
        if gps_only {
            log::warn!("GIF does not support selective GPS stripping; removing all metadata");
        }

        let target = output_path.unwrap_or(path);
        let data = fs::read(path)?;
        let scan = scan_blocks(&data).map_err(|e| MetadataError::write("GIF", target, e))?;

        // Comments, plain-text captions, and application extensions go;
        // NETSCAPE stays so animations keep looping.
        let out = self.splice(
            &data,
            &scan,
            |kind| match kind {
                BlockKind::Comment(_) | BlockKind::PlainText => true,
                BlockKind::Application { id, .. } => id != NETSCAPE_ID,
                _ => false,
            },
            None,
        );
        self.guarded_write(path, target, &out, "strip")
    }
}

enum BlockKind {
    Comment(String),
    Application { id: Vec<u8>, payload: Vec<u8> },
    GraphicControl { delay_cs: u16 },
    PlainText,
    Image,
    Trailer,
}

struct ScannedBlock {
    span: Range<usize>,
    kind: BlockKind,
}

struct GifScan {
    /// Offset just past the header, logical screen descriptor, and global
    /// color table — the earliest point an extension block may appear.
    body_start: usize,
    blocks: Vec<ScannedBlock>,
}

/// Walk the GIF87a/89a block structure.
fn scan_blocks(data: &[u8]) -> std::result::Result<GifScan, String> {
    if data.len() < 13 || (&data[..6] != b"GIF87a" && &data[..6] != b"GIF89a") {
        return Err("invalid GIF signature".into());
    }

    let mut pos = 13;
    let packed = data[10];
    if packed & 0x80 != 0 {
        pos += 3usize << ((packed & 0x07) + 1);
    }
    if pos > data.len() {
        return Err("truncated global color table".into());
    }

    let body_start = pos;
    let mut blocks = Vec::new();

    while pos < data.len() {
        let start = pos;
        match data[pos] {
            EXTENSION_INTRODUCER => {
                let label = *data.get(pos + 1).ok_or("truncated extension block")?;
                pos += 2;
                match label {
                    LABEL_COMMENT => {
                        let (payload, next) = read_subblocks(data, pos)?;
                        let text = payload.iter().map(|&b| b as char).collect();
                        pos = next;
                        blocks.push(ScannedBlock {
                            span: start..pos,
                            kind: BlockKind::Comment(text),
                        });
                    }
                    LABEL_GCE => {
                        let size = *data.get(pos).ok_or("truncated GCE")? as usize;
                        if pos + 1 + size + 1 > data.len() {
                            return Err("truncated GCE".into());
                        }
                        let delay_cs = if size >= 3 {
                            u16::from_le_bytes([data[pos + 2], data[pos + 3]])
                        } else {
                            0
                        };
                        pos += 1 + size + 1; // size byte + payload + terminator
                        blocks.push(ScannedBlock {
                            span: start..pos,
                            kind: BlockKind::GraphicControl { delay_cs },
                        });
                    }
                    LABEL_APPLICATION => {
                        let id_len = *data.get(pos).ok_or("truncated application block")? as usize;
                        if pos + 1 + id_len > data.len() {
                            return Err("truncated application block".into());
                        }
                        let id = data[pos + 1..pos + 1 + id_len].to_vec();
                        let (payload, next) = read_subblocks(data, pos + 1 + id_len)?;
                        pos = next;
                        blocks.push(ScannedBlock {
                            span: start..pos,
                            kind: BlockKind::Application { id, payload },
                        });
                    }
                    LABEL_PLAIN_TEXT => {
                        let header = *data.get(pos).ok_or("truncated plain text block")? as usize;
                        let (_, next) = read_subblocks(data, pos + 1 + header)?;
                        pos = next;
                        blocks.push(ScannedBlock {
                            span: start..pos,
                            kind: BlockKind::PlainText,
                        });
                    }
                    _ => {
                        // Unknown extension: skip its sub-block chain
                        let (_, next) = read_subblocks(data, pos)?;
                        pos = next;
                    }
                }
            }
            IMAGE_SEPARATOR => {
                if pos + 10 > data.len() {
                    return Err("truncated image descriptor".into());
                }
                let packed = data[pos + 9];
                pos += 10;
                if packed & 0x80 != 0 {
                    pos += 3usize << ((packed & 0x07) + 1);
                }
                // LZW minimum code size byte, then the data sub-blocks
                pos += 1;
                let (_, next) = read_subblocks(data, pos)?;
                pos = next;
                blocks.push(ScannedBlock {
                    span: start..pos,
                    kind: BlockKind::Image,
                });
            }
            TRAILER => {
                pos += 1;
                blocks.push(ScannedBlock {
                    span: start..pos,
                    kind: BlockKind::Trailer,
                });
                break;
            }
            other => return Err(format!("unexpected block introducer 0x{other:02X}")),
        }
    }

    Ok(GifScan { body_start, blocks })
}

/// Concatenate a sub-block chain, returning the payload and the offset just
/// past the terminator.
fn read_subblocks(data: &[u8], mut pos: usize) -> std::result::Result<(Vec<u8>, usize), String> {
    let mut payload = Vec::new();
    loop {
        let len = *data.get(pos).ok_or("truncated sub-block chain")? as usize;
        pos += 1;
        if len == 0 {
            return Ok((payload, pos));
        }
        if pos + len > data.len() {
            return Err("truncated sub-block".into());
        }
        payload.extend_from_slice(&data[pos..pos + len]);
        pos += len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{write_gif_with_comment, write_plain_gif};
    use tempfile::TempDir;

    fn adapter() -> GifAdapter {
        GifAdapter::new(Arc::new(FileSafetyManager::new()), IntegrityConfig::default())
    }

    // ── reading ──────────────────────────────────────────────────────

    #[test]
    fn reads_comment_extension() {
        let dir = TempDir::new().unwrap();
        let path = write_gif_with_comment(dir.path(), "a.gif", "made with sweeptest");

        let meta = adapter().read_metadata(&path).unwrap();
        assert_eq!(meta.custom.get_str("GIF:comment"), Some("made with sweeptest"));
        assert!(meta.has_metadata());
    }

    #[test]
    fn plain_gif_has_no_comment() {
        let dir = TempDir::new().unwrap();
        let path = write_plain_gif(dir.path(), "a.gif");
        let meta = adapter().read_metadata(&path).unwrap();
        assert!(meta.custom.get("GIF:comment").is_none());
    }

    #[test]
    fn rejects_non_gif_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.gif");
        fs::write(&path, b"nope").unwrap();
        assert!(adapter().read_metadata(&path).is_err());
    }

    // ── stripping ────────────────────────────────────────────────────

    #[test]
    fn strip_removes_comment_and_preserves_pixels() {
        let dir = TempDir::new().unwrap();
        let path = write_gif_with_comment(dir.path(), "a.gif", "secret note");
        let adapter = adapter();

        let hash_before = adapter.get_pixel_hash(&path);
        let out = dir.path().join("out.gif");
        adapter.strip_metadata(&path, Some(&out), false).unwrap();

        let meta = adapter.read_metadata(&out).unwrap();
        assert!(meta.custom.get("GIF:comment").is_none());
        assert_eq!(adapter.get_pixel_hash(&out), hash_before);
    }

    #[test]
    fn gps_only_still_strips_everything() {
        let dir = TempDir::new().unwrap();
        let path = write_gif_with_comment(dir.path(), "a.gif", "note");
        let adapter = adapter();

        let out = dir.path().join("out.gif");
        adapter.strip_metadata(&path, Some(&out), true).unwrap();
        assert!(adapter.read_metadata(&out).unwrap().custom.get("GIF:comment").is_none());
    }

    // ── writing ──────────────────────────────────────────────────────

    #[test]
    fn write_replaces_comment() {
        let dir = TempDir::new().unwrap();
        let path = write_gif_with_comment(dir.path(), "a.gif", "old comment");
        let adapter = adapter();

        let mut meta = adapter.read_metadata(&path).unwrap();
        meta.custom.set("GIF:comment", "new comment");
        let out = dir.path().join("out.gif");
        adapter.write_metadata(&meta, Some(&out)).unwrap();

        let reread = adapter.read_metadata(&out).unwrap();
        assert_eq!(reread.custom.get_str("GIF:comment"), Some("new comment"));
    }

    #[test]
    fn write_without_comment_drops_existing() {
        let dir = TempDir::new().unwrap();
        let path = write_gif_with_comment(dir.path(), "a.gif", "old");
        let adapter = adapter();

        let mut meta = adapter.read_metadata(&path).unwrap();
        meta.custom.remove("GIF:comment");
        let out = dir.path().join("out.gif");
        adapter.write_metadata(&meta, Some(&out)).unwrap();

        assert!(adapter.read_metadata(&out).unwrap().custom.get("GIF:comment").is_none());
    }

    // ── scanner ──────────────────────────────────────────────────────

    #[test]
    fn scanner_sees_one_frame_in_minimal_gif() {
        let scan = scan_blocks(crate::test_fixtures::MINIMAL_GIF).unwrap();
        let frames = scan
            .blocks
            .iter()
            .filter(|b| matches!(b.kind, BlockKind::Image))
            .count();
        assert_eq!(frames, 1);
        assert!(scan.blocks.iter().any(|b| matches!(b.kind, BlockKind::Trailer)));
    }

    #[test]
    fn scanner_rejects_truncated_data() {
        assert!(scan_blocks(&crate::test_fixtures::MINIMAL_GIF[..10]).is_err());
    }
}
