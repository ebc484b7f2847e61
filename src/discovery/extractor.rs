//! Raw container walkers for forensic inspection.
//!
//! Unlike the adapters, the extractor records *every* chunk or segment it
//! encounters — including types the normalized model never surfaces — and
//! never writes anything back. Built on top of the engine for the
//! normalized cross-reference view.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::engine::MetadataEngine;
use crate::error::Result;

use super::models::{Confidence, ExtractedMetadata, MAX_RAW_CAPTURE, PlatformMatch, RawChunk};

/// Substring indicators for producing-platform classification.
const PLATFORM_INDICATORS: &[(&str, &str, &str, Confidence)] = &[
    // (field-path fragment, platform id, platform name, confidence)
    ("tEXt:parameters", "stable_diffusion", "Stable Diffusion", Confidence::High),
    ("iTXt:parameters", "stable_diffusion", "Stable Diffusion", Confidence::High),
    ("tEXt:workflow", "comfyui", "ComfyUI", Confidence::High),
    ("tEXt:prompt", "comfyui", "ComfyUI", Confidence::Medium),
    ("Midjourney", "midjourney", "Midjourney", Confidence::Medium),
    ("DALL-E", "dalle", "DALL-E", Confidence::Medium),
];

/// Walks raw container structure and classifies the producing platform.
pub struct MetadataExtractor<'a> {
    engine: &'a MetadataEngine,
}

impl<'a> MetadataExtractor<'a> {
    pub fn new(engine: &'a MetadataEngine) -> Self {
        Self { engine }
    }

    /// Extract the complete raw view of `path`.
    pub fn extract_all(&self, path: &Path) -> Result<ExtractedMetadata> {
        let standard = self.engine.read_metadata(path)?;
        let file_size = fs::metadata(path)?.len();
        let data = fs::read(path)?;

        let mut raw_chunks = Vec::new();
        let mut custom_fields = BTreeMap::new();
        let mut errors = Vec::new();

        let walk = match standard.format.as_str() {
            "PNG" => walk_png(&data, &mut raw_chunks, &mut custom_fields),
            "JPEG" => walk_jpeg(&data, &mut raw_chunks, &mut custom_fields),
            "WebP" => walk_webp(&data, &mut raw_chunks, &mut custom_fields),
            other => {
                log::debug!("No raw walker for {other}; standard metadata only");
                Ok(())
            }
        };
        if let Err(e) = walk {
            errors.push(format!("error extracting raw chunks: {e}"));
        }

        Ok(ExtractedMetadata {
            file_path: path.to_path_buf(),
            file_format: standard.format.clone(),
            file_size,
            standard_metadata: standard,
            raw_chunks,
            custom_fields,
            extraction_errors: errors,
        })
    }

    /// Classify the producing platform from decoded field paths and text.
    pub fn classify(&self, extracted: &ExtractedMetadata) -> PlatformMatch {
        let mut best: Option<PlatformMatch> = None;

        for (needle, id, name, confidence) in PLATFORM_INDICATORS {
            let matched: Vec<String> = extracted
                .custom_fields
                .iter()
                .filter(|(key, value)| key.contains(needle) || value.contains(needle))
                .map(|(key, _)| key.clone())
                .collect();
            if matched.is_empty() {
                continue;
            }

            let better = match &best {
                None => true,
                Some(current) => rank(*confidence) > rank(current.confidence),
            };
            if better {
                best = Some(PlatformMatch {
                    platform_id: (*id).to_string(),
                    platform_name: (*name).to_string(),
                    confidence: *confidence,
                    matched_indicators: matched,
                });
            }
        }

        best.unwrap_or_else(PlatformMatch::unknown)
    }
}

fn rank(confidence: Confidence) -> u8 {
    match confidence {
        Confidence::High => 3,
        Confidence::Medium => 2,
        Confidence::Low => 1,
        Confidence::Unknown => 0,
    }
}

fn capture(data: &[u8]) -> Vec<u8> {
    data[..data.len().min(MAX_RAW_CAPTURE)].to_vec()
}

fn printable(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| !c.is_control() || c == '\n' || c == '\r' || c == '\t')
}

/// Every PNG chunk, with decoded text for the text chunk types.
fn walk_png(
    data: &[u8],
    chunks: &mut Vec<RawChunk>,
    fields: &mut BTreeMap<String, String>,
) -> std::result::Result<(), String> {
    if data.len() < 8 || data[..8] != crate::adapters::png::PNG_SIGNATURE {
        return Err("invalid PNG signature".into());
    }

    let mut pos = 8;
    while pos + 8 <= data.len() {
        let length =
            u32::from_be_bytes(data[pos..pos + 4].try_into().map_err(|_| "bad length")?) as usize;
        let chunk_type = String::from_utf8_lossy(&data[pos + 4..pos + 8]).into_owned();
        let start = pos + 8;
        if start + length + 4 > data.len() {
            return Err(format!("truncated {chunk_type} chunk"));
        }
        let payload = &data[start..start + length];

        let mut chunk = RawChunk {
            chunk_type: format!("PNG:{chunk_type}"),
            offset: pos,
            length,
            raw_data: capture(payload),
            decoded_text: None,
        };

        if matches!(chunk_type.as_str(), "tEXt" | "iTXt" | "zTXt") {
            if let Some(null_pos) = payload.iter().position(|&b| b == 0) {
                let keyword: String = payload[..null_pos].iter().map(|&b| b as char).collect();
                let text = String::from_utf8_lossy(&payload[null_pos + 1..]).into_owned();
                chunk.decoded_text = Some(format!("{keyword}: {text}"));
                fields.insert(format!("PNG:{chunk_type}:{keyword}"), text);
            }
        }

        let done = chunk_type == "IEND";
        chunks.push(chunk);
        pos = start + length + 4;
        if done {
            break;
        }
    }
    Ok(())
}

/// Every JPEG segment, including all APPn markers and COM.
fn walk_jpeg(
    data: &[u8],
    chunks: &mut Vec<RawChunk>,
    fields: &mut BTreeMap<String, String>,
) -> std::result::Result<(), String> {
    if data.len() < 2 || data[..2] != [0xFF, 0xD8] {
        return Err("invalid JPEG signature".into());
    }

    let mut pos = 2;
    while pos + 2 <= data.len() {
        if data[pos] != 0xFF {
            break;
        }
        let marker = data[pos + 1];

        // EOI or the start of entropy-coded data ends the segment walk
        if marker == 0xD9 || marker == 0xDA {
            break;
        }
        // RST markers and padding carry no length
        if (0xD0..=0xD8).contains(&marker) || marker == 0xFF {
            pos += 2;
            continue;
        }
        if pos + 4 > data.len() {
            break;
        }

        let length =
            u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if length < 2 || pos + 2 + length > data.len() {
            return Err(format!("truncated segment 0x{marker:02X}"));
        }
        let payload = &data[pos + 4..pos + 2 + length];

        let segment_type = if (0xE0..=0xEF).contains(&marker) {
            format!("JPEG:APP{}", marker - 0xE0)
        } else if marker == 0xFE {
            "JPEG:COM".to_string()
        } else {
            format!("JPEG:0x{marker:02X}")
        };

        let mut chunk = RawChunk {
            chunk_type: segment_type,
            offset: pos,
            length: payload.len(),
            raw_data: capture(payload),
            decoded_text: None,
        };

        let decoded = String::from_utf8_lossy(payload).into_owned();
        if printable(&decoded) {
            chunk.decoded_text = Some(decoded.clone());
        }
        if marker == 0xFE {
            fields.insert("JPEG:Comment".into(), decoded);
        }

        chunks.push(chunk);
        pos += 2 + length;
    }
    Ok(())
}

/// Every WebP RIFF sub-chunk.
fn walk_webp(
    data: &[u8],
    chunks: &mut Vec<RawChunk>,
    fields: &mut BTreeMap<String, String>,
) -> std::result::Result<(), String> {
    if data.len() < 12 || &data[..4] != b"RIFF" || &data[8..12] != b"WEBP" {
        return Err("invalid WebP RIFF header".into());
    }

    let mut pos = 12;
    while pos + 8 <= data.len() {
        let id = String::from_utf8_lossy(&data[pos..pos + 4]).into_owned();
        let size = u32::from_le_bytes(data[pos + 4..pos + 8].try_into().map_err(|_| "bad size")?)
            as usize;
        let start = pos + 8;
        if start + size > data.len() {
            return Err(format!("truncated {id} chunk"));
        }
        let payload = &data[start..start + size];

        let mut chunk = RawChunk {
            chunk_type: format!("WebP:{id}"),
            offset: pos,
            length: size,
            raw_data: capture(payload),
            decoded_text: None,
        };
        if id == "XMP " {
            let text = String::from_utf8_lossy(payload).into_owned();
            fields.insert("WebP:XMP".into(), text.clone());
            chunk.decoded_text = Some(text);
        }

        chunks.push(chunk);
        pos = start + size + (size % 2);
    }
    Ok(())
}
