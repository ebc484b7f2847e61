//! Test-only builders for tiny synthetic image files.
//!
//! Fixtures are generated in temp directories rather than checked in, so
//! every test starts from a known byte layout.

#![cfg(test)]

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};

/// Canonical 1×1 GIF89a (2-entry global color table, one GCE, one frame).
pub const MINIMAL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, // "GIF89a"
    0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, // LSD: 1x1, GCT of 2
    0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, // color table
    0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, // graphic control ext
    0x2C, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, // image desc
    0x02, 0x02, 0x44, 0x01, 0x00, // LZW data
    0x3B, // trailer
];

fn fixed_rgb(pixel: [u8; 3]) -> RgbImage {
    RgbImage::from_fn(2, 2, |_, _| image::Rgb(pixel))
}

pub fn write_plain_png(dir: &Path, name: &str) -> PathBuf {
    write_plain_png_with_pixel(dir, name, [10, 20, 30])
}

pub fn write_plain_png_with_pixel(dir: &Path, name: &str, pixel: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    fixed_rgb(pixel).save(&path).unwrap();
    path
}

/// PNG with tEXt chunks, written through the `png` encoder.
pub fn write_png_with_text(dir: &Path, name: &str, chunks: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(name);
    let file = fs::File::create(&path).unwrap();
    let mut encoder = png::Encoder::new(file, 2, 2);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    for (keyword, text) in chunks {
        encoder
            .add_text_chunk(keyword.to_string(), text.to_string())
            .unwrap();
    }
    let mut writer = encoder.write_header().unwrap();
    let img = fixed_rgb([10, 20, 30]);
    writer.write_image_data(img.as_raw()).unwrap();
    writer.finish().unwrap();
    path
}

pub fn write_plain_jpeg(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let img = fixed_rgb([128, 128, 128]);
    let file = fs::File::create(&path).unwrap();
    let mut encoder = JpegEncoder::new_with_quality(file, 90);
    encoder
        .encode(img.as_raw(), 2, 2, ExtendedColorType::Rgb8)
        .unwrap();
    path
}

/// JPEG carrying a hand-assembled EXIF APP1 segment: IFD0 `Make = "Canon"`
/// plus a GPS sub-IFD with `GPSLatitudeRef = "N"`.
pub fn write_jpeg_with_gps_exif(dir: &Path, name: &str) -> PathBuf {
    let plain = write_plain_jpeg(dir, "__plain_fixture.jpg");
    let bytes = fs::read(&plain).unwrap();
    fs::remove_file(&plain).unwrap();

    let tiff = minimal_gps_tiff_blob();
    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(&tiff);

    let mut out = Vec::with_capacity(bytes.len() + payload.len() + 4);
    out.extend_from_slice(&bytes[..2]); // SOI
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((payload.len() as u16 + 2).to_be_bytes()));
    out.extend_from_slice(&payload);
    out.extend_from_slice(&bytes[2..]);

    let path = dir.join(name);
    fs::write(&path, out).unwrap();
    path
}

/// Little-endian TIFF blob: IFD0 { Make, GPSInfo -> GPS IFD { GPSLatitudeRef } }.
pub fn minimal_gps_tiff_blob() -> Vec<u8> {
    let mut b = Vec::new();
    let u16le = |b: &mut Vec<u8>, v: u16| b.extend_from_slice(&v.to_le_bytes());
    let u32le = |b: &mut Vec<u8>, v: u32| b.extend_from_slice(&v.to_le_bytes());

    b.extend_from_slice(b"II");
    u16le(&mut b, 42);
    u32le(&mut b, 8); // IFD0 offset

    // IFD0: 2 entries at offset 8, ends at 8 + 2 + 24 + 4 = 38
    let make_data_offset = 38u32;
    let gps_ifd_offset = make_data_offset + 6; // "Canon\0"

    u16le(&mut b, 2);
    // Make (0x010F), ASCII, count 6, offset
    u16le(&mut b, 0x010F);
    u16le(&mut b, 2);
    u32le(&mut b, 6);
    u32le(&mut b, make_data_offset);
    // GPSInfo pointer (0x8825), LONG, count 1
    u16le(&mut b, 0x8825);
    u16le(&mut b, 4);
    u32le(&mut b, 1);
    u32le(&mut b, gps_ifd_offset);
    u32le(&mut b, 0); // next IFD

    b.extend_from_slice(b"Canon\0");

    // GPS IFD: 1 entry
    u16le(&mut b, 1);
    // GPSLatitudeRef (0x0001), ASCII, count 2, inline "N\0"
    u16le(&mut b, 0x0001);
    u16le(&mut b, 2);
    u32le(&mut b, 2);
    b.extend_from_slice(b"N\0\0\0");
    u32le(&mut b, 0); // next IFD

    b
}

pub fn write_plain_gif(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, MINIMAL_GIF).unwrap();
    path
}

/// The minimal GIF with a comment extension spliced in before the image data.
pub fn write_gif_with_comment(dir: &Path, name: &str, comment: &str) -> PathBuf {
    let mut out = MINIMAL_GIF[..19].to_vec(); // header + LSD + GCT
    out.push(0x21);
    out.push(0xFE);
    for chunk in comment.as_bytes().chunks(255) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    out.push(0x00); // block terminator
    out.extend_from_slice(&MINIMAL_GIF[19..]);

    let path = dir.join(name);
    fs::write(&path, out).unwrap();
    path
}

pub fn write_plain_webp(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let img = fixed_rgb([10, 20, 30]);
    let file = fs::File::create(&path).unwrap();
    let encoder = image::codecs::webp::WebPEncoder::new_lossless(file);
    encoder
        .write_image(img.as_raw(), 2, 2, ExtendedColorType::Rgb8)
        .unwrap();
    path
}

/// Lossless WebP rewrapped with a VP8X header and an EXIF chunk.
pub fn write_webp_with_exif(dir: &Path, name: &str) -> PathBuf {
    let plain = write_plain_webp(dir, "__plain_fixture.webp");
    let bytes = fs::read(&plain).unwrap();
    fs::remove_file(&plain).unwrap();

    // Payload chunks of the simple file (everything after the 12-byte header)
    let inner = &bytes[12..];

    let mut vp8x = Vec::new();
    vp8x.push(0x08); // EXIF flag
    vp8x.extend_from_slice(&[0, 0, 0]);
    vp8x.extend_from_slice(&1u32.to_le_bytes()[..3]); // canvas width - 1
    vp8x.extend_from_slice(&1u32.to_le_bytes()[..3]); // canvas height - 1

    let exif = minimal_gps_tiff_blob();

    let mut body = Vec::new();
    push_riff_chunk(&mut body, b"VP8X", &vp8x);
    body.extend_from_slice(inner);
    push_riff_chunk(&mut body, b"EXIF", &exif);

    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&((body.len() as u32 + 4).to_le_bytes()));
    out.extend_from_slice(b"WEBP");
    out.extend_from_slice(&body);

    let path = dir.join(name);
    fs::write(&path, out).unwrap();
    path
}

fn push_riff_chunk(out: &mut Vec<u8>, id: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(id);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
}

pub fn write_plain_tiff(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fixed_rgb([10, 20, 30]).save(&path).unwrap();
    path
}
