//! Client-side post-processing for backend-returned images: brand
//! watermarking and square thumbnail derivation.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};

pub const THUMBNAIL_SIZE: u32 = 128;
const THUMBNAIL_JPEG_QUALITY: u8 = 80;

/// Brand label stamped on every generated image.
pub const WATERMARK_LABEL: &str = "STUDIO AI";

const GLYPH_COLS: u32 = 5;
const GLYPH_ROWS: u32 = 7;

#[derive(Debug, thiserror::Error)]
pub enum ImageOpError {
    #[error("unsupported mime type: {0}")]
    UnsupportedMime(String),
    #[error("image payload is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("decode image failed: {0}")]
    Decode(#[source] image::ImageError),
    #[error("encode image failed: {0}")]
    Encode(#[source] image::ImageError),
}

pub fn mime_to_format(mime_type: &str) -> Result<ImageFormat, ImageOpError> {
    match mime_type {
        "image/png" => Ok(ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Ok(ImageFormat::Jpeg),
        "image/gif" => Ok(ImageFormat::Gif),
        "image/webp" => Ok(ImageFormat::WebP),
        "image/bmp" => Ok(ImageFormat::Bmp),
        other => Err(ImageOpError::UnsupportedMime(other.to_string())),
    }
}

fn decode(bytes: &[u8], mime_type: &str) -> Result<DynamicImage, ImageOpError> {
    let format = mime_to_format(mime_type)?;
    image::load_from_memory_with_format(bytes, format).map_err(ImageOpError::Decode)
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ImageOpError> {
    let mut output = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut output), ImageFormat::Png)
        .map_err(ImageOpError::Encode)?;
    Ok(output)
}

/// Decode a base64 image payload, stamp the brand label, re-encode as PNG.
///
/// Deterministic for identical input bytes. Callers apply this exactly once
/// per backend-returned image, before the image is displayed or stored.
pub fn render_watermarked(payload_base64: &str, mime_type: &str) -> Result<Vec<u8>, ImageOpError> {
    let bytes = BASE64.decode(payload_base64)?;
    let mut image = decode(&bytes, mime_type)?.to_rgba8();
    stamp_label(&mut image);
    encode_png(&DynamicImage::ImageRgba8(image))
}

/// Fixed-size square preview: center-crop to `min(width, height)`, scale to
/// 128x128, encode as lossy JPEG.
pub fn thumbnail_jpeg(bytes: &[u8], mime_type: &str) -> Result<Vec<u8>, ImageOpError> {
    let image = decode(bytes, mime_type)?;
    let (width, height) = image.dimensions();
    let side = width.min(height);
    let x = (width - side) / 2;
    let y = (height - side) / 2;
    let square = image
        .crop_imm(x, y, side, side)
        .resize_exact(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Triangle);

    let mut output = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut output);
    let encoder = JpegEncoder::new_with_quality(
        &mut cursor,
        THUMBNAIL_JPEG_QUALITY,
    );
    DynamicImage::ImageRgb8(square.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(ImageOpError::Encode)?;
    Ok(output)
}

/// Blend the label into the top-right corner at 50% white. Font size and
/// padding scale with image width; the label is clipped on images too small
/// to hold it.
fn stamp_label(image: &mut RgbaImage) {
    let (width, height) = image.dimensions();
    let font_size = (width / 40).max(24);
    let padding = (width / 100).max(10);
    let cell = (font_size / GLYPH_ROWS).max(1);
    let advance = cell * (GLYPH_COLS + 1);
    let label_width = advance * WATERMARK_LABEL.chars().count() as u32 - cell;

    let x0 = width as i64 - padding as i64 - label_width as i64;
    let y0 = padding as i64;

    for (index, ch) in WATERMARK_LABEL.chars().enumerate() {
        let rows = glyph(ch);
        let glyph_x = x0 + index as i64 * advance as i64;
        for (row, bits) in rows.into_iter().enumerate() {
            for col in 0..GLYPH_COLS {
                if bits & (1u8 << (GLYPH_COLS - 1 - col)) == 0 {
                    continue;
                }
                for dy in 0..cell {
                    for dx in 0..cell {
                        let x = glyph_x + (col * cell + dx) as i64;
                        let y = y0 + (row as u32 * cell + dy) as i64;
                        if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
                            continue;
                        }
                        blend_half_white(image.get_pixel_mut(x as u32, y as u32));
                    }
                }
            }
        }
    }
}

fn blend_half_white(pixel: &mut Rgba<u8>) {
    for channel in pixel.0.iter_mut() {
        *channel = ((*channel as u16 + 255) / 2) as u8;
    }
}

/// 5x7 bitmap for each character the label can contain.
fn glyph(ch: char) -> [u8; GLYPH_ROWS as usize] {
    match ch {
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'I' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b11111],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        _ => [0; GLYPH_ROWS as usize],
    }
}
