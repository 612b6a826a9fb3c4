//! Image asset and generated result types shared across the workflow.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hex SHA-256 digest, used for asset ids and session tokens.
pub fn digest_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Sniff the image container from magic bytes.
pub fn detect_mime_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if bytes.starts_with(b"BM") {
        return Some("image/bmp");
    }
    None
}

pub fn data_uri(mime_type: &str, base64: &str) -> String {
    format!("data:{mime_type};base64,{base64}")
}

/// File name without its final extension.
fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// The uploaded (or background-removed) product image. Immutable; a
/// background-removal result produces a new asset that replaces it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageAsset {
    pub id: String,
    pub name: String,
    #[serde(skip)]
    pub base64: String,
    pub mime_type: String,
}

impl ImageAsset {
    pub fn from_upload(name: &str, bytes: &[u8], mime_type: &'static str) -> Self {
        let timestamp = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default();
        let id = digest_hex(&format!("upload:{timestamp}:{name}:{}", bytes.len()));
        Self {
            id,
            name: name.to_string(),
            base64: BASE64.encode(bytes),
            mime_type: mime_type.to_string(),
        }
    }

    /// Successor asset holding a background-removed rendition. Renames to a
    /// `-no-bg` suffix and forces PNG, which the backend guarantees anyway.
    pub fn background_removed(&self, base64: String) -> Self {
        let name = format!("{}-no-bg.png", file_stem(&self.name));
        let id = digest_hex(&format!("no-bg:{}:{}", self.id, base64.len()));
        Self {
            id,
            name,
            base64,
            mime_type: "image/png".to_string(),
        }
    }

    pub fn preview_uri(&self) -> String {
        data_uri(&self.mime_type, &self.base64)
    }
}

/// A display-ready generated image. `rendered_src` is a watermarked data
/// URI; regeneration replaces it in place, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedImage {
    pub id: String,
    pub rendered_src: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdCopy {
    pub id: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_containers() {
        assert_eq!(
            detect_mime_type(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00]),
            Some("image/png")
        );
        assert_eq!(detect_mime_type(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(detect_mime_type(b"GIF89a..."), Some("image/gif"));
        assert_eq!(detect_mime_type(b"RIFF\x00\x00\x00\x00WEBPVP8 "), Some("image/webp"));
        assert_eq!(detect_mime_type(b"not an image"), None);
    }

    #[test]
    fn background_removal_renames_and_forces_png() {
        let asset = ImageAsset::from_upload("shoe.photo.jpg", b"\xFF\xD8\xFFdata", "image/jpeg");
        let replaced = asset.background_removed("QUJD".to_string());
        assert_eq!(replaced.name, "shoe.photo-no-bg.png");
        assert_eq!(replaced.mime_type, "image/png");
        assert_ne!(replaced.id, asset.id);
    }

    #[test]
    fn stem_handles_extensionless_names() {
        let asset = ImageAsset::from_upload("product", b"BMxx", "image/bmp");
        assert_eq!(asset.background_removed(String::new()).name, "product-no-bg.png");
    }

    #[test]
    fn preview_uri_embeds_mime_and_payload() {
        let asset = ImageAsset::from_upload("a.png", b"abc", "image/png");
        assert_eq!(asset.preview_uri(), format!("data:image/png;base64,{}", asset.base64));
    }
}
