use std::fs;
use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageReader;
use serde_json::{json, Value};
use studio_contracts::DataUrl;

/// A user-selected image held in memory for the length of one edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Pixel size when the bytes decode as a known format.
    pub dimensions: Option<(u32, u32)>,
}

impl ImageAsset {
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("image")
            .to_string();
        let mime_type = sniff_mime(&bytes)
            .or_else(|| mime_for_path(path))
            .unwrap_or("image/png")
            .to_string();
        Ok(Self::with_mime(name, bytes, mime_type))
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let mime_type = sniff_mime(&bytes).unwrap_or("image/png").to_string();
        Self::with_mime(name, bytes, mime_type)
    }

    fn with_mime(name: impl Into<String>, bytes: Vec<u8>, mime_type: String) -> Self {
        let dimensions = read_dimensions(&bytes);
        Self {
            name: name.into(),
            bytes,
            mime_type,
            dimensions,
        }
    }

    /// `inlineData` part for a `generateContent` request.
    pub fn inline_part(&self) -> Value {
        json!({
            "inlineData": {
                "mimeType": self.mime_type,
                "data": BASE64.encode(&self.bytes),
            }
        })
    }

    pub fn summary(&self) -> String {
        match self.dimensions {
            Some((width, height)) => format!("{} ({width}x{height}, {})", self.name, self.mime_type),
            None => format!("{} ({})", self.name, self.mime_type),
        }
    }
}

/// Decoded image returned by the image model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl GeneratedImage {
    pub fn data_url(&self) -> String {
        DataUrl::new(self.mime_type.clone(), self.bytes.clone()).encode()
    }

    pub fn to_asset(&self, name: impl Into<String>) -> ImageAsset {
        ImageAsset::with_mime(name, self.bytes.clone(), self.mime_type.clone())
    }
}

/// Reads the size from the header without decoding pixels.
fn read_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    let format = image::guess_format(bytes).ok()?;
    match format {
        image::ImageFormat::Png => Some("image/png"),
        image::ImageFormat::Jpeg => Some("image/jpeg"),
        image::ImageFormat::WebP => Some("image/webp"),
        image::ImageFormat::Gif => Some("image/gif"),
        image::ImageFormat::Bmp => Some("image/bmp"),
        image::ImageFormat::Tiff => Some("image/tiff"),
        _ => None,
    }
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" | "heif" => Some("image/heic"),
        _ => None,
    }
}
