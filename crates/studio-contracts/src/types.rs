use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::StudioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Compose,
    Restore,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compose => "compose",
            Self::Restore => "restore",
        }
    }

    pub fn label(&self, language: Language) -> &'static str {
        match (self, language) {
            (Self::Compose, Language::Korean) => "이미지 합성",
            (Self::Restore, Language::Korean) => "사진 복원",
            (Self::Compose, Language::English) => "Image composition",
            (Self::Restore, Language::English) => "Photo restoration",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One archived generation result. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    pub prompt: String,
    #[serde(rename = "type")]
    pub operation: OperationType,
    pub timestamp: String,
}

impl HistoryItem {
    /// Builds an item with a fresh v4 id and the current UTC time.
    pub fn new(image_url: impl Into<String>, prompt: impl Into<String>, operation: OperationType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            image_url: image_url.into(),
            prompt: prompt.into(),
            operation,
            timestamp: now_utc_iso(),
        }
    }

    pub fn parsed_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(self.timestamp.trim()).ok()
    }

    pub fn decode_image(&self) -> Result<DataUrl, StudioError> {
        DataUrl::parse(&self.image_url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpscaleFactor {
    #[serde(rename = "none")]
    None,
    #[default]
    #[serde(rename = "2x")]
    X2,
    #[serde(rename = "4x")]
    X4,
}

impl UpscaleFactor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::X2 => "2x",
            Self::X4 => "4x",
        }
    }

    /// Label shown next to the option; "none" reads as the original size.
    pub fn display(&self) -> &'static str {
        match self {
            Self::None => "1x",
            Self::X2 => "2x",
            Self::X4 => "4x",
        }
    }
}

impl FromStr for UpscaleFactor {
    type Err = StudioError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "1x" | "off" | "" => Ok(Self::None),
            "2x" | "2" => Ok(Self::X2),
            "4x" | "4" => Ok(Self::X4),
            other => Err(StudioError::validation(format!(
                "unknown upscale factor '{other}' (expected none, 2x or 4x)"
            ))),
        }
    }
}

/// Restore toggles. Only used to derive the instruction text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhancementOptions {
    pub repair_damage: bool,
    pub colorize: bool,
    pub upscale: UpscaleFactor,
}

impl Default for EnhancementOptions {
    fn default() -> Self {
        Self {
            repair_damage: true,
            colorize: true,
            upscale: UpscaleFactor::X2,
        }
    }
}

/// Language the user writes instructions in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Korean,
    English,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Korean => "korean",
            Self::English => "english",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Korean => "Korean",
            Self::English => "English",
        }
    }
}

impl FromStr for Language {
    type Err = StudioError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ko" | "kr" | "korean" | "한국어" => Ok(Self::Korean),
            "en" | "english" => Ok(Self::English),
            other => Err(StudioError::Config(format!("unsupported language '{other}'"))),
        }
    }
}

/// A decoded `data:<mime>;base64,<payload>` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl DataUrl {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, StudioError> {
        let rest = raw
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| StudioError::validation("image URL is not a data URL"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| StudioError::validation("data URL has no payload"))?;
        let Some(mime_type) = header.strip_suffix(";base64") else {
            return Err(StudioError::validation("data URL is not base64 encoded"));
        };
        let bytes = BASE64
            .decode(payload.as_bytes())
            .map_err(|err| StudioError::validation(format!("data URL payload: {err}")))?;
        let mime_type = if mime_type.is_empty() {
            "application/octet-stream"
        } else {
            mime_type
        };
        Ok(Self::new(mime_type, bytes))
    }

    pub fn encode(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.bytes))
    }

    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    let lowered = mime.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    if lowered.contains("gif") {
        return "gif";
    }
    "png"
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn history_item_uses_archive_field_names() -> anyhow::Result<()> {
        let item = HistoryItem {
            id: "a-1".to_string(),
            image_url: "data:image/png;base64,AAAA".to_string(),
            prompt: "place glasses on the face".to_string(),
            operation: OperationType::Compose,
            timestamp: "2026-02-19T00:00:00.000Z".to_string(),
        };
        let value = serde_json::to_value(&item)?;
        assert_eq!(value["imageUrl"], json!("data:image/png;base64,AAAA"));
        assert_eq!(value["type"], json!("compose"));
        assert!(value.get("image_url").is_none());

        let back: HistoryItem = serde_json::from_value(value)?;
        assert_eq!(back, item);
        Ok(())
    }

    #[test]
    fn new_history_item_gets_unique_id_and_rfc3339_timestamp() {
        let a = HistoryItem::new("data:image/png;base64,AA==", "x", OperationType::Restore);
        let b = HistoryItem::new("data:image/png;base64,AA==", "x", OperationType::Restore);
        assert_ne!(a.id, b.id);
        assert!(a.parsed_timestamp().is_some());
    }

    #[test]
    fn data_url_parses_and_reencodes() -> anyhow::Result<()> {
        let parsed = DataUrl::parse("data:image/jpeg;base64,/9j/AA==")?;
        assert_eq!(parsed.mime_type, "image/jpeg");
        assert_eq!(parsed.bytes, vec![0xff, 0xd8, 0xff, 0x00]);
        assert_eq!(parsed.extension(), "jpg");
        assert_eq!(parsed.encode(), "data:image/jpeg;base64,/9j/AA==");
        Ok(())
    }

    #[test]
    fn data_url_rejects_non_base64_urls() {
        assert!(DataUrl::parse("https://example.com/a.png").is_err());
        assert!(DataUrl::parse("data:image/png,rawtext").is_err());
        assert!(DataUrl::parse("data:image/png;base64").is_err());
    }

    #[test]
    fn upscale_factor_parses_aliases() {
        assert_eq!("1x".parse::<UpscaleFactor>().ok(), Some(UpscaleFactor::None));
        assert_eq!("2X".parse::<UpscaleFactor>().ok(), Some(UpscaleFactor::X2));
        assert_eq!("4".parse::<UpscaleFactor>().ok(), Some(UpscaleFactor::X4));
        assert!("8x".parse::<UpscaleFactor>().is_err());
    }

    #[test]
    fn enhancement_defaults_match_restore_screen() {
        let options = EnhancementOptions::default();
        assert!(options.repair_damage);
        assert!(options.colorize);
        assert_eq!(options.upscale, UpscaleFactor::X2);
        let value: Value = serde_json::to_value(options).unwrap_or(Value::Null);
        assert_eq!(value["upscale"], json!("2x"));
    }
}
