use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value;

use crate::assets::GeneratedImage;

/// A `generateContent` response reduced to the three shapes the studio acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    Image(ImageResult),
    NoImage(NoImageResult),
    Error(ErrorResult),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageResult {
    pub image: GeneratedImage,
    /// Any text parts the model returned next to the image.
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NoImageResult {
    pub text: Option<String>,
    pub finish_reason: Option<String>,
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResult {
    pub code: Option<i64>,
    pub status: Option<String>,
    pub message: String,
}

impl ModelResponse {
    /// Parses a raw payload without trusting its shape.
    ///
    /// The first inline part with non-empty, decodable data wins. Parts whose
    /// base64 does not decode are skipped rather than failing the response.
    pub fn from_payload(payload: &Value) -> Self {
        if let Some(error) = payload.get("error") {
            return Self::Error(ErrorResult {
                code: error.get("code").and_then(Value::as_i64),
                status: error
                    .get("status")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| error.as_str().map(str::to_string))
                    .unwrap_or_else(|| "unknown model error".to_string()),
            });
        }

        // Only the first candidate is read; alternatives are never mixed.
        let first = payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first());
        let parts = first
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let mut texts: Vec<String> = Vec::new();
        let mut image: Option<GeneratedImage> = None;

        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                if !text.trim().is_empty() {
                    texts.push(text.trim().to_string());
                }
                continue;
            }
            if image.is_some() {
                continue;
            }
            let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            else {
                continue;
            };
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let Ok(bytes) = BASE64.decode(data.as_bytes()) else {
                tracing::warn!("skipping inline image part with invalid base64");
                continue;
            };
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or("image/png")
                .to_string();
            image = Some(GeneratedImage { mime_type, bytes });
        }

        let text = if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        };

        match image {
            Some(image) => Self::Image(ImageResult { image, text }),
            None => Self::NoImage(NoImageResult {
                text,
                finish_reason: first
                    .and_then(|candidate| candidate.get("finishReason"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                block_reason: payload
                    .get("promptFeedback")
                    .and_then(|feedback| feedback.get("blockReason"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Image(result) => result.text.as_deref(),
            Self::NoImage(result) => result.text.as_deref(),
            Self::Error(_) => None,
        }
    }

    pub fn into_image(self) -> Option<GeneratedImage> {
        match self {
            Self::Image(result) => Some(result.image),
            _ => None,
        }
    }

    /// Short description used in logs and the event journal.
    pub fn describe(&self) -> String {
        match self {
            Self::Image(result) => format!(
                "image ({}, {} bytes)",
                result.image.mime_type,
                result.image.bytes.len()
            ),
            Self::NoImage(result) => {
                let mut reasons = Vec::new();
                if let Some(reason) = &result.block_reason {
                    reasons.push(format!("blocked: {reason}"));
                }
                if let Some(reason) = &result.finish_reason {
                    reasons.push(format!("finish: {reason}"));
                }
                if reasons.is_empty() {
                    "no image".to_string()
                } else {
                    format!("no image ({})", reasons.join(", "))
                }
            }
            Self::Error(result) => match result.code {
                Some(code) => format!("error {code}: {}", result.message),
                None => format!("error: {}", result.message),
            },
        }
    }
}
