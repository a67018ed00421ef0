use std::collections::BTreeMap;
use std::io::Cursor;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, Rgb, RgbImage};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use studio_contracts::settings::{DEFAULT_API_BASE, DEFAULT_REQUEST_TIMEOUT_S};

use crate::assets::ImageAsset;

/// Why a request is being sent. Drives logging and the offline transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPurpose {
    Suggest,
    Translate,
    Compose,
    Restore,
    Analyze,
    Probe,
}

impl RequestPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Suggest => "suggest",
            Self::Translate => "translate",
            Self::Compose => "compose",
            Self::Restore => "restore",
            Self::Analyze => "analyze",
            Self::Probe => "probe",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Text,
    Image,
}

impl Modality {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Image(ImageAsset),
    Text(String),
}

impl Part {
    fn to_json(&self) -> Value {
        match self {
            Self::Image(asset) => asset.inline_part(),
            Self::Text(text) => json!({ "text": text }),
        }
    }
}

/// One multimodal `generateContent` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRequest {
    pub purpose: RequestPurpose,
    pub model: String,
    pub parts: Vec<Part>,
    pub response_modalities: Vec<Modality>,
}

impl ContentRequest {
    pub fn new(purpose: RequestPurpose, model: impl Into<String>) -> Self {
        Self {
            purpose,
            model: model.into(),
            parts: Vec::new(),
            response_modalities: Vec::new(),
        }
    }

    pub fn image(mut self, asset: &ImageAsset) -> Self {
        self.parts.push(Part::Image(asset.clone()));
        self
    }

    pub fn images<'a>(mut self, assets: impl IntoIterator<Item = &'a ImageAsset>) -> Self {
        for asset in assets {
            self.parts.push(Part::Image(asset.clone()));
        }
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(Part::Text(text.into()));
        self
    }

    pub fn modalities(mut self, modalities: &[Modality]) -> Self {
        self.response_modalities = modalities.to_vec();
        self
    }

    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| matches!(part, Part::Image(_)))
            .count()
    }

    pub fn text_parts(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) => Some(text.as_str()),
                Part::Image(_) => None,
            })
            .collect()
    }

    pub fn payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert(
            "contents".to_string(),
            Value::Array(vec![json!({
                "role": "user",
                "parts": self.parts.iter().map(Part::to_json).collect::<Vec<Value>>(),
            })]),
        );
        if !self.response_modalities.is_empty() {
            payload.insert(
                "generationConfig".to_string(),
                json!({
                    "responseModalities": self
                        .response_modalities
                        .iter()
                        .map(Modality::as_str)
                        .collect::<Vec<&str>>(),
                }),
            );
        }
        Value::Object(payload)
    }
}

/// Network boundary to a generation backend. Returns the raw JSON payload;
/// interpretation happens in [`crate::response::ModelResponse`].
pub trait GenerationTransport: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &ContentRequest) -> Result<Value>;
}

#[derive(Default)]
pub struct TransportRegistry {
    transports: BTreeMap<String, Box<dyn GenerationTransport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: GenerationTransport + 'static>(&mut self, transport: T) {
        self.transports
            .insert(transport.name().to_string(), Box::new(transport));
    }

    pub fn get(&self, name: &str) -> Option<&dyn GenerationTransport> {
        self.transports.get(name).map(|transport| transport.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.transports.keys().cloned().collect()
    }
}

pub struct GeminiTransport {
    api_base: String,
    api_key: Option<String>,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiTransport {
    pub fn new(api_base: &str, api_key: Option<String>, timeout_s: f64) -> Self {
        let api_base = api_base.trim().trim_end_matches('/');
        Self {
            api_base: if api_base.is_empty() {
                DEFAULT_API_BASE.to_string()
            } else {
                api_base.to_string()
            },
            api_key: api_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            timeout: Duration::from_secs_f64(if timeout_s.is_finite() && timeout_s > 0.0 {
                timeout_s
            } else {
                DEFAULT_REQUEST_TIMEOUT_S
            }),
            http: HttpClient::new(),
        }
    }

    pub fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

impl GenerationTransport for GeminiTransport {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &ContentRequest) -> Result<Value> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set and no API key saved in settings");
        };
        let endpoint = self.endpoint_for_model(&request.model);
        tracing::debug!(
            purpose = request.purpose.as_str(),
            model = %request.model,
            images = request.image_count(),
            "sending generateContent request"
        );
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .json(&request.payload())
            .send()
            .with_context(|| format!("Gemini request failed ({})", request.model))?;
        response_json_or_error("Gemini", response)
    }
}

/// Offline transport. Image requests get a solid PNG whose color is derived
/// from the request text; text requests get canned answers. Translation and
/// analysis return no text so callers exercise their fallbacks.
pub struct DryrunTransport;

impl GenerationTransport for DryrunTransport {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &ContentRequest) -> Result<Value> {
        if request.response_modalities.contains(&Modality::Image) {
            let (width, height) = request
                .parts
                .iter()
                .find_map(|part| match part {
                    Part::Image(asset) => asset.dimensions,
                    Part::Text(_) => None,
                })
                .map(|(width, height)| (width.clamp(1, 512), height.clamp(1, 512)))
                .unwrap_or((256, 256));
            let seed_text = request.text_parts().join("\n");
            let bytes = dryrun_png(width, height, &seed_text)?;
            return Ok(json!({
                "candidates": [{
                    "content": {"parts": [{
                        "inlineData": {"mimeType": "image/png", "data": BASE64.encode(bytes)}
                    }]},
                    "finishReason": "STOP"
                }]
            }));
        }

        let text = match request.purpose {
            RequestPurpose::Suggest => dryrun_suggestion(request.image_count().saturating_sub(1)),
            RequestPurpose::Probe => "ok".to_string(),
            _ => String::new(),
        };
        let parts = if text.is_empty() {
            Vec::new()
        } else {
            vec![json!({ "text": text })]
        };
        Ok(json!({
            "candidates": [{
                "content": {"parts": parts},
                "finishReason": "STOP"
            }],
            "dryrun_id": short_id(&request.text_parts().join("\n"), request.parts.len() as u64),
        }))
    }
}

pub fn default_transport_registry(
    api_base: &str,
    api_key: Option<String>,
    timeout_s: f64,
) -> TransportRegistry {
    let mut transports = TransportRegistry::new();
    transports.register(DryrunTransport);
    transports.register(GeminiTransport::new(api_base, api_key, timeout_s));
    transports
}

fn dryrun_suggestion(objects: usize) -> String {
    const ORDINALS: [&str; 5] = ["first", "second", "third", "fourth", "fifth"];
    let mut clauses = Vec::new();
    for idx in 0..objects {
        let ordinal = ORDINALS
            .get(idx)
            .map(|value| (*value).to_string())
            .unwrap_or_else(|| format!("#{}", idx + 1));
        clauses.push(format!("place the {ordinal} object naturally in the subject's hands or on the subject"));
    }
    if clauses.is_empty() {
        return "Blend the images naturally with realistic lighting and shadows.".to_string();
    }
    format!(
        "Composite realistically so that the subject interacts with every object: {}. Never change the original design of any object, and match lighting and shadows.",
        clauses.join("; ")
    )
}

fn dryrun_png(width: u32, height: u32, seed_text: &str) -> Result<Vec<u8>> {
    let (r, g, b) = color_from_text(seed_text);
    let image = RgbImage::from_pixel(width, height, Rgb([r, g, b]));
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .context("failed to encode dryrun image")?;
    Ok(out.into_inner())
}

fn color_from_text(text: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

fn short_id(text: &str, idx: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(idx.to_be_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..4])
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::response::ModelResponse;

    fn asset(name: &str) -> ImageAsset {
        ImageAsset::from_bytes(name, vec![1, 2, 3])
    }

    #[test]
    fn payload_orders_parts_and_sets_modalities() {
        let request = ContentRequest::new(RequestPurpose::Compose, "gemini-2.5-flash-image")
            .image(&asset("base"))
            .images([&asset("o1"), &asset("o2")])
            .text("directive")
            .modalities(&[Modality::Image, Modality::Text]);
        let payload = request.payload();
        let parts = payload["contents"][0]["parts"].as_array().cloned().unwrap_or_default();
        assert_eq!(parts.len(), 4);
        assert!(parts[0].get("inlineData").is_some());
        assert!(parts[2].get("inlineData").is_some());
        assert_eq!(parts[3], json!({"text": "directive"}));
        assert_eq!(payload["contents"][0]["role"], json!("user"));
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["IMAGE", "TEXT"])
        );
        assert_eq!(request.image_count(), 3);
    }

    #[test]
    fn text_requests_omit_generation_config() {
        let payload = ContentRequest::new(RequestPurpose::Translate, "gemini-3-flash-preview")
            .text("hello")
            .payload();
        assert!(payload.get("generationConfig").is_none());
    }

    #[test]
    fn gemini_endpoint_accepts_prefixed_and_bare_models() {
        let transport = GeminiTransport::new("https://example.test/v1beta/", None, 10.0);
        assert_eq!(
            transport.endpoint_for_model("gemini-2.5-flash-image"),
            "https://example.test/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
        assert_eq!(
            transport.endpoint_for_model("models/gemini-3-flash-preview"),
            "https://example.test/v1beta/models/gemini-3-flash-preview:generateContent"
        );
    }

    #[test]
    fn gemini_without_key_fails_before_network() {
        let transport = GeminiTransport::new("", Some("   ".to_string()), 10.0);
        let err = transport
            .generate(&ContentRequest::new(RequestPurpose::Probe, "m").text("ping"))
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn dryrun_image_is_deterministic_png() -> anyhow::Result<()> {
        let request = ContentRequest::new(RequestPurpose::Restore, "dryrun-image-1")
            .image(&asset("target"))
            .text("restore")
            .modalities(&[Modality::Image, Modality::Text]);
        let first = ModelResponse::from_payload(&DryrunTransport.generate(&request)?);
        let second = ModelResponse::from_payload(&DryrunTransport.generate(&request)?);
        assert_eq!(first, second);
        let image = first.into_image().ok_or_else(|| anyhow::anyhow!("no image"))?;
        assert_eq!(image.mime_type, "image/png");
        let decoded = image::load_from_memory(&image.bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (256, 256));
        Ok(())
    }

    #[test]
    fn dryrun_translation_returns_no_text() -> anyhow::Result<()> {
        let request = ContentRequest::new(RequestPurpose::Translate, "dryrun-text-1").text("안녕");
        let response = ModelResponse::from_payload(&DryrunTransport.generate(&request)?);
        assert_eq!(response.text(), None);
        Ok(())
    }

    #[test]
    fn dryrun_suggestion_names_each_object() -> anyhow::Result<()> {
        let request = ContentRequest::new(RequestPurpose::Suggest, "dryrun-text-1")
            .text("meta")
            .image(&asset("base"))
            .images([&asset("o1"), &asset("o2")]);
        let response = ModelResponse::from_payload(&DryrunTransport.generate(&request)?);
        let text = response.text().unwrap_or_default().to_string();
        assert!(text.contains("first object"));
        assert!(text.contains("second object"));
        assert!(!text.contains("third object"));
        Ok(())
    }

    #[test]
    fn registry_lists_transports_by_name() {
        let registry = default_transport_registry("", None, 30.0);
        assert_eq!(registry.names(), vec!["dryrun", "gemini"]);
        assert!(registry.get("gemini").is_some());
        assert!(registry.get("openai").is_none());
    }

    #[test]
    fn truncate_text_appends_ellipsis() {
        assert_eq!(truncate_text("abcdef", 3), "abc…");
        assert_eq!(truncate_text("abc", 3), "abc");
    }
}
