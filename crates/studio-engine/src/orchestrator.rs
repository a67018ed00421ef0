use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use studio_contracts::errors::{
    COMPOSE_FAILED_MESSAGE, NO_IMAGE_COMPOSE_MESSAGE, NO_IMAGE_RESTORE_MESSAGE,
    RESTORE_FAILED_MESSAGE, SUGGEST_FAILED_MESSAGE,
};
use studio_contracts::events::{EventKind, EventPayload, EventWriter};
use studio_contracts::models::{
    ModelRegistry, ModelSelector, ModelSpec, CAPABILITY_IMAGE, CAPABILITY_TEXT, CAPABILITY_VISION,
};
use studio_contracts::settings::{StudioConfig, DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL};
use studio_contracts::{Language, StudioError, StudioResult};

use crate::assets::{GeneratedImage, ImageAsset};
use crate::prompts;
use crate::response::ModelResponse;
use crate::transport::{
    default_transport_registry, truncate_text, ContentRequest, Modality, RequestPurpose,
    TransportRegistry,
};

const PROBE_PROMPT: &str = "Reply with the single word: ok";

/// Sends studio operations to the configured models.
///
/// Every call blocks until the model answers. Nothing is retried; a failed
/// generation surfaces as [`StudioError::Generation`] and the user resubmits.
pub struct Orchestrator {
    transports: TransportRegistry,
    selector: ModelSelector,
    text_model: String,
    image_model: String,
    language: Language,
    translate: bool,
    events: Option<EventWriter>,
}

impl Orchestrator {
    pub fn new(transports: TransportRegistry, selector: ModelSelector) -> Self {
        Self {
            transports,
            selector,
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            language: Language::default(),
            translate: true,
            events: None,
        }
    }

    pub fn from_config(config: &StudioConfig) -> Self {
        let transports = default_transport_registry(
            &config.api_base,
            config.api_key.clone(),
            config.request_timeout_s,
        );
        let selector = if config.dryrun {
            ModelSelector::new(Some(ModelRegistry::dryrun()))
        } else {
            ModelSelector::new(None)
        };
        Self::new(transports, selector)
            .with_models(config.text_model.clone(), config.image_model.clone())
            .with_language(config.language, config.translate)
    }

    pub fn with_models(mut self, text_model: impl Into<String>, image_model: impl Into<String>) -> Self {
        self.text_model = text_model.into();
        self.image_model = image_model.into();
        self
    }

    pub fn with_language(mut self, language: Language, translate: bool) -> Self {
        self.language = language;
        self.translate = translate;
        self
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn text_model(&self) -> &str {
        &self.text_model
    }

    pub fn image_model(&self) -> &str {
        &self.image_model
    }

    /// Instructions are only translated when they are not already English.
    pub fn translation_enabled(&self) -> bool {
        self.translate && self.language != Language::English
    }

    /// Asks the text model for a compose instruction naming each object by
    /// ordinal.
    pub fn suggest_composition_prompt(
        &self,
        base: Option<&ImageAsset>,
        objects: &[ImageAsset],
    ) -> StudioResult<String> {
        let base = validate_compose_inputs(base, objects)?;
        let model = self.model_for(&self.text_model, CAPABILITY_VISION)?;
        let request = ContentRequest::new(RequestPurpose::Suggest, &model.name)
            .text(prompts::composition_meta_prompt(self.language, objects.len()))
            .image(base)
            .images(objects);

        self.record_started(&request);
        let outcome = self
            .send(&model, &request)
            .and_then(|response| match response.text() {
                Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
                _ => bail!("model returned no suggestion ({})", response.describe()),
            });
        match outcome {
            Ok(text) => {
                self.record(
                    EventKind::GenerationSucceeded,
                    json!({"purpose": request.purpose.as_str(), "model": model.name, "chars": text.chars().count()}),
                );
                Ok(text)
            }
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "instruction suggestion failed");
                self.record_failed(&request, &err);
                Err(StudioError::generation(SUGGEST_FAILED_MESSAGE))
            }
        }
    }

    /// Composites the object images into the base image.
    ///
    /// Parts are sent as base image, object images, then the directive text.
    pub fn compose_images(
        &self,
        base: Option<&ImageAsset>,
        objects: &[ImageAsset],
        instruction: &str,
    ) -> StudioResult<GeneratedImage> {
        let base = validate_compose_inputs(base, objects)?;
        let instruction = prompts::compose_instruction_or_default(instruction, self.language);
        let english = self.english_or_original(&instruction);
        let model = self.model_for(&self.image_model, CAPABILITY_IMAGE)?;
        let request = ContentRequest::new(RequestPurpose::Compose, &model.name)
            .image(base)
            .images(objects)
            .text(prompts::compose_directive(&english))
            .modalities(&[Modality::Image, Modality::Text]);
        self.generate_image(&model, &request, NO_IMAGE_COMPOSE_MESSAGE, COMPOSE_FAILED_MESSAGE)
    }

    pub fn restore_image(
        &self,
        target: Option<&ImageAsset>,
        instruction: &str,
    ) -> StudioResult<GeneratedImage> {
        let target = target
            .ok_or_else(|| StudioError::validation("Upload a photo to restore."))?;
        let instruction = prompts::restore_instruction_or_default(instruction, self.language);
        let english = self.english_or_original(&instruction);
        let model = self.model_for(&self.image_model, CAPABILITY_IMAGE)?;
        let request = ContentRequest::new(RequestPurpose::Restore, &model.name)
            .image(target)
            .text(prompts::restore_directive(&english))
            .modalities(&[Modality::Image, Modality::Text]);
        self.generate_image(&model, &request, NO_IMAGE_RESTORE_MESSAGE, RESTORE_FAILED_MESSAGE)
    }

    /// Short caption for a generated result. Callers keep their own label on
    /// error.
    pub fn analyze_image(&self, image: &GeneratedImage) -> StudioResult<String> {
        let model = self.model_for(&self.text_model, CAPABILITY_VISION)?;
        let request = ContentRequest::new(RequestPurpose::Analyze, &model.name)
            .image(&image.to_asset("result"))
            .text(prompts::analysis_prompt(self.language));
        let response = self
            .send(&model, &request)
            .map_err(|err| StudioError::Analysis(format!("{err:#}")))?;
        match response.text() {
            Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            _ => Err(StudioError::Analysis(format!(
                "model returned no caption ({})",
                response.describe()
            ))),
        }
    }

    /// Caption for the archive, or `fallback` when analysis is unavailable.
    pub fn caption_or(&self, image: &GeneratedImage, fallback: &str) -> String {
        match self.analyze_image(image) {
            Ok(caption) => caption,
            Err(err) => {
                tracing::warn!(error = %err, "keeping instruction as history label");
                self.record(EventKind::AnalysisFallback, json!({"error": err.to_string()}));
                fallback.to_string()
            }
        }
    }

    /// Translates user text to English.
    ///
    /// Empty input yields empty output. When translation is disabled the
    /// text comes back unchanged.
    pub fn translate_to_english(&self, text: &str) -> StudioResult<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        if !self.translation_enabled() {
            return Ok(text.to_string());
        }
        let model = self.model_for(&self.text_model, CAPABILITY_TEXT)?;
        let request = ContentRequest::new(RequestPurpose::Translate, &model.name)
            .text(prompts::translation_prompt(text, self.language));
        let response = self
            .send(&model, &request)
            .map_err(|err| StudioError::Translation(format!("{err:#}")))?;
        match response.text() {
            Some(translated) if !translated.trim().is_empty() => Ok(translated.trim().to_string()),
            _ => Err(StudioError::Translation(format!(
                "model returned no text ({})",
                response.describe()
            ))),
        }
    }

    /// Sends a tiny text request to the text model.
    pub fn test_connection(&self) -> StudioResult<String> {
        let model = self.model_for(&self.text_model, CAPABILITY_TEXT)?;
        let request = ContentRequest::new(RequestPurpose::Probe, &model.name).text(PROBE_PROMPT);
        let response = self
            .send(&model, &request)
            .map_err(|err| StudioError::generation(format!("connection test failed: {err:#}")))?;
        Ok(response
            .text()
            .map(|text| truncate_text(text, 80))
            .unwrap_or_else(|| response.describe()))
    }

    fn english_or_original(&self, instruction: &str) -> String {
        match self.translate_to_english(instruction) {
            Ok(translated) if !translated.trim().is_empty() => translated,
            Ok(_) => instruction.to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "sending instruction untranslated");
                self.record(EventKind::TranslationFallback, json!({"error": err.to_string()}));
                instruction.to_string()
            }
        }
    }

    fn generate_image(
        &self,
        model: &ModelSpec,
        request: &ContentRequest,
        no_image_message: &str,
        failed_message: &str,
    ) -> StudioResult<GeneratedImage> {
        self.record_started(request);
        let response = match self.send(model, request) {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(
                    purpose = request.purpose.as_str(),
                    error = %format!("{err:#}"),
                    "image generation failed"
                );
                self.record_failed(request, &err);
                return Err(StudioError::generation(failed_message));
            }
        };
        let description = response.describe();
        match response.into_image() {
            Some(image) => {
                tracing::info!(
                    purpose = request.purpose.as_str(),
                    model = %model.name,
                    bytes = image.bytes.len(),
                    "image generated"
                );
                self.record(
                    EventKind::GenerationSucceeded,
                    json!({
                        "purpose": request.purpose.as_str(),
                        "model": model.name,
                        "mime_type": image.mime_type,
                        "bytes": image.bytes.len(),
                    }),
                );
                Ok(image)
            }
            None => {
                tracing::warn!(purpose = request.purpose.as_str(), response = %description, "no image in response");
                self.record(
                    EventKind::GenerationFailed,
                    json!({
                        "purpose": request.purpose.as_str(),
                        "model": model.name,
                        "error": description,
                    }),
                );
                Err(StudioError::generation(no_image_message))
            }
        }
    }

    fn model_for(&self, requested: &str, capability: &str) -> StudioResult<ModelSpec> {
        let selection = self.selector.select(requested, capability)?;
        if let Some(reason) = &selection.fallback_reason {
            tracing::warn!(model = %selection.model.name, "{reason}");
        }
        Ok(selection.model)
    }

    fn send(&self, model: &ModelSpec, request: &ContentRequest) -> Result<ModelResponse> {
        let transport = self
            .transports
            .get(&model.provider)
            .with_context(|| format!("no transport registered for provider '{}'", model.provider))?;
        let payload = transport.generate(request)?;
        let response = ModelResponse::from_payload(&payload);
        if let ModelResponse::Error(_) = &response {
            bail!("{} returned {}", transport.name(), response.describe());
        }
        tracing::debug!(
            purpose = request.purpose.as_str(),
            response = %response.describe(),
            "model responded"
        );
        Ok(response)
    }

    fn record_started(&self, request: &ContentRequest) {
        self.record(
            EventKind::GenerationStarted,
            json!({
                "purpose": request.purpose.as_str(),
                "model": request.model,
                "images": request.image_count(),
            }),
        );
    }

    fn record_failed(&self, request: &ContentRequest, err: &anyhow::Error) {
        self.record(
            EventKind::GenerationFailed,
            json!({
                "purpose": request.purpose.as_str(),
                "model": request.model,
                "error": truncate_text(&format!("{err:#}"), 512),
            }),
        );
    }

    fn record(&self, kind: EventKind, payload: Value) {
        if let Some(events) = &self.events {
            events.record(kind, map_object(payload));
        }
    }
}

fn validate_compose_inputs<'a>(
    base: Option<&'a ImageAsset>,
    objects: &[ImageAsset],
) -> StudioResult<&'a ImageAsset> {
    let base = base.ok_or_else(|| StudioError::validation("Upload a base image first."))?;
    if objects.is_empty() {
        return Err(StudioError::validation("Add at least one object image."));
    }
    Ok(base)
}

pub(crate) fn map_object(value: Value) -> EventPayload {
    match value {
        Value::Object(map) => map,
        _ => EventPayload::new(),
    }
}
